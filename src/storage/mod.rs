pub mod file_lock;
pub mod layout;
pub mod persistence;
pub mod snapshot;
pub mod wal;
