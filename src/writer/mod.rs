pub mod key_lock;
pub mod upsert;
