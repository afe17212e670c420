pub mod config;
pub mod engine;
pub mod error;
pub mod lifecycle;
pub mod stats;
pub mod types;
