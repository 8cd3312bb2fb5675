//! Shared utilities

pub mod config;
pub mod fs;
pub mod port;
pub mod process;
pub mod retry;

pub use config::Config;
pub use process::ProcessBuilder;
pub use retry::retry;
