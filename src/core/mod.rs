//! Core types shared by every layer: formats and errors.

pub mod error;
pub mod format;

pub use error::{ErrorLog, Result, ShimError};
pub use format::Format;
