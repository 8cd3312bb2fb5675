//! Command implementations

pub mod backends;
pub mod completions;
pub mod convert;
pub mod supports;
