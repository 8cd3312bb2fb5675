//! High-level operations.
//!
//! This module contains the public conversion API used by callers and by
//! the `docshim` binary.

pub mod convert;

pub use convert::DocShim;
