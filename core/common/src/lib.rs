//! Common utilities and types shared across dropmedia crates.
//!
//! This module provides the error type and the media key type that every
//! storage backend speaks.

pub mod error;
pub mod types;

pub use error::{Error, Result};
pub use types::MediaPath;
