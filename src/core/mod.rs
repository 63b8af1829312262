//! Core utilities and common types for plughub.

pub mod error;
pub mod types;

pub use error::{Error, ErrorBody, Result};
pub use types::*;
