//! Shared types for the session proxy workspace

mod error;
mod secret;

pub use error::{Error, Result};
pub use secret::Secret;
