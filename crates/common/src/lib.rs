//! Shared configuration error and secret types for the auth gateway

mod error;
mod secret;

pub use error::{Error, Result};
pub use secret::Secret;
