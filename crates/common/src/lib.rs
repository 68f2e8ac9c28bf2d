//! Common types for the quote notifier workspace

mod error;
mod secret;

pub use error::{Error, Result};
pub use secret::Secret;
