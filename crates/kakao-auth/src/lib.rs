//! Kakao OAuth credential handling
//!
//! Owns everything between "a process starts with some configured tokens"
//! and "here is an access token the memo API will accept":
//!
//! 1. `credentials::CredentialStore` loads the durable token record, or seeds
//!    it from configuration, and persists every change atomically
//! 2. `lifecycle::TokenManager` probes the held access token, renews it with
//!    the refresh token, and falls back to first-run bootstrap
//! 3. `token` holds the raw token endpoint and probe calls
//! 4. `sink::SecretSink` lets rotated tokens be pushed to an external store

pub mod constants;
pub mod credentials;
pub mod error;
pub mod lifecycle;
pub mod sink;
pub mod token;

#[cfg(test)]
mod testing;

pub use constants::*;
pub use credentials::{
    Changes, CredentialSet, CredentialStore, CredentialUpdate, normalize_secret, normalize_token,
};
pub use error::{Error, Result};
pub use lifecycle::{Bootstrap, TokenManager, TokenState};
pub use sink::SecretSink;
pub use token::{OAuthClient, ProbeOutcome, RenewalResult};
