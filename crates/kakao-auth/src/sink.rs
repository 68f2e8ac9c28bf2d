//! External persistence of rotated credentials
//!
//! The durable record is the source of truth. A sink additionally pushes a
//! rotated token somewhere outside the process (a CI secret store, a vault)
//! so the next scheduled run on a fresh machine starts from the new value.

use std::future::Future;
use std::pin::Pin;

use common::Secret;

use crate::error::Result;

/// Persist a named credential outside the process.
///
/// Uses `Pin<Box<dyn Future>>` return types for dyn-compatibility
/// (`Arc<dyn SecretSink>`).
pub trait SecretSink: Send + Sync {
    fn persist<'a>(
        &'a self,
        name: &'a str,
        value: &'a Secret<String>,
    ) -> Pin<Box<dyn Future<Output = Result<()>> + Send + 'a>>;
}
