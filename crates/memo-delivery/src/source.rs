//! Where the delivery loop gets its access tokens

use std::future::Future;
use std::pin::Pin;

use common::Secret;
use kakao_auth::TokenManager;

/// Boxed token future, kept dyn-compatible like the rest of the seams.
pub type TokenFuture<'a> =
    Pin<Box<dyn Future<Output = kakao_auth::Result<Secret<String>>> + Send + 'a>>;

/// Supplier of access tokens for the send loop.
///
/// `ensure_valid_token` may return a cached token; `force_renewal` must not,
/// since it is only called after the send endpoint rejected the current one.
pub trait TokenSource: Send {
    fn ensure_valid_token(&mut self) -> TokenFuture<'_>;
    fn force_renewal(&mut self) -> TokenFuture<'_>;
}

impl TokenSource for TokenManager {
    fn ensure_valid_token(&mut self) -> TokenFuture<'_> {
        Box::pin(TokenManager::ensure_valid_token(self))
    }

    fn force_renewal(&mut self) -> TokenFuture<'_> {
        Box::pin(TokenManager::force_renewal(self))
    }
}
