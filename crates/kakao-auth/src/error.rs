//! Error types for credential storage and token lifecycle operations

/// Errors from credential and token operations.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("HTTP request failed: {0}")]
    Http(String),

    /// The token endpoint refused the grant (revoked/expired refresh token,
    /// bad authorization code, unknown client).
    #[error("renewal rejected: {0}")]
    RenewalRejected(String),

    #[error("token exchange failed: {0}")]
    TokenExchange(String),

    /// The durable credential record cannot be read or written.
    #[error("credential store unavailable: {0}")]
    StoreUnavailable(String),

    /// First-run acquisition could not produce a usable token.
    #[error("bootstrap failed: {0}")]
    Bootstrap(String),

    #[error("credential parse error: {0}")]
    CredentialParse(String),

    /// Every path to a valid access token failed; terminal for the run.
    #[error("credentials exhausted: {0}")]
    CredentialsExhausted(String),

    #[error("secret sink failed: {0}")]
    Sink(String),
}

/// Result alias for auth operations.
pub type Result<T> = std::result::Result<T, Error>;
