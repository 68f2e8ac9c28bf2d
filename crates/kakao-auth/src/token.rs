//! Token endpoint and validity probe calls
//!
//! Three remote interactions:
//! 1. Refresh-token renewal (`grant_type=refresh_token`)
//! 2. Authorization code exchange (`grant_type=authorization_code`)
//! 3. Validity probe against the access token info endpoint
//!
//! Renewal and exchange POST form bodies to the kauth host; the probe is a
//! bearer-authenticated GET on the kapi host.

use common::Secret;
use reqwest::StatusCode;
use serde::Deserialize;
use tracing::debug;

use crate::constants::{BOOTSTRAP_REFRESH_HEADER, Endpoints};
use crate::credentials::{CredentialUpdate, normalize_secret};
use crate::error::{Error, Result};

/// Registered application identity used on the token endpoint.
#[derive(Debug, Clone)]
pub struct OAuthClient {
    /// REST API key of the Kakao application
    pub client_id: String,
    pub client_secret: Option<Secret<String>>,
    /// Required for authorization code exchange only
    pub redirect_uri: Option<String>,
}

/// Token endpoint response for both renewal and code exchange.
///
/// Kakao only includes `refresh_token` when it rotates it, so the field is
/// optional and an absent value must never clear the stored one.
#[derive(Debug, Deserialize)]
pub struct RenewalResult {
    pub access_token: Secret<String>,
    #[serde(default)]
    pub refresh_token: Option<Secret<String>>,
    /// Seconds until the access token expires (delta, not absolute)
    #[serde(default)]
    pub expires_in: Option<u64>,
}

impl RenewalResult {
    /// Convert into a store update, turning `expires_in` into an absolute
    /// unix millisecond timestamp relative to `now_millis`.
    pub fn into_update(self, now_millis: u64) -> CredentialUpdate {
        CredentialUpdate {
            access_token: Some(self.access_token),
            refresh_token: self.refresh_token.filter(|t| !t.expose().trim().is_empty()),
            expires_at: self.expires_in.map(|secs| expires_at_millis(now_millis, secs)),
        }
    }
}

/// Result of the validity probe.
#[derive(Debug)]
pub enum ProbeOutcome {
    /// 200: token accepted. `refresh_token` is read from the bootstrap
    /// response header when the server supplies one.
    Valid {
        expires_in: Option<u64>,
        refresh_token: Option<Secret<String>>,
    },
    /// 401: token expired or revoked
    Rejected,
}

#[derive(Deserialize)]
struct TokenInfo {
    #[serde(default)]
    expires_in: Option<u64>,
}

/// Absolute expiry for a server-supplied `expires_in`. Saturates instead of
/// overflowing on absurd values.
pub fn expires_at_millis(now_millis: u64, expires_in_secs: u64) -> u64 {
    now_millis.saturating_add(expires_in_secs.saturating_mul(1000))
}

/// Current time as unix milliseconds.
pub fn now_millis() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}

/// Renew the access token with a refresh token.
pub async fn refresh_access_token(
    client: &reqwest::Client,
    endpoints: &Endpoints,
    oauth: &OAuthClient,
    refresh: &Secret<String>,
) -> Result<RenewalResult> {
    let mut form = vec![
        ("grant_type", "refresh_token"),
        ("client_id", oauth.client_id.as_str()),
        ("refresh_token", refresh.expose().as_str()),
    ];
    if let Some(secret) = &oauth.client_secret {
        form.push(("client_secret", secret.expose().as_str()));
    }

    debug!("requesting refresh-token renewal");
    post_token_form(client, &endpoints.token, &form, "refresh").await
}

/// Exchange a one-time authorization code for a token pair.
pub async fn exchange_code(
    client: &reqwest::Client,
    endpoints: &Endpoints,
    oauth: &OAuthClient,
    code: &Secret<String>,
) -> Result<RenewalResult> {
    let redirect_uri = oauth.redirect_uri.as_deref().ok_or_else(|| {
        Error::Bootstrap("authorization code exchange requires a redirect URI".into())
    })?;

    let mut form = vec![
        ("grant_type", "authorization_code"),
        ("client_id", oauth.client_id.as_str()),
        ("redirect_uri", redirect_uri),
        ("code", code.expose().as_str()),
    ];
    if let Some(secret) = &oauth.client_secret {
        form.push(("client_secret", secret.expose().as_str()));
    }

    debug!("exchanging authorization code");
    post_token_form(client, &endpoints.token, &form, "code exchange").await
}

async fn post_token_form(
    client: &reqwest::Client,
    url: &str,
    form: &[(&str, &str)],
    what: &str,
) -> Result<RenewalResult> {
    let response = client
        .post(url)
        .form(form)
        .send()
        .await
        .map_err(|e| Error::Http(format!("token {what} request failed: {e}")))?;

    let status = response.status();
    if !status.is_success() {
        let body = response
            .text()
            .await
            .unwrap_or_else(|_| String::from("<no body>"));

        // 400 invalid_grant, 401 invalid client, 403 disabled app
        if matches!(status.as_u16(), 400 | 401 | 403) {
            return Err(Error::RenewalRejected(format!(
                "token {what} rejected ({status}): {body}"
            )));
        }

        return Err(Error::TokenExchange(format!(
            "token {what} returned {status}: {body}"
        )));
    }

    response
        .json::<RenewalResult>()
        .await
        .map_err(|e| Error::TokenExchange(format!("invalid token {what} response: {e}")))
}

/// Check an access token with a cheap authenticated call.
///
/// 200 → `Valid`, 401 → `Rejected`, anything else is an error: the caller
/// decides whether an inconclusive probe is fatal.
pub async fn probe_access_token(
    client: &reqwest::Client,
    endpoints: &Endpoints,
    access: &Secret<String>,
) -> Result<ProbeOutcome> {
    let response = client
        .get(&endpoints.token_info)
        .bearer_auth(access.expose())
        .send()
        .await
        .map_err(|e| Error::Http(format!("token probe request failed: {e}")))?;

    let status = response.status();
    if status == StatusCode::UNAUTHORIZED {
        return Ok(ProbeOutcome::Rejected);
    }
    if !status.is_success() {
        let body = response
            .text()
            .await
            .unwrap_or_else(|_| String::from("<no body>"));
        return Err(Error::Http(format!("token probe returned {status}: {body}")));
    }

    let refresh_token = normalize_secret(
        response
            .headers()
            .get(BOOTSTRAP_REFRESH_HEADER)
            .and_then(|v| v.to_str().ok()),
    );
    // The body is informational; an unexpected shape does not make the token invalid
    let expires_in = response
        .json::<TokenInfo>()
        .await
        .ok()
        .and_then(|info| info.expires_in);

    Ok(ProbeOutcome::Valid {
        expires_in,
        refresh_token,
    })
}
