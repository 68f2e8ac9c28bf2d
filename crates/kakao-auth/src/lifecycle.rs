//! Access token lifecycle
//!
//! `TokenManager` owns the credential store and decides, per call, whether
//! the held access token can be used, needs a probe, or must be renewed.
//!
//! State transitions:
//! - NoCredentials / RefreshOnly → Valid (renewal or bootstrap succeeded)
//! - Cached → Valid (probe 200, or expiry comfortably in the future)
//! - Cached / Valid → Rejected (probe 401, or caller reports a 401)
//! - Rejected → Valid (renewed) | Exhausted (every path failed)
//! - Exhausted is terminal for the run
//!
//! Renewal order: refresh token first, then the bootstrap paths (one-time
//! authorization code, then the configured access token validated against
//! the token info endpoint).

use std::sync::Arc;

use common::Secret;
use tracing::{debug, error, info, warn};

use crate::constants::{ACCESS_TOKEN_SECRET_NAME, Endpoints, REFRESH_TOKEN_SECRET_NAME};
use crate::credentials::{Changes, CredentialSet, CredentialStore, CredentialUpdate};
use crate::error::{Error, Result};
use crate::sink::SecretSink;
use crate::token::{self, OAuthClient, ProbeOutcome, expires_at_millis, now_millis};

/// A token whose expiry is at least this far away is used without a probe.
const EXPIRY_MARGIN_MILLIS: u64 = 60_000;

/// Where the manager stands with respect to a usable access token.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenState {
    NoCredentials,
    RefreshOnly,
    /// Access token held but not verified during this run
    Cached,
    Valid,
    Rejected,
    /// No remaining way to obtain a token; terminal for the run
    Exhausted,
}

impl TokenState {
    /// Status label for logging.
    pub fn label(&self) -> &'static str {
        match self {
            TokenState::NoCredentials => "no_credentials",
            TokenState::RefreshOnly => "refresh_only",
            TokenState::Cached => "cached",
            TokenState::Valid => "valid",
            TokenState::Rejected => "rejected",
            TokenState::Exhausted => "exhausted",
        }
    }

    fn from_credentials(creds: &CredentialSet) -> Self {
        match (&creds.access_token, &creds.refresh_token) {
            (Some(_), _) => TokenState::Cached,
            (None, Some(_)) => TokenState::RefreshOnly,
            (None, None) => TokenState::NoCredentials,
        }
    }
}

/// Operator-supplied first-run material.
#[derive(Debug, Default)]
pub struct Bootstrap {
    /// Access token obtained out of band (e.g. from the developer console)
    pub access_token: Option<Secret<String>>,
    /// One-time authorization code from the consent redirect
    pub authorization_code: Option<Secret<String>>,
}

/// Single owner of the live credentials for a run.
pub struct TokenManager {
    store: CredentialStore,
    http: reqwest::Client,
    endpoints: Endpoints,
    oauth: OAuthClient,
    bootstrap: Bootstrap,
    sink: Option<Arc<dyn SecretSink>>,
    state: TokenState,
    renewals: u32,
    sink_failures: u32,
}

impl TokenManager {
    pub fn new(
        store: CredentialStore,
        http: reqwest::Client,
        endpoints: Endpoints,
        oauth: OAuthClient,
        bootstrap: Bootstrap,
    ) -> Self {
        let state = TokenState::from_credentials(store.current());
        info!(state = state.label(), "token manager initialized");
        Self {
            store,
            http,
            endpoints,
            oauth,
            bootstrap,
            sink: None,
            state,
            renewals: 0,
            sink_failures: 0,
        }
    }

    /// Hand rotated tokens to an external sink as well as the durable record.
    pub fn with_sink(mut self, sink: Arc<dyn SecretSink>) -> Self {
        self.sink = Some(sink);
        self
    }

    pub fn state(&self) -> TokenState {
        self.state
    }

    pub fn credentials(&self) -> &CredentialSet {
        self.store.current()
    }

    /// Successful renewals (refresh, code exchange or bootstrap) this run.
    pub fn renewals(&self) -> u32 {
        self.renewals
    }

    /// Rotations the external sink failed to persist this run.
    pub fn sink_failures(&self) -> u32 {
        self.sink_failures
    }

    /// Return an access token believed valid, renewing if necessary.
    ///
    /// Fails with `CredentialsExhausted` when neither the refresh token nor
    /// the bootstrap material yields a token, and with `StoreUnavailable`
    /// when a renewed token cannot be persisted.
    pub async fn ensure_valid_token(&mut self) -> Result<Secret<String>> {
        match self.state {
            TokenState::Exhausted => return Err(exhausted_for_run()),
            // The held token was refused; only a renewal can help
            TokenState::Rejected => return self.renew().await,
            TokenState::Valid => {
                if let Some(access) = self.usable_access_token() {
                    return Ok(access);
                }
            }
            _ => {}
        }

        if let Some(access) = self.store.current().access_token.clone() {
            if self.expiry_is_comfortable() {
                debug!("access token expiry is comfortably ahead, skipping probe");
                self.transition(TokenState::Valid);
                return Ok(access);
            }

            match token::probe_access_token(&self.http, &self.endpoints, &access).await {
                Ok(ProbeOutcome::Valid { expires_in, .. }) => {
                    if let Some(secs) = expires_in {
                        self.store
                            .merge(CredentialUpdate {
                                expires_at: Some(expires_at_millis(now_millis(), secs)),
                                ..Default::default()
                            })
                            .await?;
                    }
                    self.transition(TokenState::Valid);
                    return Ok(access);
                }
                Ok(ProbeOutcome::Rejected) => {
                    info!("cached access token rejected by probe");
                    self.transition(TokenState::Rejected);
                }
                Err(e) => {
                    // Inconclusive: use the token and let a send-time 401 trigger renewal
                    warn!(error = %e, "validity probe failed, using cached access token");
                    self.transition(TokenState::Valid);
                    return Ok(access);
                }
            }
        }

        self.renew().await
    }

    /// Mark the held access token as rejected without any network traffic.
    pub fn invalidate(&mut self) {
        if self.state != TokenState::Exhausted {
            self.transition(TokenState::Rejected);
        }
    }

    /// Discard the held access token and renew unconditionally.
    ///
    /// Used after the remote service answered 401 to a token that this
    /// manager considered valid.
    pub async fn force_renewal(&mut self) -> Result<Secret<String>> {
        if self.state == TokenState::Exhausted {
            return Err(exhausted_for_run());
        }
        self.invalidate();
        self.renew().await
    }

    async fn renew(&mut self) -> Result<Secret<String>> {
        let refresh_failure = match self.store.current().refresh_token.clone() {
            Some(refresh) => {
                match token::refresh_access_token(&self.http, &self.endpoints, &self.oauth, &refresh)
                    .await
                {
                    Ok(result) => {
                        return self
                            .adopt(result.into_update(now_millis()), "refresh_token")
                            .await;
                    }
                    Err(e) => {
                        warn!(error = %e, "refresh-token renewal failed, falling back to bootstrap");
                        e.to_string()
                    }
                }
            }
            None => {
                debug!("no refresh token held, attempting bootstrap");
                "no refresh token held".to_string()
            }
        };

        match self.acquire_initial().await {
            Ok(access) => Ok(access),
            Err(e @ Error::StoreUnavailable(_)) => Err(e),
            Err(e) => {
                self.transition(TokenState::Exhausted);
                error!(refresh = %refresh_failure, bootstrap = %e, "no viable path to an access token");
                Err(Error::CredentialsExhausted(format!(
                    "refresh: {refresh_failure}; bootstrap: {e}"
                )))
            }
        }
    }

    /// First-run acquisition.
    ///
    /// A configured authorization code is exchanged once. Otherwise the
    /// bootstrap access token is validated against the token info endpoint;
    /// a refresh token is taken from that response's header when present.
    async fn acquire_initial(&mut self) -> Result<Secret<String>> {
        if let Some(code) = self.bootstrap.authorization_code.take() {
            match token::exchange_code(&self.http, &self.endpoints, &self.oauth, &code).await {
                Ok(result) => {
                    return self
                        .adopt(result.into_update(now_millis()), "authorization_code")
                        .await;
                }
                Err(e) => warn!(error = %e, "authorization code exchange failed"),
            }
        }

        let access = self.bootstrap.access_token.clone().ok_or_else(|| {
            Error::Bootstrap("no bootstrap access token configured".into())
        })?;

        // The bootstrap token may be the very token that was just rejected
        if self.state == TokenState::Rejected
            && matches!(&self.store.current().access_token, Some(held) if held.same_as(&access))
        {
            return Err(Error::Bootstrap(
                "bootstrap access token is the one just rejected; supply a fresh token".into(),
            ));
        }

        match token::probe_access_token(&self.http, &self.endpoints, &access).await? {
            ProbeOutcome::Rejected => Err(Error::Bootstrap(
                "bootstrap access token rejected; supply a fresh token".into(),
            )),
            ProbeOutcome::Valid {
                expires_in,
                refresh_token,
            } => {
                if refresh_token.is_none() {
                    warn!("bootstrap probe returned no refresh token, continuing with access token only");
                }
                let update = CredentialUpdate {
                    access_token: Some(access),
                    refresh_token,
                    expires_at: expires_in.map(|secs| expires_at_millis(now_millis(), secs)),
                };
                self.adopt(update, "bootstrap").await
            }
        }
    }

    /// Persist a newly obtained token and make it the live one.
    async fn adopt(&mut self, update: CredentialUpdate, via: &'static str) -> Result<Secret<String>> {
        let access = update
            .access_token
            .clone()
            .ok_or_else(|| Error::TokenExchange(format!("{via} produced no access token")))?;

        let changes = self.store.merge(update).await?;
        self.renewals += 1;
        self.transition(TokenState::Valid);
        info!(
            via,
            rotated_refresh = changes.refresh_token,
            "access token renewed"
        );

        self.propagate(changes).await;
        Ok(access)
    }

    /// Push rotated values to the external sink. Failures are counted and
    /// logged; the durable record already holds the new values.
    async fn propagate(&mut self, changes: Changes) {
        let Some(sink) = self.sink.clone() else {
            return;
        };
        let current = self.store.current().clone();

        let rotated = [
            (
                changes.access_token,
                ACCESS_TOKEN_SECRET_NAME,
                current.access_token.as_ref(),
            ),
            (
                changes.refresh_token,
                REFRESH_TOKEN_SECRET_NAME,
                current.refresh_token.as_ref(),
            ),
        ];
        for (changed, name, value) in rotated {
            let (true, Some(value)) = (changed, value) else {
                continue;
            };
            match sink.persist(name, value).await {
                Ok(()) => debug!(name, "rotated credential persisted externally"),
                Err(e) => {
                    self.sink_failures += 1;
                    warn!(name, error = %e, "failed to persist rotated credential externally");
                }
            }
        }
    }

    fn usable_access_token(&self) -> Option<Secret<String>> {
        let creds = self.store.current();
        let access = creds.access_token.clone()?;
        match creds.expires_at {
            Some(expires_at) if expires_at <= now_millis() + EXPIRY_MARGIN_MILLIS => None,
            _ => Some(access),
        }
    }

    fn expiry_is_comfortable(&self) -> bool {
        matches!(self.store.current().expires_at, Some(at) if at > now_millis() + EXPIRY_MARGIN_MILLIS)
    }

    fn transition(&mut self, next: TokenState) {
        if self.state != next {
            debug!(from = self.state.label(), to = next.label(), "token state transition");
            self.state = next;
        }
    }
}

fn exhausted_for_run() -> Error {
    Error::CredentialsExhausted("credentials already exhausted for this run".into())
}
