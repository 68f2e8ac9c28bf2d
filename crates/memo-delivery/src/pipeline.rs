//! Chunked delivery with bounded retry and mid-send token renewal
//!
//! Chunks go out strictly in order. Each chunk gets `max_attempts` ordinary
//! attempts with a fixed delay between them. A 401 from the send endpoint
//! triggers one forced renewal per chunk and repeats the same attempt with
//! the new token; a second 401 on that chunk is an ordinary failure. When a
//! chunk runs out of attempts the run stops and later chunks are never sent.

use std::time::Duration;

use serde::Serialize;
use tracing::{Span, debug, info, instrument, warn};

use crate::chunk::{DEFAULT_MAX_CHUNK_CHARS, MessageChunk, split_message};
use crate::client::{MemoClient, SendOutcome};
use crate::error::{Error, Result};
use crate::metrics;
use crate::source::TokenSource;

/// Ordinary attempt ceiling per chunk and the pause between attempts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            delay: Duration::from_secs(2),
        }
    }
}

/// One send of one chunk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeliveryAttempt {
    /// 1-based chunk number
    pub chunk: usize,
    /// 1-based ordinary attempt number; a renewal repeat keeps the number
    pub attempt: u32,
    pub outcome: SendOutcome,
}

/// What the loop does after an attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NextStep {
    Delivered,
    /// Renew the token and repeat the same attempt without waiting
    RenewAndRepeat,
    RetryAfter(Duration),
    Abort,
}

/// Decide the next step for an attempt. `renewed` is true once this chunk has
/// already used its forced renewal.
pub fn next_step(attempt: &DeliveryAttempt, renewed: bool, policy: &RetryPolicy) -> NextStep {
    match attempt.outcome {
        SendOutcome::Delivered => NextStep::Delivered,
        SendOutcome::Unauthorized if !renewed => NextStep::RenewAndRepeat,
        _ if attempt.attempt >= policy.max_attempts => NextStep::Abort,
        _ => NextStep::RetryAfter(policy.delay),
    }
}

/// Summary of a fully delivered run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DeliveryReport {
    pub run_id: String,
    pub chunks_total: usize,
    pub chunks_delivered: usize,
    /// Forced renewals triggered by a rejected send
    pub renewals: u32,
}

/// Splits a message and delivers it chunk by chunk.
pub struct DeliveryPipeline<S: TokenSource> {
    source: S,
    client: MemoClient,
    policy: RetryPolicy,
    max_chunk_chars: usize,
    run_id: Option<String>,
    delivered: usize,
    renewals: u32,
}

impl<S: TokenSource> DeliveryPipeline<S> {
    pub fn new(source: S, client: MemoClient, policy: RetryPolicy) -> Self {
        Self {
            source,
            client,
            policy,
            max_chunk_chars: DEFAULT_MAX_CHUNK_CHARS,
            run_id: None,
            delivered: 0,
            renewals: 0,
        }
    }

    pub fn with_max_chunk_chars(mut self, max_chunk_chars: usize) -> Self {
        self.max_chunk_chars = max_chunk_chars.max(1);
        self
    }

    /// Chunks delivered by the most recent run, including one that failed or
    /// timed out part way.
    pub fn progress(&self) -> usize {
        self.delivered
    }

    /// Identifier of the most recent run, also present on its log lines.
    pub fn run_id(&self) -> Option<&str> {
        self.run_id.as_deref()
    }

    pub fn source(&self) -> &S {
        &self.source
    }

    pub fn into_source(self) -> S {
        self.source
    }

    /// Deliver `message` in order. The empty message succeeds with zero
    /// chunks and makes no network calls.
    #[instrument(skip_all, fields(run_id = tracing::field::Empty))]
    pub async fn deliver(&mut self, message: &str) -> Result<DeliveryReport> {
        let run_id = format!("run_{}", uuid::Uuid::new_v4().simple());
        Span::current().record("run_id", run_id.as_str());
        self.run_id = Some(run_id.clone());
        self.delivered = 0;
        self.renewals = 0;

        let chunks = split_message(message, self.max_chunk_chars);
        let chunks_total = chunks.len();
        info!(chunks_total, "starting delivery");

        for chunk in &chunks {
            if let Err(e) = self.deliver_chunk(chunk, chunks_total).await {
                warn!(
                    error = %e,
                    kind = e.kind(),
                    delivered = self.delivered,
                    chunks_total,
                    "delivery aborted"
                );
                metrics::record_run(run_result(self.delivered));
                return Err(e);
            }
            self.delivered += 1;
            metrics::record_chunk_delivered();
        }

        info!(
            chunks_delivered = self.delivered,
            renewals = self.renewals,
            "delivery complete"
        );
        metrics::record_run("delivered");
        Ok(DeliveryReport {
            run_id,
            chunks_total,
            chunks_delivered: self.delivered,
            renewals: self.renewals,
        })
    }

    /// [`deliver`](Self::deliver) under a deadline for the whole run.
    pub async fn deliver_with_timeout(
        &mut self,
        message: &str,
        timeout: Duration,
    ) -> Result<DeliveryReport> {
        match tokio::time::timeout(timeout, self.deliver(message)).await {
            Ok(result) => result,
            Err(_) => {
                let delivered = self.delivered;
                warn!(delivered, timeout_secs = timeout.as_secs_f64(), "delivery timed out");
                metrics::record_run(run_result(delivered));
                Err(Error::Timeout {
                    delivered,
                    after_secs: timeout.as_secs(),
                })
            }
        }
    }

    async fn deliver_chunk(&mut self, chunk: &MessageChunk<'_>, chunks_total: usize) -> Result<()> {
        let delivered = self.delivered;
        let credentials_error = |source| Error::Credentials {
            chunk: chunk.number,
            delivered,
            source,
        };

        let mut token = self
            .source
            .ensure_valid_token()
            .await
            .map_err(credentials_error)?;
        let mut attempt = 1;
        let mut renewed = false;

        loop {
            let outcome = self.client.send(&token, chunk.text).await;
            metrics::record_send_attempt(outcome.label());
            let record = DeliveryAttempt {
                chunk: chunk.number,
                attempt,
                outcome,
            };

            match next_step(&record, renewed, &self.policy) {
                NextStep::Delivered => {
                    debug!(chunk = chunk.number, attempt, "chunk delivered");
                    return Ok(());
                }
                NextStep::RenewAndRepeat => {
                    info!(chunk = chunk.number, attempt, "send rejected access token, renewing");
                    renewed = true;
                    self.renewals += 1;
                    metrics::record_renewal("unauthorized_send");
                    token = self
                        .source
                        .force_renewal()
                        .await
                        .map_err(credentials_error)?;
                }
                NextStep::RetryAfter(delay) => {
                    warn!(
                        chunk = chunk.number,
                        attempt,
                        outcome = record.outcome.label(),
                        reason = %record.outcome.describe(),
                        "send failed, retrying"
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                NextStep::Abort => {
                    return Err(Error::ChunkSendFailed {
                        chunk: chunk.number,
                        chunks_total,
                        delivered,
                        attempts: attempt,
                        reason: record.outcome.describe(),
                    });
                }
            }
        }
    }
}

fn run_result(delivered: usize) -> &'static str {
    if delivered == 0 { "failed" } else { "partial" }
}
