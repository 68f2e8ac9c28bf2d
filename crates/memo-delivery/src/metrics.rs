//! Delivery metrics
//!
//! Recorded through the `metrics` facade; the binary decides where they go.
//!
//! - `memo_send_attempts_total` (counter): label `outcome`
//! - `memo_chunks_delivered_total` (counter)
//! - `memo_token_renewals_total` (counter): label `trigger`
//! - `memo_delivery_runs_total` (counter): label `result`

/// Record one send request with its classified outcome.
pub fn record_send_attempt(outcome: &str) {
    metrics::counter!("memo_send_attempts_total", "outcome" => outcome.to_string()).increment(1);
}

pub fn record_chunk_delivered() {
    metrics::counter!("memo_chunks_delivered_total").increment(1);
}

/// Record a token renewal forced by the delivery loop.
pub fn record_renewal(trigger: &str) {
    metrics::counter!("memo_token_renewals_total", "trigger" => trigger.to_string()).increment(1);
}

/// Record the end of a delivery run (`delivered`, `partial` or `failed`).
pub fn record_run(result: &str) {
    metrics::counter!("memo_delivery_runs_total", "result" => result.to_string()).increment(1);
}
