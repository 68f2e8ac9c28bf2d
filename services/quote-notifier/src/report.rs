//! Machine-readable run report and exit code

use memo_delivery::DeliveryReport;
use serde::Serialize;

/// How far a run got.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RunOutcome {
    /// Every chunk was delivered (including the empty message)
    Delivered,
    /// A prefix of the chunks was delivered before the run stopped
    Partial,
    /// Nothing was delivered, or the run never got as far as sending
    Failed,
}

impl RunOutcome {
    pub fn exit_code(self) -> i32 {
        match self {
            RunOutcome::Delivered => 0,
            RunOutcome::Failed => 1,
            RunOutcome::Partial => 2,
        }
    }
}

/// Printed to stdout as one JSON object at the end of every run.
#[derive(Debug, Serialize)]
pub struct RunReport {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub run_id: Option<String>,
    pub outcome: RunOutcome,
    pub chunks_total: usize,
    pub chunks_delivered: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failed_chunk: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_kind: Option<&'static str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub token_renewals: u32,
    pub sink_failures: u32,
}

/// Token manager counters copied into the report.
#[derive(Debug, Default, Clone, Copy)]
pub struct TokenCounters {
    pub renewals: u32,
    pub sink_failures: u32,
}

impl RunReport {
    pub fn from_delivery(
        result: &memo_delivery::Result<DeliveryReport>,
        run_id: Option<&str>,
        chunks_total: usize,
        counters: TokenCounters,
    ) -> Self {
        let base = Self {
            run_id: run_id.map(str::to_owned),
            outcome: RunOutcome::Delivered,
            chunks_total,
            chunks_delivered: 0,
            failed_chunk: None,
            error_kind: None,
            error: None,
            token_renewals: counters.renewals,
            sink_failures: counters.sink_failures,
        };

        match result {
            Ok(report) => Self {
                chunks_delivered: report.chunks_delivered,
                ..base
            },
            Err(e) => Self {
                outcome: if e.delivered() == 0 {
                    RunOutcome::Failed
                } else {
                    RunOutcome::Partial
                },
                chunks_delivered: e.delivered(),
                failed_chunk: e.failed_chunk(),
                error_kind: Some(e.kind()),
                error: Some(e.to_string()),
                ..base
            },
        }
    }

    /// Report for a run that failed before delivery started.
    pub fn setup_failure(error: &anyhow::Error) -> Self {
        Self {
            run_id: None,
            outcome: RunOutcome::Failed,
            chunks_total: 0,
            chunks_delivered: 0,
            failed_chunk: None,
            error_kind: Some("setup"),
            error: Some(format!("{error:#}")),
            token_renewals: 0,
            sink_failures: 0,
        }
    }

    pub fn exit_code(&self) -> i32 {
        self.outcome.exit_code()
    }

    pub fn to_json(&self) -> String {
        serde_json::to_string(self).unwrap_or_else(|e| {
            format!(r#"{{"outcome":"failed","error_kind":"report","error":"{e}"}}"#)
        })
    }
}
