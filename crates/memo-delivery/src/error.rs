//! Error types for message delivery

/// Why a delivery run stopped before every chunk was sent.
///
/// Chunk numbers are 1-based. `delivered` counts the chunks that reached the
/// channel before the failure, so `delivered == 0` means nothing was sent.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error(
        "chunk {chunk}/{chunks_total} failed after {attempts} attempts ({delivered} delivered): {reason}"
    )]
    ChunkSendFailed {
        chunk: usize,
        chunks_total: usize,
        delivered: usize,
        attempts: u32,
        reason: String,
    },

    #[error("no usable access token at chunk {chunk} ({delivered} delivered): {source}")]
    Credentials {
        chunk: usize,
        delivered: usize,
        source: kakao_auth::Error,
    },

    #[error("delivery timed out after {after_secs}s ({delivered} delivered)")]
    Timeout { delivered: usize, after_secs: u64 },
}

impl Error {
    /// Chunks delivered before the failure.
    pub fn delivered(&self) -> usize {
        match self {
            Error::ChunkSendFailed { delivered, .. }
            | Error::Credentials { delivered, .. }
            | Error::Timeout { delivered, .. } => *delivered,
        }
    }

    /// The 1-based chunk that failed, when known.
    pub fn failed_chunk(&self) -> Option<usize> {
        match self {
            Error::ChunkSendFailed { chunk, .. } | Error::Credentials { chunk, .. } => Some(*chunk),
            Error::Timeout { .. } => None,
        }
    }

    /// Short label for logs and metrics.
    pub fn kind(&self) -> &'static str {
        match self {
            Error::ChunkSendFailed { .. } => "chunk_send_failed",
            Error::Credentials {
                source: kakao_auth::Error::StoreUnavailable(_),
                ..
            } => "store_unavailable",
            Error::Credentials { .. } => "credentials_exhausted",
            Error::Timeout { .. } => "timeout",
        }
    }
}

/// Result alias for delivery operations.
pub type Result<T> = std::result::Result<T, Error>;
