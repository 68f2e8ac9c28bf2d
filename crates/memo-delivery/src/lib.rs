//! Memo delivery pipeline
//!
//! Turns one message into ordered "memo to self" sends:
//!
//! 1. `chunk` splits the message on character boundaries under the template limit
//! 2. `client::MemoClient` posts one chunk and classifies the response
//! 3. `pipeline::DeliveryPipeline` drives the chunks with bounded retry and
//!    renews the access token through a `source::TokenSource` when a send is
//!    rejected as unauthorized

pub mod chunk;
pub mod client;
pub mod error;
pub mod metrics;
pub mod pipeline;
pub mod source;

#[cfg(test)]
mod testing;

pub use chunk::{DEFAULT_MAX_CHUNK_CHARS, MessageChunk, split_message};
pub use client::{MemoClient, MemoTemplate, SendOutcome};
pub use error::{Error, Result};
pub use pipeline::{DeliveryAttempt, DeliveryPipeline, DeliveryReport, NextStep, RetryPolicy, next_step};
pub use source::{TokenFuture, TokenSource};
