//! Error types for the emitter library

use thiserror::Error;

/// Errors from pushing one sample to the sink
#[derive(Debug, Error)]
pub enum PushError {
    /// The sink answered with something other than 200
    #[error("sink rejected {url}: {status} {reason}: {body}")]
    Rejected {
        url: String,
        status: u16,
        reason: String,
        body: String,
    },

    /// The request never completed (connect, timeout, body IO)
    #[error("push transport failed: {0}")]
    Transport(#[from] reqwest::Error),

    /// The configured sink does not assemble into a valid URL
    #[error("invalid sink URL: {0}")]
    InvalidSink(#[from] url::ParseError),
}

/// Errors from answering a time-series query
#[derive(Debug, Error, Clone, PartialEq)]
pub enum QueryError {
    /// The expression lacks a `by` clause or a `{` tag filter
    #[error("unsupported query expression: {expression}")]
    UnsupportedExpression { expression: String },
}
