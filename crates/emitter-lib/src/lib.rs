//! Emitter library for synthetic pod metrics
//!
//! This crate provides the core functionality for:
//! - Enumerating pods and filtering them by name patterns
//! - Fabricating per-container cpu/memory samples from normal
//!   distributions
//! - Encoding sample metadata into push-gateway URL paths
//! - Pushing samples to a sink and replaying the last batch as
//!   time-series query responses

pub mod error;
pub mod models;
pub mod observability;
pub mod path;
pub mod poll;
pub mod push;
pub mod query;
pub mod sampler;
pub mod source;
pub mod store;

pub use error::{PushError, QueryError};
pub use models::*;
pub use observability::{EmitterMetrics, StructuredLogger};
pub use path::{encode_path, encode_segment, is_valid_key, PathMap};
pub use poll::{Emitter, EmitterConfig};
pub use push::PushClient;
pub use query::{QueryResponder, SeriesEntry, SeriesResponse};
pub use sampler::SampleGenerator;
pub use source::{KubePodSource, PodSource};
pub use store::BatchStore;
