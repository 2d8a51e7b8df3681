//! Last-batch sample store
//!
//! Holds every sample from the most recent completed pass. Passes build
//! a private batch and swap it in whole, so a reader never observes a
//! half-built pass. Clones share the same underlying batch.

use crate::models::Sample;
use std::sync::Arc;
use tokio::sync::RwLock;

/// Shared in-memory store of the last completed batch
#[derive(Debug, Clone, Default)]
pub struct BatchStore {
    samples: Arc<RwLock<Vec<Sample>>>,
}

impl BatchStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Swap in a freshly built batch, discarding the previous one
    pub async fn replace(&self, batch: Vec<Sample>) {
        *self.samples.write().await = batch;
    }

    /// Drop all samples
    pub async fn clear(&self) {
        self.samples.write().await.clear();
    }

    /// Append one sample to the current batch
    pub async fn append(&self, sample: Sample) {
        self.samples.write().await.push(sample);
    }

    /// Cloned view of the current batch, in push order
    pub async fn snapshot(&self) -> Vec<Sample> {
        self.samples.read().await.clone()
    }

    pub async fn len(&self) -> usize {
        self.samples.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.samples.read().await.is_empty()
    }
}
