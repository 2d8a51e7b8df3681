//! Pod enumeration from the Kubernetes API
//!
//! Provides the source of pod metadata the emitter draws from. The
//! production source lists pods across all namespaces through the
//! cluster API; tests substitute their own implementations.

use crate::models::PodRecord;
use anyhow::{Context, Result};
use k8s_openapi::api::core::v1::Pod;
use kube::api::{Api, ListParams};
use kube::Client;
use tracing::debug;

pub use async_trait::async_trait;

/// Trait for pod listing implementations
#[async_trait]
pub trait PodSource: Send + Sync {
    /// List all pods visible to the emitter, across namespaces
    async fn list_all_pods(&self) -> Result<Vec<PodRecord>>;

    /// Read one pod in full; called when the identity cache misses
    async fn read_pod(&self, namespace: &str, name: &str) -> Result<PodRecord>;
}

/// Pod source backed by the cluster API
pub struct KubePodSource {
    client: Client,
}

impl KubePodSource {
    /// Connect using the ambient configuration (in-cluster service
    /// account, or the local kubeconfig when running outside)
    pub async fn try_default() -> Result<Self> {
        let client = Client::try_default()
            .await
            .context("Failed to create Kubernetes client")?;
        Ok(Self::new(client))
    }

    pub fn new(client: Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl PodSource for KubePodSource {
    async fn list_all_pods(&self) -> Result<Vec<PodRecord>> {
        let pods: Api<Pod> = Api::all(self.client.clone());
        let list = pods
            .list(&ListParams::default())
            .await
            .context("Failed to list pods")?;

        let records: Vec<PodRecord> = list.items.into_iter().filter_map(pod_to_record).collect();
        debug!(count = records.len(), "Listed pods");
        Ok(records)
    }

    async fn read_pod(&self, namespace: &str, name: &str) -> Result<PodRecord> {
        let pods: Api<Pod> = Api::namespaced(self.client.clone(), namespace);
        let pod = pods
            .get(name)
            .await
            .with_context(|| format!("Failed to read pod {}/{}", namespace, name))?;

        pod_to_record(pod)
            .ok_or_else(|| anyhow::anyhow!("Pod {}/{} has incomplete metadata", namespace, name))
    }
}

/// Convert an API pod into the record the emitter works with
///
/// Pods without a name or namespace in their metadata are dropped;
/// everything downstream keys on those two fields.
fn pod_to_record(pod: Pod) -> Option<PodRecord> {
    let metadata = pod.metadata;
    let name = metadata.name?;
    let namespace = metadata.namespace?;

    let containers = pod
        .spec
        .map(|spec| spec.containers.into_iter().map(|c| c.name).collect())
        .unwrap_or_default();

    Some(PodRecord {
        namespace,
        name,
        annotations: metadata.annotations.unwrap_or_default(),
        labels: metadata.labels.unwrap_or_default(),
        containers,
    })
}
