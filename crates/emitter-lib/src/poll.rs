//! Pod metrics generation loop
//!
//! Implements the pass that lists pods, fabricates usage samples for
//! every container of every matching pod, pushes each sample to the
//! destination, and swaps the finished batch into the store for the
//! query side to replay.

use crate::models::{PassSummary, PodRecord, Sample};
use crate::observability::{EmitterMetrics, StructuredLogger};
use crate::path::{is_valid_key, PathMap};
use crate::push::PushClient;
use crate::sampler::SampleGenerator;
use crate::source::PodSource;
use crate::store::BatchStore;
use anyhow::{Context, Result};
use chrono::Utc;
use dashmap::DashMap;
use regex::Regex;
use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::{interval, Instant};
use tracing::{info, warn};

/// Configuration for the generation loop
#[derive(Debug, Clone)]
pub struct EmitterConfig {
    /// Push destination, host or host:port
    pub destination: String,
    /// Mean of the synthetic cpu distribution, in millicores
    pub mean_cpu_millicores: f64,
    /// Standard deviation of the cpu distribution, in millicores
    pub stddev_cpu_millicores: f64,
    /// Mean of the synthetic memory distribution, in MiB
    pub mean_mem_mib: f64,
    /// Standard deviation of the memory distribution, in MiB
    pub stddev_mem_mib: f64,
    /// Time between passes (default: 30 seconds)
    pub interval: Duration,
    /// Job segment pushes are submitted under
    pub job: String,
    /// Namespaces to include; matches from the start of the name
    pub namespace_pattern: String,
    /// Pod names to include; matches from the start of the name
    pub pod_pattern: String,
    /// Emit for every pod, ignoring the patterns
    pub match_all: bool,
    /// Tags attached to every sample path
    pub static_tags: Vec<(String, String)>,
    /// Timeout for each push request
    pub push_timeout: Duration,
}

impl Default for EmitterConfig {
    fn default() -> Self {
        Self {
            destination: "pushservice".to_string(),
            mean_cpu_millicores: 1000.0,
            stddev_cpu_millicores: 150.0,
            mean_mem_mib: 128.0,
            stddev_mem_mib: 15.0,
            interval: Duration::from_secs(30),
            job: "metrics-emitter".to_string(),
            namespace_pattern: "monitoring".to_string(),
            pod_pattern: "prometheus-[0-9a-f]{9}-[0-9a-z]{5}".to_string(),
            match_all: false,
            static_tags: vec![("data".to_string(), "metrics-emitter".to_string())],
            push_timeout: Duration::from_secs(10),
        }
    }
}

/// Drives generation passes over the pod source
pub struct Emitter {
    /// Pod source implementation
    source: Arc<dyn PodSource>,
    /// Push client for the destination sink
    push: PushClient,
    /// Synthetic value distributions
    sampler: SampleGenerator,
    /// Last completed batch, shared with the query side
    store: BatchStore,
    /// Pod details read once per namespace/name key, never evicted
    pod_cache: DashMap<String, PodRecord>,
    namespace_pattern: Regex,
    pod_pattern: Regex,
    match_all: bool,
    job: String,
    static_tags: Vec<(String, String)>,
    /// Serializes passes; timer and trigger endpoint share one emitter
    pass_lock: Mutex<()>,
    metrics: EmitterMetrics,
    logger: StructuredLogger,
}

impl Emitter {
    pub fn new(
        source: Arc<dyn PodSource>,
        store: BatchStore,
        config: &EmitterConfig,
    ) -> Result<Self> {
        let sampler = SampleGenerator::new(
            config.mean_cpu_millicores,
            config.stddev_cpu_millicores,
            config.mean_mem_mib,
            config.stddev_mem_mib,
        )?;
        let push = PushClient::new(&config.destination, config.push_timeout)
            .context("Failed to create push client")?;

        Ok(Self {
            source,
            push,
            sampler,
            store,
            pod_cache: DashMap::new(),
            namespace_pattern: anchored(&config.namespace_pattern)?,
            pod_pattern: anchored(&config.pod_pattern)?,
            match_all: config.match_all,
            job: config.job.clone(),
            static_tags: config.static_tags.clone(),
            pass_lock: Mutex::new(()),
            metrics: EmitterMetrics::new(),
            logger: StructuredLogger::new(&config.job),
        })
    }

    /// Run one full generation pass
    ///
    /// The batch is staged locally and only swapped into the store once
    /// the pass finishes, so queries never observe a partial batch. A
    /// pod source failure abandons the pass and leaves the previous
    /// batch in place.
    pub async fn run_pass(&self) -> Result<PassSummary> {
        let _guard = self.pass_lock.lock().await;
        let started = Instant::now();
        self.metrics.inc_passes();

        let mut summary = PassSummary {
            started_at: Utc::now(),
            pods_total: 0,
            pods_matched: 0,
            samples_pushed: 0,
            push_failures: 0,
            api_request_count: 0,
            skipped_keys: BTreeSet::new(),
        };

        let pods = self.source.list_all_pods().await?;
        summary.pods_total = pods.len();

        let mut batch: Vec<Sample> = Vec::new();
        for pod in &pods {
            if !self.matches(pod) {
                continue;
            }
            summary.pods_matched += 1;

            let record = self.cached_record(pod).await?;
            let (base_path, job) = self.base_path(&record, &mut summary.skipped_keys);

            for container in &record.containers {
                let mut path = base_path.clone();
                path.insert("name", container.as_str());
                path.insert("container", container.as_str());

                let (cpu_millicores, mem_bytes) = self.sampler.generate();
                let sample = Sample {
                    path,
                    cpu_millicores,
                    mem_bytes,
                };
                // The batch records what the pass set out to push, not
                // what the sink confirmed.
                batch.push(sample.clone());

                match self
                    .push
                    .push(&job, &sample.path, cpu_millicores, mem_bytes)
                    .await
                {
                    Ok(()) => {
                        summary.samples_pushed += 1;
                        self.metrics.inc_samples_pushed();
                    }
                    Err(e) => {
                        summary.push_failures += 1;
                        self.metrics.inc_push_failures();
                        self.logger.log_push_failure(&record.name, container, &e);
                    }
                }
            }
        }

        self.store.replace(batch).await;

        summary.api_request_count = self.metrics.query_requests();
        self.metrics
            .set_pod_counts(summary.pods_total as i64, summary.pods_matched as i64);
        self.metrics
            .observe_pass_duration(started.elapsed().as_secs_f64());
        self.logger.log_pass_complete(&summary);

        Ok(summary)
    }

    /// Drive passes on a fixed interval until shutdown
    pub async fn run_loop(
        self: Arc<Self>,
        period: Duration,
        mut shutdown: tokio::sync::broadcast::Receiver<()>,
    ) {
        info!(
            interval_secs = period.as_secs(),
            "Starting generation loop"
        );

        let mut ticker = interval(period);

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    if let Err(e) = self.run_pass().await {
                        warn!(error = %e, "Generation pass failed");
                    }
                }
                _ = shutdown.recv() => {
                    info!("Shutting down generation loop");
                    break;
                }
            }
        }
    }

    fn matches(&self, pod: &PodRecord) -> bool {
        self.match_all
            || (self.namespace_pattern.is_match(&pod.namespace)
                && self.pod_pattern.is_match(&pod.name))
    }

    /// Pod details are read through a cache keyed by namespace/name;
    /// entries persist for the life of the process
    async fn cached_record(&self, pod: &PodRecord) -> Result<PodRecord> {
        let key = format!("{}/{}", pod.namespace, pod.name);
        if let Some(record) = self.pod_cache.get(&key) {
            return Ok(record.clone());
        }

        let record = self.source.read_pod(&pod.namespace, &pod.name).await?;
        self.pod_cache.insert(key, record.clone());
        Ok(record)
    }

    /// Build the path segments shared by all of a pod's containers and
    /// resolve the job its samples are submitted under
    ///
    /// Reserved keys go first, then static tags, then annotations, then
    /// labels, so labels win every collision. Keys the validator
    /// rejects land in `skipped` instead of the path. A surviving `job`
    /// key overrides the configured job name for this pod.
    fn base_path(&self, record: &PodRecord, skipped: &mut BTreeSet<String>) -> (PathMap, String) {
        let mut path = PathMap::for_pod(&record.namespace, &record.name);

        let tags = self.static_tags.iter().map(|(key, value)| (key, value));
        let metadata = record.annotations.iter().chain(record.labels.iter());
        for (key, value) in tags.chain(metadata) {
            if is_valid_key(key) {
                path.insert(key.as_str(), value.as_str());
            } else {
                skipped.insert(key.clone());
            }
        }

        let job = path.get("job").unwrap_or(self.job.as_str()).to_string();
        (path, job)
    }
}

/// Compile a pattern that matches from the start of its subject
fn anchored(pattern: &str) -> Result<Regex> {
    Regex::new(&format!("^(?:{})", pattern))
        .with_context(|| format!("Invalid pattern {:?}", pattern))
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::collections::BTreeMap;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Pod source serving a fixed set of records
    struct MockPodSource {
        pods: Vec<PodRecord>,
        list_calls: AtomicUsize,
        read_calls: AtomicUsize,
    }

    impl MockPodSource {
        fn new(pods: Vec<PodRecord>) -> Self {
            Self {
                pods,
                list_calls: AtomicUsize::new(0),
                read_calls: AtomicUsize::new(0),
            }
        }
    }

    #[async_trait]
    impl PodSource for MockPodSource {
        async fn list_all_pods(&self) -> Result<Vec<PodRecord>> {
            self.list_calls.fetch_add(1, Ordering::SeqCst);
            Ok(self.pods.clone())
        }

        async fn read_pod(&self, namespace: &str, name: &str) -> Result<PodRecord> {
            self.read_calls.fetch_add(1, Ordering::SeqCst);
            self.pods
                .iter()
                .find(|p| p.namespace == namespace && p.name == name)
                .cloned()
                .ok_or_else(|| anyhow::anyhow!("No such pod {}/{}", namespace, name))
        }
    }

    fn prometheus_pod() -> PodRecord {
        PodRecord {
            namespace: "monitoring".to_string(),
            name: "prometheus-012345678-abc12".to_string(),
            annotations: BTreeMap::new(),
            labels: BTreeMap::new(),
            containers: vec!["server".to_string(), "sidecar".to_string()],
        }
    }

    /// Config pointed at a port nothing listens on; pushes fail fast
    /// and the pass carries on
    fn offline_config() -> EmitterConfig {
        EmitterConfig {
            destination: "127.0.0.1:9".to_string(),
            push_timeout: Duration::from_millis(500),
            ..Default::default()
        }
    }

    fn emitter(pods: Vec<PodRecord>, config: &EmitterConfig) -> (Arc<Emitter>, BatchStore) {
        let store = BatchStore::new();
        let emitter = Emitter::new(
            Arc::new(MockPodSource::new(pods)),
            store.clone(),
            config,
        )
        .unwrap();
        (Arc::new(emitter), store)
    }

    #[test]
    fn test_emitter_config_default() {
        let config = EmitterConfig::default();
        assert_eq!(config.destination, "pushservice");
        assert_eq!(config.mean_cpu_millicores, 1000.0);
        assert_eq!(config.mean_mem_mib, 128.0);
        assert_eq!(config.interval, Duration::from_secs(30));
        assert_eq!(config.job, "metrics-emitter");
        assert!(!config.match_all);
    }

    #[test]
    fn test_invalid_pattern_is_rejected() {
        let config = EmitterConfig {
            namespace_pattern: "(".to_string(),
            ..Default::default()
        };
        let result = Emitter::new(
            Arc::new(MockPodSource::new(vec![])),
            BatchStore::new(),
            &config,
        );
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_pass_samples_every_container_of_matching_pods() {
        let mut nginx = PodRecord {
            namespace: "default".to_string(),
            name: "nginx-1".to_string(),
            ..Default::default()
        };
        nginx.containers.push("nginx".to_string());

        let (emitter, store) = emitter(vec![prometheus_pod(), nginx], &offline_config());

        let summary = emitter.run_pass().await.unwrap();

        assert_eq!(summary.pods_total, 2);
        assert_eq!(summary.pods_matched, 1);
        assert_eq!(summary.samples_pushed + summary.push_failures, 2);
        assert_eq!(store.len().await, 2);
    }

    #[tokio::test]
    async fn test_matched_pod_without_containers_yields_no_samples() {
        let mut pod = prometheus_pod();
        pod.containers.clear();

        let (emitter, store) = emitter(vec![pod], &offline_config());

        let summary = emitter.run_pass().await.unwrap();
        assert_eq!(summary.pods_matched, 1);
        assert_eq!(summary.samples_pushed + summary.push_failures, 0);
        assert!(store.is_empty().await);
    }

    #[tokio::test]
    async fn test_patterns_match_name_prefixes() {
        let mut pod = prometheus_pod();
        pod.namespace = "monitoring-extra".to_string();

        let (emitter, _store) = emitter(vec![pod], &offline_config());

        let summary = emitter.run_pass().await.unwrap();
        assert_eq!(summary.pods_matched, 1);
    }

    #[tokio::test]
    async fn test_patterns_never_match_mid_string() {
        let mut shifted_namespace = prometheus_pod();
        shifted_namespace.namespace = "not-monitoring".to_string();

        let mut shifted_name = prometheus_pod();
        shifted_name.name = format!("extra-{}", shifted_name.name);

        let (emitter, store) = emitter(vec![shifted_namespace, shifted_name], &offline_config());

        let summary = emitter.run_pass().await.unwrap();
        assert_eq!(summary.pods_total, 2);
        assert_eq!(summary.pods_matched, 0);
        assert!(store.is_empty().await);
    }

    #[tokio::test]
    async fn test_match_all_ignores_patterns() {
        let mut nginx = PodRecord {
            namespace: "default".to_string(),
            name: "nginx-1".to_string(),
            ..Default::default()
        };
        nginx.containers.push("nginx".to_string());

        let config = EmitterConfig {
            match_all: true,
            ..offline_config()
        };
        let (emitter, _store) = emitter(vec![nginx], &config);

        let summary = emitter.run_pass().await.unwrap();
        assert_eq!(summary.pods_matched, 1);
    }

    #[tokio::test]
    async fn test_labels_override_annotations_and_static_tags() {
        let mut pod = prometheus_pod();
        pod.containers.truncate(1);
        pod.annotations
            .insert("team".to_string(), "infra".to_string());
        pod.labels.insert("team".to_string(), "core".to_string());
        pod.labels
            .insert("data".to_string(), "overridden".to_string());

        let (emitter, store) = emitter(vec![pod], &offline_config());
        emitter.run_pass().await.unwrap();

        let batch = store.snapshot().await;
        assert_eq!(batch.len(), 1);
        assert_eq!(batch[0].path.get("team"), Some("core"));
        assert_eq!(batch[0].path.get("data"), Some("overridden"));
    }

    #[tokio::test]
    async fn test_rejected_keys_are_reported_not_pushed() {
        let mut pod = prometheus_pod();
        pod.containers.truncate(1);
        pod.labels
            .insert("pod-template-hash".to_string(), "abc123".to_string());
        pod.annotations
            .insert("checksum/config".to_string(), "beef".to_string());

        let (emitter, store) = emitter(vec![pod], &offline_config());
        let summary = emitter.run_pass().await.unwrap();

        let batch = store.snapshot().await;
        assert_eq!(batch[0].path.get("pod-template-hash"), None);
        assert_eq!(batch[0].path.get("checksum/config"), None);
        assert!(summary.skipped_keys.contains("pod-template-hash"));
        assert!(summary.skipped_keys.contains("checksum/config"));
    }

    #[tokio::test]
    async fn test_static_tags_go_through_the_key_validator() {
        let mut pod = prometheus_pod();
        pod.containers.truncate(1);

        let config = EmitterConfig {
            static_tags: vec![
                ("team".to_string(), "core".to_string()),
                ("rollout-stage".to_string(), "canary".to_string()),
            ],
            ..offline_config()
        };
        let (emitter, store) = emitter(vec![pod], &config);

        let summary = emitter.run_pass().await.unwrap();

        let batch = store.snapshot().await;
        assert_eq!(batch[0].path.get("team"), Some("core"));
        assert_eq!(batch[0].path.get("rollout-stage"), None);
        assert!(summary.skipped_keys.contains("rollout-stage"));
    }

    #[tokio::test]
    async fn test_path_key_order_is_stable() {
        let mut pod = prometheus_pod();
        pod.containers.truncate(1);
        pod.labels.insert("team".to_string(), "core".to_string());

        let (emitter, store) = emitter(vec![pod], &offline_config());
        emitter.run_pass().await.unwrap();

        let batch = store.snapshot().await;
        let keys: Vec<&str> = batch[0].path.iter().map(|(k, _)| k).collect();
        assert_eq!(
            keys,
            vec![
                "kubernetes_namespace",
                "kubernetes_pod_name",
                "pod",
                "namespace",
                "data",
                "team",
                "name",
                "container",
            ]
        );
    }

    #[tokio::test]
    async fn test_job_label_overrides_configured_job() {
        let mut pod = prometheus_pod();
        pod.containers.truncate(1);
        pod.labels
            .insert("job".to_string(), "custom".to_string());

        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("PUT", mockito::Matcher::Regex("^/metrics/job/custom/".to_string()))
            .with_status(200)
            .expect(1)
            .create_async()
            .await;

        let config = EmitterConfig {
            destination: server.host_with_port(),
            push_timeout: Duration::from_secs(5),
            ..Default::default()
        };
        let (emitter, _store) = emitter(vec![pod], &config);

        let summary = emitter.run_pass().await.unwrap();
        assert_eq!(summary.samples_pushed, 1);
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_pod_details_read_once_across_passes() {
        let pod = prometheus_pod();
        let source = Arc::new(MockPodSource::new(vec![pod]));
        let emitter = Arc::new(
            Emitter::new(source.clone(), BatchStore::new(), &offline_config()).unwrap(),
        );

        emitter.run_pass().await.unwrap();
        emitter.run_pass().await.unwrap();

        assert_eq!(source.list_calls.load(Ordering::SeqCst), 2);
        assert_eq!(source.read_calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_failed_pushes_still_land_in_the_batch() {
        let mut pod = prometheus_pod();
        pod.containers.truncate(1);

        let (emitter, store) = emitter(vec![pod], &offline_config());
        let summary = emitter.run_pass().await.unwrap();

        assert_eq!(summary.samples_pushed, 0);
        assert_eq!(summary.push_failures, 1);
        assert_eq!(store.len().await, 1);
    }

    #[tokio::test]
    async fn test_batch_is_replaced_not_accumulated() {
        let mut pod = prometheus_pod();
        pod.containers.truncate(1);

        let (emitter, store) = emitter(vec![pod], &offline_config());
        emitter.run_pass().await.unwrap();
        emitter.run_pass().await.unwrap();

        assert_eq!(store.len().await, 1);
    }

    #[tokio::test]
    async fn test_containers_get_independent_paths() {
        let (emitter, store) = emitter(vec![prometheus_pod()], &offline_config());
        emitter.run_pass().await.unwrap();

        let batch = store.snapshot().await;
        assert_eq!(batch.len(), 2);
        assert_eq!(batch[0].path.get("name"), Some("server"));
        assert_eq!(batch[0].path.get("container"), Some("server"));
        assert_eq!(batch[1].path.get("name"), Some("sidecar"));
        assert_eq!(batch[1].path.get("container"), Some("sidecar"));
    }
}
