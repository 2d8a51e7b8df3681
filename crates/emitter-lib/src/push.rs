//! Push client for the metrics sink
//!
//! Renders one sample into the sink's PUT surface:
//! `PUT http://{sink}/metrics/job/{job}/namespace/{ns}/{encoded path}`
//! with a two-line plain-text body. A non-200 reply is an error for the
//! caller to log; the client never retries.

use crate::error::PushError;
use crate::path::{encode_path, PathMap};
use reqwest::Client;
use std::time::Duration;
use tracing::debug;
use url::Url;

/// HTTP client for a push-gateway style sink
#[derive(Debug, Clone)]
pub struct PushClient {
    client: Client,
    sink: String,
}

impl PushClient {
    /// Create a client for `sink` (host or host:port) with a bounded
    /// request timeout
    pub fn new(sink: impl Into<String>, timeout: Duration) -> Result<Self, PushError> {
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            sink: sink.into(),
        })
    }

    /// Target URL for one sample. The namespace segment carries the
    /// path's raw `namespace` value; the encoded path repeats it.
    fn target_url(&self, job: &str, path: &PathMap) -> Result<Url, PushError> {
        let namespace = path.get("namespace").unwrap_or("");
        let raw = format!(
            "http://{}/metrics/job/{}/namespace/{}/{}",
            self.sink,
            job,
            namespace,
            encode_path(path)
        );
        Ok(Url::parse(&raw)?)
    }

    /// Push one sample under `job`. Non-200 replies come back as
    /// [`PushError::Rejected`] with the sink's status, reason and body.
    pub async fn push(
        &self,
        job: &str,
        path: &PathMap,
        cpu_millicores: f64,
        mem_bytes: u64,
    ) -> Result<(), PushError> {
        let url = self.target_url(job, path)?;
        let payload = format_payload(cpu_millicores, mem_bytes);

        let response = self.client.put(url.clone()).body(payload).send().await?;

        let status = response.status();
        if status.as_u16() != 200 {
            let reason = status.canonical_reason().unwrap_or("unknown").to_string();
            let body = response.text().await.unwrap_or_default();
            return Err(PushError::Rejected {
                url: url.to_string(),
                status: status.as_u16(),
                reason,
                body,
            });
        }

        debug!(url = %url, "Pushed sample");
        Ok(())
    }
}

/// Two lines: cpu scaled to cores at three decimals, mem as whole bytes
fn format_payload(cpu_millicores: f64, mem_bytes: u64) -> String {
    format!("cpu {:.3}\nmem {}.0\n", cpu_millicores / 1000.0, mem_bytes)
}
