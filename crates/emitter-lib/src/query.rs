//! Datadog-style time-series replay over the last batch
//!
//! Answers `/api/v1/query` expressions the way a metrics provider
//! would, with exactly one point per series taken from the most recent
//! pass. Only the cpu and memory usage metrics are known; anything else
//! yields an empty result.

use crate::error::QueryError;
use crate::models::Sample;
use crate::store::BatchStore;
use serde::Serialize;

const CPU_METRIC: &str = "kubernetes.cpu.usage";
const MEM_METRIC: &str = "kubernetes.mem.usage";

/// Fixed unit descriptor attached to every series entry
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Unit {
    pub family: &'static str,
    pub id: u32,
    pub name: &'static str,
    pub plural: &'static str,
    pub scale_factor: f64,
    pub short_name: &'static str,
}

impl Unit {
    pub fn nanocore() -> Self {
        Self {
            family: "cpu",
            id: 121,
            name: "nanocore",
            plural: "nanocores",
            scale_factor: 1e-9,
            short_name: "ncores",
        }
    }

    pub fn byte() -> Self {
        Self {
            family: "bytes",
            id: 2,
            name: "byte",
            plural: "bytes",
            scale_factor: 1.0,
            short_name: "B",
        }
    }
}

/// Second element of the `unit` pair; serializes as `{}`
#[derive(Debug, Clone, Serialize)]
pub struct UnitOverride {}

/// One time series in a query response
#[derive(Debug, Clone, Serialize)]
pub struct SeriesEntry {
    pub display_name: String,
    pub expression: String,
    pub start: i64,
    pub end: i64,
    pub interval: i64,
    pub length: i64,
    pub metric: String,
    pub pointlist: Vec<(i64, f64)>,
    pub scope: String,
    pub unit: (Unit, UnitOverride),
}

/// Body of a query response
#[derive(Debug, Clone, Default, Serialize)]
pub struct SeriesResponse {
    pub series: Vec<SeriesEntry>,
}

/// Structural split of a query expression
///
/// The aggregation prefix is everything before the first `by`, the
/// metric name everything before the first `{`. Queries look like
/// `avg:kubernetes.cpu.usage{kube_cluster_name:x}by{kube_namespace,...}`.
#[derive(Debug, PartialEq)]
struct ParsedExpression<'a> {
    prefix: &'a str,
    metric_name: &'a str,
}

fn parse_expression(expression: &str) -> Result<ParsedExpression<'_>, QueryError> {
    let unsupported = || QueryError::UnsupportedExpression {
        expression: expression.to_string(),
    };
    let by = expression.find("by").ok_or_else(unsupported)?;
    let brace = expression.find('{').ok_or_else(unsupported)?;
    Ok(ParsedExpression {
        prefix: &expression[..by],
        metric_name: &expression[..brace],
    })
}

/// Answers time-series queries from the last completed batch
#[derive(Debug, Clone)]
pub struct QueryResponder {
    store: BatchStore,
}

impl QueryResponder {
    pub fn new(store: BatchStore) -> Self {
        Self { store }
    }

    /// Answer one query over the current batch. `from` and `to` are
    /// epoch seconds echoed into every entry; the single point lands at
    /// `to` in milliseconds.
    pub async fn respond(
        &self,
        expression: &str,
        from: i64,
        to: i64,
    ) -> Result<SeriesResponse, QueryError> {
        let parsed = parse_expression(expression)?;
        let samples = self.store.snapshot().await;

        let mut response = SeriesResponse::default();
        if parsed.metric_name.contains(CPU_METRIC) {
            for sample in &samples {
                response.series.push(make_entry(
                    &parsed,
                    sample,
                    from,
                    to,
                    sample.cpu_millicores,
                    Unit::nanocore(),
                ));
            }
        } else if parsed.metric_name.contains(MEM_METRIC) {
            for sample in &samples {
                response.series.push(make_entry(
                    &parsed,
                    sample,
                    from,
                    to,
                    sample.mem_bytes as f64,
                    Unit::byte(),
                ));
            }
        }
        Ok(response)
    }
}

/// The dimensions string a provider would report for one sample
fn scope_for(sample: &Sample) -> String {
    format!(
        "kube_namespace:{},pod_name:{},container_name:{}",
        sample.path.get("namespace").unwrap_or(""),
        sample.path.get("pod").unwrap_or(""),
        sample.path.get("name").unwrap_or("")
    )
}

fn make_entry(
    parsed: &ParsedExpression<'_>,
    sample: &Sample,
    from: i64,
    to: i64,
    value: f64,
    unit: Unit,
) -> SeriesEntry {
    let scope = scope_for(sample);
    SeriesEntry {
        display_name: parsed.metric_name.to_string(),
        expression: format!("{}by{}", parsed.prefix, scope),
        start: from,
        end: to,
        interval: 1,
        length: 1,
        metric: parsed.metric_name.to_string(),
        pointlist: vec![(to.saturating_mul(1000), value)],
        scope,
        unit: (unit, UnitOverride {}),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::path::PathMap;

    async fn seeded_store(samples: Vec<Sample>) -> BatchStore {
        let store = BatchStore::new();
        store.replace(samples).await;
        store
    }

    fn prom_sample() -> Sample {
        let mut path = PathMap::for_pod("monitoring", "prometheus-abc");
        path.insert("name", "prom");
        path.insert("container", "prom");
        Sample {
            path,
            cpu_millicores: 500.0,
            mem_bytes: 134_217_728,
        }
    }

    const CPU_QUERY: &str =
        "max:kubernetes.cpu.usage.total{kube_cluster_name:test}by{kube_namespace,pod_name,container_name}.rollup(max, 30)";
    const MEM_QUERY: &str =
        "max:kubernetes.mem.usage{kube_cluster_name:test}by{kube_namespace,pod_name,container_name}.rollup(max, 30)";

    #[test]
    fn test_parse_expression_splits_prefix_and_metric() {
        let parsed = parse_expression("avg:kubernetes.cpu.usage{tags}by{pod}").unwrap();
        assert_eq!(parsed.metric_name, "avg:kubernetes.cpu.usage");
        assert_eq!(parsed.prefix, "avg:kubernetes.cpu.usage{tags}");
    }

    #[test]
    fn test_parse_expression_rejects_missing_delimiters() {
        assert!(parse_expression("kubernetes.cpu.usage{tags}").is_err());
        assert!(parse_expression("avg:something by pods").is_err());
        assert!(parse_expression("").is_err());
    }

    #[tokio::test]
    async fn test_cpu_query_replays_millicores_at_to() {
        let responder = QueryResponder::new(seeded_store(vec![prom_sample()]).await);

        let response = responder.respond(CPU_QUERY, 1000, 2000).await.unwrap();

        assert_eq!(response.series.len(), 1);
        let entry = &response.series[0];
        assert_eq!(entry.pointlist, vec![(2_000_000, 500.0)]);
        assert_eq!(entry.start, 1000);
        assert_eq!(entry.end, 2000);
        assert_eq!(entry.interval, 1);
        assert_eq!(entry.length, 1);
        assert_eq!(
            entry.scope,
            "kube_namespace:monitoring,pod_name:prometheus-abc,container_name:prom"
        );
        assert_eq!(entry.unit.0.short_name, "ncores");
        assert_eq!(entry.unit.0.scale_factor, 1e-9);
        assert_eq!(
            entry.metric,
            "max:kubernetes.cpu.usage.total"
        );
        assert!(entry.expression.starts_with("max:kubernetes.cpu.usage.total{"));
        assert!(entry.expression.ends_with(&entry.scope));
    }

    #[tokio::test]
    async fn test_mem_query_replays_bytes() {
        let responder = QueryResponder::new(seeded_store(vec![prom_sample()]).await);

        let response = responder.respond(MEM_QUERY, 1000, 2000).await.unwrap();

        assert_eq!(response.series.len(), 1);
        let entry = &response.series[0];
        assert_eq!(entry.pointlist, vec![(2_000_000, 134_217_728.0)]);
        assert_eq!(entry.unit.0.short_name, "B");
        assert_eq!(entry.unit.0.scale_factor, 1.0);
    }

    #[tokio::test]
    async fn test_point_timestamp_saturates_for_huge_ranges() {
        let responder = QueryResponder::new(seeded_store(vec![prom_sample()]).await);

        let response = responder.respond(CPU_QUERY, 0, i64::MAX).await.unwrap();

        let entry = &response.series[0];
        assert_eq!(entry.pointlist, vec![(i64::MAX, 500.0)]);
        assert_eq!(entry.end, i64::MAX);
    }

    #[tokio::test]
    async fn test_unknown_metric_yields_empty_series() {
        let responder = QueryResponder::new(seeded_store(vec![prom_sample()]).await);

        let response = responder
            .respond("avg:kubernetes.network.tx{x}by{pod}", 0, 10)
            .await
            .unwrap();
        assert!(response.series.is_empty());
    }

    #[tokio::test]
    async fn test_empty_batch_yields_empty_series() {
        let responder = QueryResponder::new(BatchStore::new());

        let response = responder.respond(CPU_QUERY, 0, 10).await.unwrap();
        assert!(response.series.is_empty());
    }

    #[tokio::test]
    async fn test_one_entry_per_sample() {
        let mut second = prom_sample();
        second.path.insert("name", "sidecar");
        second.cpu_millicores = 750.0;

        let responder = QueryResponder::new(seeded_store(vec![prom_sample(), second]).await);

        let response = responder.respond(CPU_QUERY, 1000, 2000).await.unwrap();
        assert_eq!(response.series.len(), 2);
        assert_eq!(response.series[0].pointlist[0].1, 500.0);
        assert_eq!(response.series[1].pointlist[0].1, 750.0);
        assert!(response.series[1].scope.ends_with("container_name:sidecar"));
    }

    #[tokio::test]
    async fn test_response_json_shape() {
        let responder = QueryResponder::new(seeded_store(vec![prom_sample()]).await);

        let response = responder.respond(CPU_QUERY, 1000, 2000).await.unwrap();
        let value = serde_json::to_value(&response).unwrap();

        assert_eq!(value["series"][0]["pointlist"][0][0], 2_000_000);
        assert_eq!(value["series"][0]["pointlist"][0][1], 500.0);
        assert_eq!(value["series"][0]["unit"][0]["name"], "nanocore");
        assert_eq!(value["series"][0]["unit"][0]["id"], 121);
        assert_eq!(value["series"][0]["unit"][1], serde_json::json!({}));
        assert_eq!(value["series"][0]["length"], 1);
    }
}
