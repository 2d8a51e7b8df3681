//! Emitter configuration

use clap::Parser;
use emitter_lib::EmitterConfig;
use std::time::Duration;

/// Synthetic pod metrics emitter
#[derive(Debug, Parser)]
#[command(name = "metrics-emitter")]
#[command(
    author,
    version,
    about = "Pushes synthetic pod metrics and answers queries over the last batch",
    long_about = None
)]
pub struct Cli {
    /// Push destination, host or host:port
    #[arg(long, env = "EMITTER_DEST", default_value = "pushservice")]
    pub dest: String,

    /// Mean millicores for cpu
    #[arg(long, env = "EMITTER_MEAN_CPU", default_value_t = 1000.0)]
    pub mean_cpu: f64,

    /// Mean mebibytes for memory
    #[arg(long, env = "EMITTER_MEAN_MEM", default_value_t = 128.0)]
    pub mean_mem: f64,

    /// Standard deviation for cpu
    #[arg(long, env = "EMITTER_STDDEV_CPU", default_value_t = 150.0)]
    pub stddev_cpu: f64,

    /// Standard deviation for memory
    #[arg(long, env = "EMITTER_STDDEV_MEM", default_value_t = 15.0)]
    pub stddev_mem: f64,

    /// Delay between passes in standalone mode, in seconds
    #[arg(long, env = "EMITTER_SLEEP_SEC", default_value_t = 30)]
    pub sleep_sec: u64,

    /// Additional tag to attach to every sample (repeatable)
    #[arg(short = 't', long = "tag", num_args = 2, value_names = ["KEY", "VALUE"])]
    pub tags: Vec<String>,

    /// Regex matched against the start of namespace names
    #[arg(long, env = "EMITTER_NAMESPACE_PATTERN", default_value = "monitoring")]
    pub namespace_pattern: String,

    /// Regex matched against the start of pod names
    #[arg(
        long,
        env = "EMITTER_POD_PATTERN",
        default_value = "prometheus-[0-9a-f]{9}-[0-9a-z]{5}"
    )]
    pub pod_pattern: String,

    /// Emit metrics for every pod, ignoring the patterns
    #[arg(long = "all", env = "EMITTER_MATCH_ALL")]
    pub match_all: bool,

    /// Job name to submit under
    #[arg(long, env = "EMITTER_JOB", default_value = "metrics-emitter")]
    pub job: String,

    /// HTTP server port
    #[arg(long, env = "EMITTER_PORT", default_value_t = 8080)]
    pub port: u16,

    /// Run the fixed-interval loop instead of relying on trigger requests
    #[arg(long, env = "EMITTER_STANDALONE")]
    pub standalone: bool,

    /// Timeout for each push request, in seconds
    #[arg(long, env = "EMITTER_PUSH_TIMEOUT_SECS", default_value_t = 10)]
    pub push_timeout_secs: u64,
}

impl Cli {
    /// Fold the command-line surface into the library configuration
    ///
    /// User-supplied tags append after the default `data` tag rather
    /// than replacing it.
    pub fn emitter_config(&self) -> EmitterConfig {
        let mut static_tags = vec![("data".to_string(), "metrics-emitter".to_string())];
        for pair in self.tags.chunks(2) {
            if let [key, value] = pair {
                static_tags.push((key.clone(), value.clone()));
            }
        }

        EmitterConfig {
            destination: self.dest.clone(),
            mean_cpu_millicores: self.mean_cpu,
            stddev_cpu_millicores: self.stddev_cpu,
            mean_mem_mib: self.mean_mem,
            stddev_mem_mib: self.stddev_mem,
            interval: Duration::from_secs(self.sleep_sec),
            job: self.job.clone(),
            namespace_pattern: self.namespace_pattern.clone(),
            pod_pattern: self.pod_pattern.clone(),
            match_all: self.match_all,
            static_tags,
            push_timeout: Duration::from_secs(self.push_timeout_secs),
        }
    }
}
