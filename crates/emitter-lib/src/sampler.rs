//! Synthetic sample generation
//!
//! Per-container cpu/mem values are drawn from two normal distributions
//! configured at startup: cpu in millicores, memory in MiB. Draws are
//! floored before use; a negative memory draw clamps to zero bytes.

use anyhow::{Context, Result};
use rand::thread_rng;
use rand_distr::{Distribution, Normal};

const BYTES_PER_MIB: f64 = 1_048_576.0;

/// Draws synthetic cpu/mem values for one container
#[derive(Debug, Clone)]
pub struct SampleGenerator {
    cpu_millicores: Normal<f64>,
    mem_mib: Normal<f64>,
}

impl SampleGenerator {
    /// Build the two distributions. Fails on a negative or non-finite
    /// standard deviation.
    pub fn new(mean_cpu: f64, stddev_cpu: f64, mean_mem: f64, stddev_mem: f64) -> Result<Self> {
        Ok(Self {
            cpu_millicores: build_normal(mean_cpu, stddev_cpu)
                .context("Invalid cpu distribution")?,
            mem_mib: build_normal(mean_mem, stddev_mem).context("Invalid memory distribution")?,
        })
    }

    /// Raw draws: (cpu in millicores, memory in MiB)
    pub fn draw(&self) -> (f64, f64) {
        let mut rng = thread_rng();
        (
            self.cpu_millicores.sample(&mut rng),
            self.mem_mib.sample(&mut rng),
        )
    }

    /// One converted sample: floored cpu millicores and a whole byte count
    pub fn generate(&self) -> (f64, u64) {
        let (cpu, mem_mib) = self.draw();
        (cpu.floor(), mib_to_bytes(mem_mib))
    }
}

/// Normal distribution with the dispersion checks the draws rely on
fn build_normal(mean: f64, stddev: f64) -> Result<Normal<f64>> {
    if !stddev.is_finite() || stddev < 0.0 {
        anyhow::bail!("stddev {} must be finite and non-negative", stddev);
    }
    Ok(Normal::new(mean, stddev)?)
}

/// MiB to whole bytes, clamped at zero
fn mib_to_bytes(mem_mib: f64) -> u64 {
    let bytes = (mem_mib * BYTES_PER_MIB).floor();
    if bytes <= 0.0 {
        0
    } else {
        bytes as u64
    }
}
