//! Repeated timed runs over a grid of point counts and block sizes.
//!
//! Each variant runs `iterations + 2` times; the fastest and slowest samples
//! are dropped and the rest averaged.

use std::fmt::Write as _;
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::{info, warn};

use crate::config::RunConfig;
use crate::device::{ComputeBackend, DispatchError};

/// Samples run on top of the requested iterations, discarded as outliers.
pub const OUTLIER_SAMPLES: u32 = 2;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SweepPoint {
    /// Label as written in the plan, e.g. `1M`.
    pub label: String,
    pub count: u64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SweepPlan {
    pub points: Vec<SweepPoint>,
    pub block_sizes: Vec<u64>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SweepRow {
    pub label: String,
    /// Mean kernel time in nanoseconds per block size; `None` if the sweep stopped first.
    pub cells: Vec<Option<f64>>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SweepTable {
    pub block_sizes: Vec<u64>,
    pub rows: Vec<SweepRow>,
    pub interrupted: bool,
}

impl SweepTable {
    pub fn render(&self) -> String {
        let mut out = String::from("\ntotal time (ns)\n\n");

        let header: Vec<String> = std::iter::once("block size".to_string())
            .chain(self.block_sizes.iter().map(|b| b.to_string()))
            .collect();
        let _ = writeln!(out, "{}", header.join("\t"));

        for row in &self.rows {
            let cells: Vec<String> = std::iter::once(format!("{} points", row.label))
                .chain(row.cells.iter().map(|c| match c {
                    Some(ns) => format!("{:.0}", ns),
                    None => String::new(),
                }))
                .collect();
            let _ = writeln!(out, "{}", cells.join("\t"));
        }
        out
    }
}

/// Mean of `samples` after dropping one minimum and one maximum. Needs at least 3 samples.
pub fn trimmed_mean(samples: &[f64]) -> Option<f64> {
    if samples.len() < 3 {
        return None;
    }
    let max = samples.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    let min = samples.iter().copied().fold(f64::INFINITY, f64::min);
    let total: f64 = samples.iter().sum();
    Some((total - max - min) / (samples.len() - 2) as f64)
}

/// Time every plan variant on `backend` using the step size and device of `base`.
///
/// `stop` is polled before each run; once set, the remaining cells stay empty.
pub fn run<B: ComputeBackend>(
    backend: &mut B,
    plan: &SweepPlan,
    base: &RunConfig,
    iterations: u32,
    program: &str,
    stop: &AtomicBool,
) -> Result<SweepTable, DispatchError> {
    let samples_per_variant = iterations.saturating_add(OUTLIER_SAMPLES);
    let mut table = SweepTable {
        block_sizes: plan.block_sizes.clone(),
        rows: Vec::with_capacity(plan.points.len()),
        interrupted: false,
    };

    info!(
        variants = plan.points.len() * plan.block_sizes.len(),
        samples_per_variant, "starting sweep"
    );

    for point in &plan.points {
        let mut row = SweepRow {
            label: point.label.clone(),
            cells: vec![None; plan.block_sizes.len()],
        };

        for (cell, &block_size) in row.cells.iter_mut().zip(&plan.block_sizes) {
            if table.interrupted {
                break;
            }
            println!("{} {} {}", program, point.label, block_size);

            let mut samples = Vec::with_capacity(samples_per_variant as usize);
            for _ in 0..samples_per_variant {
                if stop.load(Ordering::Relaxed) {
                    warn!("sweep interrupted");
                    table.interrupted = true;
                    break;
                }
                let report = backend.run_calculation(
                    point.count,
                    block_size,
                    base.step_size,
                    base.device_index,
                )?;
                samples.push(report.kernel_time.as_nanos() as f64);
            }

            if !table.interrupted {
                *cell = trimmed_mean(&samples);
            }
        }

        table.rows.push(row);
    }

    Ok(table)
}
