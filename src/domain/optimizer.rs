//! Parameter sweep optimizer.
//!
//! Expands a cartesian product of parameter axes into independent
//! backtest jobs, runs them in chunks on isolated worker pools, and
//! ranks the aggregated summaries by roi. Each chunk gets a freshly
//! built pool whose per-worker start hook reinitializes any shared
//! external resource; workers never inherit a live handle.

use std::collections::BTreeMap;
use std::sync::Arc;

use log::{debug, info, warn};
use rayon::prelude::*;
use serde::Serialize;

use super::backtest::{run_backtest, BacktestSpec};
use super::candle::Candle;
use super::error::GridtraderError;

pub const DEFAULT_WORKERS: usize = 8;

/// Inclusive numeric range axis: min, min+step, ... bounded by max.
#[derive(Debug, Clone, PartialEq)]
pub struct RangedSet {
    min: f64,
    max: f64,
    step: f64,
}

impl RangedSet {
    pub fn new(min: f64, max: f64, step: f64) -> Result<Self, GridtraderError> {
        if min > max {
            return Err(GridtraderError::ConfigInvalid {
                section: "sweep".into(),
                key: "range".into(),
                reason: format!("min {} exceeds max {}", min, max),
            });
        }
        if step <= 0.0 {
            return Err(GridtraderError::ConfigInvalid {
                section: "sweep".into(),
                key: "range".into(),
                reason: format!("step must be positive, got {}", step),
            });
        }
        Ok(RangedSet { min, max, step })
    }

    /// Number of whole steps between min and max; iteration yields
    /// `count() + 1` values.
    pub fn count(&self) -> usize {
        ((self.max - self.min) / self.step).floor() as usize
    }

    pub fn values(&self) -> Vec<f64> {
        (0..=self.count())
            .map(|i| self.min + i as f64 * self.step)
            .collect()
    }
}

/// One axis of the search: an explicit value list or a numeric range.
#[derive(Debug, Clone, PartialEq)]
pub enum ParameterSet {
    Values(Vec<f64>),
    Range(RangedSet),
}

impl ParameterSet {
    pub fn values(&self) -> Vec<f64> {
        match self {
            ParameterSet::Values(values) => values.clone(),
            ParameterSet::Range(range) => range.values(),
        }
    }

    pub fn len(&self) -> usize {
        match self {
            ParameterSet::Values(values) => values.len(),
            ParameterSet::Range(range) => range.count() + 1,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ParameterAxis {
    pub name: String,
    pub set: ParameterSet,
}

/// One point of the cartesian product, in axis order.
pub type Combination = Vec<(String, f64)>;

/// Expand the full cartesian product, preserving per-axis ordering: the
/// first axis varies slowest.
pub fn expand_combinations(axes: &[ParameterAxis]) -> Vec<Combination> {
    if axes.is_empty() {
        return vec![Vec::new()];
    }

    let rest = expand_combinations(&axes[1..]);
    let mut combinations = Vec::with_capacity(axes[0].set.len() * rest.len());
    for value in axes[0].set.values() {
        for sub in &rest {
            let mut combination = Vec::with_capacity(1 + sub.len());
            combination.push((axes[0].name.clone(), value));
            combination.extend(sub.iter().cloned());
            combinations.push(combination);
        }
    }
    combinations
}

#[derive(Debug, Clone, Serialize)]
pub struct OptimizationSummary {
    pub combination: BTreeMap<String, f64>,
    pub metrics: BTreeMap<String, f64>,
}

impl OptimizationSummary {
    pub fn roi(&self) -> f64 {
        self.metrics.get("roi").copied().unwrap_or(f64::NAN)
    }

    /// A summary counts only if it has metrics and a finite roi.
    fn is_valid(&self) -> bool {
        !self.metrics.is_empty() && self.roi().is_finite()
    }
}

/// A combination whose job failed, recorded under the Skip policy.
#[derive(Debug)]
pub struct FailedJob {
    pub combination: Combination,
    pub error: GridtraderError,
}

/// Whether one failing job aborts the whole sweep or is recorded and
/// skipped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum JobFailurePolicy {
    #[default]
    Abort,
    Skip,
}

/// Per-worker setup hook, invoked once per spawned worker before it takes
/// tasks. The slot for resetting a shared external handle (e.g. a
/// connection) that must not cross the spawn boundary.
pub type WorkerInit = Arc<dyn Fn(usize) + Send + Sync>;

#[derive(Clone)]
pub struct SweepOptions {
    pub workers: usize,
    pub on_job_failure: JobFailurePolicy,
    pub worker_init: Option<WorkerInit>,
}

impl Default for SweepOptions {
    fn default() -> Self {
        SweepOptions {
            workers: DEFAULT_WORKERS,
            on_job_failure: JobFailurePolicy::default(),
            worker_init: None,
        }
    }
}

#[derive(Debug, Default)]
pub struct SweepReport {
    /// Valid summaries, roi descending; ties keep combination order.
    pub summaries: Vec<OptimizationSummary>,
    /// Failed combinations (Skip policy only).
    pub failures: Vec<FailedJob>,
    /// Combinations attempted, before filtering.
    pub total: usize,
}

/// Run one chunk on an isolated, freshly built pool. The pool is bounded
/// at `workers` threads with a join barrier on collect; the start handler
/// runs the per-worker init before any task executes.
fn run_chunk(
    spec: &BacktestSpec,
    candles: &Arc<Vec<Candle>>,
    chunk: &[Combination],
    options: &SweepOptions,
) -> Result<Vec<Result<OptimizationSummary, GridtraderError>>, GridtraderError> {
    let mut builder = rayon::ThreadPoolBuilder::new().num_threads(options.workers);
    if let Some(init) = options.worker_init.clone() {
        builder = builder.start_handler(move |worker| init(worker));
    }
    let pool = builder
        .build()
        .map_err(|e| GridtraderError::LogicError {
            reason: format!("worker pool construction failed: {}", e),
        })?;

    Ok(pool.install(|| {
        chunk
            .par_iter()
            .map(|combination| run_job(spec, candles, combination))
            .collect()
    }))
}

/// One job: a fresh clone of the tester state with the combination merged
/// in, then a full backtest.
fn run_job(
    spec: &BacktestSpec,
    candles: &Arc<Vec<Candle>>,
    combination: &Combination,
) -> Result<OptimizationSummary, GridtraderError> {
    let mut job_spec = spec.clone();
    for (name, value) in combination {
        job_spec.apply_override(name, *value)?;
    }
    let report = run_backtest(&job_spec, candles)?;
    Ok(OptimizationSummary {
        combination: combination.iter().cloned().collect(),
        metrics: report.metrics,
    })
}

/// Expand the axes, execute every combination, and rank the summaries.
///
/// Under `Abort` a job error is fatal for the whole run; under `Skip` it
/// is recorded and the sweep continues. Empty and invalid summaries are
/// silently dropped from the ranking.
pub fn run_sweep(
    spec: &BacktestSpec,
    candles: &[Candle],
    axes: &[ParameterAxis],
    options: &SweepOptions,
) -> Result<SweepReport, GridtraderError> {
    let combinations = expand_combinations(axes);
    let total = combinations.len();
    info!(
        "sweep: {} combinations across {} axes, {} workers per chunk",
        total,
        axes.len(),
        options.workers
    );

    let candles = Arc::new(candles.to_vec());
    let chunk_size = options.workers.max(1);
    let mut summaries = Vec::with_capacity(total);
    let mut failures = Vec::new();

    for chunk in combinations.chunks(chunk_size) {
        let results = run_chunk(spec, &candles, chunk, options)?;
        for (combination, result) in chunk.iter().zip(results) {
            match result {
                Ok(summary) => summaries.push(summary),
                Err(error) => match options.on_job_failure {
                    JobFailurePolicy::Abort => return Err(error),
                    JobFailurePolicy::Skip => {
                        warn!("sweep: job failed for {:?}: {}", combination, error);
                        failures.push(FailedJob {
                            combination: combination.clone(),
                            error,
                        });
                    }
                },
            }
        }
    }

    let before = summaries.len();
    summaries.retain(|s| s.is_valid());
    if summaries.len() < before {
        debug!("sweep: dropped {} empty/invalid summaries", before - summaries.len());
    }

    // Stable sort: ties preserve original combination order.
    summaries.sort_by(|a, b| {
        b.roi()
            .partial_cmp(&a.roi())
            .unwrap_or(std::cmp::Ordering::Equal)
    });

    Ok(SweepReport {
        summaries,
        failures,
        total,
    })
}
