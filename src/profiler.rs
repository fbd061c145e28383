//! Wall-clock and memory measurement of a single engine.

use std::hint::black_box;
use std::time::Instant;

use log::debug;
use serde::{Deserialize, Serialize};

use crate::engines::{ExecutionStrategy, MemoryFootprint};
use crate::errors::{AnalysisError, AnalysisResult};
use crate::tensor::Batch;

/// Iteration counts used by [`Profiler::measure`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProfilerConfig {
    /// Runs executed before timing starts, discarded.
    pub warmup_iterations: usize,
    /// Runs averaged into the reported duration.
    pub measured_iterations: usize,
}

impl Default for ProfilerConfig {
    fn default() -> Self {
        Self {
            warmup_iterations: 5,
            measured_iterations: 20,
        }
    }
}

impl ProfilerConfig {
    pub fn validate(&self) -> AnalysisResult<()> {
        if self.measured_iterations == 0 {
            return Err(AnalysisError::InvalidConfig {
                field: "measured_iterations".to_string(),
                message: "must be greater than 0".to_string(),
            });
        }
        Ok(())
    }
}

/// Min, max and mean of an output tensor.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct OutputSummary {
    pub len: usize,
    pub min: f32,
    pub max: f32,
    pub mean: f32,
}

impl OutputSummary {
    pub fn of(values: &[f32]) -> Self {
        if values.is_empty() {
            return Self {
                len: 0,
                min: 0.0,
                max: 0.0,
                mean: 0.0,
            };
        }
        let (min, max, sum) = values.iter().fold(
            (f32::INFINITY, f32::NEG_INFINITY, 0.0f64),
            |(min, max, sum), &v| (min.min(v), max.max(v), sum + v as f64),
        );
        Self {
            len: values.len(),
            min,
            max,
            mean: (sum / values.len() as f64) as f32,
        }
    }
}

/// Result of profiling one engine on one input.
#[derive(Debug, Clone, Serialize)]
pub struct ExecutionMeasurement {
    pub engine: &'static str,
    pub warmup_iterations: usize,
    pub measured_iterations: usize,
    pub total_time_ns: u128,
    pub average_time_ns: u128,
    pub average_time_ms: f64,
    pub peak_memory_bytes: usize,
    pub memory: MemoryFootprint,
    /// Heap allocations the engine reported across the timed runs.
    pub allocation_events: usize,
    pub output_summary: OutputSummary,
}

impl ExecutionMeasurement {
    /// How many times faster `self` is than `baseline`.
    pub fn speedup_over(&self, baseline: &ExecutionMeasurement) -> f64 {
        if self.average_time_ns == 0 {
            return f64::INFINITY;
        }
        baseline.average_time_ns as f64 / self.average_time_ns as f64
    }

    pub fn peak_memory_mb(&self) -> f64 {
        self.peak_memory_bytes as f64 / (1024.0 * 1024.0)
    }
}

pub struct Profiler {
    config: ProfilerConfig,
}

impl Profiler {
    pub fn new(config: ProfilerConfig) -> AnalysisResult<Self> {
        config.validate()?;
        Ok(Self { config })
    }

    pub fn config(&self) -> ProfilerConfig {
        self.config
    }

    /// Warms `engine` up, then times `measured_iterations` runs on `input`.
    pub fn measure<E: ExecutionStrategy>(
        &self,
        engine: &mut E,
        input: &Batch,
    ) -> AnalysisResult<ExecutionMeasurement> {
        let iterations = self.config.measured_iterations;
        debug!(
            "Profiling {} ({} warm-ups, {} runs)",
            engine.name(),
            self.config.warmup_iterations,
            iterations
        );

        for _ in 0..self.config.warmup_iterations {
            black_box(engine.execute(input)?);
        }

        let progress_step = (iterations / 10).max(1);
        let mut allocation_events = 0;
        let start = Instant::now();
        for i in 0..iterations {
            black_box(engine.execute(input)?);
            allocation_events += engine.allocation_events();
            if (i + 1) % progress_step == 0 {
                debug!("  Progress: {}/{}", i + 1, iterations);
            }
        }
        let total_time_ns = start.elapsed().as_nanos();

        let output_summary = OutputSummary::of(&engine.execute(input)?);
        let memory = engine.memory_footprint();
        let average_time_ns = total_time_ns / iterations as u128;

        Ok(ExecutionMeasurement {
            engine: engine.name(),
            warmup_iterations: self.config.warmup_iterations,
            measured_iterations: iterations,
            total_time_ns,
            average_time_ns,
            average_time_ms: average_time_ns as f64 / 1_000_000.0,
            peak_memory_bytes: memory.peak_bytes,
            memory,
            allocation_events,
            output_summary,
        })
    }
}
