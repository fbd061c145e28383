//! End-to-end analysis session shared by the CLI and tests.

mod config;

use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use log::{info, warn};

use crate::buffer_plan::BufferPlan;
use crate::engines::{EagerEngine, ExecutionStrategy, PlannedEngine};
use crate::errors::AnalysisResult;
use crate::input::{input_preview, parse_input_string, tile_input};
use crate::model_spec::ModelSpec;
use crate::profiler::{ExecutionMeasurement, Profiler};
use crate::report::{AnalysisReport, Comparison, ModeReport};
use crate::tensor::Batch;
use crate::verifier::Verifier;

pub use config::{AnalysisConfig, Mode};

/// Runs the engines selected by `config.mode` and builds the report.
///
/// Structural problems (bad input, bad configuration, shape mismatches)
/// are errors. A failed verification is not: it is logged and recorded in
/// the report's comparison.
pub fn run_analysis(config: &AnalysisConfig) -> AnalysisResult<AnalysisReport> {
    config.validate()?;

    let values = parse_input_string(&config.input)?;
    let batch = tile_input(&values, config.batch_size, config.dims.input_dim)?;
    let model = ModelSpec::seeded(config.dims, config.seed)?.with_activation(config.activation);
    let model = Arc::new(model);
    let profiler = Profiler::new(config.profiler)?;
    let output_shape = [config.batch_size, config.dims.output_dim];

    info!(
        "Analyzing {} mode: batch {}, model {} -> {} -> {}",
        config.mode.as_str(),
        config.batch_size,
        config.dims.input_dim,
        config.dims.hidden_dim,
        config.dims.output_dim
    );

    let baseline = if config.mode.runs_baseline() {
        let mut engine = EagerEngine::new(Arc::clone(&model))?;
        Some(profile(&profiler, &mut engine, &batch)?)
    } else {
        None
    };

    let (optimized, plan) = if config.mode.runs_optimized() {
        let plan = BufferPlan::build_with(&model, config.batch_size, config.planner)?;
        let summary = plan.summary();
        let mut engine = PlannedEngine::new(Arc::clone(&model), plan)?;
        (Some(profile(&profiler, &mut engine, &batch)?), Some(summary))
    } else {
        (None, None)
    };

    let comparison = match (&baseline, &optimized) {
        (Some((base, base_output)), Some((opt, opt_output))) => {
            let verification = Verifier::new(config.tolerance).compare(base_output, opt_output)?;
            if !verification.passed {
                warn!("Optimized output diverges from the baseline");
            }
            Some(Comparison::new(base, opt, verification))
        }
        _ => None,
    };

    if let Some(comparison) = &comparison {
        info!(
            "Speedup {:.2}x, memory reduction {:.1}%",
            comparison.speedup, comparison.memory_reduction_percent
        );
    }

    Ok(AnalysisReport {
        timestamp_unix: SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs())
            .unwrap_or(0),
        mode: config.mode,
        batch_size: config.batch_size,
        dims: config.dims,
        input_preview: input_preview(&config.input),
        baseline: baseline.map(|(m, output)| ModeReport::new(&m, &output, output_shape)),
        optimized: optimized.map(|(m, output)| ModeReport::new(&m, &output, output_shape)),
        plan,
        comparison,
    })
}

/// Profiles `engine`, then captures one more output for verification.
fn profile<E: ExecutionStrategy>(
    profiler: &Profiler,
    engine: &mut E,
    batch: &Batch,
) -> AnalysisResult<(ExecutionMeasurement, Vec<f32>)> {
    let measurement = profiler.measure(engine, batch)?;
    info!(
        "{}: {:.3} ms average, peak {:.2} MB",
        measurement.engine,
        measurement.average_time_ms,
        measurement.peak_memory_mb()
    );
    let output = engine.execute(batch)?.into_owned();
    Ok((measurement, output))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::AnalysisError;
    use crate::model_spec::ModelDims;
    use crate::profiler::ProfilerConfig;

    fn small(mode: Mode) -> AnalysisConfig {
        AnalysisConfig {
            mode,
            batch_size: 4,
            dims: ModelDims::new(8, 32, 4),
            profiler: ProfilerConfig {
                warmup_iterations: 1,
                measured_iterations: 2,
            },
            ..AnalysisConfig::default()
        }
    }

    #[test]
    fn test_both_modes_compare() {
        let report = run_analysis(&small(Mode::Both)).unwrap();

        let comparison = report.comparison.as_ref().unwrap();
        assert!(comparison.verification.passed);
        assert_eq!(comparison.verification.max_abs_diff, 0.0);
        assert!(comparison.memory_reduction_percent > 0.0);
        assert_eq!(report.plan.as_ref().unwrap().step_count, 2);
        assert_eq!(report.baseline.as_ref().unwrap().output_shape, [4, 4]);
    }

    #[test]
    fn test_single_mode_has_no_comparison() {
        let report = run_analysis(&small(Mode::Baseline)).unwrap();
        assert!(report.baseline.is_some());
        assert!(report.optimized.is_none());
        assert!(report.plan.is_none());
        assert!(report.comparison.is_none());

        let report = run_analysis(&small(Mode::Optimized)).unwrap();
        assert!(report.baseline.is_none());
        assert_eq!(report.optimized.as_ref().unwrap().allocation_events, 0);
    }

    #[test]
    fn test_invalid_input_is_structural_error() {
        let config = AnalysisConfig {
            input: "1.0, x".to_string(),
            ..small(Mode::Both)
        };
        assert!(matches!(
            run_analysis(&config),
            Err(AnalysisError::InvalidInput { .. })
        ));
    }
}
