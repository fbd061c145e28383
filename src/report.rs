//! Structured result of an analysis session and its renderings.

use std::fmt::Write as _;
use std::fs;
use std::path::{Path, PathBuf};

use log::info;
use serde::Serialize;

use crate::analysis::Mode;
use crate::buffer_plan::PlanSummary;
use crate::errors::AnalysisResult;
use crate::model_spec::ModelDims;
use crate::profiler::{ExecutionMeasurement, OutputSummary};
use crate::verifier::VerificationResult;

pub const JSON_REPORT_FILE: &str = "analysis_report.json";
pub const TEXT_REPORT_FILE: &str = "analysis_report.txt";

/// Measurements of one engine, in report units.
#[derive(Debug, Clone, Serialize)]
pub struct ModeReport {
    pub engine: &'static str,
    pub latency_sec: f64,
    pub latency_ms: f64,
    pub peak_memory_bytes: usize,
    pub peak_memory_kb: f64,
    pub allocated_bytes: usize,
    pub allocation_events: usize,
    pub measured_iterations: usize,
    pub output_shape: [usize; 2],
    pub output_summary: OutputSummary,
    pub first_values: Vec<f32>,
}

impl ModeReport {
    pub fn new(
        measurement: &ExecutionMeasurement,
        output: &[f32],
        output_shape: [usize; 2],
    ) -> Self {
        Self {
            engine: measurement.engine,
            latency_sec: measurement.average_time_ns as f64 / 1e9,
            latency_ms: measurement.average_time_ms,
            peak_memory_bytes: measurement.peak_memory_bytes,
            peak_memory_kb: measurement.peak_memory_bytes as f64 / 1024.0,
            allocated_bytes: measurement.memory.allocated_bytes,
            allocation_events: measurement.allocation_events,
            measured_iterations: measurement.measured_iterations,
            output_shape,
            output_summary: measurement.output_summary,
            first_values: output.iter().take(5).copied().collect(),
        }
    }
}

/// Baseline versus optimized figures.
#[derive(Debug, Clone, Serialize)]
pub struct Comparison {
    /// Baseline latency divided by optimized latency.
    pub speedup: f64,
    pub memory_saved_bytes: i64,
    pub memory_reduction_percent: f64,
    pub verification: VerificationResult,
}

impl Comparison {
    pub fn new(
        baseline: &ExecutionMeasurement,
        optimized: &ExecutionMeasurement,
        verification: VerificationResult,
    ) -> Self {
        let saved = baseline.peak_memory_bytes as i64 - optimized.peak_memory_bytes as i64;
        let memory_reduction_percent = if baseline.peak_memory_bytes > 0 {
            saved as f64 / baseline.peak_memory_bytes as f64 * 100.0
        } else {
            0.0
        };
        Self {
            speedup: optimized.speedup_over(baseline),
            memory_saved_bytes: saved,
            memory_reduction_percent,
            verification,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct AnalysisReport {
    pub timestamp_unix: u64,
    pub mode: Mode,
    pub batch_size: usize,
    pub dims: ModelDims,
    pub input_preview: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub baseline: Option<ModeReport>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub optimized: Option<ModeReport>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub plan: Option<PlanSummary>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub comparison: Option<Comparison>,
}

impl AnalysisReport {
    /// Whether verification ran and failed.
    pub fn verification_failed(&self) -> bool {
        self.comparison
            .as_ref()
            .is_some_and(|c| !c.verification.passed)
    }

    pub fn to_json(&self) -> AnalysisResult<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Plain-text rendering, as written to `analysis_report.txt`.
    pub fn render_text(&self) -> String {
        let mut out = String::new();
        let _ = writeln!(out, "ML EXECUTION ANALYSIS REPORT");
        let _ = writeln!(out, "============================");
        let _ = writeln!(out);
        let _ = writeln!(out, "Timestamp: {}", self.timestamp_unix);
        let _ = writeln!(out, "Batch Size: {}", self.batch_size);
        let _ = writeln!(out, "Mode: {}", self.mode.as_str());
        let _ = writeln!(
            out,
            "Model: {} -> {} -> {}",
            self.dims.input_dim, self.dims.hidden_dim, self.dims.output_dim
        );
        let _ = writeln!(out, "Input: {}", self.input_preview);
        let _ = writeln!(out);

        for (title, section) in [
            ("BASELINE EXECUTION", &self.baseline),
            ("OPTIMIZED EXECUTION", &self.optimized),
        ] {
            if let Some(section) = section {
                let _ = writeln!(out, "{}", title);
                let _ = writeln!(out, "{}", "-".repeat(title.len()));
                let _ = writeln!(out, "Latency: {:.6} sec", section.latency_sec);
                let _ = writeln!(out, "Peak Mem: {:.2} KB", section.peak_memory_kb);
                let _ = writeln!(out, "Allocations: {}", section.allocation_events);
                let _ = writeln!(out, "Output Shape: {:?}", section.output_shape);
                let _ = writeln!(out, "  Min:  {:.4}", section.output_summary.min);
                let _ = writeln!(out, "  Max:  {:.4}", section.output_summary.max);
                let _ = writeln!(out, "  Mean: {:.4}", section.output_summary.mean);
                let _ = writeln!(out, "  First 5 values: {:?}", section.first_values);
                let _ = writeln!(out);
            }
        }

        if let Some(plan) = &self.plan {
            let _ = writeln!(out, "BUFFER PLAN");
            let _ = writeln!(out, "-----------");
            let _ = writeln!(out, "Buffers: {}", plan.buffer_count);
            let _ = writeln!(out, "Aggregate: {:.2} KB", plan.aggregate_bytes as f64 / 1024.0);
            let _ = writeln!(out, "Steps: {} ({} fused)", plan.step_count, plan.fused_pairs);
            let _ = writeln!(out);
        }

        if let Some(comparison) = &self.comparison {
            let _ = writeln!(out, "COMPARISON SUMMARY");
            let _ = writeln!(out, "------------------");
            let _ = writeln!(out, "Speedup: {:.2}x", comparison.speedup);
            let _ = writeln!(out, "Memory Saved: {:.1}%", comparison.memory_reduction_percent);
            let _ = writeln!(
                out,
                "Correctness: {} (max diff {:.2e}, tolerance {:.2e})",
                if comparison.verification.passed {
                    "PASS"
                } else {
                    "FAIL"
                },
                comparison.verification.max_abs_diff,
                comparison.verification.tolerance
            );
        }

        out
    }

    /// Writes the JSON and text renderings into `dir`, creating it if needed.
    pub fn save(&self, dir: impl AsRef<Path>) -> AnalysisResult<(PathBuf, PathBuf)> {
        let dir = dir.as_ref();
        fs::create_dir_all(dir)?;

        let json_path = dir.join(JSON_REPORT_FILE);
        fs::write(&json_path, self.to_json()?)?;
        let text_path = dir.join(TEXT_REPORT_FILE);
        fs::write(&text_path, self.render_text())?;

        info!("Reports saved to: {}", dir.display());
        Ok((json_path, text_path))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engines::MemoryFootprint;

    fn measurement(
        engine: &'static str,
        average_time_ns: u128,
        peak: usize,
    ) -> ExecutionMeasurement {
        ExecutionMeasurement {
            engine,
            warmup_iterations: 0,
            measured_iterations: 1,
            total_time_ns: average_time_ns,
            average_time_ns,
            average_time_ms: average_time_ns as f64 / 1_000_000.0,
            peak_memory_bytes: peak,
            memory: MemoryFootprint {
                peak_bytes: peak,
                allocated_bytes: peak,
                buffers: 1,
            },
            allocation_events: 0,
            output_summary: OutputSummary::of(&[1.0, 2.0]),
        }
    }

    fn verification(passed: bool) -> VerificationResult {
        VerificationResult {
            passed,
            max_abs_diff: if passed { 0.0 } else { 1.0 },
            tolerance: f32::EPSILON,
            worst_index: Some(0),
        }
    }

    #[test]
    fn test_comparison_figures() {
        let baseline = measurement("baseline", 2_000, 1_000);
        let optimized = measurement("optimized", 1_000, 600);
        let comparison = Comparison::new(&baseline, &optimized, verification(true));

        assert_eq!(comparison.speedup, 2.0);
        assert_eq!(comparison.memory_saved_bytes, 400);
        assert_eq!(comparison.memory_reduction_percent, 40.0);
    }

    #[test]
    fn test_render_text_sections() {
        let baseline = measurement("baseline", 2_000, 1_000);
        let optimized = measurement("optimized", 1_000, 600);
        let report = AnalysisReport {
            timestamp_unix: 0,
            mode: Mode::Both,
            batch_size: 1,
            dims: ModelDims::new(2, 4, 2),
            input_preview: "1,2...".to_string(),
            baseline: Some(ModeReport::new(&baseline, &[1.0, 2.0], [1, 2])),
            optimized: Some(ModeReport::new(&optimized, &[1.0, 2.0], [1, 2])),
            plan: None,
            comparison: Some(Comparison::new(&baseline, &optimized, verification(false))),
        };

        let text = report.render_text();
        assert!(text.contains("BASELINE EXECUTION"));
        assert!(text.contains("OPTIMIZED EXECUTION"));
        assert!(text.contains("Speedup: 2.00x"));
        assert!(text.contains("Correctness: FAIL"));
        assert!(!text.contains("BUFFER PLAN"));
        assert!(report.verification_failed());

        let json: serde_json::Value = serde_json::from_str(&report.to_json().unwrap()).unwrap();
        assert_eq!(json["mode"], "both");
        assert_eq!(json["comparison"]["verification"]["passed"], false);
        assert!(json.get("plan").is_none());
    }
}
