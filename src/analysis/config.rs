//! Configuration of an analysis session.

use std::fs;
use std::path::Path;

use log::warn;
use serde::{Deserialize, Serialize};

use crate::activation::Activation;
use crate::buffer_plan::PlannerOptions;
use crate::errors::{AnalysisError, AnalysisResult};
use crate::model_spec::ModelDims;
use crate::profiler::ProfilerConfig;

/// Which engines an analysis runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum Mode {
    /// Eager engine only.
    Baseline,
    /// Planned engine only.
    Optimized,
    /// Both engines, plus verification and comparison.
    #[default]
    Both,
}

impl Mode {
    pub fn runs_baseline(self) -> bool {
        matches!(self, Mode::Baseline | Mode::Both)
    }

    pub fn runs_optimized(self) -> bool {
        matches!(self, Mode::Optimized | Mode::Both)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Mode::Baseline => "baseline",
            Mode::Optimized => "optimized",
            Mode::Both => "both",
        }
    }
}

/// Everything [`run_analysis`](super::run_analysis) needs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalysisConfig {
    /// Comma-separated feature values, tiled to the input width.
    pub input: String,
    pub batch_size: usize,
    pub mode: Mode,
    pub dims: ModelDims,
    pub activation: Activation,
    pub seed: u64,
    pub tolerance: f32,
    pub profiler: ProfilerConfig,
    pub planner: PlannerOptions,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            input: "0.5, 1.2, -0.3".to_string(),
            batch_size: 32,
            mode: Mode::Both,
            dims: ModelDims::default(),
            activation: Activation::Relu,
            seed: 42,
            tolerance: f32::EPSILON,
            profiler: ProfilerConfig::default(),
            planner: PlannerOptions::default(),
        }
    }
}

impl AnalysisConfig {
    /// Loads a JSON configuration, falling back to defaults when the file is missing.
    pub fn load(path: impl AsRef<Path>) -> AnalysisResult<Self> {
        let path = path.as_ref();
        match fs::read_to_string(path) {
            Ok(content) => {
                serde_json::from_str(&content).map_err(|e| AnalysisError::ConfigParse {
                    path: path.display().to_string(),
                    source: e,
                })
            }
            Err(_) => {
                warn!(
                    "Config file '{}' not found, using default configuration",
                    path.display()
                );
                Ok(Self::default())
            }
        }
    }

    /// Validates the configuration.
    pub fn validate(&self) -> AnalysisResult<()> {
        if self.batch_size == 0 {
            return Err(invalid("batch_size", "Batch size must be greater than 0"));
        }

        for (field, value) in [
            ("dims.input_dim", self.dims.input_dim),
            ("dims.hidden_dim", self.dims.hidden_dim),
            ("dims.output_dim", self.dims.output_dim),
        ] {
            if value == 0 {
                return Err(invalid(field, "Dimension must be greater than 0"));
            }
        }

        if !self.tolerance.is_finite() || self.tolerance < 0.0 {
            return Err(invalid(
                "tolerance",
                "Tolerance must be a finite, non-negative number",
            ));
        }

        if self.profiler.measured_iterations == 0 {
            return Err(invalid(
                "profiler.measured_iterations",
                "At least one measured iteration is required",
            ));
        }

        if self.input.trim().is_empty() {
            return Err(invalid("input", "Input values cannot be empty"));
        }

        Ok(())
    }
}

fn invalid(field: &str, message: &str) -> AnalysisError {
    AnalysisError::InvalidConfig {
        field: field.to_string(),
        message: message.to_string(),
    }
}
