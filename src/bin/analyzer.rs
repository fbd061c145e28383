use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;
use log::{error, info, warn};
use planned_inference::{
    Activation, AnalysisConfig, AnalysisError, AnalysisReport, Mode, ModelDims, run_analysis,
};

#[derive(Parser, Debug)]
#[command(
    name = "analyzer",
    version,
    about = "Compares eager and statically planned execution of a feed-forward network"
)]
struct Cli {
    /// Comma-separated input values (e.g. '1.0,0.5,-0.2')
    #[arg(long, allow_hyphen_values = true, required_unless_present = "config")]
    input: Option<String>,

    /// Batch size for execution
    #[arg(long)]
    batch: Option<usize>,

    /// Execution mode
    #[arg(long, value_enum)]
    mode: Option<Mode>,

    /// Maximum absolute difference accepted by verification
    #[arg(long)]
    tolerance: Option<f32>,

    /// Warm-up runs per engine, not timed
    #[arg(long)]
    warmups: Option<usize>,

    /// Timed runs per engine
    #[arg(long)]
    iterations: Option<usize>,

    /// Seed of the generated weights
    #[arg(long)]
    seed: Option<u64>,

    #[arg(long)]
    input_dim: Option<usize>,

    #[arg(long)]
    hidden_dim: Option<usize>,

    #[arg(long)]
    output_dim: Option<usize>,

    /// Hidden-layer nonlinearity (relu, sigmoid, tanh)
    #[arg(long)]
    activation: Option<String>,

    /// Disable fusion of the activation into the first affine layer
    #[arg(long)]
    no_fusion: bool,

    /// JSON configuration used as the base for every other flag
    #[arg(long)]
    config: Option<PathBuf>,

    /// Directory receiving analysis_report.json and analysis_report.txt
    #[arg(long)]
    report_dir: Option<PathBuf>,
}

impl Cli {
    fn into_config(self) -> Result<AnalysisConfig, AnalysisError> {
        let mut config = match &self.config {
            Some(path) => AnalysisConfig::load(path)?,
            None => AnalysisConfig::default(),
        };

        if let Some(input) = self.input {
            config.input = input;
        }
        if let Some(batch) = self.batch {
            config.batch_size = batch;
        }
        if let Some(mode) = self.mode {
            config.mode = mode;
        }
        if let Some(tolerance) = self.tolerance {
            config.tolerance = tolerance;
        }
        if let Some(warmups) = self.warmups {
            config.profiler.warmup_iterations = warmups;
        }
        if let Some(iterations) = self.iterations {
            config.profiler.measured_iterations = iterations;
        }
        if let Some(seed) = self.seed {
            config.seed = seed;
        }
        config.dims = ModelDims::new(
            self.input_dim.unwrap_or(config.dims.input_dim),
            self.hidden_dim.unwrap_or(config.dims.hidden_dim),
            self.output_dim.unwrap_or(config.dims.output_dim),
        );
        if let Some(name) = self.activation {
            config.activation =
                Activation::get_by_name(&name).ok_or_else(|| AnalysisError::InvalidConfig {
                    field: "activation".to_string(),
                    message: format!("Unknown activation '{}'", name),
                })?;
        }
        if self.no_fusion {
            config.planner.fuse_elementwise = false;
        }

        Ok(config)
    }
}

fn run(cli: Cli) -> Result<AnalysisReport, AnalysisError> {
    let report_dir = cli.report_dir.clone();
    let config = cli.into_config()?;

    info!("{}", "=".repeat(60));
    info!("ML EXECUTION ANALYZER");
    info!("{}", "=".repeat(60));
    info!("Mode: {}", config.mode.as_str().to_uppercase());
    info!("Batch Size: {}", config.batch_size);
    info!(
        "Model: MLP ({} -> {} -> {})",
        config.dims.input_dim, config.dims.hidden_dim, config.dims.output_dim
    );

    let report = run_analysis(&config)?;
    println!("{}", report.render_text());

    if let Some(dir) = report_dir {
        report.save(dir)?;
    }
    Ok(report)
}

fn main() -> ExitCode {
    env_logger::init();

    match run(Cli::parse()) {
        Ok(report) => {
            if report.verification_failed() {
                warn!("Verification failed: the optimized output differs from the baseline");
            }
            ExitCode::SUCCESS
        }
        Err(e) => {
            error!("Analysis failed: {}", e);
            eprintln!("Error: {}", e);
            ExitCode::FAILURE
        }
    }
}
