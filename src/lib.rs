//! Eager versus statically planned execution of a two-layer feed-forward network.
//!
//! The network is always `affine -> activation -> affine` over batched `f32`
//! input. Two engines run it with the same arithmetic kernels:
//!
//! - [`EagerEngine`] allocates a fresh buffer for every operation.
//! - [`PlannedEngine`] executes a [`BufferPlan`] computed ahead of time: tensor
//!   lifetimes are analyzed once, tensors with disjoint lifetimes share
//!   physical buffers, the activation is fused into the first affine layer,
//!   and every run writes in place into a single preallocated arena.
//!
//! The [`Profiler`] times an engine and attributes its peak memory, the
//! [`Verifier`] checks that both engines agree, and [`run_analysis`] ties
//! everything into an [`AnalysisReport`].

pub mod activation;
pub mod analysis;
pub mod buffer_plan;
pub mod engines;
pub mod errors;
pub mod input;
pub mod kernels;
pub mod model_spec;
pub mod profiler;
pub mod report;
pub mod tensor;
pub mod verifier;

pub use activation::Activation;
pub use analysis::{AnalysisConfig, Mode, run_analysis};
pub use buffer_plan::{BufferPlan, PlanSummary, PlannerOptions};
pub use engines::{EagerEngine, ExecutionStrategy, MemoryFootprint, PlannedEngine};
pub use errors::{AnalysisError, PlanError, ShapeError};
pub use model_spec::{ModelDims, ModelSpec};
pub use profiler::{ExecutionMeasurement, Profiler, ProfilerConfig};
pub use report::AnalysisReport;
pub use tensor::Batch;
pub use verifier::{VerificationResult, Verifier};
