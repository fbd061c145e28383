//! Static memory planner for the fixed feed-forward pipeline.
//!
//! A [`BufferPlan`] is computed once per model shape and batch size. It
//! derives tensor lifetimes, decides which producer/consumer pairs are
//! fused, and packs the materialized tensors into as few physical buffers as
//! their lifetimes allow. The physical buffers are laid out back to back in
//! a single arena, so a planned engine needs exactly one allocation.

mod assignment;
mod pipeline;

use std::fmt::Write as _;

use log::info;
use serde::{Deserialize, Serialize};

use crate::errors::{PlanError, PlanResult};
use crate::model_spec::{ModelDims, ModelSpec};

pub use assignment::{BufferId, Fusion, PhysicalBuffer, Placement};
pub use pipeline::{
    HIDDEN_ACTIVATED, HIDDEN_PRE_ACTIVATION, Lifetime, OUTPUT, OpDescriptor, OpKind, Operand,
    Pipeline, TensorDescriptor, TensorId,
};

/// Knobs of the planner.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PlannerOptions {
    /// Fuse an elementwise operation into the write step of its producer.
    pub fuse_elementwise: bool,
}

impl Default for PlannerOptions {
    fn default() -> Self {
        Self {
            fuse_elementwise: true,
        }
    }
}

/// One execution step of a planned run: one operation, or a fused group.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PlanStep {
    /// Ordinals of the operations executed by this step.
    pub ops: Vec<usize>,
    /// Tensor holding the step's result.
    pub output: TensorId,
}

impl PlanStep {
    pub fn is_fused(&self) -> bool {
        self.ops.len() > 1
    }
}

/// Serializable digest of a plan, used by reports.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PlanSummary {
    pub batch_size: usize,
    pub buffer_count: usize,
    pub aggregate_bytes: usize,
    pub step_count: usize,
    pub fused_pairs: usize,
    pub tensors: Vec<TensorPlacement>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TensorPlacement {
    pub name: &'static str,
    pub shape: [usize; 2],
    pub lifetime: Lifetime,
    pub placement: Placement,
}

/// Immutable mapping from tensor descriptors to physical buffers.
#[derive(Debug, Clone)]
pub struct BufferPlan {
    dims: ModelDims,
    batch_size: usize,
    options: PlannerOptions,
    pipeline: Pipeline,
    fusions: Vec<Fusion>,
    placements: Vec<Placement>,
    buffers: Vec<PhysicalBuffer>,
    steps: Vec<PlanStep>,
}

impl BufferPlan {
    /// Builds the plan with default options (fusion enabled).
    pub fn build(model: &ModelSpec, batch_size: usize) -> PlanResult<Self> {
        Self::build_with(model, batch_size, PlannerOptions::default())
    }

    pub fn build_with(
        model: &ModelSpec,
        batch_size: usize,
        options: PlannerOptions,
    ) -> PlanResult<Self> {
        Self::for_dims(model.dims(), batch_size, options)
    }

    /// Builds a plan from the layer widths alone; no parameters are needed.
    pub fn for_dims(
        dims: ModelDims,
        batch_size: usize,
        options: PlannerOptions,
    ) -> PlanResult<Self> {
        if batch_size == 0 {
            return Err(PlanError::InvalidBatchSize { batch_size });
        }

        let pipeline = Pipeline::analyze(dims, batch_size)?;
        let fusions = if options.fuse_elementwise {
            assignment::detect_fusions(&pipeline)
        } else {
            Vec::new()
        };
        let (placements, buffers) = assignment::assign_buffers(&pipeline, &fusions);
        let steps = Self::schedule(&pipeline, &fusions);

        let plan = Self {
            dims,
            batch_size,
            options,
            pipeline,
            fusions,
            placements,
            buffers,
            steps,
        };
        plan.validate()?;

        info!(
            "Planned batch {} for {}x{}x{}: {} buffers, {} bytes, {} steps",
            batch_size,
            dims.input_dim,
            dims.hidden_dim,
            dims.output_dim,
            plan.buffer_count(),
            plan.aggregate_bytes(),
            plan.step_count()
        );
        Ok(plan)
    }

    /// Groups operations into steps, merging every fused producer/consumer pair.
    fn schedule(pipeline: &Pipeline, fusions: &[Fusion]) -> Vec<PlanStep> {
        let mut steps: Vec<PlanStep> = Vec::new();
        for op in pipeline.ops() {
            let fused_with_previous = fusions.iter().any(|f| f.consumer_op == op.ordinal);
            match steps.last_mut() {
                Some(step) if fused_with_previous => {
                    step.ops.push(op.ordinal);
                    step.output = op.writes;
                }
                _ => steps.push(PlanStep {
                    ops: vec![op.ordinal],
                    output: op.writes,
                }),
            }
        }
        steps
    }

    /// Re-checks placements, the non-aliasing invariant and buffer capacities.
    pub fn validate(&self) -> PlanResult<()> {
        for tensor in self.pipeline.tensors() {
            match self.placements[tensor.id] {
                Placement::Buffer(buffer) if buffer >= self.buffers.len() => {
                    return Err(PlanError::UnknownBuffer {
                        tensor: tensor.name.to_string(),
                        buffer,
                        buffer_count: self.buffers.len(),
                    });
                }
                _ => {}
            }
        }

        let materialized: Vec<(&TensorDescriptor, BufferId)> = self
            .pipeline
            .tensors()
            .iter()
            .filter_map(|t| match self.placements[t.id] {
                Placement::Buffer(buffer) => Some((t, buffer)),
                Placement::FusedInto(_) => None,
            })
            .collect();

        for (i, &(first, buffer)) in materialized.iter().enumerate() {
            let capacity = self.buffers[buffer].elements;
            if capacity < first.elements() {
                return Err(PlanError::BufferTooSmall {
                    tensor: first.name.to_string(),
                    buffer,
                    required: first.elements(),
                    capacity,
                });
            }
            for &(second, other_buffer) in &materialized[i + 1..] {
                if buffer == other_buffer
                    && self
                        .storage_lifetime(first.id)
                        .overlaps(&self.storage_lifetime(second.id))
                {
                    return Err(PlanError::OverlappingLifetimes {
                        first: first.name.to_string(),
                        second: second.name.to_string(),
                        buffer,
                    });
                }
            }
        }
        Ok(())
    }

    /// Lifetime of the storage owned by `id`, including tensors fused into it.
    pub fn storage_lifetime(&self, id: TensorId) -> Lifetime {
        let owner = assignment::storage_owner(&self.fusions, id);
        self.pipeline
            .tensors()
            .iter()
            .filter(|t| assignment::storage_owner(&self.fusions, t.id) == owner)
            .fold(self.pipeline.tensor(owner).lifetime, |life, t| {
                life.union(&t.lifetime)
            })
    }

    pub fn dims(&self) -> ModelDims {
        self.dims
    }

    pub fn batch_size(&self) -> usize {
        self.batch_size
    }

    pub fn options(&self) -> PlannerOptions {
        self.options
    }

    pub fn pipeline(&self) -> &Pipeline {
        &self.pipeline
    }

    pub fn tensors(&self) -> &[TensorDescriptor] {
        self.pipeline.tensors()
    }

    pub fn placement(&self, id: TensorId) -> Placement {
        self.placements[id]
    }

    /// Physical buffer backing `id`, following fusion links.
    pub fn buffer_of(&self, id: TensorId) -> BufferId {
        match self.placements[assignment::storage_owner(&self.fusions, id)] {
            Placement::Buffer(buffer) => buffer,
            Placement::FusedInto(_) => unreachable!("storage owners are always materialized"),
        }
    }

    pub fn buffers(&self) -> &[PhysicalBuffer] {
        &self.buffers
    }

    pub fn buffer(&self, id: BufferId) -> &PhysicalBuffer {
        &self.buffers[id]
    }

    pub fn buffer_count(&self) -> usize {
        self.buffers.len()
    }

    /// Total arena size in `f32` elements.
    pub fn aggregate_elements(&self) -> usize {
        self.buffers.iter().map(|b| b.elements).sum()
    }

    pub fn aggregate_bytes(&self) -> usize {
        self.buffers.iter().map(PhysicalBuffer::bytes).sum()
    }

    pub fn fusions(&self) -> &[Fusion] {
        &self.fusions
    }

    pub fn steps(&self) -> &[PlanStep] {
        &self.steps
    }

    pub fn step_count(&self) -> usize {
        self.steps.len()
    }

    pub fn summary(&self) -> PlanSummary {
        PlanSummary {
            batch_size: self.batch_size,
            buffer_count: self.buffer_count(),
            aggregate_bytes: self.aggregate_bytes(),
            step_count: self.step_count(),
            fused_pairs: self.fusions.len(),
            tensors: self
                .tensors()
                .iter()
                .map(|t| TensorPlacement {
                    name: t.name,
                    shape: t.shape,
                    lifetime: t.lifetime,
                    placement: self.placements[t.id],
                })
                .collect(),
        }
    }

    /// Human-readable rendering of the plan.
    pub fn describe(&self) -> String {
        let mut out = String::new();
        let _ = writeln!(
            out,
            "Buffer plan for batch {} ({} -> {} -> {})",
            self.batch_size, self.dims.input_dim, self.dims.hidden_dim, self.dims.output_dim
        );
        for tensor in self.tensors() {
            let target = match self.placements[tensor.id] {
                Placement::Buffer(buffer) => format!("buffer {}", buffer),
                Placement::FusedInto(into) => {
                    format!("fused into {}", self.pipeline.tensor(into).name)
                }
            };
            let _ = writeln!(
                out,
                "  {:<22} {:?} live {}..={} -> {}",
                tensor.name, tensor.shape, tensor.lifetime.first, tensor.lifetime.last, target
            );
        }
        for buffer in &self.buffers {
            let tenants: Vec<&str> = buffer
                .tenants
                .iter()
                .map(|&t| self.pipeline.tensor(t).name)
                .collect();
            let _ = writeln!(
                out,
                "  buffer {}: {} elements ({:.1} KB) hosts {}",
                buffer.id,
                buffer.elements,
                buffer.bytes() as f64 / 1024.0,
                tenants.join(", ")
            );
        }
        let steps: Vec<String> = self
            .steps
            .iter()
            .map(|step| {
                step.ops
                    .iter()
                    .map(|&op| self.pipeline.ops()[op].kind.label())
                    .collect::<Vec<_>>()
                    .join("+")
            })
            .collect();
        let _ = write!(out, "  steps: {}", steps.join(", "));
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dims() -> ModelDims {
        ModelDims::new(16, 64, 8)
    }

    #[test]
    fn test_zero_batch_is_rejected() {
        let result = BufferPlan::for_dims(dims(), 0, PlannerOptions::default());
        assert_eq!(
            result.err(),
            Some(PlanError::InvalidBatchSize { batch_size: 0 })
        );
    }

    #[test]
    fn test_oversized_batch_is_rejected() {
        let result = BufferPlan::for_dims(
            ModelDims::new(1, usize::MAX / 2, 1),
            4,
            PlannerOptions::default(),
        );
        assert!(matches!(
            result,
            Err(PlanError::Shape(crate::errors::ShapeError::TensorTooLarge {
                tensor: HIDDEN_PRE_ACTIVATION,
                ..
            }))
        ));
    }

    #[test]
    fn test_validate_rejects_dangling_buffer() {
        let mut plan = BufferPlan::for_dims(dims(), 2, PlannerOptions::default()).unwrap();
        assert!(plan.validate().is_ok());

        plan.placements[2] = Placement::Buffer(7);
        assert_eq!(
            plan.validate(),
            Err(PlanError::UnknownBuffer {
                tensor: OUTPUT.to_string(),
                buffer: 7,
                buffer_count: 2,
            })
        );
    }

    #[test]
    fn test_fused_schedule() {
        let plan = BufferPlan::for_dims(dims(), 4, PlannerOptions::default()).unwrap();

        assert_eq!(plan.step_count(), 2);
        assert!(plan.steps()[0].is_fused());
        assert_eq!(plan.steps()[0].ops, vec![0, 1]);
        assert_eq!(plan.steps()[0].output, 1);
        assert_eq!(plan.steps()[1].ops, vec![2]);
        assert_eq!(plan.buffer_of(0), plan.buffer_of(1));
        assert_ne!(plan.buffer_of(1), plan.buffer_of(2));
        assert_eq!(plan.storage_lifetime(0), Lifetime::new(0, 2));
        assert_eq!(plan.aggregate_bytes(), (4 * 64 + 4 * 8) * 4);
    }

    #[test]
    fn test_unfused_schedule() {
        let options = PlannerOptions {
            fuse_elementwise: false,
        };
        let plan = BufferPlan::for_dims(dims(), 4, options).unwrap();

        assert_eq!(plan.step_count(), 3);
        assert!(plan.steps().iter().all(|s| !s.is_fused()));
        assert_eq!(plan.buffer_count(), 2);
        assert_eq!(plan.buffer_of(0), plan.buffer_of(2));
        assert_eq!(plan.aggregate_bytes(), 2 * 4 * 64 * 4);
    }

    #[test]
    fn test_plan_is_deterministic() {
        let a = BufferPlan::for_dims(dims(), 3, PlannerOptions::default()).unwrap();
        let b = BufferPlan::for_dims(dims(), 3, PlannerOptions::default()).unwrap();
        assert_eq!(a.summary(), b.summary());
        assert_eq!(a.buffers(), b.buffers());
    }

    #[test]
    fn test_describe_mentions_every_tensor() {
        let plan = BufferPlan::for_dims(dims(), 2, PlannerOptions::default()).unwrap();
        let text = plan.describe();
        assert!(text.contains(HIDDEN_PRE_ACTIVATION));
        assert!(text.contains("fused into hidden_activated"));
        assert!(text.contains("steps: affine1+activation, affine2"));
    }
}
