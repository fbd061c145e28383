//! Engine executing a [`BufferPlan`] inside one preallocated arena.
//!
//! Construction compiles the plan's steps into a short list of
//! instructions addressing regions of a unified computation buffer. A run
//! only walks that list: every result is written in place, nothing is
//! allocated.

use std::borrow::Cow;
use std::ops::Range;
use std::sync::Arc;

use log::{debug, warn};

use crate::activation::Activation;
use crate::buffer_plan::{BufferPlan, OpKind, Operand, TensorId};
use crate::errors::{ShapeError, ShapeResult};
use crate::kernels;
use crate::model_spec::{DenseLayer, ModelSpec};
use crate::tensor::Batch;

use super::{ExecutionStrategy, MemoryFootprint};

/// Rows of `features` values starting at `offset` in the arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Region {
    offset: usize,
    features: usize,
}

impl Region {
    fn range(&self, rows: usize) -> Range<usize> {
        self.offset..self.offset + rows * self.features
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Source {
    Input,
    Arena(Region),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum LayerRef {
    First,
    Second,
}

/// One compiled plan step.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Instruction {
    /// Affine layer, optionally with the activation applied as rows are written.
    Affine {
        layer: LayerRef,
        activation: Option<Activation>,
        input: Source,
        output: Region,
    },
    ActivationInPlace {
        region: Region,
    },
    ActivationCopy {
        input: Source,
        output: Region,
    },
}

impl Instruction {
    fn apply(&self, model: &ModelSpec, input: &[f32], arena: &mut [f32], rows: usize) {
        match *self {
            Instruction::Affine {
                layer,
                activation,
                input: source,
                output,
            } => {
                let layer = match layer {
                    LayerRef::First => model.layer1(),
                    LayerRef::Second => model.layer2(),
                };
                let (src, dst) = operands(arena, input, source, output, rows);
                write_affine(layer, activation, src, dst);
            }
            Instruction::ActivationInPlace { region } => {
                model.activation().apply_in_place(&mut arena[region.range(rows)]);
            }
            Instruction::ActivationCopy {
                input: source,
                output,
            } => {
                let (src, dst) = operands(arena, input, source, output, rows);
                model.activation().apply_into(src, dst);
            }
        }
    }
}

fn write_affine(layer: &DenseLayer, activation: Option<Activation>, src: &[f32], dst: &mut [f32]) {
    match activation {
        Some(activation) => kernels::affine_activation_into(layer, activation, src, dst),
        None => kernels::affine_into(layer, src, dst),
    }
}

/// Borrows a read region and a disjoint write region of the arena.
fn operands<'a>(
    arena: &'a mut [f32],
    input: &'a [f32],
    source: Source,
    output: Region,
    rows: usize,
) -> (&'a [f32], &'a mut [f32]) {
    let dst = output.range(rows);
    let src = match source {
        Source::Input => return (input, &mut arena[dst]),
        Source::Arena(region) => region.range(rows),
    };
    debug_assert!(src.end <= dst.start || dst.end <= src.start);

    if src.end <= dst.start {
        let (head, tail) = arena.split_at_mut(dst.start);
        (&head[src], &mut tail[..dst.len()])
    } else {
        let (head, tail) = arena.split_at_mut(src.start);
        (&tail[..src.len()], &mut head[dst])
    }
}

/// Address and capacity of the arena, compared around every run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct ArenaState {
    address: usize,
    capacity: usize,
}

impl ArenaState {
    /// Allocations that happened between `before` and `self`.
    fn allocations_since(self, before: ArenaState) -> usize {
        usize::from(self != before)
    }
}

/// Executes a fixed buffer plan with in-place writes and no allocation.
pub struct PlannedEngine {
    model: Arc<ModelSpec>,
    plan: BufferPlan,
    instructions: Vec<Instruction>,
    output: Region,
    arena: Vec<f32>,
    last_rows: usize,
    /// Arena reallocations observed during the most recent run.
    last_allocations: usize,
}

impl PlannedEngine {
    /// Allocates the plan's buffers once.
    ///
    /// Fails when the plan was built for different layer widths.
    pub fn new(model: Arc<ModelSpec>, plan: BufferPlan) -> ShapeResult<Self> {
        let (planned, actual) = (plan.dims(), model.dims());
        if planned != actual {
            return Err(ShapeError::PlanModelMismatch {
                plan_input: planned.input_dim,
                plan_hidden: planned.hidden_dim,
                plan_output: planned.output_dim,
                model_input: actual.input_dim,
                model_hidden: actual.hidden_dim,
                model_output: actual.output_dim,
            });
        }

        let instructions = compile(&model, &plan);
        let output = region(&plan, plan.pipeline().output());
        let arena = vec![0.0f32; plan.aggregate_elements()];
        debug!(
            "Allocated planned arena of {} bytes for {} instructions",
            plan.aggregate_bytes(),
            instructions.len()
        );

        Ok(Self {
            model,
            plan,
            instructions,
            output,
            arena,
            last_rows: 0,
            last_allocations: 0,
        })
    }

    fn arena_state(&self) -> ArenaState {
        ArenaState {
            address: self.arena.as_ptr() as usize,
            capacity: self.arena.capacity(),
        }
    }

    pub fn plan(&self) -> &BufferPlan {
        &self.plan
    }

    pub fn model(&self) -> &ModelSpec {
        &self.model
    }

    /// Runs the plan over `input` and returns a view of the output buffer.
    ///
    /// A batch may have fewer rows than the plan was built for; it then
    /// uses a prefix of every buffer. The view lives until the next run.
    pub fn run(&mut self, input: &Batch) -> ShapeResult<&[f32]> {
        input.validate_for(self.model.input_dim())?;
        let rows = input.rows();
        if rows > self.plan.batch_size() {
            return Err(ShapeError::BatchSizeMismatch {
                planned: self.plan.batch_size(),
                actual: rows,
            });
        }

        let before = self.arena_state();
        for instruction in &self.instructions {
            instruction.apply(&self.model, input.as_slice(), &mut self.arena, rows);
        }
        self.last_rows = rows;
        self.last_allocations = self.arena_state().allocations_since(before);
        if self.last_allocations > 0 {
            warn!("Planned arena was reallocated during a run");
        }

        Ok(&self.arena[self.output.range(rows)])
    }

    /// Output of the most recent run; empty before the first one.
    pub fn output(&self) -> &[f32] {
        &self.arena[self.output.range(self.last_rows)]
    }

    /// Copies the most recent output into `destination`.
    pub fn copy_output_into(&self, destination: &mut [f32]) -> ShapeResult<()> {
        let output = self.output();
        if destination.len() != output.len() {
            return Err(ShapeError::OutputLengthMismatch {
                left: output.len(),
                right: destination.len(),
            });
        }
        destination.copy_from_slice(output);
        Ok(())
    }

    pub fn to_vec(&self) -> Vec<f32> {
        self.output().to_vec()
    }
}

impl ExecutionStrategy for PlannedEngine {
    fn name(&self) -> &'static str {
        "optimized"
    }

    fn execute(&mut self, input: &Batch) -> ShapeResult<Cow<'_, [f32]>> {
        self.run(input).map(Cow::Borrowed)
    }

    fn memory_footprint(&self) -> MemoryFootprint {
        MemoryFootprint {
            peak_bytes: self.plan.aggregate_bytes(),
            allocated_bytes: self.plan.aggregate_bytes(),
            buffers: self.plan.buffer_count(),
        }
    }

    fn allocation_events(&self) -> usize {
        self.last_allocations
    }
}

fn region(plan: &BufferPlan, tensor: TensorId) -> Region {
    Region {
        offset: plan.buffer(plan.buffer_of(tensor)).offset,
        features: plan.pipeline().tensor(tensor).shape[1],
    }
}

fn source(plan: &BufferPlan, operand: Operand) -> Source {
    match operand {
        Operand::Input => Source::Input,
        Operand::Tensor(id) => Source::Arena(region(plan, id)),
    }
}

fn compile(model: &ModelSpec, plan: &BufferPlan) -> Vec<Instruction> {
    let ops = plan.pipeline().ops();

    plan.steps()
        .iter()
        .map(|step| {
            let head = &ops[step.ops[0]];
            let input = source(plan, head.reads);
            let output = region(plan, step.output);

            match head.kind {
                OpKind::Affine1 | OpKind::Affine2 => {
                    let fused = step.ops[1..]
                        .iter()
                        .any(|&op| ops[op].kind == OpKind::Activation);
                    Instruction::Affine {
                        layer: if head.kind == OpKind::Affine1 {
                            LayerRef::First
                        } else {
                            LayerRef::Second
                        },
                        activation: fused.then_some(model.activation()),
                        input,
                        output,
                    }
                }
                OpKind::Activation => match input {
                    Source::Arena(region) if region == output => {
                        Instruction::ActivationInPlace { region }
                    }
                    _ => Instruction::ActivationCopy { input, output },
                },
            }
        })
        .collect()
}
