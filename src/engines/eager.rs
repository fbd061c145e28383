//! Baseline engine: one fresh buffer per operation, nothing reused.

use std::borrow::Cow;
use std::sync::Arc;

use crate::buffer_plan::{Pipeline, TensorDescriptor};
use crate::errors::ShapeResult;
use crate::kernels;
use crate::model_spec::ModelSpec;
use crate::tensor::{Batch, checked_elements};

use super::{AllocationLog, ExecutionStrategy, MemoryFootprint};

pub struct EagerEngine {
    model: Arc<ModelSpec>,
    /// Per-row pipeline; ordinals and lifetimes do not depend on the batch.
    pipeline: Pipeline,
    log: AllocationLog,
}

impl EagerEngine {
    pub fn new(model: Arc<ModelSpec>) -> ShapeResult<Self> {
        let pipeline = Pipeline::analyze(model.dims(), 1)?;
        Ok(Self {
            model,
            pipeline,
            log: AllocationLog::new(),
        })
    }

    pub fn model(&self) -> &ModelSpec {
        &self.model
    }

    /// Allocations of the most recent run; empty before the first one.
    pub fn allocation_log(&self) -> &AllocationLog {
        &self.log
    }

    /// Runs the network, allocating a new vector for each operation.
    ///
    /// Every vector is dropped right after the last operation reading it, and
    /// the output is released at the sink ordinal of the pipeline.
    pub fn run(&mut self, input: &Batch) -> ShapeResult<Vec<f32>> {
        input.validate_for(self.model.input_dim())?;
        let rows = input.rows();
        let activation = self.model.activation();
        let [pre, hidden, out] = match self.pipeline.tensors() {
            [pre, hidden, out] => [pre, hidden, out],
            tensors => unreachable!("pipeline has {} tensors", tensors.len()),
        };
        let pre_len = batch_len(pre, rows)?;
        let hidden_len = batch_len(hidden, rows)?;
        let out_len = batch_len(out, rows)?;
        self.log.clear();

        let mut pre_activation = vec![0.0f32; pre_len];
        let pre_event = self
            .log
            .record_alloc(pre.lifetime.first, pre.name, byte_len(&pre_activation));
        kernels::affine_into(self.model.layer1(), input.as_slice(), &mut pre_activation);

        let mut activated = vec![0.0f32; hidden_len];
        let activated_event = self
            .log
            .record_alloc(hidden.lifetime.first, hidden.name, byte_len(&activated));
        activation.apply_into(&pre_activation, &mut activated);
        drop(pre_activation);
        self.log.record_release(pre_event, pre.lifetime.last);

        let mut output = vec![0.0f32; out_len];
        let output_event = self
            .log
            .record_alloc(out.lifetime.first, out.name, byte_len(&output));
        kernels::affine_into(self.model.layer2(), &activated, &mut output);
        drop(activated);
        self.log.record_release(activated_event, hidden.lifetime.last);
        self.log.record_release(output_event, out.lifetime.last);

        Ok(output)
    }
}

impl ExecutionStrategy for EagerEngine {
    fn name(&self) -> &'static str {
        "baseline"
    }

    fn execute(&mut self, input: &Batch) -> ShapeResult<Cow<'_, [f32]>> {
        self.run(input).map(Cow::Owned)
    }

    fn memory_footprint(&self) -> MemoryFootprint {
        MemoryFootprint {
            peak_bytes: self.log.peak_bytes(),
            allocated_bytes: self.log.total_bytes(),
            buffers: self.log.len(),
        }
    }

    fn allocation_events(&self) -> usize {
        self.log.len()
    }
}

/// Length of `tensor` for a batch of `rows`.
fn batch_len(tensor: &TensorDescriptor, rows: usize) -> ShapeResult<usize> {
    checked_elements(tensor.name, rows, tensor.shape[1])
}

fn byte_len(values: &[f32]) -> usize {
    std::mem::size_of_val(values)
}
