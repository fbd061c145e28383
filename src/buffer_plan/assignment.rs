//! Fusion detection and greedy interval-based buffer assignment.

use log::debug;
use serde::Serialize;

use super::pipeline::{Lifetime, Pipeline, TensorId};

/// Index of a physical buffer in allocation order.
pub type BufferId = usize;

/// A producer/consumer pair whose intermediate is never materialized.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Fusion {
    pub producer_op: usize,
    pub consumer_op: usize,
    /// Tensor written by the producer and read only by the consumer.
    pub intermediate: TensorId,
    /// Tensor written by the consumer, whose storage the intermediate borrows.
    pub into: TensorId,
}

/// Where a tensor lives during a planned run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Placement {
    /// Materialized in a physical buffer.
    Buffer(BufferId),
    /// Computed directly into the storage of another tensor.
    FusedInto(TensorId),
}

/// A block of the planned arena.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PhysicalBuffer {
    pub id: BufferId,
    /// Capacity in `f32` elements, the largest tenant's size.
    pub elements: usize,
    /// Element offset of the buffer inside the arena.
    pub offset: usize,
    /// Materialized tensors hosted by this buffer, in assignment order.
    pub tenants: Vec<TensorId>,
    #[serde(skip)]
    busy_until: usize,
}

impl PhysicalBuffer {
    pub fn bytes(&self) -> usize {
        self.elements * std::mem::size_of::<f32>()
    }

    pub fn range(&self) -> std::ops::Range<usize> {
        self.offset..self.offset + self.elements
    }

    fn is_free_at(&self, ordinal: usize) -> bool {
        self.busy_until < ordinal
    }
}

/// Finds tensors produced by one operation and read only by the next one,
/// when that next operation is elementwise over a same-shaped result.
pub(crate) fn detect_fusions(pipeline: &Pipeline) -> Vec<Fusion> {
    let ops = pipeline.ops();
    let mut fusions = Vec::new();

    for tensor in pipeline.tensors() {
        let producer_op = pipeline.producer(tensor.id);
        let readers: Vec<usize> = pipeline.readers(tensor.id).collect();
        let [consumer_op] = readers.as_slice() else {
            continue;
        };
        let consumer_op = *consumer_op;
        if consumer_op != producer_op + 1 || !ops[consumer_op].kind.is_elementwise() {
            continue;
        }
        let into = ops[consumer_op].writes;
        if pipeline.tensor(into).shape != tensor.shape {
            continue;
        }

        debug!(
            "Fusing {} into {} ({} + {})",
            tensor.name,
            pipeline.tensor(into).name,
            ops[producer_op].kind.label(),
            ops[consumer_op].kind.label()
        );
        fusions.push(Fusion {
            producer_op,
            consumer_op,
            intermediate: tensor.id,
            into,
        });
    }

    fusions
}

/// Follows fusion links to the tensor that actually owns storage.
pub(crate) fn storage_owner(fusions: &[Fusion], mut id: TensorId) -> TensorId {
    while let Some(fusion) = fusions.iter().find(|f| f.intermediate == id) {
        id = fusion.into;
    }
    id
}

/// Places every tensor: fused intermediates borrow their consumer's storage,
/// the others are assigned to a physical buffer.
///
/// Tensors are visited in creation order. A buffer is eligible when every
/// tensor it already hosts is dead before the new tensor's storage becomes
/// live. Among eligible buffers the smallest sufficient one wins, then the
/// lowest id; if none is large enough the largest eligible buffer is grown;
/// otherwise a new buffer is appended.
pub(crate) fn assign_buffers(
    pipeline: &Pipeline,
    fusions: &[Fusion],
) -> (Vec<Placement>, Vec<PhysicalBuffer>) {
    let tensors = pipeline.tensors();
    let mut placements = Vec::with_capacity(tensors.len());
    let mut buffers: Vec<PhysicalBuffer> = Vec::new();

    for tensor in tensors {
        debug_assert_eq!(placements.len(), tensor.id);
        if let Some(fusion) = fusions.iter().find(|f| f.intermediate == tensor.id) {
            placements.push(Placement::FusedInto(fusion.into));
            continue;
        }

        let (storage, elements) = tensors
            .iter()
            .filter(|t| storage_owner(fusions, t.id) == tensor.id)
            .fold((tensor.lifetime, tensor.elements()), |(life, size), t| {
                (life.union(&t.lifetime), size.max(t.elements()))
            });

        let buffer_id = choose_buffer(&buffers, storage, elements).unwrap_or_else(|| {
            buffers.push(PhysicalBuffer {
                id: buffers.len(),
                elements,
                offset: 0,
                tenants: Vec::new(),
                busy_until: 0,
            });
            buffers.len() - 1
        });

        let buffer = &mut buffers[buffer_id];
        buffer.elements = buffer.elements.max(elements);
        buffer.busy_until = buffer.busy_until.max(storage.last);
        buffer.tenants.push(tensor.id);
        placements.push(Placement::Buffer(buffer_id));

        debug!(
            "Assigned {} (live {}..={}, {} elements) to buffer {}",
            tensor.name, storage.first, storage.last, elements, buffer_id
        );
    }

    let mut offset = 0;
    for buffer in buffers.iter_mut() {
        buffer.offset = offset;
        offset += buffer.elements;
    }

    (placements, buffers)
}

fn choose_buffer(
    buffers: &[PhysicalBuffer],
    storage: Lifetime,
    elements: usize,
) -> Option<BufferId> {
    let eligible = || buffers.iter().filter(|b| b.is_free_at(storage.first));

    eligible()
        .filter(|b| b.elements >= elements)
        .min_by_key(|b| (b.elements, b.id))
        .or_else(|| eligible().max_by_key(|b| (b.elements, std::cmp::Reverse(b.id))))
        .map(|b| b.id)
}
