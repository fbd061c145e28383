//! Static description of the fixed three-operation pipeline.
//!
//! The pipeline is a tiny computation graph stored as two arenas indexed by
//! creation order: operations and the tensors they produce. Producer and
//! consumer links are plain indices computed once by [`Pipeline::analyze`].

use serde::Serialize;

use crate::errors::ShapeResult;
use crate::model_spec::ModelDims;
use crate::tensor::checked_elements;

/// Index of a tensor descriptor in creation order.
pub type TensorId = usize;

pub const HIDDEN_PRE_ACTIVATION: &str = "hidden_pre_activation";
pub const HIDDEN_ACTIVATED: &str = "hidden_activated";
pub const OUTPUT: &str = "output";

/// The three logical operations of the network.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum OpKind {
    /// `input · W1 + b1`
    Affine1,
    /// Elementwise nonlinearity on the hidden layer.
    Activation,
    /// `hidden · W2 + b2`
    Affine2,
}

impl OpKind {
    /// Elementwise operations may overwrite their input while reading it.
    pub fn is_elementwise(self) -> bool {
        matches!(self, OpKind::Activation)
    }

    pub fn label(self) -> &'static str {
        match self {
            OpKind::Affine1 => "affine1",
            OpKind::Activation => "activation",
            OpKind::Affine2 => "affine2",
        }
    }
}

/// What an operation reads.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operand {
    /// The caller-owned input batch, never planned.
    Input,
    Tensor(TensorId),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OpDescriptor {
    pub ordinal: usize,
    pub kind: OpKind,
    pub reads: Operand,
    pub writes: TensorId,
}

/// Inclusive range of operation ordinals during which a tensor is live.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Lifetime {
    pub first: usize,
    pub last: usize,
}

impl Lifetime {
    pub fn new(first: usize, last: usize) -> Self {
        debug_assert!(first <= last);
        Self { first, last }
    }

    /// Two tensors overlap when some operation sees both of them live.
    pub fn overlaps(&self, other: &Lifetime) -> bool {
        self.first <= other.last && other.first <= self.last
    }

    pub fn union(&self, other: &Lifetime) -> Lifetime {
        Lifetime::new(self.first.min(other.first), self.last.max(other.last))
    }
}

/// A logical tensor produced by one operation of the pipeline.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TensorDescriptor {
    pub id: TensorId,
    pub name: &'static str,
    pub shape: [usize; 2],
    pub lifetime: Lifetime,
}

impl TensorDescriptor {
    pub fn elements(&self) -> usize {
        self.shape[0] * self.shape[1]
    }

    pub fn bytes(&self) -> usize {
        self.elements() * std::mem::size_of::<f32>()
    }
}

/// Operations and tensor descriptors of the network for one batch size.
#[derive(Debug, Clone)]
pub struct Pipeline {
    ops: Vec<OpDescriptor>,
    tensors: Vec<TensorDescriptor>,
}

impl Pipeline {
    /// Derives operations, tensors and lifetimes in a single forward pass.
    ///
    /// A tensor is live from the operation producing it through the last
    /// operation reading it. Tensors nobody reads are graph outputs and stay
    /// live until the virtual sink at ordinal `ops.len()`.
    ///
    /// Fails when a tensor would exceed [`MAX_TENSOR_ELEMENTS`], so every
    /// descriptor of a built pipeline has a representable size.
    ///
    /// [`MAX_TENSOR_ELEMENTS`]: crate::tensor::MAX_TENSOR_ELEMENTS
    pub fn analyze(dims: ModelDims, batch_size: usize) -> ShapeResult<Self> {
        let layout = [
            (OpKind::Affine1, HIDDEN_PRE_ACTIVATION, dims.hidden_dim),
            (OpKind::Activation, HIDDEN_ACTIVATED, dims.hidden_dim),
            (OpKind::Affine2, OUTPUT, dims.output_dim),
        ];

        let mut ops = Vec::with_capacity(layout.len());
        let mut tensors = Vec::with_capacity(layout.len());
        let mut previous = Operand::Input;

        for (ordinal, (kind, name, features)) in layout.into_iter().enumerate() {
            checked_elements(name, batch_size, features)?;
            let id = tensors.len();
            ops.push(OpDescriptor {
                ordinal,
                kind,
                reads: previous,
                writes: id,
            });
            tensors.push(TensorDescriptor {
                id,
                name,
                shape: [batch_size, features],
                lifetime: Lifetime::new(ordinal, ordinal),
            });
            previous = Operand::Tensor(id);
        }

        let sink = ops.len();
        for tensor in tensors.iter_mut() {
            let last_reader = ops
                .iter()
                .filter(|op| op.reads == Operand::Tensor(tensor.id))
                .map(|op| op.ordinal)
                .max();
            tensor.lifetime.last = last_reader.unwrap_or(sink);
        }

        Ok(Self { ops, tensors })
    }

    pub fn ops(&self) -> &[OpDescriptor] {
        &self.ops
    }

    pub fn tensors(&self) -> &[TensorDescriptor] {
        &self.tensors
    }

    pub fn tensor(&self, id: TensorId) -> &TensorDescriptor {
        &self.tensors[id]
    }

    /// Ordinal of the virtual operation that consumes graph outputs.
    pub fn sink_ordinal(&self) -> usize {
        self.ops.len()
    }

    /// Ordinal of the operation writing `id`.
    pub fn producer(&self, id: TensorId) -> usize {
        self.ops
            .iter()
            .position(|op| op.writes == id)
            .unwrap_or(self.sink_ordinal())
    }

    /// Ordinals of the operations reading `id`, in execution order.
    pub fn readers(&self, id: TensorId) -> impl Iterator<Item = usize> + '_ {
        self.ops
            .iter()
            .filter(move |op| op.reads == Operand::Tensor(id))
            .map(|op| op.ordinal)
    }

    /// Id of the final graph output.
    pub fn output(&self) -> TensorId {
        self.ops[self.ops.len() - 1].writes
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lifetimes() {
        let pipeline = Pipeline::analyze(ModelDims::new(4, 8, 2), 3).unwrap();
        let lifetimes: Vec<_> = pipeline.tensors().iter().map(|t| t.lifetime).collect();

        assert_eq!(
            lifetimes,
            vec![Lifetime::new(0, 1), Lifetime::new(1, 2), Lifetime::new(2, 3)]
        );
        assert_eq!(pipeline.tensor(0).name, HIDDEN_PRE_ACTIVATION);
        assert_eq!(pipeline.tensor(2).shape, [3, 2]);
        assert_eq!(pipeline.output(), 2);
        assert_eq!(pipeline.producer(1), 1);
        assert_eq!(pipeline.readers(0).collect::<Vec<_>>(), vec![1]);
        assert_eq!(pipeline.readers(2).count(), 0);
    }

    #[test]
    fn test_oversized_tensor_is_rejected() {
        let result = Pipeline::analyze(ModelDims::new(1, usize::MAX / 2, 1), 4);
        assert!(matches!(
            result,
            Err(crate::errors::ShapeError::TensorTooLarge {
                tensor: HIDDEN_PRE_ACTIVATION,
                rows: 4,
                ..
            })
        ));
    }

    #[test]
    fn test_overlap_is_inclusive() {
        let a = Lifetime::new(0, 1);
        assert!(a.overlaps(&Lifetime::new(1, 2)));
        assert!(!a.overlaps(&Lifetime::new(2, 3)));
        assert_eq!(a.union(&Lifetime::new(1, 2)), Lifetime::new(0, 2));
    }
}
