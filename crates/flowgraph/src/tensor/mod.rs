//! Symbolic tensor values and their metadata.
//!
//! A [`Tensor`] is a value node in a flow graph: shape/dtype metadata plus a
//! provenance record naming where the value comes from (a graph input, an
//! embedded constant, or an output slot of a producing operator). Tensors are
//! immutable once created and shared by cheap `Arc` handles; the producer
//! back-reference is held by identifier rather than by ownership so graphs
//! stay free of reference cycles.

mod dtype;
mod shape;

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use serde::{ser::SerializeStruct, Deserialize, Serialize};

pub use dtype::DType;
pub use shape::{DimSymbol, Dimension, Shape};

use crate::graph::OpId;

/// Tensor metadata coupling dtype and shape.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TensorSpec {
    pub dtype: DType,
    pub shape: Shape,
}

impl TensorSpec {
    pub fn new(dtype: DType, shape: Shape) -> Self {
        Self { dtype, shape }
    }

    /// Returns total element count when the shape is fully static.
    pub fn element_count(&self) -> Option<usize> {
        self.shape.element_count()
    }

    /// Returns total byte length when the shape is static.
    pub fn byte_len(&self) -> Option<usize> {
        let elem_count = self.element_count()?;
        elem_count.checked_mul(self.dtype.size_in_bytes())
    }
}

impl fmt::Display for TensorSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "tensor<{}, {}>", self.dtype, self.shape)
    }
}

/// Dense constant payload embedded directly into a graph.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TensorLiteral {
    pub spec: TensorSpec,
    pub bytes: Arc<[u8]>,
}

impl TensorLiteral {
    /// Wraps raw bytes; callers are responsible for matching `spec.byte_len()`.
    pub fn new(spec: TensorSpec, bytes: Arc<[u8]>) -> Self {
        Self { spec, bytes }
    }

    /// Builds an `F32` literal from host values.
    pub fn from_f32(shape: Shape, values: &[f32]) -> Self {
        let mut bytes = Vec::with_capacity(values.len() * 4);
        for value in values {
            bytes.extend_from_slice(&value.to_le_bytes());
        }
        Self {
            spec: TensorSpec::new(DType::F32, shape),
            bytes: Arc::<[u8]>::from(bytes),
        }
    }

    /// Builds an `I64` literal from host values.
    pub fn from_i64(shape: Shape, values: &[i64]) -> Self {
        let mut bytes = Vec::with_capacity(values.len() * 8);
        for value in values {
            bytes.extend_from_slice(&value.to_le_bytes());
        }
        Self {
            spec: TensorSpec::new(DType::I64, shape),
            bytes: Arc::<[u8]>::from(bytes),
        }
    }

    pub fn byte_len(&self) -> usize {
        self.bytes.len()
    }
}

impl Serialize for TensorLiteral {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        let mut state = serializer.serialize_struct("TensorLiteral", 2)?;
        state.serialize_field("spec", &self.spec)?;
        state.serialize_field("bytes", &self.bytes.as_ref())?;
        state.end()
    }
}

impl<'de> Deserialize<'de> for TensorLiteral {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        #[derive(Deserialize)]
        struct TensorLiteralHelper {
            spec: TensorSpec,
            bytes: Vec<u8>,
        }

        let helper = TensorLiteralHelper::deserialize(deserializer)?;
        Ok(TensorLiteral {
            spec: helper.spec,
            bytes: Arc::<[u8]>::from(helper.bytes),
        })
    }
}

/// Process-unique identity for a tensor node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TensorId(pub u64);

static NEXT_TENSOR_ID: AtomicU64 = AtomicU64::new(0);

impl TensorId {
    pub(crate) fn fresh() -> Self {
        TensorId(NEXT_TENSOR_ID.fetch_add(1, Ordering::Relaxed))
    }
}

/// Records where a tensor value comes from. Exactly one variant applies.
#[derive(Debug, Clone, PartialEq)]
pub enum Provenance {
    /// Formal graph parameter at the given position of the input list.
    Input { index: usize },
    /// Constant with its payload embedded in the graph.
    Constant(TensorLiteral),
    /// Output slot `index` of the operator identified by `op`.
    Produced { op: OpId, index: usize },
}

impl Provenance {
    /// Returns `true` for graph inputs and constants.
    pub fn is_source(&self) -> bool {
        !matches!(self, Provenance::Produced { .. })
    }
}

#[derive(Debug)]
pub(crate) struct TensorNode {
    pub(crate) id: TensorId,
    pub(crate) spec: TensorSpec,
    pub(crate) name: Option<Arc<str>>,
    pub(crate) provenance: Provenance,
}

/// Symbolic value handle shared between a graph and its consumers.
///
/// Cloning is cheap; equality compares node identity, not value.
#[derive(Debug, Clone)]
pub struct Tensor(Arc<TensorNode>);

impl Tensor {
    pub(crate) fn input(index: usize, spec: TensorSpec, name: Option<Arc<str>>) -> Self {
        Tensor(Arc::new(TensorNode {
            id: TensorId::fresh(),
            spec,
            name,
            provenance: Provenance::Input { index },
        }))
    }

    pub(crate) fn constant(literal: TensorLiteral, name: Option<Arc<str>>) -> Self {
        Tensor(Arc::new(TensorNode {
            id: TensorId::fresh(),
            spec: literal.spec.clone(),
            name,
            provenance: Provenance::Constant(literal),
        }))
    }

    pub(crate) fn produced(op: OpId, index: usize, spec: TensorSpec, name: Option<Arc<str>>) -> Self {
        Tensor(Arc::new(TensorNode {
            id: TensorId::fresh(),
            spec,
            name,
            provenance: Provenance::Produced { op, index },
        }))
    }

    /// Rebuilds an output tensor record for a relinked operator, preserving
    /// the tensor's identity and metadata.
    pub(crate) fn reproduced(&self, op: OpId, index: usize) -> Self {
        Tensor(Arc::new(TensorNode {
            id: self.id(),
            spec: self.spec().clone(),
            name: self.0.name.clone(),
            provenance: Provenance::Produced { op, index },
        }))
    }

    pub fn id(&self) -> TensorId {
        self.0.id
    }

    pub fn spec(&self) -> &TensorSpec {
        &self.0.spec
    }

    pub fn dtype(&self) -> DType {
        self.0.spec.dtype
    }

    pub fn shape(&self) -> &Shape {
        &self.0.spec.shape
    }

    pub fn name(&self) -> Option<&str> {
        self.0.name.as_deref()
    }

    pub fn provenance(&self) -> &Provenance {
        &self.0.provenance
    }

    /// Returns `true` when the tensor is a graph input or constant.
    pub fn is_source(&self) -> bool {
        self.0.provenance.is_source()
    }

    /// Returns the producing operator id and output slot, when any.
    pub fn producer(&self) -> Option<(OpId, usize)> {
        match &self.0.provenance {
            Provenance::Produced { op, index } => Some((*op, *index)),
            _ => None,
        }
    }
}

impl PartialEq for Tensor {
    fn eq(&self, other: &Self) -> bool {
        self.id() == other.id()
    }
}

impl Eq for Tensor {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn literal_from_f32_records_byte_payload() {
        let literal = TensorLiteral::from_f32(Shape::from_static([2]), &[1.0, -2.0]);
        assert_eq!(literal.byte_len(), 8);
        assert_eq!(literal.spec.byte_len(), Some(8));
        assert_eq!(&literal.bytes[..4], &1.0f32.to_le_bytes());
    }

    #[test]
    fn tensor_equality_is_identity() {
        let spec = TensorSpec::new(DType::F32, Shape::from_static([2]));
        let a = Tensor::input(0, spec.clone(), None);
        let b = Tensor::input(0, spec, None);
        assert_ne!(a, b);
        assert_eq!(a, a.clone());
    }
}
