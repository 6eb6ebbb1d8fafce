//! Operator-kind registry: the seam between the graph core and the kernel
//! collaborators behind it.
//!
//! Each registered kind carries a shape/dtype inference rule, invoked while
//! tracing (and while building replacement operators during rewrites), plus
//! an opaque execution descriptor consumed by whichever backend compiles the
//! finished graph. The core never interprets the descriptor; it only resolves
//! kinds and propagates inference failures.

use std::any::Any;
use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use once_cell::sync::Lazy;
use thiserror::Error;

use crate::graph::{AttrMap, OpKind};
use crate::tensor::{DType, Dimension, Shape, TensorSpec};

/// Inference rejection produced by an [`OpSchema`] rule.
#[derive(Debug, Clone, PartialEq, Error)]
#[error("{message}")]
pub struct InferenceError {
    pub message: String,
}

impl InferenceError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

/// Shape/dtype inference rule signature: input descriptors and attributes in,
/// output descriptors out.
pub type InferFn =
    dyn Fn(&[TensorSpec], &AttrMap) -> Result<Vec<TensorSpec>, InferenceError> + Send + Sync;

/// Everything the core knows about one operator kind.
pub struct OpSchema {
    kind: OpKind,
    infer: Arc<InferFn>,
    descriptor: Option<Arc<dyn Any + Send + Sync>>,
}

impl OpSchema {
    pub fn new<F>(kind: impl Into<OpKind>, infer: F) -> Self
    where
        F: Fn(&[TensorSpec], &AttrMap) -> Result<Vec<TensorSpec>, InferenceError>
            + Send
            + Sync
            + 'static,
    {
        Self {
            kind: kind.into(),
            infer: Arc::new(infer),
            descriptor: None,
        }
    }

    /// Attaches the opaque execution payload handed to backends.
    pub fn with_descriptor(mut self, descriptor: Arc<dyn Any + Send + Sync>) -> Self {
        self.descriptor = Some(descriptor);
        self
    }

    pub fn kind(&self) -> &OpKind {
        &self.kind
    }

    /// Runs the inference rule for one operator invocation.
    pub fn infer(
        &self,
        inputs: &[TensorSpec],
        attrs: &AttrMap,
    ) -> Result<Vec<TensorSpec>, InferenceError> {
        (self.infer)(inputs, attrs)
    }

    /// Downcasts the execution descriptor to a concrete collaborator type.
    pub fn descriptor<T: 'static>(&self) -> Option<&T> {
        self.descriptor.as_deref()?.downcast_ref::<T>()
    }
}

/// Registry mapping kind tags to schemas. Kinds can be registered from any
/// crate; the graph core only reads.
pub struct OpRegistry {
    schemas: RwLock<HashMap<String, Arc<OpSchema>>>,
}

static GLOBAL_REGISTRY: Lazy<OpRegistry> = Lazy::new(OpRegistry::with_builtins);

impl OpRegistry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self {
            schemas: RwLock::new(HashMap::new()),
        }
    }

    /// Creates a registry pre-populated with the builtin schemas.
    pub fn with_builtins() -> Self {
        let registry = Self::new();
        register_builtins(&registry);
        registry
    }

    /// Returns the process-wide registry used by tracing and rewriting.
    pub fn global() -> &'static OpRegistry {
        &GLOBAL_REGISTRY
    }

    /// Registers a schema, returning the schema it replaced, if any.
    pub fn register(&self, schema: OpSchema) -> Option<Arc<OpSchema>> {
        let mut schemas = self.schemas.write().expect("op registry poisoned");
        schemas.insert(schema.kind().as_str().to_string(), Arc::new(schema))
    }

    pub fn lookup(&self, kind: &str) -> Option<Arc<OpSchema>> {
        let schemas = self.schemas.read().expect("op registry poisoned");
        schemas.get(kind).cloned()
    }

    /// Registered kind names in sorted order.
    pub fn kinds(&self) -> Vec<String> {
        let schemas = self.schemas.read().expect("op registry poisoned");
        let mut kinds: Vec<String> = schemas.keys().cloned().collect();
        kinds.sort();
        kinds
    }
}

impl Default for OpRegistry {
    fn default() -> Self {
        Self::new()
    }
}

fn expect_arity(inputs: &[TensorSpec], expected: usize) -> Result<(), InferenceError> {
    if inputs.len() != expected {
        return Err(InferenceError::new(format!(
            "expected {expected} inputs, got {}",
            inputs.len()
        )));
    }
    Ok(())
}

fn same_dtype(a: &TensorSpec, b: &TensorSpec) -> Result<DType, InferenceError> {
    if a.dtype != b.dtype {
        return Err(InferenceError::new(format!(
            "dtype mismatch: {} vs {}",
            a.dtype, b.dtype
        )));
    }
    Ok(a.dtype)
}

/// Multidirectional broadcast over two shapes: axes align from the right, a
/// static 1 broadcasts, and symbolic dims unify only with themselves or 1.
fn broadcast_shapes(a: &Shape, b: &Shape) -> Result<Shape, InferenceError> {
    let rank = a.rank().max(b.rank());
    let mut dims = Vec::with_capacity(rank);
    for axis in 0..rank {
        let left = if axis + a.rank() >= rank {
            Some(&a.dims()[axis + a.rank() - rank])
        } else {
            None
        };
        let right = if axis + b.rank() >= rank {
            Some(&b.dims()[axis + b.rank() - rank])
        } else {
            None
        };
        let dim = match (left, right) {
            (Some(l), None) => l.clone(),
            (None, Some(r)) => r.clone(),
            (Some(l), Some(r)) => broadcast_dim(l, r)?,
            (None, None) => unreachable!("axis below combined rank"),
        };
        dims.push(dim);
    }
    Ok(Shape::new(dims))
}

fn broadcast_dim(a: &Dimension, b: &Dimension) -> Result<Dimension, InferenceError> {
    match (a, b) {
        (Dimension::Static(1), other) | (other, Dimension::Static(1)) => Ok(other.clone()),
        (left, right) if left == right => Ok(left.clone()),
        (left, right) => Err(InferenceError::new(format!(
            "cannot broadcast {left} against {right}"
        ))),
    }
}

fn unary_same_spec(inputs: &[TensorSpec], _attrs: &AttrMap) -> Result<Vec<TensorSpec>, InferenceError> {
    expect_arity(inputs, 1)?;
    Ok(vec![inputs[0].clone()])
}

fn unary_float_same_spec(
    inputs: &[TensorSpec],
    attrs: &AttrMap,
) -> Result<Vec<TensorSpec>, InferenceError> {
    expect_arity(inputs, 1)?;
    if !inputs[0].dtype.is_float() {
        return Err(InferenceError::new(format!(
            "expected a float dtype, got {}",
            inputs[0].dtype
        )));
    }
    unary_same_spec(inputs, attrs)
}

fn binary_broadcast(
    inputs: &[TensorSpec],
    _attrs: &AttrMap,
) -> Result<Vec<TensorSpec>, InferenceError> {
    expect_arity(inputs, 2)?;
    let dtype = same_dtype(&inputs[0], &inputs[1])?;
    let shape = broadcast_shapes(&inputs[0].shape, &inputs[1].shape)?;
    Ok(vec![TensorSpec::new(dtype, shape)])
}

/// Batched matrix product: `[..., m, k] x [..., k, n] -> [..., m, n]` with
/// broadcasting over the leading batch dims.
fn matmul_infer(inputs: &[TensorSpec], _attrs: &AttrMap) -> Result<Vec<TensorSpec>, InferenceError> {
    expect_arity(inputs, 2)?;
    let dtype = same_dtype(&inputs[0], &inputs[1])?;
    let a = &inputs[0].shape;
    let b = &inputs[1].shape;
    if a.rank() < 2 || b.rank() < 2 {
        return Err(InferenceError::new(format!(
            "matmul operands must have rank >= 2, got {} and {}",
            a.rank(),
            b.rank()
        )));
    }
    let (m, k_left) = (&a.dims()[a.rank() - 2], &a.dims()[a.rank() - 1]);
    let (k_right, n) = (&b.dims()[b.rank() - 2], &b.dims()[b.rank() - 1]);
    if k_left != k_right {
        return Err(InferenceError::new(format!(
            "contraction dims disagree: {k_left} vs {k_right}"
        )));
    }
    let batch_left = Shape::new(a.dims()[..a.rank() - 2].to_vec());
    let batch_right = Shape::new(b.dims()[..b.rank() - 2].to_vec());
    let batch = broadcast_shapes(&batch_left, &batch_right)?;
    let mut dims = batch.into_dims();
    dims.push(m.clone());
    dims.push(n.clone());
    Ok(vec![TensorSpec::new(dtype, Shape::new(dims))])
}

/// Reshape with explicit extents; one `-1` entry is inferred from the
/// element count. Requires a fully static input shape.
fn reshape_infer(inputs: &[TensorSpec], attrs: &AttrMap) -> Result<Vec<TensorSpec>, InferenceError> {
    expect_arity(inputs, 1)?;
    let requested = attrs
        .get("shape")
        .and_then(|value| value.as_i64_array())
        .ok_or_else(|| InferenceError::new("reshape requires an i64-array `shape` attribute"))?;
    let element_count = inputs[0]
        .shape
        .element_count()
        .ok_or_else(|| InferenceError::new("reshape requires a fully static input shape"))?;

    let mut known = 1usize;
    let mut infer_axis = None;
    let mut dims = Vec::with_capacity(requested.len());
    for (axis, &extent) in requested.iter().enumerate() {
        if extent == -1 {
            if infer_axis.is_some() {
                return Err(InferenceError::new("reshape allows at most one -1 extent"));
            }
            infer_axis = Some(axis);
            dims.push(0usize);
        } else if extent < 0 {
            return Err(InferenceError::new(format!(
                "reshape extent {extent} is negative"
            )));
        } else {
            let extent = extent as usize;
            known = known.checked_mul(extent).ok_or_else(|| {
                InferenceError::new("reshape element count overflows")
            })?;
            dims.push(extent);
        }
    }

    if let Some(axis) = infer_axis {
        if known == 0 || element_count % known != 0 {
            return Err(InferenceError::new(format!(
                "cannot infer -1 extent: {element_count} elements over known product {known}"
            )));
        }
        dims[axis] = element_count / known;
    } else if known != element_count {
        return Err(InferenceError::new(format!(
            "reshape changes element count: {element_count} -> {known}"
        )));
    }

    Ok(vec![TensorSpec::new(
        inputs[0].dtype,
        Shape::from_static(dims),
    )])
}

fn transpose_infer(
    inputs: &[TensorSpec],
    attrs: &AttrMap,
) -> Result<Vec<TensorSpec>, InferenceError> {
    expect_arity(inputs, 1)?;
    let perm = attrs
        .get("perm")
        .and_then(|value| value.as_i64_array())
        .ok_or_else(|| InferenceError::new("transpose requires an i64-array `perm` attribute"))?;
    let rank = inputs[0].shape.rank();
    if perm.len() != rank {
        return Err(InferenceError::new(format!(
            "perm has {} entries for rank {rank}",
            perm.len()
        )));
    }
    let mut seen = vec![false; rank];
    let mut dims = Vec::with_capacity(rank);
    for &axis in perm {
        let axis = usize::try_from(axis)
            .ok()
            .filter(|axis| *axis < rank)
            .ok_or_else(|| InferenceError::new(format!("perm entry {axis} out of range")))?;
        if seen[axis] {
            return Err(InferenceError::new(format!("perm repeats axis {axis}")));
        }
        seen[axis] = true;
        dims.push(inputs[0].shape.dims()[axis].clone());
    }
    Ok(vec![TensorSpec::new(inputs[0].dtype, Shape::new(dims))])
}

fn concat_infer(inputs: &[TensorSpec], attrs: &AttrMap) -> Result<Vec<TensorSpec>, InferenceError> {
    if inputs.is_empty() {
        return Err(InferenceError::new("concat requires at least one input"));
    }
    let axis = attrs
        .get("axis")
        .and_then(|value| value.as_i64())
        .ok_or_else(|| InferenceError::new("concat requires an i64 `axis` attribute"))?;
    let rank = inputs[0].shape.rank();
    let axis = usize::try_from(axis)
        .ok()
        .filter(|axis| *axis < rank)
        .ok_or_else(|| InferenceError::new(format!("concat axis {axis} out of range")))?;

    let mut total = 0usize;
    for spec in inputs {
        same_dtype(&inputs[0], spec)?;
        if spec.shape.rank() != rank {
            return Err(InferenceError::new(format!(
                "concat rank mismatch: {} vs {rank}",
                spec.shape.rank()
            )));
        }
        for (current_axis, (left, right)) in inputs[0]
            .shape
            .dims()
            .iter()
            .zip(spec.shape.dims())
            .enumerate()
        {
            if current_axis == axis {
                continue;
            }
            if left != right {
                return Err(InferenceError::new(format!(
                    "concat dim mismatch on axis {current_axis}: {left} vs {right}"
                )));
            }
        }
        let extent = spec.shape.dims()[axis]
            .as_static()
            .ok_or_else(|| InferenceError::new("concat axis must be static"))?;
        total += extent;
    }

    let mut dims = inputs[0].shape.dims().to_vec();
    dims[axis] = Dimension::Static(total);
    Ok(vec![TensorSpec::new(inputs[0].dtype, Shape::new(dims))])
}

fn register_builtins(registry: &OpRegistry) {
    registry.register(OpSchema::new("identity", unary_same_spec));
    registry.register(OpSchema::new("neg", unary_same_spec));
    registry.register(OpSchema::new("relu", unary_float_same_spec));
    registry.register(OpSchema::new("exp", unary_float_same_spec));
    for kind in ["add", "sub", "mul", "div", "maximum"] {
        registry.register(OpSchema::new(kind, binary_broadcast));
    }
    registry.register(OpSchema::new("matmul", matmul_infer));
    registry.register(OpSchema::new("reshape", reshape_infer));
    registry.register(OpSchema::new("transpose", transpose_infer));
    registry.register(OpSchema::new("concat", concat_infer));
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::AttrValue;

    fn f32_spec(dims: &[usize]) -> TensorSpec {
        TensorSpec::new(DType::F32, Shape::from_static(dims.to_vec()))
    }

    #[test]
    fn binary_broadcast_aligns_from_the_right() {
        let out = binary_broadcast(&[f32_spec(&[2, 1, 4]), f32_spec(&[3, 1])], &AttrMap::new())
            .expect("broadcast");
        assert_eq!(out[0].shape, Shape::from_static([2, 3, 4]));
    }

    #[test]
    fn matmul_rejects_contraction_mismatch() {
        let err = matmul_infer(&[f32_spec(&[3, 4]), f32_spec(&[5, 6])], &AttrMap::new())
            .expect_err("mismatched contraction dims");
        assert!(err.message.contains("contraction"));
    }

    #[test]
    fn reshape_infers_single_wildcard() {
        let mut attrs = AttrMap::new();
        attrs.insert("shape".to_string(), AttrValue::I64Array(vec![2, -1]));
        let out = reshape_infer(&[f32_spec(&[3, 4])], &attrs).expect("reshape");
        assert_eq!(out[0].shape, Shape::from_static([2, 6]));
    }

    #[test]
    fn transpose_requires_a_permutation() {
        let mut attrs = AttrMap::new();
        attrs.insert("perm".to_string(), AttrValue::I64Array(vec![0, 0]));
        let err = transpose_infer(&[f32_spec(&[3, 4])], &attrs).expect_err("repeated axis");
        assert!(err.message.contains("repeats"));
    }

    #[test]
    fn global_registry_resolves_builtins() {
        let schema = OpRegistry::global().lookup("matmul").expect("builtin matmul");
        assert!(schema.kind().is("matmul"));
        assert!(OpRegistry::global().lookup("missing-kind").is_none());
    }

    #[test]
    fn descriptor_downcast_recovers_payload() {
        let schema = OpSchema::new("custom", unary_same_spec)
            .with_descriptor(Arc::new("kernel-blob".to_string()));
        assert_eq!(
            schema.descriptor::<String>().map(String::as_str),
            Some("kernel-blob")
        );
        assert!(schema.descriptor::<u32>().is_none());
    }
}
