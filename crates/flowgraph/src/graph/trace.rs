//! Symbolic tracing: building a [`FlowGraph`] by recording operator calls.
//!
//! `trace_from` executes a user computation once against placeholder input
//! tensors, recording every operator construction in call order. All mutable
//! trace state lives in the [`Tracer`] passed to the closure; a thread-local
//! flag only guards against re-entrant tracing. Nothing survives past the
//! `trace_from` call.

use std::cell::Cell;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use crate::error::TraceError;
use crate::graph::{AttrMap, FlowGraph, OpId, OpKind, Operator};
use crate::registry::OpRegistry;
use crate::tensor::{Tensor, TensorId, TensorLiteral, TensorSpec};

thread_local! {
    static TRACE_ACTIVE: Cell<bool> = const { Cell::new(false) };
}

/// RAII marker for the thread's single active trace.
struct ActiveTraceGuard;

impl ActiveTraceGuard {
    fn acquire() -> Result<Self, TraceError> {
        TRACE_ACTIVE.with(|active| {
            if active.get() {
                return Err(TraceError::NestedTrace);
            }
            active.set(true);
            Ok(ActiveTraceGuard)
        })
    }
}

impl Drop for ActiveTraceGuard {
    fn drop(&mut self) {
        TRACE_ACTIVE.with(|active| active.set(false));
    }
}

/// Recording context handed to the traced computation.
///
/// Every operator constructor call lands here: inputs are membership-checked
/// against the trace, output descriptors come from the registry's inference
/// rule, and the operator is appended to the node list in call order.
/// Repeated identical calls intentionally create distinct nodes; collapsing
/// shared computation is a job for rewrite passes, not for tracing.
pub struct Tracer<'r> {
    registry: &'r OpRegistry,
    known: HashSet<TensorId>,
    ops: Vec<Operator>,
}

impl<'r> Tracer<'r> {
    fn new(registry: &'r OpRegistry) -> Self {
        Self {
            registry,
            known: HashSet::new(),
            ops: Vec::new(),
        }
    }

    /// Records one operator invocation and returns its freshly allocated
    /// output tensors.
    pub fn apply(
        &mut self,
        kind: &str,
        inputs: &[Tensor],
        attrs: AttrMap,
    ) -> Result<Vec<Tensor>, TraceError> {
        for tensor in inputs {
            self.check_membership(tensor)?;
        }

        let schema = self
            .registry
            .lookup(kind)
            .ok_or_else(|| TraceError::UnknownOpKind {
                kind: kind.to_string(),
            })?;

        let input_specs: Vec<TensorSpec> =
            inputs.iter().map(|tensor| tensor.spec().clone()).collect();
        let output_specs =
            schema
                .infer(&input_specs, &attrs)
                .map_err(|source| TraceError::ShapeInference {
                    kind: kind.to_string(),
                    source,
                })?;

        let op = Operator::new(OpKind::new(kind), attrs, inputs.to_vec(), output_specs);
        for out in op.outputs() {
            self.known.insert(out.id());
        }
        let outputs = op.outputs().to_vec();
        self.ops.push(op);
        Ok(outputs)
    }

    /// Embeds a constant tensor into the trace.
    pub fn constant(&mut self, literal: TensorLiteral) -> Tensor {
        self.constant_named(literal, None::<&str>)
    }

    /// Embeds a named constant tensor into the trace.
    pub fn constant_named(
        &mut self,
        literal: TensorLiteral,
        name: Option<impl Into<String>>,
    ) -> Tensor {
        let name = name.map(|name| Arc::<str>::from(name.into()));
        let tensor = Tensor::constant(literal, name);
        self.known.insert(tensor.id());
        tensor
    }

    /// Number of operators recorded so far.
    pub fn op_count(&self) -> usize {
        self.ops.len()
    }

    fn check_membership(&self, tensor: &Tensor) -> Result<(), TraceError> {
        if !self.known.contains(&tensor.id()) {
            return Err(TraceError::ForeignTensor {
                tensor: tensor.id(),
            });
        }
        Ok(())
    }
}

/// Traces `f` against placeholder inputs built from `example_inputs` and
/// packages the recorded operators into a [`FlowGraph`].
pub fn trace_from<F>(example_inputs: &[TensorSpec], f: F) -> Result<FlowGraph, TraceError>
where
    F: FnOnce(&mut Tracer<'_>, &[Tensor]) -> Result<Vec<Tensor>, TraceError>,
{
    let placeholders = example_inputs
        .iter()
        .enumerate()
        .map(|(index, spec)| Tensor::input(index, spec.clone(), None))
        .collect();
    trace_placeholders(placeholders, f)
}

/// Like [`trace_from`], with a name attached to each placeholder input.
pub fn trace_from_named<F>(
    example_inputs: &[(&str, TensorSpec)],
    f: F,
) -> Result<FlowGraph, TraceError>
where
    F: FnOnce(&mut Tracer<'_>, &[Tensor]) -> Result<Vec<Tensor>, TraceError>,
{
    let placeholders = example_inputs
        .iter()
        .enumerate()
        .map(|(index, (name, spec))| {
            Tensor::input(index, spec.clone(), Some(Arc::<str>::from(*name)))
        })
        .collect();
    trace_placeholders(placeholders, f)
}

fn trace_placeholders<F>(placeholders: Vec<Tensor>, f: F) -> Result<FlowGraph, TraceError>
where
    F: FnOnce(&mut Tracer<'_>, &[Tensor]) -> Result<Vec<Tensor>, TraceError>,
{
    let _guard = ActiveTraceGuard::acquire()?;

    let mut tracer = Tracer::new(OpRegistry::global());
    for tensor in &placeholders {
        tracer.known.insert(tensor.id());
    }

    let outputs = f(&mut tracer, &placeholders)?;
    for tensor in &outputs {
        tracer.check_membership(tensor)?;
    }

    let candidates: HashMap<OpId, Operator> = tracer
        .ops
        .iter()
        .map(|op| (op.id(), op.clone()))
        .collect();
    let graph = FlowGraph::assemble(placeholders, outputs, &candidates)?;
    log::debug!(
        "traced graph: {} inputs, {} outputs, {} operators ({} recorded)",
        graph.inputs().len(),
        graph.outputs().len(),
        graph.node_count(),
        candidates.len(),
    );
    Ok(graph)
}
