//! Flow-graph data model: operators, attribute payloads, and the graph itself.
//!
//! A [`FlowGraph`] is a directed acyclic graph of [`Operator`] nodes connected
//! through [`Tensor`] values, with designated ordered input and output tensor
//! lists. The interior node set is always the transitive closure reachable
//! backward from the outputs; construction recomputes that closure and
//! enforces the structural invariants (acyclicity, a single producer per
//! non-source tensor, no dangling producer references). Graphs are immutable
//! once built and may be read from any number of threads without locking;
//! transformations always produce a fresh graph that shares untouched
//! substructure with the original.

mod display;
pub mod passes;
pub mod rewrite;
pub mod trace;
pub mod visit;

use std::collections::BTreeMap;
use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use smallvec::SmallVec;
use thiserror::Error;

use crate::tensor::{Provenance, Tensor, TensorId, TensorLiteral, TensorSpec};

/// Process-unique identity for an operator node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct OpId(pub u64);

static NEXT_OP_ID: AtomicU64 = AtomicU64::new(0);

impl OpId {
    pub(crate) fn fresh() -> Self {
        OpId(NEXT_OP_ID.fetch_add(1, Ordering::Relaxed))
    }
}

/// Opaque operator-kind tag resolved through the operator registry.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct OpKind(Arc<str>);

impl OpKind {
    pub fn new(name: impl Into<String>) -> Self {
        Self(Arc::<str>::from(name.into()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Compares the tag against a plain name.
    pub fn is(&self, name: &str) -> bool {
        self.as_str() == name
    }
}

impl From<&str> for OpKind {
    fn from(name: &str) -> Self {
        OpKind::new(name)
    }
}

impl From<String> for OpKind {
    fn from(name: String) -> Self {
        OpKind::new(name)
    }
}

impl fmt::Display for OpKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Attribute payload attached to an operator.
///
/// Attributes are intentionally limited to simple primitives and arrays so
/// they are easy to serialize, hash, and validate across passes and file
/// revisions.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum AttrValue {
    Bool(bool),
    I64(i64),
    F64(f64),
    String(String),
    BoolArray(Vec<bool>),
    I64Array(Vec<i64>),
    F64Array(Vec<f64>),
    StringArray(Vec<String>),
}

impl AttrValue {
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            AttrValue::Bool(value) => Some(*value),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            AttrValue::I64(value) => Some(*value),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            AttrValue::F64(value) => Some(*value),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            AttrValue::String(value) => Some(value),
            _ => None,
        }
    }

    pub fn as_i64_array(&self) -> Option<&[i64]> {
        match self {
            AttrValue::I64Array(values) => Some(values),
            _ => None,
        }
    }
}

/// Ordered attribute map keyed by attribute name.
pub type AttrMap = BTreeMap<String, AttrValue>;

#[derive(Debug)]
pub(crate) struct OperatorNode {
    pub(crate) id: OpId,
    pub(crate) kind: OpKind,
    pub(crate) attrs: AttrMap,
    pub(crate) inputs: Vec<Tensor>,
    pub(crate) outputs: Vec<Tensor>,
}

/// Graph node handle: an operator invocation with ordered input tensor
/// references and exclusively owned output tensors.
///
/// Cloning is cheap; equality compares node identity.
#[derive(Debug, Clone)]
pub struct Operator(Arc<OperatorNode>);

impl Operator {
    /// Allocates a new operator together with its output tensors.
    pub(crate) fn new(
        kind: OpKind,
        attrs: AttrMap,
        inputs: Vec<Tensor>,
        output_specs: Vec<TensorSpec>,
    ) -> Self {
        let id = OpId::fresh();
        let outputs = output_specs
            .into_iter()
            .enumerate()
            .map(|(index, spec)| Tensor::produced(id, index, spec, None))
            .collect();
        Operator(Arc::new(OperatorNode {
            id,
            kind,
            attrs,
            inputs,
            outputs,
        }))
    }

    /// Rebuilds an operator loaded from a persisted graph, with explicit
    /// output descriptors instead of registry-driven inference.
    pub(crate) fn from_parts(
        kind: OpKind,
        attrs: AttrMap,
        inputs: Vec<Tensor>,
        outputs: Vec<(TensorSpec, Option<Arc<str>>)>,
    ) -> Self {
        let id = OpId::fresh();
        let outputs = outputs
            .into_iter()
            .enumerate()
            .map(|(index, (spec, name))| Tensor::produced(id, index, spec, name))
            .collect();
        Operator(Arc::new(OperatorNode {
            id,
            kind,
            attrs,
            inputs,
            outputs,
        }))
    }

    /// Produces a copy of this operator wired to new input tensors, keeping
    /// the operator and output-tensor identities intact. Used by the rewriter
    /// for pass-through nodes whose upstream values changed.
    pub(crate) fn relinked(&self, inputs: Vec<Tensor>) -> Self {
        let id = self.id();
        let outputs = self
            .outputs()
            .iter()
            .enumerate()
            .map(|(index, out)| out.reproduced(id, index))
            .collect();
        Operator(Arc::new(OperatorNode {
            id,
            kind: self.kind().clone(),
            attrs: self.attrs().clone(),
            inputs,
            outputs,
        }))
    }

    pub fn id(&self) -> OpId {
        self.0.id
    }

    pub fn kind(&self) -> &OpKind {
        &self.0.kind
    }

    pub fn attrs(&self) -> &AttrMap {
        &self.0.attrs
    }

    pub fn inputs(&self) -> &[Tensor] {
        &self.0.inputs
    }

    pub fn outputs(&self) -> &[Tensor] {
        &self.0.outputs
    }
}

impl PartialEq for Operator {
    fn eq(&self, other: &Self) -> bool {
        self.id() == other.id()
    }
}

impl Eq for Operator {}

/// Structural-invariant violation found while building or validating a graph.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum GraphError {
    #[error("operator {op:?} transitively consumes its own output")]
    Cycle { op: OpId },
    #[error("tensor {tensor:?} references producer {op:?} which is not part of the graph")]
    DanglingProducer { tensor: TensorId, op: OpId },
    #[error("input tensor {tensor:?} does not appear in the graph input list")]
    ForeignInput { tensor: TensorId },
    #[error("tensor {tensor:?} is claimed by more than one producing operator")]
    DuplicateProducer { tensor: TensorId },
    #[error("graph input list entry {index} is not a placeholder for that position")]
    InvalidInputList { index: usize },
    #[error("output tensor {tensor:?} does not match its operator's output slot")]
    InvalidProvenance { tensor: TensorId },
}

/// Directed acyclic graph of operators with designated input/output tensors.
#[derive(Debug, Clone)]
pub struct FlowGraph {
    inputs: Vec<Tensor>,
    outputs: Vec<Tensor>,
    nodes: Vec<Operator>,
    node_index: HashMap<OpId, usize>,
    consumers: HashMap<TensorId, SmallVec<[OpId; 4]>>,
}

impl FlowGraph {
    /// Computes the backward closure from `outputs` over `candidates` and
    /// packages it into a validated graph.
    ///
    /// The node list comes out in the canonical deterministic order: the
    /// post-order of a depth-first walk that starts from the outputs in
    /// order and expands operator inputs in order, first discovery wins.
    /// Producers therefore always precede consumers.
    pub(crate) fn assemble(
        inputs: Vec<Tensor>,
        outputs: Vec<Tensor>,
        candidates: &HashMap<OpId, Operator>,
    ) -> Result<FlowGraph, GraphError> {
        let mut input_ids: HashMap<TensorId, usize> = HashMap::with_capacity(inputs.len());
        for (index, tensor) in inputs.iter().enumerate() {
            match tensor.provenance() {
                Provenance::Input { index: recorded } if *recorded == index => {}
                _ => return Err(GraphError::InvalidInputList { index }),
            }
            if input_ids.insert(tensor.id(), index).is_some() {
                return Err(GraphError::InvalidInputList { index });
            }
        }

        #[derive(Clone, Copy, PartialEq)]
        enum Mark {
            Visiting,
            Done,
        }

        struct Frame {
            op: Operator,
            next_input: usize,
        }

        let mut marks: HashMap<OpId, Mark> = HashMap::with_capacity(candidates.len());
        let mut nodes: Vec<Operator> = Vec::new();
        let mut produced: HashMap<TensorId, OpId> = HashMap::new();
        let mut stack: Vec<Frame> = Vec::new();

        for root in &outputs {
            let Some((op, slot)) = reference_of(root, &input_ids)? else {
                continue;
            };
            let producer = lookup_producer(candidates, op, root)?;
            check_output_slot(&producer, slot, root)?;
            if matches!(marks.get(&op), Some(Mark::Done)) {
                continue;
            }
            marks.insert(op, Mark::Visiting);
            stack.push(Frame {
                op: producer,
                next_input: 0,
            });

            while let Some(frame) = stack.last_mut() {
                if frame.next_input < frame.op.inputs().len() {
                    let tensor = frame.op.inputs()[frame.next_input].clone();
                    frame.next_input += 1;
                    let Some((dep, slot)) = reference_of(&tensor, &input_ids)? else {
                        continue;
                    };
                    let producer = lookup_producer(candidates, dep, &tensor)?;
                    check_output_slot(&producer, slot, &tensor)?;
                    match marks.get(&dep) {
                        Some(Mark::Done) => {}
                        Some(Mark::Visiting) => return Err(GraphError::Cycle { op: dep }),
                        None => {
                            marks.insert(dep, Mark::Visiting);
                            stack.push(Frame {
                                op: producer,
                                next_input: 0,
                            });
                        }
                    }
                } else {
                    let frame = stack.pop().expect("frame present while walking");
                    for (index, out) in frame.op.outputs().iter().enumerate() {
                        match out.provenance() {
                            Provenance::Produced { op, index: slot }
                                if *op == frame.op.id() && *slot == index => {}
                            _ => return Err(GraphError::InvalidProvenance { tensor: out.id() }),
                        }
                        if produced.insert(out.id(), frame.op.id()).is_some() {
                            return Err(GraphError::DuplicateProducer { tensor: out.id() });
                        }
                    }
                    marks.insert(frame.op.id(), Mark::Done);
                    nodes.push(frame.op);
                }
            }
        }

        let mut node_index = HashMap::with_capacity(nodes.len());
        for (position, op) in nodes.iter().enumerate() {
            node_index.insert(op.id(), position);
        }

        let mut consumers: HashMap<TensorId, SmallVec<[OpId; 4]>> = HashMap::new();
        for op in &nodes {
            for tensor in op.inputs() {
                consumers.entry(tensor.id()).or_default().push(op.id());
            }
        }

        Ok(FlowGraph {
            inputs,
            outputs,
            nodes,
            node_index,
            consumers,
        })
    }

    /// Ordered formal parameters of the graph.
    pub fn inputs(&self) -> &[Tensor] {
        &self.inputs
    }

    /// Ordered result tensors of the graph.
    pub fn outputs(&self) -> &[Tensor] {
        &self.outputs
    }

    /// Reachable operators in the canonical deterministic order.
    pub fn nodes(&self) -> &[Operator] {
        &self.nodes
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    /// Looks up an operator by identity.
    pub fn operator(&self, id: OpId) -> Option<&Operator> {
        self.node_index
            .get(&id)
            .map(|position| &self.nodes[*position])
    }

    /// Returns the operator producing `tensor`, when it is an interior value
    /// of this graph.
    pub fn producer(&self, tensor: &Tensor) -> Option<&Operator> {
        let (op, _) = tensor.producer()?;
        self.operator(op)
    }

    /// Identities of the operators consuming `tensor` within this graph.
    pub fn consumers(&self, tensor: TensorId) -> &[OpId] {
        self.consumers
            .get(&tensor)
            .map(|ops| ops.as_slice())
            .unwrap_or(&[])
    }

    /// Re-checks every structural invariant. Used by pass pipelines when
    /// opt-in validation is enabled.
    pub fn validate(&self) -> Result<(), GraphError> {
        let candidates: HashMap<OpId, Operator> =
            self.nodes.iter().map(|op| (op.id(), op.clone())).collect();
        FlowGraph::assemble(self.inputs.clone(), self.outputs.clone(), &candidates)?;
        Ok(())
    }

    /// Structural and value equality: same topology, kinds, attributes,
    /// tensor descriptors, and constant payloads. Node identities are
    /// deliberately ignored, so a graph is structurally equal to its
    /// serialized round-trip.
    pub fn structural_eq(&self, other: &FlowGraph) -> bool {
        canonical_form(self) == canonical_form(other)
    }
}

fn reference_of(
    tensor: &Tensor,
    input_ids: &HashMap<TensorId, usize>,
) -> Result<Option<(OpId, usize)>, GraphError> {
    match tensor.provenance() {
        Provenance::Input { .. } => {
            if !input_ids.contains_key(&tensor.id()) {
                return Err(GraphError::ForeignInput { tensor: tensor.id() });
            }
            Ok(None)
        }
        Provenance::Constant(_) => Ok(None),
        Provenance::Produced { op, index } => Ok(Some((*op, *index))),
    }
}

fn lookup_producer(
    candidates: &HashMap<OpId, Operator>,
    op: OpId,
    tensor: &Tensor,
) -> Result<Operator, GraphError> {
    candidates
        .get(&op)
        .cloned()
        .ok_or(GraphError::DanglingProducer {
            tensor: tensor.id(),
            op,
        })
}

/// The producing operator must expose the referenced tensor on the recorded
/// output slot.
fn check_output_slot(producer: &Operator, slot: usize, tensor: &Tensor) -> Result<(), GraphError> {
    match producer.outputs().get(slot) {
        Some(out) if out.id() == tensor.id() => Ok(()),
        _ => Err(GraphError::DanglingProducer {
            tensor: tensor.id(),
            op: producer.id(),
        }),
    }
}

/// Canonical position-based reference to a value, independent of identities.
#[derive(Debug, PartialEq)]
enum CanonRef {
    Input(usize),
    Constant(usize),
    Node { node: usize, output: usize },
}

#[derive(Debug, PartialEq)]
struct CanonNode<'g> {
    kind: &'g str,
    attrs: &'g AttrMap,
    inputs: Vec<CanonRef>,
    outputs: Vec<(&'g TensorSpec, Option<&'g str>)>,
}

#[derive(Debug, PartialEq)]
struct CanonGraph<'g> {
    inputs: Vec<(&'g TensorSpec, Option<&'g str>)>,
    constants: Vec<(&'g TensorLiteral, Option<&'g str>)>,
    nodes: Vec<CanonNode<'g>>,
    outputs: Vec<CanonRef>,
}

fn intern_constant<'g>(
    tensor: &'g Tensor,
    constant_index: &mut HashMap<TensorId, usize>,
    constants: &mut Vec<(&'g TensorLiteral, Option<&'g str>)>,
) {
    if let Provenance::Constant(literal) = tensor.provenance() {
        // First-encounter order keeps the numbering deterministic.
        if !constant_index.contains_key(&tensor.id()) {
            constant_index.insert(tensor.id(), constants.len());
            constants.push((literal, tensor.name()));
        }
    }
}

fn canonical_form(graph: &FlowGraph) -> CanonGraph<'_> {
    let mut input_index: HashMap<TensorId, usize> = HashMap::new();
    for (index, tensor) in graph.inputs().iter().enumerate() {
        input_index.insert(tensor.id(), index);
    }

    let mut node_positions: HashMap<OpId, usize> = HashMap::new();
    for (position, op) in graph.nodes().iter().enumerate() {
        node_positions.insert(op.id(), position);
    }

    let mut constant_index: HashMap<TensorId, usize> = HashMap::new();
    let mut constants: Vec<(&TensorLiteral, Option<&str>)> = Vec::new();
    for op in graph.nodes() {
        for tensor in op.inputs() {
            intern_constant(tensor, &mut constant_index, &mut constants);
        }
    }
    for tensor in graph.outputs() {
        intern_constant(tensor, &mut constant_index, &mut constants);
    }

    let ref_of = |tensor: &Tensor| -> CanonRef {
        match tensor.provenance() {
            Provenance::Input { .. } => CanonRef::Input(input_index[&tensor.id()]),
            Provenance::Constant(_) => CanonRef::Constant(constant_index[&tensor.id()]),
            Provenance::Produced { op, index } => CanonRef::Node {
                node: node_positions[op],
                output: *index,
            },
        }
    };

    let nodes = graph
        .nodes()
        .iter()
        .map(|op| CanonNode {
            kind: op.kind().as_str(),
            attrs: op.attrs(),
            inputs: op.inputs().iter().map(&ref_of).collect(),
            outputs: op
                .outputs()
                .iter()
                .map(|out| (out.spec(), out.name()))
                .collect(),
        })
        .collect();

    CanonGraph {
        inputs: graph
            .inputs()
            .iter()
            .map(|tensor| (tensor.spec(), tensor.name()))
            .collect(),
        constants,
        nodes,
        outputs: graph.outputs().iter().map(&ref_of).collect(),
    }
}
