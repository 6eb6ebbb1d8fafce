//! Read-only post-order folds over a [`FlowGraph`].

use std::collections::HashMap;

use crate::graph::{FlowGraph, OpId, Operator};
use crate::tensor::{Tensor, TensorId};

/// One result per reachable node, keyed by node identity.
///
/// Interior results are keyed by operator; source results (graph inputs and
/// constants) are keyed by tensor.
#[derive(Debug)]
pub struct VisitMap<R> {
    operators: HashMap<OpId, R>,
    sources: HashMap<TensorId, R>,
}

impl<R> VisitMap<R> {
    /// Result recorded for an operator node.
    pub fn operator(&self, op: &Operator) -> Option<&R> {
        self.operators.get(&op.id())
    }

    pub fn operator_by_id(&self, id: OpId) -> Option<&R> {
        self.operators.get(&id)
    }

    /// Result recorded for a source tensor (graph input or constant).
    pub fn source(&self, tensor: &Tensor) -> Option<&R> {
        self.sources.get(&tensor.id())
    }

    /// Resolves a tensor to the result of the node that defines it: its
    /// producing operator for interior values, the leaf result otherwise.
    pub fn for_tensor(&self, tensor: &Tensor) -> Option<&R> {
        match tensor.producer() {
            Some((op, _)) => self.operators.get(&op),
            None => self.sources.get(&tensor.id()),
        }
    }

    /// Total number of visited nodes, sources included.
    pub fn len(&self) -> usize {
        self.operators.len() + self.sources.len()
    }

    pub fn is_empty(&self) -> bool {
        self.operators.is_empty() && self.sources.is_empty()
    }
}

/// Generic post-order fold over a graph.
pub struct GraphVisitor;

impl GraphVisitor {
    /// Folds `op_fn` over every reachable operator and `leaf_fn` over every
    /// reachable source tensor, each exactly once regardless of fan-in.
    ///
    /// `op_fn` receives the results of the nodes defining the operator's
    /// inputs, in input order, and runs only after all of them. Traversal
    /// follows the graph's canonical deterministic order. The graph is never
    /// mutated; concurrent visits over one graph are safe.
    pub fn visit<R, F, L>(graph: &FlowGraph, mut op_fn: F, mut leaf_fn: L) -> VisitMap<R>
    where
        F: FnMut(&Operator, &[&R]) -> R,
        L: FnMut(&Tensor) -> R,
    {
        let mut sources: HashMap<TensorId, R> = HashMap::new();
        let mut visit_leaf = |tensor: &Tensor, sources: &mut HashMap<TensorId, R>| {
            if tensor.is_source() && !sources.contains_key(&tensor.id()) {
                sources.insert(tensor.id(), leaf_fn(tensor));
            }
        };
        for op in graph.nodes() {
            for tensor in op.inputs() {
                visit_leaf(tensor, &mut sources);
            }
        }
        for tensor in graph.outputs() {
            visit_leaf(tensor, &mut sources);
        }

        let mut operators: HashMap<OpId, R> = HashMap::with_capacity(graph.node_count());
        for op in graph.nodes() {
            let result = {
                let dependencies: Vec<&R> = op
                    .inputs()
                    .iter()
                    .map(|tensor| match tensor.producer() {
                        Some((producer, _)) => operators
                            .get(&producer)
                            .expect("producer visited before consumer"),
                        None => sources
                            .get(&tensor.id())
                            .expect("source leaf visited before consumer"),
                    })
                    .collect();
                op_fn(op, &dependencies)
            };
            operators.insert(op.id(), result);
        }

        VisitMap { operators, sources }
    }
}
