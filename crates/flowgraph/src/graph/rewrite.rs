//! Mutating post-order transformation of flow graphs.
//!
//! A rewrite walks the graph in canonical order, offering every operator to a
//! per-node rewrite function together with the already-rewritten versions of
//! its inputs. An identity-keyed memo guarantees that a shared subgraph is
//! rewritten exactly once and that every consumer rewires to the same result;
//! untouched nodes are shared with the original graph rather than copied.
//! The input graph is never mutated: rewriting returns a fresh, validated
//! [`FlowGraph`] with the same input and output arity.

use std::collections::HashMap;

use crate::error::{PassError, RewriteError};
use crate::graph::{AttrMap, FlowGraph, GraphError, OpId, OpKind, Operator};
use crate::registry::OpRegistry;
use crate::tensor::{Tensor, TensorId, TensorLiteral, TensorSpec};

/// Builder handed to rewrite functions for constructing replacement nodes.
///
/// Replacement operators go through the same registry inference as tracing;
/// the context keeps every node it builds so the rewritten graph can resolve
/// their producers.
pub struct RewriteCtx<'r> {
    registry: &'r OpRegistry,
    created: Vec<Operator>,
}

impl<'r> RewriteCtx<'r> {
    fn new(registry: &'r OpRegistry) -> Self {
        Self {
            registry,
            created: Vec::new(),
        }
    }

    /// Builds a replacement operator and returns its output tensors.
    pub fn apply(
        &mut self,
        kind: &str,
        inputs: &[Tensor],
        attrs: AttrMap,
    ) -> Result<Vec<Tensor>, RewriteError> {
        let schema = self
            .registry
            .lookup(kind)
            .ok_or_else(|| RewriteError::UnknownOpKind {
                kind: kind.to_string(),
            })?;
        let input_specs: Vec<TensorSpec> =
            inputs.iter().map(|tensor| tensor.spec().clone()).collect();
        let output_specs =
            schema
                .infer(&input_specs, &attrs)
                .map_err(|source| RewriteError::ShapeInference {
                    kind: kind.to_string(),
                    source,
                })?;
        let op = Operator::new(OpKind::new(kind), attrs, inputs.to_vec(), output_specs);
        let outputs = op.outputs().to_vec();
        self.created.push(op);
        Ok(outputs)
    }

    /// Materialises a fresh constant tensor for use in replacements.
    pub fn constant(&mut self, literal: TensorLiteral) -> Tensor {
        Tensor::constant(literal, None)
    }
}

/// Per-node rewrite decision: `None` passes the node through (inputs still
/// relinked), `Some` replaces the node's outputs positionally.
pub type Rewrite = Option<Vec<Tensor>>;

/// Post-order graph-to-graph transformation driver.
pub struct GraphRewriter;

impl GraphRewriter {
    /// Rewrites `graph` with the per-node function `g`, producing a new
    /// graph with identical input/output arity.
    ///
    /// `g` sees each reachable operator exactly once, in canonical order,
    /// together with its rewritten inputs. Replacement outputs map onto the
    /// original outputs by position; a replacement that leaves a consumed
    /// output position unmapped fails with `ArityMismatch`, and a rewrite
    /// that makes a node depend on its own rewritten output fails with
    /// `CycleIntroduced`.
    pub fn rewrite<G>(graph: &FlowGraph, mut g: G) -> Result<FlowGraph, RewriteError>
    where
        G: FnMut(&mut RewriteCtx<'_>, &Operator, &[Tensor]) -> Result<Rewrite, RewriteError>,
    {
        let mut cx = RewriteCtx::new(OpRegistry::global());
        // Maps original tensor identity to its value in the rewritten graph.
        let mut memo: HashMap<TensorId, Tensor> = HashMap::new();
        let mut candidates: HashMap<OpId, Operator> = HashMap::new();

        let resolve = |memo: &HashMap<TensorId, Tensor>, tensor: &Tensor| -> Tensor {
            memo.get(&tensor.id()).cloned().unwrap_or_else(|| tensor.clone())
        };

        for op in graph.nodes() {
            let rewritten_inputs: Vec<Tensor> = op
                .inputs()
                .iter()
                .map(|tensor| resolve(&memo, tensor))
                .collect();

            let decision = g(&mut cx, op, &rewritten_inputs)?;
            // Replacing a node by its own outputs is a pass-through.
            let decision = match decision {
                Some(replacement)
                    if replacement.len() == op.outputs().len()
                        && replacement
                            .iter()
                            .zip(op.outputs())
                            .all(|(after, before)| after.id() == before.id()) =>
                {
                    None
                }
                other => other,
            };

            match decision {
                Some(replacement) => {
                    // Positions beyond the replacement arity must be dead in
                    // the original graph.
                    for (position, out) in op.outputs().iter().enumerate().skip(replacement.len()) {
                        let consumed = !graph.consumers(out.id()).is_empty()
                            || graph.outputs().iter().any(|o| o.id() == out.id());
                        if consumed {
                            return Err(RewriteError::ArityMismatch {
                                op: op.id(),
                                kind: op.kind().as_str().to_string(),
                                got: replacement.len(),
                                missing: position,
                            });
                        }
                    }
                    for (out, new) in op.outputs().iter().zip(replacement) {
                        memo.insert(out.id(), new);
                    }
                }
                None => {
                    let changed = op
                        .inputs()
                        .iter()
                        .zip(&rewritten_inputs)
                        .any(|(before, after)| before.id() != after.id());
                    let node = if changed {
                        op.relinked(rewritten_inputs)
                    } else {
                        op.clone()
                    };
                    for out in node.outputs() {
                        memo.insert(out.id(), out.clone());
                    }
                    candidates.insert(node.id(), node);
                }
            }
        }

        for op in cx.created {
            candidates.insert(op.id(), op);
        }

        let outputs: Vec<Tensor> = graph
            .outputs()
            .iter()
            .map(|tensor| resolve(&memo, tensor))
            .collect();
        FlowGraph::assemble(graph.inputs().to_vec(), outputs, &candidates).map_err(|err| {
            match err {
                GraphError::Cycle { op } => RewriteError::CycleIntroduced { op },
                GraphError::DanglingProducer { tensor, .. } => {
                    RewriteError::UnknownProducer { tensor }
                }
                other => RewriteError::Graph(other),
            }
        })
    }
}

/// A named rewrite, the unit composed into pipelines.
pub trait RewritePass {
    /// Identifying name attached to pipeline failures and logs.
    fn name(&self) -> &'static str;

    /// Called once per graph before the walk; stateful passes reset here.
    fn begin_graph(&mut self, _graph: &FlowGraph) {}

    /// The per-node rewrite decision.
    fn rewrite_operator(
        &mut self,
        cx: &mut RewriteCtx<'_>,
        op: &Operator,
        inputs: &[Tensor],
    ) -> Result<Rewrite, RewriteError>;
}

enum Step {
    Pass(Box<dyn RewritePass>),
    FixedPoint { max_iters: usize, steps: Vec<Step> },
}

/// Ordered chain of rewrite passes.
///
/// Passes run sequentially, each consuming the previous result. A
/// `fixed_point` group repeats its steps until the graph stops changing or
/// the iteration bound is reached. The first failing pass aborts the
/// pipeline and surfaces its error wrapped with the pass name.
#[derive(Default)]
pub struct RewritePipeline {
    steps: Vec<Step>,
}

impl RewritePipeline {
    pub fn new() -> Self {
        Self { steps: Vec::new() }
    }

    /// Appends a pass to the pipeline.
    pub fn pass(&mut self, pass: impl RewritePass + 'static) {
        self.steps.push(Step::Pass(Box::new(pass)));
    }

    /// Appends a bounded fixed-point group built by `build`.
    pub fn fixed_point<F>(&mut self, max_iters: usize, build: F)
    where
        F: FnOnce(&mut RewritePipeline),
    {
        let mut inner = RewritePipeline::new();
        build(&mut inner);
        self.steps.push(Step::FixedPoint {
            max_iters: max_iters.max(1),
            steps: inner.steps,
        });
    }

    /// Runs every step over `graph`, returning the final rewritten graph.
    pub fn run(&mut self, graph: &FlowGraph) -> Result<FlowGraph, PassError> {
        let (result, _changed) = run_steps(&mut self.steps, graph)?;
        Ok(result)
    }
}

fn run_steps(steps: &mut [Step], graph: &FlowGraph) -> Result<(FlowGraph, bool), PassError> {
    let mut current = graph.clone();
    let mut changed_any = false;
    for step in steps {
        match step {
            Step::Pass(pass) => {
                let name = pass.name();
                pass.begin_graph(&current);
                let result = GraphRewriter::rewrite(&current, |cx, op, inputs| {
                    pass.rewrite_operator(cx, op, inputs)
                });
                let next = result.map_err(|source| PassError {
                    pass: name.to_string(),
                    source,
                })?;
                if crate::env::validate_passes_enabled() {
                    next.validate().map_err(|err| PassError {
                        pass: name.to_string(),
                        source: RewriteError::Graph(err),
                    })?;
                }
                let changed = !next.structural_eq(&current);
                log::debug!(
                    "pass `{name}`: {} ({} -> {} operators)",
                    if changed { "changed graph" } else { "no change" },
                    current.node_count(),
                    next.node_count(),
                );
                changed_any |= changed;
                current = next;
            }
            Step::FixedPoint { max_iters, steps } => {
                for _ in 0..*max_iters {
                    let (next, changed) = run_steps(steps, &current)?;
                    changed_any |= changed;
                    current = next;
                    if !changed {
                        break;
                    }
                }
            }
        }
    }
    Ok((current, changed_any))
}
