use flowgraph::{
    trace_from, AttrMap, DType, FlowGraph, GraphRewriter, OpId, RewriteCtx, RewriteError,
    RewritePass, RewritePipeline, Shape, TensorSpec,
};

fn f32_spec(dims: &[usize]) -> TensorSpec {
    TensorSpec::new(DType::F32, Shape::from_static(dims.to_vec()))
}

fn chain() -> FlowGraph {
    trace_from(&[f32_spec(&[3, 4])], |tx, inputs| {
        let a = tx.apply("relu", &[inputs[0].clone()], AttrMap::new())?;
        tx.apply("exp", &[a[0].clone()], AttrMap::new())
    })
    .expect("chain trace succeeds")
}

fn diamond() -> FlowGraph {
    trace_from(&[f32_spec(&[2, 2])], |tx, inputs| {
        let a = tx.apply("relu", &[inputs[0].clone()], AttrMap::new())?;
        let b = tx.apply("exp", &[a[0].clone()], AttrMap::new())?;
        let c = tx.apply("neg", &[a[0].clone()], AttrMap::new())?;
        tx.apply("add", &[b[0].clone(), c[0].clone()], AttrMap::new())
    })
    .expect("diamond trace succeeds")
}

#[test]
fn null_rewrite_preserves_structure_and_shares_nodes() {
    let graph = diamond();
    let rewritten =
        GraphRewriter::rewrite(&graph, |_cx, _op, _inputs| Ok(None)).expect("rewrite succeeds");

    assert!(rewritten.structural_eq(&graph));
    // Untouched substructure is shared, not copied: node identities survive.
    let before: Vec<OpId> = graph.nodes().iter().map(|op| op.id()).collect();
    let after: Vec<OpId> = rewritten.nodes().iter().map(|op| op.id()).collect();
    assert_eq!(before, after);
}

#[test]
fn replacement_rewires_consumers() {
    let graph = chain();
    let rewritten = GraphRewriter::rewrite(&graph, |cx, op, inputs| {
        if op.kind().is("relu") {
            // Swap the activation; downstream `exp` must follow the new value.
            return Ok(Some(cx.apply("neg", inputs, AttrMap::new())?));
        }
        Ok(None)
    })
    .expect("rewrite succeeds");

    assert_eq!(rewritten.node_count(), 2);
    assert!(rewritten.nodes()[0].kind().is("neg"));
    assert!(rewritten.nodes()[1].kind().is("exp"));
    assert_eq!(rewritten.inputs().len(), graph.inputs().len());
    assert_eq!(rewritten.outputs().len(), graph.outputs().len());
    rewritten.validate().expect("rewritten graph is valid");
}

#[test]
fn shared_subgraph_is_rewritten_exactly_once() {
    let graph = diamond();
    let mut relu_rewrites = 0usize;
    let rewritten = GraphRewriter::rewrite(&graph, |cx, op, inputs| {
        if op.kind().is("relu") {
            relu_rewrites += 1;
            return Ok(Some(cx.apply("identity", inputs, AttrMap::new())?));
        }
        Ok(None)
    })
    .expect("rewrite succeeds");

    assert_eq!(relu_rewrites, 1, "diamond apex must be rewritten once");
    assert_eq!(rewritten.node_count(), 4);

    // Both branches must consume the same replacement, not divergent copies.
    let exp = rewritten
        .nodes()
        .iter()
        .find(|op| op.kind().is("exp"))
        .expect("exp present");
    let neg = rewritten
        .nodes()
        .iter()
        .find(|op| op.kind().is("neg"))
        .expect("neg present");
    assert_eq!(exp.inputs()[0].id(), neg.inputs()[0].id());
}

#[test]
fn elimination_by_forwarding_an_input() {
    let graph = chain();
    let rewritten = GraphRewriter::rewrite(&graph, |_cx, op, inputs| {
        if op.kind().is("relu") {
            return Ok(Some(vec![inputs[0].clone()]));
        }
        Ok(None)
    })
    .expect("rewrite succeeds");

    assert_eq!(rewritten.node_count(), 1);
    assert!(rewritten.nodes()[0].kind().is("exp"));
    assert_eq!(
        rewritten.nodes()[0].inputs()[0].id(),
        rewritten.inputs()[0].id(),
        "exp now reads the graph input directly"
    );
}

#[test]
fn missing_consumed_output_is_an_arity_mismatch() {
    let graph = chain();
    let err = GraphRewriter::rewrite(&graph, |_cx, op, _inputs| {
        if op.kind().is("relu") {
            // Dropping the only output while `exp` still consumes it.
            return Ok(Some(Vec::new()));
        }
        Ok(None)
    })
    .expect_err("arity mismatch must fail");
    assert!(matches!(err, RewriteError::ArityMismatch { missing: 0, .. }));
}

#[test]
fn depending_on_your_own_rewrite_is_a_cycle() {
    let graph = chain();
    let downstream = graph.outputs()[0].clone();
    let err = GraphRewriter::rewrite(&graph, move |_cx, op, _inputs| {
        if op.kind().is("relu") {
            // Forward the downstream result as this node's replacement; the
            // consumer of relu then depends on its own rewritten output.
            return Ok(Some(vec![downstream.clone()]));
        }
        Ok(None)
    })
    .expect_err("cycle must fail");
    assert!(matches!(err, RewriteError::CycleIntroduced { .. }));
}

struct FailingPass;

impl RewritePass for FailingPass {
    fn name(&self) -> &'static str {
        "failing"
    }

    fn rewrite_operator(
        &mut self,
        cx: &mut RewriteCtx<'_>,
        _op: &flowgraph::Operator,
        inputs: &[flowgraph::Tensor],
    ) -> Result<flowgraph::Rewrite, RewriteError> {
        cx.apply("not-a-registered-kind", inputs, AttrMap::new())?;
        Ok(None)
    }
}

struct RenamingPass;

impl RewritePass for RenamingPass {
    fn name(&self) -> &'static str {
        "relu-to-neg"
    }

    fn rewrite_operator(
        &mut self,
        cx: &mut RewriteCtx<'_>,
        op: &flowgraph::Operator,
        inputs: &[flowgraph::Tensor],
    ) -> Result<flowgraph::Rewrite, RewriteError> {
        if op.kind().is("relu") {
            return Ok(Some(cx.apply("neg", inputs, AttrMap::new())?));
        }
        Ok(None)
    }
}

#[test]
fn pipeline_failure_names_the_pass() {
    let graph = chain();
    let mut pipeline = RewritePipeline::new();
    pipeline.pass(RenamingPass);
    pipeline.pass(FailingPass);

    let err = pipeline.run(&graph).expect_err("pipeline must fail");
    assert_eq!(err.pass, "failing");
    assert!(matches!(err.source, RewriteError::UnknownOpKind { .. }));
}

#[test]
fn pipeline_chains_passes_in_order() {
    let graph = chain();
    let mut pipeline = RewritePipeline::new();
    pipeline.pass(RenamingPass);

    let rewritten = pipeline.run(&graph).expect("pipeline succeeds");
    assert!(rewritten.nodes()[0].kind().is("neg"));
    assert!(!rewritten.structural_eq(&graph));
}
