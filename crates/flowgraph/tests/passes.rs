use flowgraph::{
    trace_from, AttrMap, CommonSubexpressionEliminationPass, DType, FlowGraph,
    IdentityEliminationPass, RewritePipeline, Shape, TensorSpec,
};

fn f32_spec(dims: &[usize]) -> TensorSpec {
    TensorSpec::new(DType::F32, Shape::from_static(dims.to_vec()))
}

fn duplicated_adds() -> FlowGraph {
    trace_from(&[f32_spec(&[2, 2])], |tx, inputs| {
        let x = inputs[0].clone();
        let first = tx.apply("add", &[x.clone(), x.clone()], AttrMap::new())?;
        let second = tx.apply("add", &[x.clone(), x], AttrMap::new())?;
        tx.apply("mul", &[first[0].clone(), second[0].clone()], AttrMap::new())
    })
    .expect("trace succeeds")
}

#[test]
fn cse_collapses_duplicate_nodes() {
    let graph = duplicated_adds();
    assert_eq!(graph.node_count(), 3);

    let mut pipeline = RewritePipeline::new();
    pipeline.pass(CommonSubexpressionEliminationPass::new());
    let rewritten = pipeline.run(&graph).expect("pipeline succeeds");

    assert_eq!(rewritten.node_count(), 2, "one add plus the mul remain");
    let mul = rewritten
        .nodes()
        .iter()
        .find(|op| op.kind().is("mul"))
        .expect("mul survives");
    assert_eq!(
        mul.inputs()[0].id(),
        mul.inputs()[1].id(),
        "both mul operands rewire onto the surviving add"
    );
}

#[test]
fn cse_distinguishes_attrs() {
    let graph = trace_from(&[f32_spec(&[2, 3])], |tx, inputs| {
        let mut flat = AttrMap::new();
        flat.insert(
            "shape".to_string(),
            flowgraph::AttrValue::I64Array(vec![6]),
        );
        let mut tall = AttrMap::new();
        tall.insert(
            "shape".to_string(),
            flowgraph::AttrValue::I64Array(vec![3, 2]),
        );
        let a = tx.apply("reshape", &[inputs[0].clone()], flat)?;
        let b = tx.apply("reshape", &[inputs[0].clone()], tall)?;
        let a2 = tx.apply("neg", &[a[0].clone()], AttrMap::new())?;
        let b2 = tx.apply("neg", &[b[0].clone()], AttrMap::new())?;
        Ok(vec![a2[0].clone(), b2[0].clone()])
    })
    .expect("trace succeeds");

    let mut pipeline = RewritePipeline::new();
    pipeline.pass(CommonSubexpressionEliminationPass::new());
    let rewritten = pipeline.run(&graph).expect("pipeline succeeds");
    assert_eq!(
        rewritten.node_count(),
        4,
        "different attrs must not be merged"
    );
}

#[test]
fn identity_elimination_forwards_inputs() {
    let graph = trace_from(&[f32_spec(&[4])], |tx, inputs| {
        let a = tx.apply("identity", &[inputs[0].clone()], AttrMap::new())?;
        let b = tx.apply("identity", &[a[0].clone()], AttrMap::new())?;
        tx.apply("exp", &[b[0].clone()], AttrMap::new())
    })
    .expect("trace succeeds");
    assert_eq!(graph.node_count(), 3);

    let mut pipeline = RewritePipeline::new();
    pipeline.pass(IdentityEliminationPass::new());
    let rewritten = pipeline.run(&graph).expect("pipeline succeeds");

    assert_eq!(rewritten.node_count(), 1);
    assert!(rewritten.nodes()[0].kind().is("exp"));
    assert_eq!(
        rewritten.nodes()[0].inputs()[0].id(),
        rewritten.inputs()[0].id()
    );
}

#[test]
fn fixed_point_converges_within_bounds() {
    // identity chains interleaved with duplicate work: both cleanups have to
    // run to convergence together.
    let graph = trace_from(&[f32_spec(&[2, 2])], |tx, inputs| {
        let x = inputs[0].clone();
        let a = tx.apply("identity", &[x.clone()], AttrMap::new())?;
        let left = tx.apply("add", &[a[0].clone(), x.clone()], AttrMap::new())?;
        let b = tx.apply("identity", &[x.clone()], AttrMap::new())?;
        let right = tx.apply("add", &[b[0].clone(), x], AttrMap::new())?;
        tx.apply("mul", &[left[0].clone(), right[0].clone()], AttrMap::new())
    })
    .expect("trace succeeds");
    assert_eq!(graph.node_count(), 5);

    let mut pipeline = RewritePipeline::new();
    pipeline.fixed_point(4, |p| {
        p.pass(IdentityEliminationPass::new());
        p.pass(CommonSubexpressionEliminationPass::new());
    });
    let rewritten = pipeline.run(&graph).expect("pipeline succeeds");

    // identity nodes vanish, the two adds become one, mul remains.
    assert_eq!(rewritten.node_count(), 2);
    rewritten.validate().expect("rewritten graph is valid");
}

#[test]
fn clean_graph_passes_through_unchanged() {
    let graph = duplicated_adds();
    let mut pipeline = RewritePipeline::new();
    pipeline.pass(IdentityEliminationPass::new());
    let rewritten = pipeline.run(&graph).expect("pipeline succeeds");
    assert!(rewritten.structural_eq(&graph));
}
