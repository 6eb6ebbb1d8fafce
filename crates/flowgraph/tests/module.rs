use anyhow::Result;
use flowgraph::{
    trace_from, AttrMap, DType, Module, Sequential, Shape, TensorSpec, TraceError, Tracer,
};

fn f32_spec(dims: &[usize]) -> TensorSpec {
    TensorSpec::new(DType::F32, Shape::from_static(dims.to_vec()))
}

/// Minimal layer: applies one registered elementwise kind.
struct Activation {
    kind: &'static str,
}

impl Module for Activation {
    fn forward(
        &self,
        tracer: &mut Tracer<'_>,
        inputs: &[flowgraph::Tensor],
    ) -> Result<Vec<flowgraph::Tensor>, TraceError> {
        tracer.apply(self.kind, inputs, AttrMap::new())
    }
}

#[test]
fn sequential_threads_outputs_to_inputs() -> Result<()> {
    let model = Sequential::new()
        .push(Activation { kind: "relu" })
        .push(Activation { kind: "exp" })
        .push(Activation { kind: "neg" });
    assert_eq!(model.len(), 3);

    let graph = trace_from(&[f32_spec(&[4, 4])], |tx, inputs| {
        model.forward(tx, inputs)
    })?;

    let kinds: Vec<&str> = graph
        .nodes()
        .iter()
        .map(|op| op.kind().as_str())
        .collect();
    assert_eq!(kinds, vec!["relu", "exp", "neg"]);
    assert_eq!(graph.outputs().len(), 1);
    Ok(())
}

#[test]
fn empty_sequential_is_a_passthrough() -> Result<()> {
    let model = Sequential::new();
    assert!(model.is_empty());

    let graph = trace_from(&[f32_spec(&[2])], |tx, inputs| {
        model.forward(tx, inputs)
    })?;

    assert_eq!(graph.node_count(), 0);
    assert_eq!(graph.outputs()[0].id(), graph.inputs()[0].id());
    Ok(())
}

#[test]
fn module_errors_abort_the_trace() {
    struct Broken;
    impl Module for Broken {
        fn forward(
            &self,
            tracer: &mut Tracer<'_>,
            inputs: &[flowgraph::Tensor],
        ) -> Result<Vec<flowgraph::Tensor>, TraceError> {
            tracer.apply("unregistered-layer-kind", inputs, AttrMap::new())
        }
    }

    let model = Sequential::new()
        .push(Activation { kind: "relu" })
        .push(Broken);
    let err = trace_from(&[f32_spec(&[2])], |tx, inputs| model.forward(tx, inputs))
        .expect_err("broken module must fail the trace");
    assert!(matches!(err, TraceError::UnknownOpKind { .. }));
}
