use flowgraph::io::graph_file::save_graph_v1;
use flowgraph::io::to_json_string;
use flowgraph::{
    load_graph, save_graph, trace_from, trace_from_named, AttrMap, AttrValue, DType, FlowGraph,
    PersistError, Shape, TensorLiteral, TensorSpec,
};

fn f32_spec(dims: &[usize]) -> TensorSpec {
    TensorSpec::new(DType::F32, Shape::from_static(dims.to_vec()))
}

/// Diamond with a shared constant, attribute-bearing nodes, and named ports.
fn sample_graph() -> FlowGraph {
    trace_from_named(&[("x", f32_spec(&[2, 3]))], |tx, inputs| {
        let scale = tx.constant_named(
            TensorLiteral::from_f32(Shape::from_static([2, 3]), &[1.0, 2.0, 3.0, 4.0, 5.0, 6.0]),
            Some("scale"),
        );
        let scaled = tx.apply("mul", &[inputs[0].clone(), scale], AttrMap::new())?;
        let mut perm = AttrMap::new();
        perm.insert("perm".to_string(), AttrValue::I64Array(vec![1, 0]));
        let transposed = tx.apply("transpose", &[scaled[0].clone()], perm)?;
        let relu = tx.apply("relu", &[scaled[0].clone()], AttrMap::new())?;
        let mut flip = AttrMap::new();
        flip.insert("perm".to_string(), AttrValue::I64Array(vec![1, 0]));
        let back = tx.apply("transpose", &[relu[0].clone()], flip)?;
        tx.apply("add", &[transposed[0].clone(), back[0].clone()], AttrMap::new())
    })
    .expect("sample trace succeeds")
}

#[test]
fn round_trip_preserves_structure_and_values() {
    let graph = sample_graph();
    let mut bytes = Vec::new();
    save_graph(&graph, &mut bytes).expect("save succeeds");

    let loaded = load_graph(&mut bytes.as_slice()).expect("load succeeds");
    assert!(loaded.structural_eq(&graph), "round-trip law");
    assert_eq!(loaded.node_count(), graph.node_count());
    assert_eq!(loaded.inputs()[0].name(), Some("x"));
    loaded.validate().expect("loaded graph is valid");

    // Identities are fresh; only structure survives.
    assert_ne!(loaded.outputs()[0].id(), graph.outputs()[0].id());
}

#[test]
fn legacy_revision_round_trips() {
    let graph = sample_graph();
    let mut bytes = Vec::new();
    save_graph_v1(&graph, &mut bytes).expect("v1 save succeeds");

    let loaded = load_graph(&mut bytes.as_slice()).expect("v1 load succeeds");
    assert!(loaded.structural_eq(&graph));

    // Both revisions describe the same graph.
    let mut current = Vec::new();
    save_graph(&graph, &mut current).expect("v2 save succeeds");
    let from_current = load_graph(&mut current.as_slice()).expect("v2 load succeeds");
    assert!(loaded.structural_eq(&from_current));
}

#[test]
fn saving_is_byte_deterministic() {
    let graph = sample_graph();
    let mut first = Vec::new();
    let mut second = Vec::new();
    save_graph(&graph, &mut first).expect("save succeeds");
    save_graph(&graph, &mut second).expect("save succeeds");
    assert_eq!(first, second);
}

#[test]
fn truncated_payloads_are_corrupt_never_partial() {
    let graph = sample_graph();
    let mut bytes = Vec::new();
    save_graph(&graph, &mut bytes).expect("save succeeds");

    // Chop the payload at several depths: inside the header, inside the
    // index, and inside the trailing constant blobs.
    for len in [4usize, 10, bytes.len() / 2, bytes.len() - 1] {
        let err = load_graph(&mut &bytes[..len]).expect_err("truncation must fail");
        assert!(
            matches!(err, PersistError::Corrupt { .. }),
            "prefix of {len} bytes gave {err:?}"
        );
    }

    let err = load_graph(&mut &bytes[..0]).expect_err("empty payload must fail");
    assert!(matches!(err, PersistError::Corrupt { offset: 0, .. }));
}

#[test]
fn unknown_future_version_is_rejected() {
    let mut bytes = Vec::new();
    bytes.extend_from_slice(b"FLOWGRPH");
    bytes.extend_from_slice(&99u32.to_le_bytes());
    let err = load_graph(&mut bytes.as_slice()).expect_err("future version must fail");
    match err {
        PersistError::UnsupportedVersion { found, newest } => {
            assert_eq!(found, 99);
            assert!(newest < 99);
        }
        other => panic!("expected UnsupportedVersion, got {other:?}"),
    }
}

#[test]
fn wrong_magic_is_corrupt() {
    let mut bytes = Vec::new();
    bytes.extend_from_slice(b"NOTGRAPH");
    bytes.extend_from_slice(&2u32.to_le_bytes());
    let err = load_graph(&mut bytes.as_slice()).expect_err("bad magic must fail");
    assert!(matches!(err, PersistError::Corrupt { offset: 0, .. }));
}

/// Hand-built v1 stream whose single node references node index 5, a
/// forward reference the loader must reject.
#[test]
fn forward_node_references_are_corrupt() {
    let mut bytes = Vec::new();
    bytes.extend_from_slice(b"FLOWGRPH");
    bytes.extend_from_slice(&1u32.to_le_bytes());

    let write_u32 = |bytes: &mut Vec<u8>, value: u32| bytes.extend_from_slice(&value.to_le_bytes());
    let write_str = |bytes: &mut Vec<u8>, value: &str| {
        bytes.extend_from_slice(&(value.len() as u32).to_le_bytes());
        bytes.extend_from_slice(value.as_bytes());
    };
    // tensor desc: unnamed f32 vector of length 1
    let write_desc = |bytes: &mut Vec<u8>| {
        bytes.push(0); // no name
        bytes.extend_from_slice(&DType::F32.tag().to_le_bytes());
        bytes.extend_from_slice(&1u32.to_le_bytes()); // rank
        bytes.push(0); // static dim
        bytes.extend_from_slice(&1u64.to_le_bytes());
    };

    write_u32(&mut bytes, 1); // one input
    write_desc(&mut bytes);
    write_u32(&mut bytes, 0); // no constants
    write_u32(&mut bytes, 1); // one node
    write_str(&mut bytes, "identity");
    write_u32(&mut bytes, 0); // no attrs
    write_u32(&mut bytes, 1); // one operand
    bytes.push(2); // node reference
    write_u32(&mut bytes, 5); // points past every node
    write_u32(&mut bytes, 0);
    write_u32(&mut bytes, 1); // one output
    write_desc(&mut bytes);
    write_u32(&mut bytes, 1); // one graph output
    bytes.push(2);
    write_u32(&mut bytes, 0);
    write_u32(&mut bytes, 0);

    let err = load_graph(&mut bytes.as_slice()).expect_err("forward reference must fail");
    match err {
        PersistError::Corrupt { reason, .. } => {
            assert!(reason.contains("node reference"), "reason was: {reason}")
        }
        other => panic!("expected Corrupt, got {other:?}"),
    }
}

#[test]
fn blob_length_mismatches_are_corrupt() {
    let graph = trace_from(&[f32_spec(&[2])], |tx, inputs| {
        let c = tx.constant(TensorLiteral::from_f32(Shape::from_static([2]), &[1.0, 2.0]));
        tx.apply("add", &[inputs[0].clone(), c], AttrMap::new())
    })
    .expect("trace succeeds");

    let mut bytes = Vec::new();
    save_graph(&graph, &mut bytes).expect("save succeeds");
    // The 8-byte constant blob is the file tail; drop half of it.
    bytes.truncate(bytes.len() - 4);
    let err = load_graph(&mut bytes.as_slice()).expect_err("short blob must fail");
    assert!(matches!(err, PersistError::Corrupt { .. }));
}

#[test]
fn json_export_describes_the_index() {
    let graph = sample_graph();
    let json = to_json_string(&graph).expect("json export succeeds");
    assert!(json.contains("\"transpose\""));
    assert!(json.contains("\"scale\""));
    assert!(!json.contains("bytes"), "payload bytes stay out of the index");
}

#[test]
fn path_round_trip() {
    let graph = sample_graph();
    let dir = std::env::temp_dir().join("flowgraph-graph-file-test");
    std::fs::create_dir_all(&dir).expect("temp dir");
    let path = dir.join("sample.fg");
    flowgraph::save_graph_to_path(&graph, &path).expect("save to path");
    let loaded = flowgraph::load_graph_from_path(&path).expect("load from path");
    assert!(loaded.structural_eq(&graph));
    std::fs::remove_file(&path).ok();
}
