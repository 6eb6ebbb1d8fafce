//! Versioned binary container for flow graphs.
//!
//! Layout: an 8-byte magic header, a little-endian `u32` format version,
//! then the payload. The current revision (version 2) stores a
//! length-prefixed bincode index describing inputs, constants, the node list
//! in canonical order, and outputs, followed by the raw constant payloads in
//! index order. Node connectivity is encoded purely through order plus
//! explicit input references, so no separate adjacency table is needed.
//! Version 1, the immediately prior revision, streams every record by hand
//! and keeps constant payloads inline; it remains fully loadable.
//!
//! Loading rebuilds a graph with fresh node identities; equality with the
//! saved graph is structural, never referential. Any truncation or
//! inconsistency fails with [`PersistError::Corrupt`]; a partial graph is
//! never returned.

use std::collections::HashMap;
use std::fs::File;
use std::io::{BufReader, BufWriter, Read, Write};
use std::path::Path;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::error::PersistError;
use crate::graph::{AttrMap, AttrValue, FlowGraph, OpId, OpKind, Operator};
use crate::tensor::{
    DType, DimSymbol, Dimension, Provenance, Shape, Tensor, TensorId, TensorLiteral, TensorSpec,
};

const MAGIC: &[u8; 8] = b"FLOWGRPH";
const VERSION_V1: u32 = 1;
const VERSION_V2: u32 = 2;
/// Newest revision written by [`save_graph`].
pub const CURRENT_VERSION: u32 = VERSION_V2;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct TensorDoc {
    name: Option<String>,
    spec: TensorSpec,
}

/// Position-based reference to a value available before a node executes.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
enum ValueRef {
    Input(u32),
    Constant(u32),
    Node { node: u32, output: u32 },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct ConstantDoc {
    name: Option<String>,
    spec: TensorSpec,
    byte_len: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct NodeDoc {
    kind: String,
    attrs: AttrMap,
    inputs: Vec<ValueRef>,
    outputs: Vec<TensorDoc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct GraphDoc {
    inputs: Vec<TensorDoc>,
    constants: Vec<ConstantDoc>,
    nodes: Vec<NodeDoc>,
    outputs: Vec<ValueRef>,
}

/// Serializes `graph` into `sink` using the current format version.
pub fn save_graph<W: Write>(graph: &FlowGraph, sink: &mut W) -> Result<(), PersistError> {
    let (doc, blobs) = encode_graph(graph);
    let index = bincode::serialize(&doc)?;
    let index_len = u32::try_from(index.len()).map_err(|_| PersistError::Unrepresentable {
        reason: "graph index exceeds the format's length field".to_string(),
    })?;

    sink.write_all(MAGIC)?;
    sink.write_all(&VERSION_V2.to_le_bytes())?;
    sink.write_all(&index_len.to_le_bytes())?;
    sink.write_all(&index)?;
    for blob in &blobs {
        sink.write_all(blob)?;
    }
    sink.flush()?;
    log::debug!(
        "saved graph: version {VERSION_V2}, {} nodes, {} constants, {} index bytes",
        doc.nodes.len(),
        doc.constants.len(),
        index.len(),
    );
    Ok(())
}

/// Serializes `graph` in the legacy streamed revision (version 1). Kept for
/// producing fixtures consumed by older readers.
pub fn save_graph_v1<W: Write>(graph: &FlowGraph, sink: &mut W) -> Result<(), PersistError> {
    let (doc, blobs) = encode_graph(graph);

    sink.write_all(MAGIC)?;
    sink.write_all(&VERSION_V1.to_le_bytes())?;

    write_u32(sink, doc.inputs.len())?;
    for input in &doc.inputs {
        write_tensor_doc(sink, input)?;
    }

    write_u32(sink, doc.constants.len())?;
    for (constant, blob) in doc.constants.iter().zip(&blobs) {
        write_tensor_doc(
            sink,
            &TensorDoc {
                name: constant.name.clone(),
                spec: constant.spec.clone(),
            },
        )?;
        sink.write_all(&(blob.len() as u64).to_le_bytes())?;
        sink.write_all(blob)?;
    }

    write_u32(sink, doc.nodes.len())?;
    for node in &doc.nodes {
        write_str(sink, &node.kind)?;
        write_u32(sink, node.attrs.len())?;
        for (key, value) in &node.attrs {
            write_str(sink, key)?;
            write_attr_value(sink, value)?;
        }
        write_u32(sink, node.inputs.len())?;
        for reference in &node.inputs {
            write_value_ref(sink, reference)?;
        }
        write_u32(sink, node.outputs.len())?;
        for output in &node.outputs {
            write_tensor_doc(sink, output)?;
        }
    }

    write_u32(sink, doc.outputs.len())?;
    for reference in &doc.outputs {
        write_value_ref(sink, reference)?;
    }
    sink.flush()?;
    Ok(())
}

/// Deserializes a graph from `source`, accepting any supported version.
pub fn load_graph<R: Read>(source: &mut R) -> Result<FlowGraph, PersistError> {
    let mut reader = CountingReader::new(source);

    let mut magic = [0u8; 8];
    reader.read_exact_buf(&mut magic)?;
    if &magic != MAGIC {
        return Err(PersistError::Corrupt {
            offset: 0,
            reason: "invalid magic header".to_string(),
        });
    }

    let version = reader.read_u32()?;
    let (doc, blobs) = match version {
        VERSION_V1 => read_v1(&mut reader)?,
        VERSION_V2 => read_v2(&mut reader)?,
        other => {
            return Err(PersistError::UnsupportedVersion {
                found: other,
                newest: CURRENT_VERSION,
            })
        }
    };

    let graph = realize_graph(doc, blobs, reader.offset())?;
    log::debug!(
        "loaded graph: version {version}, {} inputs, {} outputs, {} operators",
        graph.inputs().len(),
        graph.outputs().len(),
        graph.node_count(),
    );
    Ok(graph)
}

/// Writes `graph` to a file path using the current format version.
pub fn save_graph_to_path<P: AsRef<Path>>(graph: &FlowGraph, path: P) -> Result<(), PersistError> {
    let file = File::create(path)?;
    let mut writer = BufWriter::new(file);
    save_graph(graph, &mut writer)
}

/// Reads a graph back from a file path.
pub fn load_graph_from_path<P: AsRef<Path>>(path: P) -> Result<FlowGraph, PersistError> {
    let file = File::open(path)?;
    let mut reader = BufReader::new(file);
    load_graph(&mut reader)
}

/// Human-readable JSON rendering of the graph index, for debugging. Constant
/// payload bytes are elided (lengths remain).
pub fn to_json_string(graph: &FlowGraph) -> Result<String, PersistError> {
    let (doc, _blobs) = encode_graph(graph);
    serde_json::to_string_pretty(&doc).map_err(|err| PersistError::Unrepresentable {
        reason: format!("json encoding failed: {err}"),
    })
}

fn encode_graph(graph: &FlowGraph) -> (GraphDoc, Vec<Arc<[u8]>>) {
    let mut input_index: HashMap<TensorId, u32> = HashMap::new();
    for (index, tensor) in graph.inputs().iter().enumerate() {
        input_index.insert(tensor.id(), index as u32);
    }

    let mut node_positions: HashMap<OpId, u32> = HashMap::new();
    for (position, op) in graph.nodes().iter().enumerate() {
        node_positions.insert(op.id(), position as u32);
    }

    // Constants are numbered in first-reference order so the encoding is
    // deterministic for a given graph.
    let mut constant_index: HashMap<TensorId, u32> = HashMap::new();
    let mut constants = Vec::new();
    let mut blobs: Vec<Arc<[u8]>> = Vec::new();
    {
        let mut intern = |tensor: &Tensor| {
            if let Provenance::Constant(literal) = tensor.provenance() {
                if !constant_index.contains_key(&tensor.id()) {
                    constant_index.insert(tensor.id(), constants.len() as u32);
                    constants.push(ConstantDoc {
                        name: tensor.name().map(str::to_string),
                        spec: literal.spec.clone(),
                        byte_len: literal.byte_len() as u64,
                    });
                    blobs.push(Arc::clone(&literal.bytes));
                }
            }
        };
        for op in graph.nodes() {
            for tensor in op.inputs() {
                intern(tensor);
            }
        }
        for tensor in graph.outputs() {
            intern(tensor);
        }
    }

    let ref_of = |tensor: &Tensor| -> ValueRef {
        match tensor.provenance() {
            Provenance::Input { .. } => ValueRef::Input(input_index[&tensor.id()]),
            Provenance::Constant(_) => ValueRef::Constant(constant_index[&tensor.id()]),
            Provenance::Produced { op, index } => ValueRef::Node {
                node: node_positions[op],
                output: *index as u32,
            },
        }
    };

    let tensor_doc = |tensor: &Tensor| TensorDoc {
        name: tensor.name().map(str::to_string),
        spec: tensor.spec().clone(),
    };

    let nodes = graph
        .nodes()
        .iter()
        .map(|op| NodeDoc {
            kind: op.kind().as_str().to_string(),
            attrs: op.attrs().clone(),
            inputs: op.inputs().iter().map(&ref_of).collect(),
            outputs: op.outputs().iter().map(&tensor_doc).collect(),
        })
        .collect();

    let doc = GraphDoc {
        inputs: graph.inputs().iter().map(&tensor_doc).collect(),
        constants,
        nodes,
        outputs: graph.outputs().iter().map(&ref_of).collect(),
    };
    (doc, blobs)
}

/// Reconstructs a validated graph from a decoded document and its constant
/// payloads. `end_offset` localizes semantic failures for error reporting.
fn realize_graph(
    doc: GraphDoc,
    blobs: Vec<Arc<[u8]>>,
    end_offset: u64,
) -> Result<FlowGraph, PersistError> {
    let corrupt = |reason: String| PersistError::Corrupt {
        offset: end_offset,
        reason,
    };

    if doc.constants.len() != blobs.len() {
        return Err(corrupt(format!(
            "constant table lists {} entries but {} payloads are present",
            doc.constants.len(),
            blobs.len()
        )));
    }

    let inputs: Vec<Tensor> = doc
        .inputs
        .iter()
        .enumerate()
        .map(|(index, input)| {
            Tensor::input(
                index,
                input.spec.clone(),
                input.name.as_deref().map(Arc::<str>::from),
            )
        })
        .collect();

    let mut constants = Vec::with_capacity(doc.constants.len());
    for (constant, blob) in doc.constants.iter().zip(blobs) {
        if blob.len() as u64 != constant.byte_len {
            return Err(corrupt(format!(
                "constant payload is {} bytes, descriptor says {}",
                blob.len(),
                constant.byte_len
            )));
        }
        if let Some(expected) = constant.spec.byte_len() {
            if expected as u64 != constant.byte_len {
                return Err(corrupt(format!(
                    "constant payload is {} bytes but {} describes {} bytes",
                    constant.byte_len, constant.spec, expected
                )));
            }
        }
        constants.push(Tensor::constant(
            TensorLiteral::new(constant.spec.clone(), blob),
            constant.name.as_deref().map(Arc::<str>::from),
        ));
    }

    let mut nodes: Vec<Operator> = Vec::with_capacity(doc.nodes.len());
    let resolve = |reference: ValueRef,
                   limit: usize,
                   nodes: &[Operator]|
     -> Result<Tensor, PersistError> {
        match reference {
            ValueRef::Input(index) => inputs.get(index as usize).cloned().ok_or_else(|| {
                corrupt(format!("input reference {index} out of range"))
            }),
            ValueRef::Constant(index) => constants.get(index as usize).cloned().ok_or_else(|| {
                corrupt(format!("constant reference {index} out of range"))
            }),
            ValueRef::Node { node, output } => {
                let node = node as usize;
                if node >= limit {
                    return Err(corrupt(format!(
                        "node reference {node} points at or beyond node {limit}"
                    )));
                }
                nodes[node]
                    .outputs()
                    .get(output as usize)
                    .cloned()
                    .ok_or_else(|| {
                        corrupt(format!(
                            "output reference {output} out of range for node {node}"
                        ))
                    })
            }
        }
    };

    for (position, node) in doc.nodes.iter().enumerate() {
        let mut op_inputs = Vec::with_capacity(node.inputs.len());
        for reference in &node.inputs {
            op_inputs.push(resolve(*reference, position, &nodes)?);
        }
        let outputs = node
            .outputs
            .iter()
            .map(|output| {
                (
                    output.spec.clone(),
                    output.name.as_deref().map(Arc::<str>::from),
                )
            })
            .collect();
        nodes.push(Operator::from_parts(
            OpKind::new(node.kind.clone()),
            node.attrs.clone(),
            op_inputs,
            outputs,
        ));
    }

    let mut outputs = Vec::with_capacity(doc.outputs.len());
    for reference in &doc.outputs {
        outputs.push(resolve(*reference, nodes.len(), &nodes)?);
    }

    let candidates: HashMap<OpId, Operator> =
        nodes.iter().map(|op| (op.id(), op.clone())).collect();
    FlowGraph::assemble(inputs, outputs, &candidates)
        .map_err(|err| corrupt(format!("inconsistent graph structure: {err}")))
}

fn read_v2<R: Read>(reader: &mut CountingReader<R>) -> Result<(GraphDoc, Vec<Arc<[u8]>>), PersistError> {
    let index_offset = reader.offset();
    let index_len = reader.read_u32()? as usize;
    let index = reader.read_bytes(index_len)?;
    let doc: GraphDoc = bincode::deserialize(&index).map_err(|err| PersistError::Corrupt {
        offset: index_offset,
        reason: format!("failed to decode graph index: {err}"),
    })?;

    let mut blobs = Vec::with_capacity(doc.constants.len());
    for constant in &doc.constants {
        let byte_len = usize::try_from(constant.byte_len).map_err(|_| PersistError::Corrupt {
            offset: reader.offset(),
            reason: format!("constant payload length {} out of range", constant.byte_len),
        })?;
        blobs.push(Arc::<[u8]>::from(reader.read_bytes(byte_len)?));
    }
    Ok((doc, blobs))
}

fn read_v1<R: Read>(reader: &mut CountingReader<R>) -> Result<(GraphDoc, Vec<Arc<[u8]>>), PersistError> {
    let input_count = reader.read_u32()? as usize;
    let mut inputs = Vec::with_capacity(input_count);
    for _ in 0..input_count {
        inputs.push(read_tensor_doc(reader)?);
    }

    let constant_count = reader.read_u32()? as usize;
    let mut constants = Vec::with_capacity(constant_count);
    let mut blobs = Vec::with_capacity(constant_count);
    for _ in 0..constant_count {
        let desc = read_tensor_doc(reader)?;
        let byte_len = reader.read_u64()?;
        let byte_len = usize::try_from(byte_len).map_err(|_| PersistError::Corrupt {
            offset: reader.offset(),
            reason: format!("constant payload length {byte_len} out of range"),
        })?;
        let blob = reader.read_bytes(byte_len)?;
        constants.push(ConstantDoc {
            name: desc.name,
            spec: desc.spec,
            byte_len: byte_len as u64,
        });
        blobs.push(Arc::<[u8]>::from(blob));
    }

    let node_count = reader.read_u32()? as usize;
    let mut nodes = Vec::with_capacity(node_count);
    for _ in 0..node_count {
        let kind = reader.read_string()?;
        let attr_count = reader.read_u32()? as usize;
        let mut attrs = AttrMap::new();
        for _ in 0..attr_count {
            let key = reader.read_string()?;
            let value = read_attr_value(reader)?;
            attrs.insert(key, value);
        }
        let input_count = reader.read_u32()? as usize;
        let mut node_inputs = Vec::with_capacity(input_count);
        for _ in 0..input_count {
            node_inputs.push(read_value_ref(reader)?);
        }
        let output_count = reader.read_u32()? as usize;
        let mut outputs = Vec::with_capacity(output_count);
        for _ in 0..output_count {
            outputs.push(read_tensor_doc(reader)?);
        }
        nodes.push(NodeDoc {
            kind,
            attrs,
            inputs: node_inputs,
            outputs,
        });
    }

    let output_count = reader.read_u32()? as usize;
    let mut outputs = Vec::with_capacity(output_count);
    for _ in 0..output_count {
        outputs.push(read_value_ref(reader)?);
    }

    Ok((
        GraphDoc {
            inputs,
            constants,
            nodes,
            outputs,
        },
        blobs,
    ))
}

// ---- streamed record helpers (version 1) ----

fn write_u32<W: Write>(sink: &mut W, value: usize) -> Result<(), PersistError> {
    let value = u32::try_from(value).map_err(|_| PersistError::Unrepresentable {
        reason: format!("count {value} exceeds the format's length field"),
    })?;
    sink.write_all(&value.to_le_bytes())?;
    Ok(())
}

fn write_str<W: Write>(sink: &mut W, value: &str) -> Result<(), PersistError> {
    write_u32(sink, value.len())?;
    sink.write_all(value.as_bytes())?;
    Ok(())
}

fn write_tensor_doc<W: Write>(sink: &mut W, doc: &TensorDoc) -> Result<(), PersistError> {
    match &doc.name {
        Some(name) => {
            sink.write_all(&[1u8])?;
            write_str(sink, name)?;
        }
        None => sink.write_all(&[0u8])?,
    }
    sink.write_all(&doc.spec.dtype.tag().to_le_bytes())?;
    write_u32(sink, doc.spec.shape.rank())?;
    for dim in doc.spec.shape.dims() {
        match dim {
            Dimension::Static(extent) => {
                sink.write_all(&[0u8])?;
                sink.write_all(&(*extent as u64).to_le_bytes())?;
            }
            Dimension::Dynamic(symbol) => {
                sink.write_all(&[1u8])?;
                write_str(sink, symbol.as_str())?;
            }
        }
    }
    Ok(())
}

fn write_value_ref<W: Write>(sink: &mut W, reference: &ValueRef) -> Result<(), PersistError> {
    match reference {
        ValueRef::Input(index) => {
            sink.write_all(&[0u8])?;
            sink.write_all(&index.to_le_bytes())?;
        }
        ValueRef::Constant(index) => {
            sink.write_all(&[1u8])?;
            sink.write_all(&index.to_le_bytes())?;
        }
        ValueRef::Node { node, output } => {
            sink.write_all(&[2u8])?;
            sink.write_all(&node.to_le_bytes())?;
            sink.write_all(&output.to_le_bytes())?;
        }
    }
    Ok(())
}

fn write_attr_value<W: Write>(sink: &mut W, value: &AttrValue) -> Result<(), PersistError> {
    match value {
        AttrValue::Bool(value) => {
            sink.write_all(&[0u8, *value as u8])?;
        }
        AttrValue::I64(value) => {
            sink.write_all(&[1u8])?;
            sink.write_all(&value.to_le_bytes())?;
        }
        AttrValue::F64(value) => {
            sink.write_all(&[2u8])?;
            sink.write_all(&value.to_le_bytes())?;
        }
        AttrValue::String(value) => {
            sink.write_all(&[3u8])?;
            write_str(sink, value)?;
        }
        AttrValue::BoolArray(values) => {
            sink.write_all(&[4u8])?;
            write_u32(sink, values.len())?;
            for value in values {
                sink.write_all(&[*value as u8])?;
            }
        }
        AttrValue::I64Array(values) => {
            sink.write_all(&[5u8])?;
            write_u32(sink, values.len())?;
            for value in values {
                sink.write_all(&value.to_le_bytes())?;
            }
        }
        AttrValue::F64Array(values) => {
            sink.write_all(&[6u8])?;
            write_u32(sink, values.len())?;
            for value in values {
                sink.write_all(&value.to_le_bytes())?;
            }
        }
        AttrValue::StringArray(values) => {
            sink.write_all(&[7u8])?;
            write_u32(sink, values.len())?;
            for value in values {
                write_str(sink, value)?;
            }
        }
    }
    Ok(())
}

fn read_tensor_doc<R: Read>(reader: &mut CountingReader<R>) -> Result<TensorDoc, PersistError> {
    let name = if reader.read_u8()? != 0 {
        Some(reader.read_string()?)
    } else {
        None
    };
    let tag_offset = reader.offset();
    let dtype_tag = reader.read_u32()?;
    let dtype = DType::from_tag(dtype_tag).ok_or_else(|| PersistError::Corrupt {
        offset: tag_offset,
        reason: format!("unknown dtype tag {dtype_tag}"),
    })?;
    let rank = reader.read_u32()? as usize;
    let mut dims = Vec::with_capacity(rank);
    for _ in 0..rank {
        let kind = reader.read_u8()?;
        match kind {
            0 => {
                let extent = reader.read_u64()?;
                let extent = usize::try_from(extent).map_err(|_| PersistError::Corrupt {
                    offset: reader.offset(),
                    reason: format!("dimension extent {extent} out of range"),
                })?;
                dims.push(Dimension::Static(extent));
            }
            1 => {
                let symbol = reader.read_string()?;
                dims.push(Dimension::Dynamic(DimSymbol::new(symbol)));
            }
            other => {
                return Err(PersistError::Corrupt {
                    offset: reader.offset(),
                    reason: format!("unknown dimension kind {other}"),
                })
            }
        }
    }
    Ok(TensorDoc {
        name,
        spec: TensorSpec::new(dtype, Shape::new(dims)),
    })
}

fn read_value_ref<R: Read>(reader: &mut CountingReader<R>) -> Result<ValueRef, PersistError> {
    let tag_offset = reader.offset();
    let tag = reader.read_u8()?;
    match tag {
        0 => Ok(ValueRef::Input(reader.read_u32()?)),
        1 => Ok(ValueRef::Constant(reader.read_u32()?)),
        2 => Ok(ValueRef::Node {
            node: reader.read_u32()?,
            output: reader.read_u32()?,
        }),
        other => Err(PersistError::Corrupt {
            offset: tag_offset,
            reason: format!("unknown value reference tag {other}"),
        }),
    }
}

fn read_attr_value<R: Read>(reader: &mut CountingReader<R>) -> Result<AttrValue, PersistError> {
    let tag_offset = reader.offset();
    let tag = reader.read_u8()?;
    match tag {
        0 => Ok(AttrValue::Bool(reader.read_u8()? != 0)),
        1 => Ok(AttrValue::I64(reader.read_i64()?)),
        2 => Ok(AttrValue::F64(reader.read_f64()?)),
        3 => Ok(AttrValue::String(reader.read_string()?)),
        4 => {
            let count = reader.read_u32()? as usize;
            let mut values = Vec::with_capacity(count);
            for _ in 0..count {
                values.push(reader.read_u8()? != 0);
            }
            Ok(AttrValue::BoolArray(values))
        }
        5 => {
            let count = reader.read_u32()? as usize;
            let mut values = Vec::with_capacity(count);
            for _ in 0..count {
                values.push(reader.read_i64()?);
            }
            Ok(AttrValue::I64Array(values))
        }
        6 => {
            let count = reader.read_u32()? as usize;
            let mut values = Vec::with_capacity(count);
            for _ in 0..count {
                values.push(reader.read_f64()?);
            }
            Ok(AttrValue::F64Array(values))
        }
        7 => {
            let count = reader.read_u32()? as usize;
            let mut values = Vec::with_capacity(count);
            for _ in 0..count {
                values.push(reader.read_string()?);
            }
            Ok(AttrValue::StringArray(values))
        }
        other => Err(PersistError::Corrupt {
            offset: tag_offset,
            reason: format!("unknown attribute tag {other}"),
        }),
    }
}

/// Byte source that tracks the read offset so corruption errors can point at
/// the exact position.
struct CountingReader<'a, R: Read> {
    inner: &'a mut R,
    offset: u64,
}

impl<'a, R: Read> CountingReader<'a, R> {
    fn new(inner: &'a mut R) -> Self {
        Self { inner, offset: 0 }
    }

    fn offset(&self) -> u64 {
        self.offset
    }

    fn read_exact_buf(&mut self, buf: &mut [u8]) -> Result<(), PersistError> {
        let start = self.offset;
        match self.inner.read_exact(buf) {
            Ok(()) => {
                self.offset += buf.len() as u64;
                Ok(())
            }
            Err(err) if err.kind() == std::io::ErrorKind::UnexpectedEof => {
                Err(PersistError::Corrupt {
                    offset: start,
                    reason: "unexpected end of data".to_string(),
                })
            }
            Err(err) => Err(PersistError::Io(err)),
        }
    }

    fn read_bytes(&mut self, len: usize) -> Result<Vec<u8>, PersistError> {
        let mut buf = vec![0u8; len];
        self.read_exact_buf(&mut buf)?;
        Ok(buf)
    }

    fn read_u8(&mut self) -> Result<u8, PersistError> {
        let mut buf = [0u8; 1];
        self.read_exact_buf(&mut buf)?;
        Ok(buf[0])
    }

    fn read_u32(&mut self) -> Result<u32, PersistError> {
        let mut buf = [0u8; 4];
        self.read_exact_buf(&mut buf)?;
        Ok(u32::from_le_bytes(buf))
    }

    fn read_u64(&mut self) -> Result<u64, PersistError> {
        let mut buf = [0u8; 8];
        self.read_exact_buf(&mut buf)?;
        Ok(u64::from_le_bytes(buf))
    }

    fn read_i64(&mut self) -> Result<i64, PersistError> {
        let mut buf = [0u8; 8];
        self.read_exact_buf(&mut buf)?;
        Ok(i64::from_le_bytes(buf))
    }

    fn read_f64(&mut self) -> Result<f64, PersistError> {
        let mut buf = [0u8; 8];
        self.read_exact_buf(&mut buf)?;
        Ok(f64::from_le_bytes(buf))
    }

    fn read_string(&mut self) -> Result<String, PersistError> {
        let len_offset = self.offset;
        let len = self.read_u32()? as usize;
        let bytes = self.read_bytes(len)?;
        String::from_utf8(bytes).map_err(|_| PersistError::Corrupt {
            offset: len_offset,
            reason: "string payload is not valid utf-8".to_string(),
        })
    }
}
