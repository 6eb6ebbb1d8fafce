//! Typed failure taxonomy for the graph core.
//!
//! Every error here is terminal for the operation that raised it: nothing is
//! retried internally, and a failed operation never leaves a partially built
//! graph behind.

use thiserror::Error;

use crate::graph::{GraphError, OpId};
use crate::registry::InferenceError;
use crate::tensor::TensorId;

/// Failures raised while recording a trace.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum TraceError {
    /// An operator was fed a tensor that does not belong to the active trace.
    #[error("tensor {tensor:?} does not belong to the active trace")]
    ForeignTensor { tensor: TensorId },
    /// The registry's shape/dtype inference rule rejected the call.
    #[error("shape inference failed for operator `{kind}`: {source}")]
    ShapeInference {
        kind: String,
        #[source]
        source: InferenceError,
    },
    /// `trace_from` was entered while another trace was already recording on
    /// this thread.
    #[error("a trace is already active on this thread")]
    NestedTrace,
    /// The operator kind is not present in the registry.
    #[error("operator kind `{kind}` is not registered")]
    UnknownOpKind { kind: String },
    /// The recorded computation violated a structural invariant.
    #[error(transparent)]
    Graph(#[from] GraphError),
}

/// Failures raised while rewriting a graph.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum RewriteError {
    /// A replacement left a consumed output position of the original
    /// operator without a counterpart.
    #[error(
        "replacement for operator `{kind}` ({op:?}) has {got} outputs but position {missing} is still consumed"
    )]
    ArityMismatch {
        op: OpId,
        kind: String,
        got: usize,
        missing: usize,
    },
    /// The rewrite wired a node to depend on its own rewritten output.
    #[error("rewrite made operator {op:?} depend on its own output")]
    CycleIntroduced { op: OpId },
    /// A replacement referenced a tensor whose producer is not part of the
    /// rewritten graph.
    #[error("replacement references tensor {tensor:?} with no producer in the rewritten graph")]
    UnknownProducer { tensor: TensorId },
    /// Building a replacement operator failed shape/dtype inference.
    #[error("shape inference failed for replacement operator `{kind}`: {source}")]
    ShapeInference {
        kind: String,
        #[source]
        source: InferenceError,
    },
    /// A replacement used an operator kind missing from the registry.
    #[error("operator kind `{kind}` is not registered")]
    UnknownOpKind { kind: String },
    /// The rewritten graph violated some other structural invariant.
    #[error(transparent)]
    Graph(#[from] GraphError),
}

/// A pipeline failure, carrying the identifying name of the pass that raised
/// the underlying error.
#[derive(Debug, Clone, PartialEq, Error)]
#[error("pass `{pass}` failed: {source}")]
pub struct PassError {
    pub pass: String,
    #[source]
    pub source: RewriteError,
}

/// Failures raised while saving or loading a persisted graph.
#[derive(Debug, Error)]
pub enum PersistError {
    /// The payload declares a format version this build does not read.
    #[error("graph file version {found} is not supported (newest supported version is {newest})")]
    UnsupportedVersion { found: u32, newest: u32 },
    /// The payload is truncated or structurally inconsistent.
    #[error("corrupt graph file at byte {offset}: {reason}")]
    Corrupt { offset: u64, reason: String },
    /// The graph index could not be encoded while saving.
    #[error("encode error: {0}")]
    Encode(#[from] bincode::Error),
    /// The graph exceeds a representational limit of the format.
    #[error("graph does not fit the format: {reason}")]
    Unrepresentable { reason: String },
    /// An underlying sink/source failure unrelated to payload structure.
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),
}
