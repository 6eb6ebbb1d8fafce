//! Graph intermediate representation for tensor computation.
//!
//! The crate covers four stages of a graph's life:
//!
//! 1. **Build**: [`trace_from`] symbolically executes user computation
//!    against placeholder tensors and records every operator call into a
//!    [`FlowGraph`].
//! 2. **Inspect**: [`GraphVisitor`] folds a read-only function over the
//!    graph in deterministic post-order, once per node.
//! 3. **Transform**: [`GraphRewriter`] and [`RewritePipeline`] produce new
//!    graphs with rewritten interiors, sharing untouched structure with the
//!    original.
//! 4. **Persist**: [`save_graph`] / [`load_graph`] move graphs through a
//!    versioned binary container.
//!
//! Operator semantics live behind the [`registry::OpRegistry`] seam: the
//! core only runs shape/dtype inference rules and hands opaque execution
//! descriptors to whichever backend compiles the finished graph.

pub mod error;
pub mod graph;
pub mod io;
pub mod module;
pub mod registry;
pub mod tensor;

mod env;

pub use error::{PassError, PersistError, RewriteError, TraceError};
pub use graph::passes::{CommonSubexpressionEliminationPass, IdentityEliminationPass};
pub use graph::rewrite::{GraphRewriter, Rewrite, RewriteCtx, RewritePass, RewritePipeline};
pub use graph::trace::{trace_from, trace_from_named, Tracer};
pub use graph::visit::{GraphVisitor, VisitMap};
pub use graph::{AttrMap, AttrValue, FlowGraph, GraphError, OpId, OpKind, Operator};
pub use io::graph_file::{load_graph, load_graph_from_path, save_graph, save_graph_to_path};
pub use module::{Module, Sequential};
pub use registry::{InferenceError, OpRegistry, OpSchema};
pub use tensor::{
    DType, DimSymbol, Dimension, Provenance, Shape, Tensor, TensorId, TensorLiteral, TensorSpec,
};
