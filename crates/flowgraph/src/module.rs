//! Interfaces for the layer libraries that emit operators during tracing.
//!
//! The concrete layer zoo lives outside this crate; the core only fixes the
//! seam: a module consumes tensors of the active trace and emits operator
//! calls through the [`Tracer`]. [`Sequential`] is the one container shipped
//! here, since pipelines of modules are how traced models compose.

use crate::error::TraceError;
use crate::graph::trace::Tracer;
use crate::tensor::Tensor;

/// A unit of user computation that records operators into an active trace.
pub trait Module {
    /// Emits this module's computation for the given inputs, returning its
    /// outputs. All tensors must belong to the active trace.
    fn forward(
        &self,
        tracer: &mut Tracer<'_>,
        inputs: &[Tensor],
    ) -> Result<Vec<Tensor>, TraceError>;
}

/// Ordered container running each module on the previous module's outputs.
#[derive(Default)]
pub struct Sequential {
    modules: Vec<Box<dyn Module>>,
}

impl Sequential {
    pub fn new() -> Self {
        Self {
            modules: Vec::new(),
        }
    }

    /// Appends a module, builder style.
    pub fn push(mut self, module: impl Module + 'static) -> Self {
        self.modules.push(Box::new(module));
        self
    }

    pub fn len(&self) -> usize {
        self.modules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.modules.is_empty()
    }
}

impl Module for Sequential {
    fn forward(
        &self,
        tracer: &mut Tracer<'_>,
        inputs: &[Tensor],
    ) -> Result<Vec<Tensor>, TraceError> {
        let mut current = inputs.to_vec();
        for module in &self.modules {
            current = module.forward(tracer, &current)?;
        }
        Ok(current)
    }
}
