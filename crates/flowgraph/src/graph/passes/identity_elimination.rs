//! Removes `identity` operators by forwarding their input.

use crate::error::RewriteError;
use crate::graph::rewrite::{Rewrite, RewriteCtx, RewritePass};
use crate::graph::Operator;
use crate::tensor::Tensor;

#[derive(Default)]
pub struct IdentityEliminationPass;

impl IdentityEliminationPass {
    pub fn new() -> Self {
        Self
    }
}

impl RewritePass for IdentityEliminationPass {
    fn name(&self) -> &'static str {
        "identity-elimination"
    }

    fn rewrite_operator(
        &mut self,
        _cx: &mut RewriteCtx<'_>,
        op: &Operator,
        inputs: &[Tensor],
    ) -> Result<Rewrite, RewriteError> {
        if op.kind().is("identity") && inputs.len() == 1 && op.outputs().len() == 1 {
            return Ok(Some(vec![inputs[0].clone()]));
        }
        Ok(None)
    }
}
