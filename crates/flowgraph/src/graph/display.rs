//! Indented text listing of a flow graph for logs and debugging.

use std::collections::HashMap;
use std::fmt;

use crate::tensor::{Provenance, Tensor, TensorId};

use super::FlowGraph;

impl fmt::Display for FlowGraph {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // Stable local numbering: inputs first, then every operator output in
        // canonical node order. Constants print inline.
        let mut numbering: HashMap<TensorId, usize> = HashMap::new();
        let mut next = 0usize;
        for tensor in self.inputs() {
            numbering.insert(tensor.id(), next);
            next += 1;
        }
        for op in self.nodes() {
            for out in op.outputs() {
                numbering.insert(out.id(), next);
                next += 1;
            }
        }

        let value_repr = |tensor: &Tensor| -> String {
            match tensor.provenance() {
                Provenance::Constant(literal) => format!("const({})", literal.spec),
                _ => match numbering.get(&tensor.id()) {
                    Some(number) => format!("%{number}"),
                    None => "%?".to_string(),
                },
            }
        };

        write_line(f, 0, "flow_graph {")?;
        if !self.inputs().is_empty() {
            write_line(f, 1, "inputs:")?;
            for tensor in self.inputs() {
                let name = tensor
                    .name()
                    .map(|name| format!(" \"{name}\""))
                    .unwrap_or_default();
                write_line(
                    f,
                    2,
                    &format!("{} : {}{}", value_repr(tensor), tensor.spec(), name),
                )?;
            }
        }
        if !self.nodes().is_empty() {
            write_line(f, 1, "body:")?;
            for op in self.nodes() {
                let operands = op
                    .inputs()
                    .iter()
                    .map(&value_repr)
                    .collect::<Vec<_>>()
                    .join(", ");
                let results = op
                    .outputs()
                    .iter()
                    .map(&value_repr)
                    .collect::<Vec<_>>()
                    .join(", ");
                let types = op
                    .outputs()
                    .iter()
                    .map(|out| out.spec().to_string())
                    .collect::<Vec<_>>()
                    .join(", ");
                let attrs = if op.attrs().is_empty() {
                    String::new()
                } else {
                    let entries = op
                        .attrs()
                        .iter()
                        .map(|(key, value)| format!("{key} = {value:?}"))
                        .collect::<Vec<_>>()
                        .join(", ");
                    format!(" {{{entries}}}")
                };
                write_line(
                    f,
                    2,
                    &format!("{results} = {}({operands}){attrs} -> {types}", op.kind()),
                )?;
            }
        }
        if !self.outputs().is_empty() {
            write_line(f, 1, "outputs:")?;
            for tensor in self.outputs() {
                write_line(f, 2, &value_repr(tensor))?;
            }
        }
        write_line(f, 0, "}")
    }
}

fn write_line(f: &mut fmt::Formatter<'_>, indent: usize, line: &str) -> fmt::Result {
    for _ in 0..indent {
        f.write_str("  ")?;
    }
    writeln!(f, "{line}")
}

#[cfg(test)]
mod tests {
    use crate::graph::trace::trace_from;
    use crate::graph::AttrMap;
    use crate::tensor::{DType, Shape, TensorSpec};

    #[test]
    fn listing_numbers_values_in_canonical_order() {
        let graph = trace_from(
            &[TensorSpec::new(DType::F32, Shape::from_static([3, 4]))],
            |tx, inputs| {
                let a = tx.apply("relu", &[inputs[0].clone()], AttrMap::new())?;
                tx.apply("exp", &[a[0].clone()], AttrMap::new())
            },
        )
        .expect("trace succeeds");

        let listing = graph.to_string();
        assert!(listing.contains("%0 : tensor<f32, 3x4>"));
        assert!(listing.contains("%1 = relu(%0)"));
        assert!(listing.contains("%2 = exp(%1)"));
        assert!(listing.trim_end().ends_with('}'));
    }
}
