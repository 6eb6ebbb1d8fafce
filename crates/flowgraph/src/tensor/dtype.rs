//! Enumerates the scalar element types carried by symbolic tensors.

use serde::{Deserialize, Serialize};

/// Logical dtype identifier attached to every tensor in a graph.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DType {
    /// Single-bit boolean.
    I1,
    /// 8-bit signed integer.
    I8,
    /// 32-bit signed integer, primarily for index tensors.
    I32,
    /// 64-bit signed integer.
    I64,
    /// 16-bit floating point with full mantissa (fp16).
    F16,
    /// 16-bit bfloat16 precision as used by many accelerators.
    Bf16,
    /// 32-bit floating point following IEEE-754 semantics.
    F32,
    /// 64-bit floating point.
    F64,
}

impl DType {
    /// Returns the number of bytes required per scalar element.
    pub fn size_in_bytes(self) -> usize {
        match self {
            DType::I1 | DType::I8 => 1,
            DType::F16 | DType::Bf16 => 2,
            DType::I32 | DType::F32 => 4,
            DType::I64 | DType::F64 => 8,
        }
    }

    /// Returns `true` when the dtype is a floating-point representation.
    pub fn is_float(self) -> bool {
        matches!(self, DType::F16 | DType::Bf16 | DType::F32 | DType::F64)
    }

    /// Returns `true` when the dtype is a signed integer.
    pub fn is_integer(self) -> bool {
        matches!(self, DType::I8 | DType::I32 | DType::I64)
    }

    /// Produces a stable tag used by the streamed graph-file revision.
    pub fn tag(self) -> u32 {
        match self {
            DType::I1 => 0,
            DType::I8 => 1,
            DType::I32 => 2,
            DType::I64 => 3,
            DType::F16 => 4,
            DType::Bf16 => 5,
            DType::F32 => 6,
            DType::F64 => 7,
        }
    }

    /// Reconstructs a `DType` from its serialized tag representation.
    pub fn from_tag(tag: u32) -> Option<Self> {
        match tag {
            0 => Some(DType::I1),
            1 => Some(DType::I8),
            2 => Some(DType::I32),
            3 => Some(DType::I64),
            4 => Some(DType::F16),
            5 => Some(DType::Bf16),
            6 => Some(DType::F32),
            7 => Some(DType::F64),
            _ => None,
        }
    }
}

impl std::fmt::Display for DType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            DType::I1 => "i1",
            DType::I8 => "i8",
            DType::I32 => "i32",
            DType::I64 => "i64",
            DType::F16 => "f16",
            DType::Bf16 => "bf16",
            DType::F32 => "f32",
            DType::F64 => "f64",
        };
        f.write_str(name)
    }
}
