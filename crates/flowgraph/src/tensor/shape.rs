//! Tensor shapes with static extents and named symbolic dimensions.

use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

/// Names a symbolic dynamic dimension (e.g. `?B` for a batch extent).
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct DimSymbol(Arc<str>);

impl DimSymbol {
    pub fn new(name: impl Into<String>) -> Self {
        Self(Arc::<str>::from(name.into()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Serialize for DimSymbol {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for DimSymbol {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let name = String::deserialize(deserializer)?;
        Ok(DimSymbol::new(name))
    }
}

/// Represents a single axis extent in a tensor shape.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Dimension {
    Static(usize),
    Dynamic(DimSymbol),
}

impl Dimension {
    /// Convenience constructor for static extents.
    pub fn from_usize(value: usize) -> Self {
        Self::Static(value)
    }

    /// Returns the static extent when present.
    pub fn as_static(&self) -> Option<usize> {
        match self {
            Dimension::Static(value) => Some(*value),
            Dimension::Dynamic(_) => None,
        }
    }
}

impl fmt::Display for Dimension {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Dimension::Static(value) => write!(f, "{value}"),
            Dimension::Dynamic(symbol) => write!(f, "?{}", symbol.as_str()),
        }
    }
}

/// Logical tensor shape as an ordered list of dimensions.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Shape {
    dims: Vec<Dimension>,
}

impl Shape {
    pub fn new(dims: impl Into<Vec<Dimension>>) -> Self {
        Self { dims: dims.into() }
    }

    /// Builds a fully static shape from plain extents.
    pub fn from_static(dims: impl IntoIterator<Item = usize>) -> Self {
        Self {
            dims: dims.into_iter().map(Dimension::Static).collect(),
        }
    }

    pub fn rank(&self) -> usize {
        self.dims.len()
    }

    pub fn dims(&self) -> &[Dimension] {
        &self.dims
    }

    pub fn into_dims(self) -> Vec<Dimension> {
        self.dims
    }

    /// Returns `true` when no axis is symbolic.
    pub fn is_fully_static(&self) -> bool {
        self.dims.iter().all(|dim| dim.as_static().is_some())
    }

    /// Returns static dimensions when all dims are static.
    pub fn static_dims(&self) -> Option<Vec<usize>> {
        let mut dims = Vec::with_capacity(self.dims.len());
        for dim in &self.dims {
            dims.push(dim.as_static()?);
        }
        Some(dims)
    }

    /// Returns element count when all dims are static and the product fits.
    pub fn element_count(&self) -> Option<usize> {
        let dims = self.static_dims()?;
        let mut count = 1usize;
        for dim in dims {
            count = count.checked_mul(dim)?;
        }
        Some(count)
    }
}

impl From<Vec<usize>> for Shape {
    fn from(dims: Vec<usize>) -> Self {
        Shape::from_static(dims)
    }
}

impl fmt::Display for Shape {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.dims.is_empty() {
            return f.write_str("[]");
        }
        for (axis, dim) in self.dims.iter().enumerate() {
            if axis > 0 {
                f.write_str("x")?;
            }
            write!(f, "{dim}")?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn element_count_requires_static_dims() {
        let static_shape = Shape::from_static([3, 4]);
        assert_eq!(static_shape.element_count(), Some(12));

        let symbolic = Shape::new(vec![
            Dimension::Dynamic(DimSymbol::new("B")),
            Dimension::Static(4),
        ]);
        assert_eq!(symbolic.element_count(), None);
        assert!(!symbolic.is_fully_static());
    }

    #[test]
    fn display_marks_symbolic_dims() {
        let shape = Shape::new(vec![
            Dimension::Dynamic(DimSymbol::new("B")),
            Dimension::Static(8),
        ]);
        assert_eq!(shape.to_string(), "?Bx8");
    }
}
