//! Shape definition and row-major index arithmetic.

use serde::{Deserialize, Serialize};

use crate::{OpcError, Result};

/// Tensor shape (dimensions), outermost first.
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Shape(pub Vec<usize>);

impl Shape {
    pub fn new(dims: impl Into<Vec<usize>>) -> Self {
        Self(dims.into())
    }

    /// Number of dimensions (rank).
    pub fn ndim(&self) -> usize {
        self.0.len()
    }

    /// Total number of elements.
    pub fn numel(&self) -> usize {
        self.0.iter().product()
    }

    pub fn dims(&self) -> &[usize] {
        &self.0
    }

    /// Resolve an axis that may be negative (counted from the back).
    pub fn resolve_axis(&self, axis: i64) -> Option<usize> {
        let ndim = self.0.len() as i64;
        let idx = if axis < 0 { ndim + axis } else { axis };
        (0..ndim).contains(&idx).then_some(idx as usize)
    }

    /// Get dimension at axis (supports negative indexing).
    pub fn dim(&self, axis: i64) -> Option<usize> {
        self.resolve_axis(axis).map(|idx| self.0[idx])
    }

    /// Row-major strides, in elements.
    pub fn strides(&self) -> Vec<usize> {
        let mut strides = vec![1usize; self.0.len()];
        for i in (0..self.0.len().saturating_sub(1)).rev() {
            strides[i] = strides[i + 1] * self.0[i + 1];
        }
        strides
    }

    /// Convert a flat row-major offset into a multi-index.
    pub fn unravel(&self, mut flat: usize) -> Vec<usize> {
        let mut index = vec![0usize; self.0.len()];
        for (axis, &dim) in self.0.iter().enumerate().rev() {
            if dim == 0 {
                continue;
            }
            index[axis] = flat % dim;
            flat /= dim;
        }
        index
    }

    /// Convert a multi-index into a flat row-major offset.
    pub fn ravel(&self, index: &[usize]) -> Option<usize> {
        if index.len() != self.0.len() {
            return None;
        }
        let mut flat = 0usize;
        for (&i, &dim) in index.iter().zip(&self.0) {
            if i >= dim {
                return None;
            }
            flat = flat * dim + i;
        }
        Some(flat)
    }

    /// Reject shapes a conformance scenario may not declare: rank 0, or any
    /// dimension of size zero.
    pub fn validate(&self) -> Result<()> {
        if self.0.is_empty() {
            return Err(OpcError::InvalidShape {
                shape: self.clone(),
                reason: "rank-0 shapes are not allowed".into(),
            });
        }
        if let Some(axis) = self.0.iter().position(|&d| d == 0) {
            return Err(OpcError::InvalidShape {
                shape: self.clone(),
                reason: format!("dimension {axis} is 0, every dimension must be >= 1"),
            });
        }
        Ok(())
    }
}

impl From<Vec<usize>> for Shape {
    fn from(dims: Vec<usize>) -> Self {
        Self(dims)
    }
}

impl From<&[usize]> for Shape {
    fn from(dims: &[usize]) -> Self {
        Self(dims.to_vec())
    }
}

impl<const N: usize> From<[usize; N]> for Shape {
    fn from(dims: [usize; N]) -> Self {
        Self(dims.to_vec())
    }
}

impl std::fmt::Display for Shape {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[")?;
        for (i, d) in self.0.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{d}")?;
        }
        write!(f, "]")
    }
}
