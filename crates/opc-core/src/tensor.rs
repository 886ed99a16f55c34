//! Host tensor: a shaped buffer of `f32` values in row-major order.
//!
//! A tensor's shape is fixed at construction. Values may be rewritten in
//! place through [`Tensor::data_mut`], but nothing can change the element
//! count or the shape afterwards.

use serde::Serialize;

use crate::{OpcError, Result, Shape};

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct Tensor {
    shape: Shape,
    data: Vec<f32>,
}

impl Tensor {
    // ── Constructors ────────────────────────────────────────────────────

    /// Create a tensor from f32 data.
    pub fn from_f32(data: &[f32], shape: &Shape) -> Result<Self> {
        Self::from_vec(data.to_vec(), shape.clone())
    }

    /// Create a tensor taking ownership of `data`.
    pub fn from_vec(data: Vec<f32>, shape: Shape) -> Result<Self> {
        let expected = shape.numel();
        if data.len() != expected {
            return Err(OpcError::InvalidArgument(format!(
                "data length {} does not match shape {} (expected {})",
                data.len(),
                shape,
                expected,
            )));
        }
        Ok(Self { shape, data })
    }

    /// Create a tensor filled with zeros.
    pub fn zeros(shape: &Shape) -> Self {
        Self::full(shape, 0.0)
    }

    /// Create a tensor with every element set to `value`.
    pub fn full(shape: &Shape, value: f32) -> Self {
        Self {
            shape: shape.clone(),
            data: vec![value; shape.numel()],
        }
    }

    /// Create a tensor whose element at flat offset `i` is `f(i)`.
    pub fn from_fn(shape: &Shape, f: impl FnMut(usize) -> f32) -> Self {
        Self {
            shape: shape.clone(),
            data: (0..shape.numel()).map(f).collect(),
        }
    }

    // ── Accessors ───────────────────────────────────────────────────────

    pub fn shape(&self) -> &Shape {
        &self.shape
    }

    pub fn data(&self) -> &[f32] {
        &self.data
    }

    /// Mutable view of the values. The shape stays fixed.
    pub fn data_mut(&mut self) -> &mut [f32] {
        &mut self.data
    }

    pub fn numel(&self) -> usize {
        self.data.len()
    }

    /// Element at a multi-index, or `None` if the index is out of bounds.
    pub fn get(&self, index: &[usize]) -> Option<f32> {
        self.shape.ravel(index).map(|flat| self.data[flat])
    }

    pub fn into_data(self) -> Vec<f32> {
        self.data
    }

    // ── Transforms ──────────────────────────────────────────────────────

    /// Apply `f` to every element, producing a new tensor of the same shape.
    pub fn map(&self, f: impl Fn(f32) -> f32) -> Tensor {
        Tensor {
            shape: self.shape.clone(),
            data: self.data.iter().map(|&x| f(x)).collect(),
        }
    }
}
