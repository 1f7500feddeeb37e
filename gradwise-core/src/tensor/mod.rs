// src/tensor/mod.rs

use crate::error::GradwiseError;
use approx::{AbsDiffEq, RelativeEq};
use serde::{Deserialize, Serialize};

pub mod create;
mod inplace_ops;
pub mod utils;

pub use create::{full, ones, randn, uniform, zeros, zeros_like};

/// A dense, contiguous, row-major `f32` tensor.
///
/// Tensors own their buffer. Cloning copies the data, so a clone never
/// aliases the original; optimizer snapshots rely on this.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "TensorRecord")]
pub struct Tensor {
    shape: Vec<usize>,
    data: Vec<f32>,
}

/// Unvalidated wire form of a [`Tensor`].
#[derive(Deserialize)]
struct TensorRecord {
    shape: Vec<usize>,
    data: Vec<f32>,
}

impl TryFrom<TensorRecord> for Tensor {
    type Error = GradwiseError;

    fn try_from(record: TensorRecord) -> Result<Self, Self::Error> {
        Tensor::new(record.data, record.shape)
    }
}

impl Tensor {
    /// Creates a new Tensor with the given data and shape.
    ///
    /// Fails with `TensorCreationError` when `data.len()` is not the product
    /// of `shape`. An empty shape denotes a scalar holding one element.
    pub fn new(data: Vec<f32>, shape: Vec<usize>) -> Result<Self, GradwiseError> {
        let numel: usize = shape.iter().product();
        if numel != data.len() {
            return Err(GradwiseError::TensorCreationError {
                data_len: data.len(),
                shape,
            });
        }
        Ok(Tensor { shape, data })
    }

    /// Builds a tensor whose length is already known to match its shape.
    pub(crate) fn from_parts(data: Vec<f32>, shape: Vec<usize>) -> Self {
        debug_assert_eq!(shape.iter().product::<usize>(), data.len());
        Tensor { shape, data }
    }

    pub fn shape(&self) -> &[usize] {
        &self.shape
    }

    pub fn rank(&self) -> usize {
        self.shape.len()
    }

    /// Returns the number of elements in the tensor.
    pub fn numel(&self) -> usize {
        self.data.len()
    }

    /// Flattened view of the elements in row-major order.
    pub fn data(&self) -> &[f32] {
        &self.data
    }

    pub fn data_mut(&mut self) -> &mut [f32] {
        &mut self.data
    }

    pub fn to_vec(&self) -> Vec<f32> {
        self.data.clone()
    }

    pub fn into_vec(self) -> Vec<f32> {
        self.data
    }

    /// Returns `Ok(())` if `other` has the same shape, `ShapeMismatch` otherwise.
    pub fn check_same_shape(&self, other: &Tensor, operation: &str) -> Result<(), GradwiseError> {
        if self.shape != other.shape {
            return Err(GradwiseError::ShapeMismatch {
                expected: self.shape.clone(),
                actual: other.shape.clone(),
                operation: operation.to_string(),
            });
        }
        Ok(())
    }
}

impl AbsDiffEq for Tensor {
    type Epsilon = f32;

    fn default_epsilon() -> f32 {
        f32::default_epsilon()
    }

    fn abs_diff_eq(&self, other: &Self, epsilon: f32) -> bool {
        self.shape == other.shape
            && self
                .data
                .iter()
                .zip(other.data.iter())
                .all(|(a, b)| a.abs_diff_eq(b, epsilon))
    }
}

impl RelativeEq for Tensor {
    fn default_max_relative() -> f32 {
        f32::default_max_relative()
    }

    fn relative_eq(&self, other: &Self, epsilon: f32, max_relative: f32) -> bool {
        self.shape == other.shape
            && self
                .data
                .iter()
                .zip(other.data.iter())
                .all(|(a, b)| a.relative_eq(b, epsilon, max_relative))
    }
}

#[cfg(test)]
#[path = "tensor_test.rs"]
mod tests;
