// Reductions and out-of-place element-wise helpers.

use crate::error::GradwiseError;
use crate::tensor::Tensor;
use num_traits::Float;

/// Sign that maps zero to zero.
///
/// `f32::signum` returns `1.0` for `+0.0`; optimizers that follow the sign
/// of a moment estimate need frozen components to stay frozen. NaN stays NaN.
pub fn sign<T: Float>(x: T) -> T {
    if x > T::zero() {
        T::one()
    } else if x < T::zero() {
        -T::one()
    } else {
        // zero or NaN
        x * T::zero()
    }
}

/// Row-major strides for `shape`.
///
/// shape = [2, 3] -> strides = [3, 1]
pub fn contiguous_strides(shape: &[usize]) -> Vec<usize> {
    let mut strides = vec![1; shape.len()];
    for i in (0..shape.len().saturating_sub(1)).rev() {
        strides[i] = strides[i + 1] * shape[i + 1];
    }
    strides
}

impl Tensor {
    /// Element-wise [`sign`].
    pub fn sign(&self) -> Tensor {
        self.map(sign::<f32>)
    }

    pub fn map(&self, f: impl Fn(f32) -> f32) -> Tensor {
        let data = self.data().iter().map(|&x| f(x)).collect();
        Tensor::from_parts(data, self.shape().to_vec())
    }

    /// `out[i] = f(self[i], other[i])`
    pub fn zip_map(
        &self,
        other: &Tensor,
        operation: &str,
        f: impl Fn(f32, f32) -> f32,
    ) -> Result<Tensor, GradwiseError> {
        self.check_same_shape(other, operation)?;
        let data = self
            .data()
            .iter()
            .zip(other.data().iter())
            .map(|(&a, &b)| f(a, b))
            .collect();
        Ok(Tensor::from_parts(data, self.shape().to_vec()))
    }

    pub fn sub(&self, other: &Tensor) -> Result<Tensor, GradwiseError> {
        self.zip_map(other, "sub", |a, b| a - b)
    }

    /// Inner product of the flattened tensors, accumulated in `f64`.
    pub fn dot(&self, other: &Tensor) -> Result<f64, GradwiseError> {
        self.check_same_shape(other, "dot")?;
        Ok(self
            .data()
            .iter()
            .zip(other.data().iter())
            .map(|(&a, &b)| a as f64 * b as f64)
            .sum())
    }

    pub fn sum_squares(&self) -> f64 {
        self.data().iter().map(|&x| x as f64 * x as f64).sum()
    }

    /// Euclidean norm of the flattened tensor.
    pub fn norm(&self) -> f64 {
        self.sum_squares().sqrt()
    }

    pub fn mean(&self) -> f64 {
        if self.numel() == 0 {
            return 0.0;
        }
        self.data().iter().map(|&x| x as f64).sum::<f64>() / self.numel() as f64
    }
}

#[cfg(test)]
#[path = "utils_test.rs"]
mod tests;
