// In-place element-wise arithmetic on `Tensor`.
//
// Every binary method checks shapes before touching `self`, so a failed call
// leaves the receiver unchanged.

use crate::error::GradwiseError;
use crate::tensor::Tensor;

impl Tensor {
    /// `self *= scalar`
    pub fn mul_scalar_(&mut self, scalar: f32) {
        self.data_mut().iter_mut().for_each(|x| *x *= scalar);
    }

    /// `self += other`
    pub fn add_(&mut self, other: &Tensor) -> Result<(), GradwiseError> {
        self.zip_apply_(other, "add_", |a, b| a + b)
    }

    /// `self -= other`
    pub fn sub_(&mut self, other: &Tensor) -> Result<(), GradwiseError> {
        self.zip_apply_(other, "sub_", |a, b| a - b)
    }

    /// `self += alpha * other`
    pub fn add_scaled_(&mut self, other: &Tensor, alpha: f32) -> Result<(), GradwiseError> {
        self.zip_apply_(other, "add_scaled_", |a, b| a + alpha * b)
    }

    /// `self += weight * (end - self)`
    pub fn lerp_(&mut self, end: &Tensor, weight: f32) -> Result<(), GradwiseError> {
        self.zip_apply_(end, "lerp_", |a, b| a + weight * (b - a))
    }

    /// Exponential moving average: `self = beta * self + (1 - beta) * other`.
    pub fn ema_(&mut self, other: &Tensor, beta: f32) -> Result<(), GradwiseError> {
        self.zip_apply_(other, "ema_", |a, b| beta * a + (1.0 - beta) * b)
    }

    /// Exponential moving average of squares: `self = beta * self + (1 - beta) * other^2`.
    pub fn ema_sq_(&mut self, other: &Tensor, beta: f32) -> Result<(), GradwiseError> {
        self.zip_apply_(other, "ema_sq_", |a, b| beta * a + (1.0 - beta) * b * b)
    }

    /// Overwrites the elements of `self` with those of `other`.
    pub fn copy_from_(&mut self, other: &Tensor) -> Result<(), GradwiseError> {
        self.check_same_shape(other, "copy_from_")?;
        self.data_mut().copy_from_slice(other.data());
        Ok(())
    }

    /// Applies `f` to every element.
    pub fn map_(&mut self, f: impl Fn(f32) -> f32) {
        self.data_mut().iter_mut().for_each(|x| *x = f(*x));
    }

    /// `self[i] = f(self[i], other[i])` for every element.
    pub fn zip_apply_(
        &mut self,
        other: &Tensor,
        operation: &str,
        f: impl Fn(f32, f32) -> f32,
    ) -> Result<(), GradwiseError> {
        self.check_same_shape(other, operation)?;
        self.data_mut()
            .iter_mut()
            .zip(other.data().iter())
            .for_each(|(a, &b)| *a = f(*a, b));
        Ok(())
    }

    /// Adds `alpha * value` at each flat index, leaving other elements untouched.
    ///
    /// Used for sparse updates; indices are validated by `SparseTensor`.
    pub fn scatter_add_(&mut self, indices: &[usize], values: &[f32], alpha: f32) -> Result<(), GradwiseError> {
        let numel = self.numel();
        if let Some(&bad) = indices.iter().find(|&&i| i >= numel) {
            return Err(GradwiseError::IndexOutOfBounds {
                index: vec![bad],
                shape: self.shape().to_vec(),
            });
        }
        let data = self.data_mut();
        for (&i, &v) in indices.iter().zip(values.iter()) {
            data[i] += alpha * v;
        }
        Ok(())
    }
}

#[cfg(test)]
#[path = "inplace_ops_test.rs"]
mod tests;
