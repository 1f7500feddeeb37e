// src/tensor/create.rs

use crate::error::GradwiseError;
use crate::tensor::Tensor;
use rand::distributions::{Distribution, Uniform};
use rand::Rng;
use rand_distr::StandardNormal;

/// Creates a new tensor filled with zeros with the specified shape.
pub fn zeros(shape: &[usize]) -> Tensor {
    full(shape, 0.0)
}

/// Creates a new tensor filled with ones with the specified shape.
pub fn ones(shape: &[usize]) -> Tensor {
    full(shape, 1.0)
}

/// Creates a new tensor filled with a specific value with the specified shape.
pub fn full(shape: &[usize], value: f32) -> Tensor {
    let numel = shape.iter().product();
    Tensor::from_parts(vec![value; numel], shape.to_vec())
}

/// Creates a new tensor filled with zeros, having the same shape as the input tensor.
pub fn zeros_like(tensor: &Tensor) -> Tensor {
    zeros(tensor.shape())
}

/// Samples a tensor from the standard normal distribution.
pub fn randn<R: Rng + ?Sized>(shape: &[usize], rng: &mut R) -> Tensor {
    let numel: usize = shape.iter().product();
    let data: Vec<f32> = (0..numel)
        .map(|_| <StandardNormal as Distribution<f32>>::sample(&StandardNormal, rng))
        .collect();
    Tensor::from_parts(data, shape.to_vec())
}

/// Samples a tensor uniformly from `[low, high)`.
pub fn uniform<R: Rng + ?Sized>(
    shape: &[usize],
    low: f32,
    high: f32,
    rng: &mut R,
) -> Result<Tensor, GradwiseError> {
    if !(low < high) {
        return Err(GradwiseError::InvalidInput(format!(
            "uniform requires low < high, got [{}, {})",
            low, high
        )));
    }
    let dist = Uniform::new(low, high);
    let numel: usize = shape.iter().product();
    let data: Vec<f32> = (0..numel).map(|_| dist.sample(rng)).collect();
    Ok(Tensor::from_parts(data, shape.to_vec()))
}

#[cfg(test)]
#[path = "create_test.rs"]
mod tests;
