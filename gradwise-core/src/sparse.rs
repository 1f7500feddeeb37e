use crate::error::GradwiseError;
use crate::tensor::{self, Tensor};

/// A sparse tensor in coordinate (COO) form over flat row-major offsets.
///
/// Indices are kept sorted and unique; duplicate entries are summed on
/// construction (the coalesced form).
#[derive(Clone, Debug, PartialEq)]
pub struct SparseTensor {
    shape: Vec<usize>,
    indices: Vec<usize>,
    values: Vec<f32>,
}

impl SparseTensor {
    /// Creates a sparse tensor from flat offsets and their values.
    pub fn new(shape: Vec<usize>, indices: Vec<usize>, values: Vec<f32>) -> Result<Self, GradwiseError> {
        if indices.len() != values.len() {
            return Err(GradwiseError::InvalidInput(format!(
                "sparse tensor has {} indices but {} values",
                indices.len(),
                values.len()
            )));
        }
        let numel: usize = shape.iter().product();
        if let Some(&bad) = indices.iter().find(|&&i| i >= numel) {
            return Err(GradwiseError::IndexOutOfBounds {
                index: vec![bad],
                shape,
            });
        }

        let mut entries: Vec<(usize, f32)> = indices.into_iter().zip(values).collect();
        entries.sort_by_key(|&(i, _)| i);
        let before = entries.len();
        let mut coalesced: Vec<(usize, f32)> = Vec::with_capacity(before);
        for (i, v) in entries {
            if let Some((last, acc)) = coalesced.last_mut() {
                if *last == i {
                    *acc += v;
                    continue;
                }
            }
            coalesced.push((i, v));
        }
        if coalesced.len() != before {
            log::warn!(
                "Coalesced {} duplicate sparse indices for shape {:?}",
                before - coalesced.len(),
                shape
            );
        }

        let (indices, values): (Vec<usize>, Vec<f32>) = coalesced.into_iter().unzip();
        Ok(SparseTensor { shape, indices, values })
    }

    /// Creates a sparse tensor from per-dimension coordinates.
    pub fn from_coordinates(
        shape: Vec<usize>,
        coordinates: &[Vec<usize>],
        values: Vec<f32>,
    ) -> Result<Self, GradwiseError> {
        let strides = tensor::utils::contiguous_strides(&shape);
        let mut flat = Vec::with_capacity(coordinates.len());
        for coord in coordinates {
            if coord.len() != shape.len() || coord.iter().zip(shape.iter()).any(|(&c, &d)| c >= d) {
                return Err(GradwiseError::IndexOutOfBounds {
                    index: coord.clone(),
                    shape,
                });
            }
            flat.push(coord.iter().zip(strides.iter()).map(|(c, s)| c * s).sum());
        }
        SparseTensor::new(shape, flat, values)
    }

    pub fn shape(&self) -> &[usize] {
        &self.shape
    }

    /// Number of stored (explicit) entries.
    pub fn nnz(&self) -> usize {
        self.indices.len()
    }

    pub fn indices(&self) -> &[usize] {
        &self.indices
    }

    pub fn values(&self) -> &[f32] {
        &self.values
    }

    pub fn iter(&self) -> impl Iterator<Item = (usize, f32)> + '_ {
        self.indices.iter().copied().zip(self.values.iter().copied())
    }

    /// Materializes the tensor, filling unlisted positions with zero.
    pub fn to_dense(&self) -> Tensor {
        let mut dense = tensor::zeros(&self.shape);
        let data = dense.data_mut();
        for (i, v) in self.iter() {
            data[i] = v;
        }
        dense
    }

    /// Inner product with a dense tensor of the same shape.
    pub fn dot_dense(&self, other: &Tensor) -> Result<f64, GradwiseError> {
        if self.shape != other.shape() {
            return Err(GradwiseError::ShapeMismatch {
                expected: self.shape.clone(),
                actual: other.shape().to_vec(),
                operation: "sparse dot".to_string(),
            });
        }
        let data = other.data();
        Ok(self.iter().map(|(i, v)| v as f64 * data[i] as f64).sum())
    }
}

#[cfg(test)]
#[path = "sparse_test.rs"]
mod tests;
