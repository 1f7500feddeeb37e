use crate::error::GradwiseError;
use crate::sparse::SparseTensor;
use crate::tensor::Tensor;

/// A gradient as delivered by the autograd engine for one parameter.
///
/// The layout tag is set by the producer. Consumers branch on it and only
/// rely on index/value access for the sparse case.
#[derive(Clone, Debug, PartialEq)]
pub enum Gradient {
    Dense(Tensor),
    Sparse(SparseTensor),
    /// A layout this crate cannot read (device-resident, blocked, quantized...).
    Opaque { layout: String, shape: Vec<usize> },
}

impl Gradient {
    pub fn shape(&self) -> &[usize] {
        match self {
            Gradient::Dense(t) => t.shape(),
            Gradient::Sparse(s) => s.shape(),
            Gradient::Opaque { shape, .. } => shape,
        }
    }

    /// Name of the storage layout, as used in error messages.
    pub fn layout(&self) -> &str {
        match self {
            Gradient::Dense(_) => "strided",
            Gradient::Sparse(_) => "sparse_coo",
            Gradient::Opaque { layout, .. } => layout,
        }
    }

    pub fn is_sparse(&self) -> bool {
        matches!(self, Gradient::Sparse(_))
    }

    pub fn as_dense(&self) -> Option<&Tensor> {
        match self {
            Gradient::Dense(t) => Some(t),
            _ => None,
        }
    }

    /// Checks the gradient against the shape of the parameter it belongs to.
    pub fn check_shape(&self, expected: &[usize], operation: &str) -> Result<(), GradwiseError> {
        if self.shape() != expected {
            return Err(GradwiseError::ShapeMismatch {
                expected: expected.to_vec(),
                actual: self.shape().to_vec(),
                operation: operation.to_string(),
            });
        }
        Ok(())
    }
}

impl From<Tensor> for Gradient {
    fn from(tensor: Tensor) -> Self {
        Gradient::Dense(tensor)
    }
}

impl From<SparseTensor> for Gradient {
    fn from(sparse: SparseTensor) -> Self {
        Gradient::Sparse(sparse)
    }
}
