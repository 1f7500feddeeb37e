//! Core data types for the gradwise optimizers: dense and sparse tensors,
//! gradients tagged by layout, shared parameters and the workspace error type.

pub mod error;
pub mod gradient;
pub mod nn;
pub mod sparse;
pub mod tensor;

pub use error::GradwiseError;
pub use gradient::Gradient;
pub use nn::{Parameter, SharedParameter};
pub use sparse::SparseTensor;
pub use tensor::Tensor;
