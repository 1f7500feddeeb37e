use crate::error::GradwiseError;
use crate::gradient::Gradient;
use crate::tensor::Tensor;
use std::fmt;
use std::ops::Deref;
use std::sync::{Arc, RwLock};

/// A parameter shared between the training loop and an optimizer.
pub type SharedParameter = Arc<RwLock<Parameter>>;

/// A learnable tensor together with the gradient supplied for the current step.
///
/// The training loop owns parameters; optimizers only mutate their values.
#[derive(Clone)]
pub struct Parameter {
    tensor: Tensor,
    name: Option<String>,
    grad: Option<Gradient>,
}

impl Parameter {
    pub fn new(tensor: Tensor, name: Option<String>) -> Self {
        Parameter {
            tensor,
            name,
            grad: None,
        }
    }

    pub fn new_unnamed(tensor: Tensor) -> Self {
        Parameter::new(tensor, None)
    }

    /// Wraps the parameter for sharing with an optimizer.
    pub fn into_shared(self) -> SharedParameter {
        Arc::new(RwLock::new(self))
    }

    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    pub fn tensor(&self) -> &Tensor {
        &self.tensor
    }

    pub fn tensor_mut(&mut self) -> &mut Tensor {
        &mut self.tensor
    }

    /// Consumes the Parameter and returns the underlying Tensor.
    pub fn into_inner(self) -> Tensor {
        self.tensor
    }

    pub fn grad(&self) -> Option<&Gradient> {
        self.grad.as_ref()
    }

    /// Sets the gradient for the current step, replacing any previous one.
    pub fn set_grad(&mut self, grad: impl Into<Gradient>) -> Result<(), GradwiseError> {
        let grad = grad.into();
        grad.check_shape(self.tensor.shape(), "Parameter::set_grad")?;
        self.grad = Some(grad);
        Ok(())
    }

    pub fn clear_grad(&mut self) {
        self.grad = None;
    }

    /// Mutable access to the value alongside a shared borrow of the gradient.
    pub fn value_and_grad_mut(&mut self) -> (&mut Tensor, Option<&Gradient>) {
        (&mut self.tensor, self.grad.as_ref())
    }
}

// Allow accessing the underlying Tensor immutably via Deref.
impl Deref for Parameter {
    type Target = Tensor;

    fn deref(&self) -> &Self::Target {
        &self.tensor
    }
}

impl fmt::Debug for Parameter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Parameter({}, shape={:?}, grad={})",
            self.name().unwrap_or("<unnamed>"),
            self.tensor.shape(),
            self.grad.as_ref().map_or("none", |g| g.layout())
        )
    }
}

#[cfg(test)]
#[path = "parameter_test.rs"]
mod tests;
