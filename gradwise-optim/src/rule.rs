//! Seams between the facade and the algorithms.
//!
//! An [`UpdateRule`] turns `(parameter, gradient, state)` into a new parameter
//! and state. A [`GradientTransform`] rewrites a gradient before it reaches a
//! rule. Wrappers such as `OrthoGrad<R>` and `Trac<R>` compose the two.

use crate::snapshot::{FieldReader, StateFields};
use crate::state::ParamState;
use gradwise_core::{Gradient, GradwiseError, Tensor};
use std::borrow::Cow;

pub trait UpdateRule: Send + Sync + Sized {
    type State: ParamState;

    /// Name recorded in snapshots, e.g. `FOCUS` or `OrthoGrad(SGD)`.
    fn name(&self) -> String;

    /// Learning rate used when a parameter group does not override it.
    fn learning_rate(&self) -> f32;

    /// Default state for a parameter, built before its first update.
    fn init_state(&self, param: &Tensor) -> Self::State;

    /// Applies one step to `param`.
    ///
    /// Implementations validate the gradient before mutating `param` or
    /// `state`, so an error leaves both untouched.
    fn update(
        &self,
        param: &mut Tensor,
        grad: &Gradient,
        state: &mut Self::State,
        lr: f32,
    ) -> Result<(), GradwiseError>;

    /// Checks a restored state against this rule's configuration, for
    /// invariants a single record cannot check on its own.
    fn check_state(&self, _state: &Self::State, _param_index: usize) -> Result<(), GradwiseError> {
        Ok(())
    }

    /// Complete configuration, nested rules included.
    fn config(&self) -> StateFields;

    /// A rule of the same kind configured from `config`.
    fn from_config(&self, config: &FieldReader<'_>) -> Result<Self, GradwiseError>;
}

pub trait GradientTransform: Send + Sync + Sized {
    fn name(&self) -> &'static str;

    /// Returns the gradient to hand on, borrowing `grad` when it is left as is.
    fn transform<'g>(
        &self,
        param: &Tensor,
        grad: &'g Gradient,
    ) -> Result<Cow<'g, Gradient>, GradwiseError>;

    fn config(&self) -> StateFields;

    fn from_config(&self, config: &FieldReader<'_>) -> Result<Self, GradwiseError>;
}

/// Borrows the dense tensor of `grad`, rejecting other layouts for `optimizer`.
pub fn dense_gradient<'g>(
    grad: &'g Gradient,
    param: &Tensor,
    optimizer: &str,
) -> Result<&'g Tensor, GradwiseError> {
    grad.check_shape(param.shape(), optimizer)?;
    match grad {
        Gradient::Dense(t) => Ok(t),
        Gradient::Sparse(_) => Err(GradwiseError::SparseGradientUnsupported {
            optimizer: optimizer.to_string(),
        }),
        Gradient::Opaque { layout, .. } => Err(GradwiseError::UnsupportedGradientLayout {
            layout: layout.clone(),
            operation: optimizer.to_string(),
        }),
    }
}

/// `1 - beta^step`
pub fn bias_correction(beta: f32, step: u64) -> f32 {
    let exponent = i32::try_from(step).unwrap_or(i32::MAX);
    1.0 - beta.powi(exponent)
}

#[cfg(test)]
#[path = "rule_test.rs"]
mod tests;
