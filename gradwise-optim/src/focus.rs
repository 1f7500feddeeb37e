use crate::optimizer::RuleOptimizer;
use crate::rule::{bias_correction, dense_gradient, UpdateRule};
use crate::snapshot::{FieldReader, StateFields, StateValue};
use crate::state::ParamState;
use crate::validation::{validate_betas, validate_learning_rate, validate_non_negative};
use gradwise_core::tensor::utils::sign;
use gradwise_core::{tensor, Gradient, GradwiseError, Tensor};

/// Hyperparameters of [`Focus`].
#[derive(Clone, Debug, PartialEq)]
pub struct FocusConfig {
    pub lr: f32,
    /// Decay of the gradient-sign EMA (the pivot).
    pub beta1: f32,
    /// Decay of the parameter EMA used by the attraction term.
    pub beta2: f32,
    /// Strength of the pull towards the parameter EMA; `0` (the default)
    /// disables it.
    pub gamma: f32,
    /// Decoupled weight decay.
    pub weight_decay: f32,
    /// Scale the step by `|pivot_hat|` instead of taking its sign alone.
    pub scale_by_magnitude: bool,
}

impl Default for FocusConfig {
    fn default() -> Self {
        FocusConfig {
            lr: 1e-2,
            beta1: 0.9,
            beta2: 0.999,
            gamma: 0.0,
            weight_decay: 0.0,
            scale_by_magnitude: false,
        }
    }
}

/// FOCUS: sign-of-EMA-of-signs steps with an attraction towards the
/// parameter's own moving average (arXiv:2501.12243).
#[derive(Clone, Debug, PartialEq)]
pub struct Focus {
    config: FocusConfig,
}

#[derive(Clone, Debug, PartialEq)]
pub struct FocusState {
    pub step: u64,
    pub pivot: Tensor,
    /// Bias-corrected EMA of the parameter; equals the parameter exactly
    /// while it has not moved.
    pub param_avg: Tensor,
}

impl ParamState for FocusState {
    fn to_fields(&self) -> StateFields {
        StateFields::new()
            .with("step", StateValue::Int(self.step))
            .with("pivot", StateValue::Tensor(self.pivot.clone()))
            .with("param_avg", StateValue::Tensor(self.param_avg.clone()))
    }

    fn from_fields(fields: &FieldReader<'_>, shape: &[usize]) -> Result<Self, GradwiseError> {
        Ok(FocusState {
            step: fields.int("step")?,
            pivot: fields.tensor("pivot", shape)?,
            param_avg: fields.tensor("param_avg", shape)?,
        })
    }
}

pub type FocusOptimizer = RuleOptimizer<Focus>;

impl Focus {
    pub fn new(config: FocusConfig) -> Result<Self, GradwiseError> {
        validate_learning_rate(config.lr)?;
        validate_betas(&[config.beta1, config.beta2])?;
        validate_non_negative(config.gamma as f64, "gamma")?;
        validate_non_negative(config.weight_decay as f64, "weight_decay")?;
        Ok(Focus { config })
    }
}

impl UpdateRule for Focus {
    type State = FocusState;

    fn name(&self) -> String {
        "FOCUS".to_string()
    }

    fn learning_rate(&self) -> f32 {
        self.config.lr
    }

    fn init_state(&self, param: &Tensor) -> FocusState {
        FocusState {
            step: 0,
            pivot: tensor::zeros_like(param),
            param_avg: tensor::zeros_like(param),
        }
    }

    fn update(
        &self,
        param: &mut Tensor,
        grad: &Gradient,
        state: &mut FocusState,
        lr: f32,
    ) -> Result<(), GradwiseError> {
        let grad = dense_gradient(grad, param, "FOCUS")?;
        let FocusConfig {
            beta1,
            beta2,
            gamma,
            weight_decay,
            scale_by_magnitude,
            ..
        } = self.config;

        state
            .pivot
            .zip_apply_(grad, "FOCUS pivot", |m, g| beta1 * m + (1.0 - beta1) * sign(g))?;
        state.step += 1;

        let bc1 = bias_correction(beta1, state.step);
        // avg_hat += (1 - beta2) / (1 - beta2^t) * (p - avg_hat); the weight is
        // exactly 1 on the first step
        let avg_weight = (1.0 - beta2) / bias_correction(beta2, state.step);
        state
            .param_avg
            .zip_apply_(param, "FOCUS param_avg", |avg, p| avg + avg_weight * (p - avg))?;

        let pivot = state.pivot.data();
        let param_avg = state.param_avg.data();
        for ((p, &m), &avg) in param.data_mut().iter_mut().zip(pivot).zip(param_avg) {
            let pivot_hat = m / bc1;
            let mut direction = sign(pivot_hat);
            if scale_by_magnitude {
                direction *= pivot_hat.abs();
            }
            let attraction = if gamma != 0.0 {
                gamma * sign(*p - avg)
            } else {
                0.0
            };
            *p -= lr * (direction + attraction + weight_decay * *p);
        }
        Ok(())
    }

    fn config(&self) -> StateFields {
        StateFields::new()
            .with("lr", StateValue::Scalar(self.config.lr as f64))
            .with("beta1", StateValue::Scalar(self.config.beta1 as f64))
            .with("beta2", StateValue::Scalar(self.config.beta2 as f64))
            .with("gamma", StateValue::Scalar(self.config.gamma as f64))
            .with("weight_decay", StateValue::Scalar(self.config.weight_decay as f64))
            .with("scale_by_magnitude", StateValue::Flag(self.config.scale_by_magnitude))
    }

    fn from_config(&self, config: &FieldReader<'_>) -> Result<Self, GradwiseError> {
        Focus::new(FocusConfig {
            lr: config.scalar_f32("lr")?,
            beta1: config.scalar_f32("beta1")?,
            beta2: config.scalar_f32("beta2")?,
            gamma: config.scalar_f32("gamma")?,
            weight_decay: config.scalar_f32("weight_decay")?,
            scale_by_magnitude: config.flag("scale_by_magnitude")?,
        })
    }
}

#[cfg(test)]
#[path = "focus_test.rs"]
mod tests;
