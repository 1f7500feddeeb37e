use crate::optimizer::RuleOptimizer;
use crate::rule::{dense_gradient, UpdateRule};
use crate::snapshot::{FieldReader, StateFields, StateValue};
use crate::state::ParamState;
use crate::validation::{validate_learning_rate, validate_non_negative};
use gradwise_core::{tensor, Gradient, GradwiseError, Tensor};

/// Hyperparameters of [`Sgd`].
#[derive(Clone, Debug, PartialEq)]
pub struct SgdConfig {
    pub lr: f32,
    pub momentum: f32,
    pub dampening: f32,
    pub nesterov: bool,
    /// L2 penalty added to the gradient.
    pub weight_decay: f32,
}

impl Default for SgdConfig {
    fn default() -> Self {
        SgdConfig {
            lr: 1e-2,
            momentum: 0.0,
            dampening: 0.0,
            nesterov: false,
            weight_decay: 0.0,
        }
    }
}

/// Stochastic gradient descent with optional momentum and Nesterov momentum.
///
/// With neither momentum nor weight decay it also accepts sparse gradients,
/// touching only the listed elements.
#[derive(Clone, Debug, PartialEq)]
pub struct Sgd {
    config: SgdConfig,
}

#[derive(Clone, Debug, PartialEq)]
pub struct SgdState {
    pub step: u64,
    pub momentum_buffer: Tensor,
}

impl ParamState for SgdState {
    fn to_fields(&self) -> StateFields {
        StateFields::new()
            .with("step", StateValue::Int(self.step))
            .with("momentum_buffer", StateValue::Tensor(self.momentum_buffer.clone()))
    }

    fn from_fields(fields: &FieldReader<'_>, shape: &[usize]) -> Result<Self, GradwiseError> {
        Ok(SgdState {
            step: fields.int("step")?,
            momentum_buffer: fields.tensor("momentum_buffer", shape)?,
        })
    }
}

pub type SgdOptimizer = RuleOptimizer<Sgd>;

impl Sgd {
    pub fn new(config: SgdConfig) -> Result<Self, GradwiseError> {
        validate_learning_rate(config.lr)?;
        validate_non_negative(config.momentum as f64, "momentum")?;
        validate_non_negative(config.dampening as f64, "dampening")?;
        validate_non_negative(config.weight_decay as f64, "weight_decay")?;
        if config.nesterov && (config.momentum <= 0.0 || config.dampening != 0.0) {
            return Err(GradwiseError::ConfigurationError(
                "Nesterov momentum requires a momentum and zero dampening".to_string(),
            ));
        }
        Ok(Sgd { config })
    }

    fn sparse_capable(&self) -> bool {
        self.config.momentum == 0.0 && self.config.weight_decay == 0.0
    }
}

impl UpdateRule for Sgd {
    type State = SgdState;

    fn name(&self) -> String {
        "SGD".to_string()
    }

    fn learning_rate(&self) -> f32 {
        self.config.lr
    }

    fn init_state(&self, param: &Tensor) -> SgdState {
        SgdState {
            step: 0,
            momentum_buffer: tensor::zeros_like(param),
        }
    }

    fn update(
        &self,
        param: &mut Tensor,
        grad: &Gradient,
        state: &mut SgdState,
        lr: f32,
    ) -> Result<(), GradwiseError> {
        if let Gradient::Sparse(sparse) = grad {
            grad.check_shape(param.shape(), "SGD")?;
            if !self.sparse_capable() {
                return Err(GradwiseError::SparseGradientUnsupported {
                    optimizer: "SGD with momentum or weight decay".to_string(),
                });
            }
            param.scatter_add_(sparse.indices(), sparse.values(), -lr)?;
            state.step += 1;
            return Ok(());
        }

        let grad = dense_gradient(grad, param, "SGD")?;
        let SgdConfig {
            momentum,
            dampening,
            nesterov,
            weight_decay,
            ..
        } = self.config;

        let mut d_p = grad.clone();
        if weight_decay != 0.0 {
            d_p.add_scaled_(param, weight_decay)?;
        }

        if momentum != 0.0 {
            let buf = &mut state.momentum_buffer;
            if state.step == 0 {
                buf.copy_from_(&d_p)?;
            } else {
                buf.mul_scalar_(momentum);
                buf.add_scaled_(&d_p, 1.0 - dampening)?;
            }
            if nesterov {
                d_p.add_scaled_(buf, momentum)?;
            } else {
                d_p.copy_from_(buf)?;
            }
        }

        param.add_scaled_(&d_p, -lr)?;
        state.step += 1;
        Ok(())
    }

    fn config(&self) -> StateFields {
        StateFields::new()
            .with("lr", StateValue::Scalar(self.config.lr as f64))
            .with("momentum", StateValue::Scalar(self.config.momentum as f64))
            .with("dampening", StateValue::Scalar(self.config.dampening as f64))
            .with("nesterov", StateValue::Flag(self.config.nesterov))
            .with("weight_decay", StateValue::Scalar(self.config.weight_decay as f64))
    }

    fn from_config(&self, config: &FieldReader<'_>) -> Result<Self, GradwiseError> {
        Sgd::new(SgdConfig {
            lr: config.scalar_f32("lr")?,
            momentum: config.scalar_f32("momentum")?,
            dampening: config.scalar_f32("dampening")?,
            nesterov: config.flag("nesterov")?,
            weight_decay: config.scalar_f32("weight_decay")?,
        })
    }
}

#[cfg(test)]
#[path = "sgd_test.rs"]
mod tests;
