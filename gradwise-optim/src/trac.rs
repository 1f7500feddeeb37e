//! TRAC: parameter-free scaling of a base rule's accumulated updates.
//!
//! The parameter is kept at `theta_ref + scale * delta`, where `delta` sums
//! the updates proposed by the base rule and `scale` is learned online by a
//! bank of discounted trackers, one per beta.

use crate::optimizer::RuleOptimizer;
use crate::rule::UpdateRule;
use crate::sgd::Sgd;
use crate::snapshot::{FieldReader, StateFields, StateValue};
use crate::state::ParamState;
use crate::validation::{validate_non_negative, validate_positive, validate_range, RangeType};
use gradwise_core::{tensor, Gradient, GradwiseError, Tensor};
use std::f64::consts::{FRAC_1_SQRT_2, PI};

#[derive(Clone, Debug, PartialEq)]
pub struct TracConfig {
    /// Discount factors of the trackers; one tracker per entry.
    pub betas: Vec<f64>,
    /// Terms of the `erfi` series.
    pub num_coefs: usize,
    /// Initial scale of each tracker.
    pub s_prev: f64,
    pub eps: f64,
}

impl Default for TracConfig {
    fn default() -> Self {
        TracConfig {
            betas: vec![0.9, 0.99, 0.999, 0.9999, 0.99999, 0.999999],
            num_coefs: 128,
            s_prev: 1e-8,
            eps: 1e-8,
        }
    }
}

/// Imaginary error function, `erfi(x) = -i erf(ix)`, from the first
/// `num_coefs` terms of its Maclaurin series.
pub fn erfi(x: f64, num_coefs: usize) -> f64 {
    let x2 = x * x;
    // term_n = x^(2n+1) / n!
    let mut term = x;
    let mut sum = 0.0;
    for n in 0..num_coefs {
        sum += term / (2 * n + 1) as f64;
        term *= x2 / (n + 1) as f64;
    }
    2.0 / PI.sqrt() * sum
}

/// TRAC wrapped around a base rule, SGD by default.
#[derive(Clone, Debug, PartialEq)]
pub struct Trac<R = Sgd> {
    config: TracConfig,
    inner: R,
    /// `s_prev / erfi(1/sqrt(2))`
    s_scale: f64,
}

#[derive(Clone, Debug, PartialEq)]
pub struct TracState<S> {
    pub step: u64,
    /// Parameter value when the state was created.
    pub theta_ref: Tensor,
    /// Sum of the base rule's proposed updates.
    pub delta: Tensor,
    pub variance: Vec<f64>,
    pub sigma: Vec<f64>,
    pub s: Vec<f64>,
    pub inner: S,
}

impl<S> TracState<S> {
    /// Current scale applied to `delta`: the tracker sum, floored at zero.
    pub fn scale(&self) -> f64 {
        self.s.iter().sum::<f64>().max(0.0)
    }
}

impl<S: ParamState> ParamState for TracState<S> {
    fn to_fields(&self) -> StateFields {
        StateFields::new()
            .with("step", StateValue::Int(self.step))
            .with("theta_ref", StateValue::Tensor(self.theta_ref.clone()))
            .with("delta", StateValue::Tensor(self.delta.clone()))
            .with("variance", StateValue::Vector(self.variance.clone()))
            .with("sigma", StateValue::Vector(self.sigma.clone()))
            .with("s", StateValue::Vector(self.s.clone()))
            .with("inner", StateValue::Section(self.inner.to_fields()))
    }

    fn from_fields(fields: &FieldReader<'_>, shape: &[usize]) -> Result<Self, GradwiseError> {
        let variance = fields.vector("variance")?.to_vec();
        let trackers = variance.len();
        Ok(TracState {
            step: fields.int("step")?,
            theta_ref: fields.tensor("theta_ref", shape)?,
            delta: fields.tensor("delta", shape)?,
            variance,
            sigma: fields.vector_of_len("sigma", trackers)?,
            s: fields.vector_of_len("s", trackers)?,
            inner: S::from_fields(&fields.nested(fields.component(), "inner")?, shape)?,
        })
    }
}

pub type TracOptimizer<R = Sgd> = RuleOptimizer<Trac<R>>;

impl<R: UpdateRule> Trac<R> {
    pub fn new(inner: R, config: TracConfig) -> Result<Self, GradwiseError> {
        if config.betas.is_empty() {
            return Err(GradwiseError::ConfigurationError(
                "TRAC needs at least one beta".to_string(),
            ));
        }
        for (i, &beta) in config.betas.iter().enumerate() {
            validate_range(beta, &format!("betas[{}]", i), 0.0, 1.0, RangeType::ClosedOpen)?;
        }
        validate_positive(config.num_coefs as f64, "num_coefs")?;
        validate_positive(config.s_prev, "s_prev")?;
        validate_non_negative(config.eps, "eps")?;

        let s_scale = config.s_prev / erfi(FRAC_1_SQRT_2, config.num_coefs);
        Ok(Trac {
            config,
            inner,
            s_scale,
        })
    }

    pub fn inner(&self) -> &R {
        &self.inner
    }

    pub fn settings(&self) -> &TracConfig {
        &self.config
    }
}

impl<R: UpdateRule> UpdateRule for Trac<R> {
    type State = TracState<R::State>;

    fn name(&self) -> String {
        format!("TRAC({})", self.inner.name())
    }

    fn learning_rate(&self) -> f32 {
        self.inner.learning_rate()
    }

    fn init_state(&self, param: &Tensor) -> Self::State {
        let trackers = self.config.betas.len();
        TracState {
            step: 0,
            theta_ref: param.clone(),
            delta: tensor::zeros_like(param),
            variance: vec![0.0; trackers],
            sigma: vec![0.0; trackers],
            s: vec![0.0; trackers],
            inner: self.inner.init_state(param),
        }
    }

    fn update(
        &self,
        param: &mut Tensor,
        grad: &Gradient,
        state: &mut Self::State,
        lr: f32,
    ) -> Result<(), GradwiseError> {
        grad.check_shape(param.shape(), "TRAC")?;
        let h = match grad {
            Gradient::Dense(g) => g.dot(&state.delta)?,
            Gradient::Sparse(g) => g.dot_dense(&state.delta)?,
            Gradient::Opaque { layout, .. } => {
                return Err(GradwiseError::UnsupportedGradientLayout {
                    layout: layout.clone(),
                    operation: "TRAC".to_string(),
                })
            }
        };

        let mut proposal = param.clone();
        self.inner.update(&mut proposal, grad, &mut state.inner, lr)?;
        let proposed = proposal.sub(param)?;
        state.delta.add_(&proposed)?;
        state.step += 1;

        let eps = self.config.eps;
        let trackers = self
            .config
            .betas
            .iter()
            .zip(state.variance.iter_mut())
            .zip(state.sigma.iter_mut())
            .zip(state.s.iter_mut());
        for (((&beta, variance), sigma), s) in trackers {
            *variance = beta * beta * *variance + h * h;
            *sigma = beta * *sigma - h;
            *s = self.s_scale * erfi(*sigma / ((2.0 * *variance).sqrt() + eps), self.config.num_coefs);
        }

        let scale = state.scale();
        let theta_ref = state.theta_ref.data();
        let delta = state.delta.data();
        for ((p, &r), &d) in param.data_mut().iter_mut().zip(theta_ref).zip(delta) {
            *p = (r as f64 + scale * d as f64) as f32;
        }
        log::trace!("TRAC step {}: h = {:e}, scale = {:e}", state.step, h, scale);
        Ok(())
    }

    fn check_state(&self, state: &Self::State, param_index: usize) -> Result<(), GradwiseError> {
        let expected = self.config.betas.len();
        if state.variance.len() != expected {
            return Err(GradwiseError::schema(
                format!("{} (parameter {})", self.name(), param_index),
                format!(
                    "state has {} tracker(s) but {} betas are configured",
                    state.variance.len(),
                    expected
                ),
            ));
        }
        self.inner.check_state(&state.inner, param_index)
    }

    fn config(&self) -> StateFields {
        StateFields::new()
            .with("betas", StateValue::Vector(self.config.betas.clone()))
            .with("num_coefs", StateValue::Int(self.config.num_coefs as u64))
            .with("s_prev", StateValue::Scalar(self.config.s_prev))
            .with("eps", StateValue::Scalar(self.config.eps))
            .with("inner", StateValue::Section(self.inner.config()))
    }

    fn from_config(&self, config: &FieldReader<'_>) -> Result<Self, GradwiseError> {
        let num_coefs = usize::try_from(config.int("num_coefs")?).map_err(|_| {
            GradwiseError::schema(config.component(), "num_coefs does not fit in usize")
        })?;
        let inner_name = self.inner.name();
        let inner = self.inner.from_config(&config.nested(&inner_name, "inner")?)?;
        Trac::new(
            inner,
            TracConfig {
                betas: config.vector("betas")?.to_vec(),
                num_coefs,
                s_prev: config.scalar("s_prev")?,
                eps: config.scalar("eps")?,
            },
        )
    }
}

#[cfg(test)]
#[path = "trac_test.rs"]
mod tests;
