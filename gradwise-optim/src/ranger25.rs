//! Ranger25: a fixed pipeline of OrthoGrad, weight decay, AdEMAMix moments,
//! a cautious mask, an atan2 step and Lookahead, run per parameter.

use crate::optimizer::RuleOptimizer;
use crate::orthograd::{OrthoGradConfig, OrthoGradTransform};
use crate::rule::{bias_correction, dense_gradient, GradientTransform, UpdateRule};
use crate::snapshot::{FieldReader, StateFields, StateValue};
use crate::state::ParamState;
use crate::validation::{
    validate_betas, validate_learning_rate, validate_non_negative, validate_range, RangeType,
};
use gradwise_core::{tensor, Gradient, GradwiseError, Tensor};
use std::borrow::Cow;

/// Lower bound on the surviving fraction used to rescale the cautious mask.
const CAUTIOUS_MIN_FRACTION: f64 = 1e-3;

#[derive(Clone, Debug, PartialEq)]
pub struct Ranger25Config {
    pub lr: f32,
    /// Decays of `exp_avg`, `exp_avg_sq` and `exp_avg_slow`.
    pub betas: (f32, f32, f32),
    /// Weight of the slow EMA in the numerator.
    pub alpha: f32,
    /// Warm-up length for `alpha` and `beta3`; `None` disables the warm-up.
    pub t_alpha_beta3: Option<u64>,
    pub lookahead_merge_time: u64,
    pub lookahead_blending_alpha: f32,
    pub weight_decay: f32,
    /// Shrink the parameter directly instead of adding `wd * p` to the gradient.
    pub weight_decouple: bool,
    pub cautious: bool,
    pub orthograd: bool,
    /// Settings of the OrthoGrad stage, used when `orthograd` is on.
    pub orthograd_config: OrthoGradConfig,
}

impl Default for Ranger25Config {
    fn default() -> Self {
        Ranger25Config {
            lr: 1e-3,
            betas: (0.9, 0.98, 0.9999),
            alpha: 5.0,
            t_alpha_beta3: None,
            lookahead_merge_time: 5,
            lookahead_blending_alpha: 0.5,
            weight_decay: 1e-3,
            weight_decouple: true,
            cautious: true,
            orthograd: true,
            orthograd_config: OrthoGradConfig::default(),
        }
    }
}

impl Ranger25Config {
    /// Stage names in execution order, as recorded in snapshots.
    pub fn pipeline(&self) -> Vec<&'static str> {
        let mut stages = Vec::with_capacity(6);
        if self.orthograd {
            stages.push("orthograd");
        }
        stages.extend(["weight_decay", "ademamix"]);
        if self.cautious {
            stages.push("cautious");
        }
        stages.extend(["atan2", "lookahead"]);
        stages
    }
}

/// `alpha` ramped linearly over the warm-up.
pub fn schedule_alpha(t_alpha_beta3: Option<u64>, step: u64, alpha: f32) -> f32 {
    match t_alpha_beta3 {
        Some(t) => (step as f32 * alpha / t as f32).min(alpha),
        None => alpha,
    }
}

/// `beta3` ramped from `beta1` so that the EMA half-life grows linearly.
pub fn schedule_beta3(t_alpha_beta3: Option<u64>, step: u64, beta1: f32, beta3: f32) -> f32 {
    let t = match t_alpha_beta3 {
        Some(t) => t as f64,
        None => return beta3,
    };
    let progress = step as f64 / t;
    let log_beta1 = (beta1 as f64).ln();
    let log_beta3 = (beta3 as f64).ln();
    let scheduled = (log_beta1 * log_beta3 / ((1.0 - progress) * log_beta3 + progress * log_beta1)).exp();
    (scheduled as f32).min(beta3)
}

#[derive(Clone, Debug)]
pub struct Ranger25 {
    config: Ranger25Config,
    orthograd: Option<OrthoGradTransform>,
}

impl PartialEq for Ranger25 {
    fn eq(&self, other: &Self) -> bool {
        self.config == other.config
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct Ranger25State {
    pub step: u64,
    pub exp_avg: Tensor,
    pub exp_avg_sq: Tensor,
    pub exp_avg_slow: Tensor,
    /// Lookahead slow weights.
    pub slow_param: Tensor,
}

impl ParamState for Ranger25State {
    fn to_fields(&self) -> StateFields {
        let ademamix = StateFields::new()
            .with("exp_avg", StateValue::Tensor(self.exp_avg.clone()))
            .with("exp_avg_sq", StateValue::Tensor(self.exp_avg_sq.clone()))
            .with("exp_avg_slow", StateValue::Tensor(self.exp_avg_slow.clone()));
        let lookahead = StateFields::new().with("slow_param", StateValue::Tensor(self.slow_param.clone()));
        StateFields::new()
            .with("step", StateValue::Int(self.step))
            .with("ademamix", StateValue::Section(ademamix))
            .with("lookahead", StateValue::Section(lookahead))
    }

    fn from_fields(fields: &FieldReader<'_>, shape: &[usize]) -> Result<Self, GradwiseError> {
        let ademamix = fields.nested("Ranger25.ademamix", "ademamix")?;
        let lookahead = fields.nested("Ranger25.lookahead", "lookahead")?;
        Ok(Ranger25State {
            step: fields.int("step")?,
            exp_avg: ademamix.tensor("exp_avg", shape)?,
            exp_avg_sq: ademamix.tensor("exp_avg_sq", shape)?,
            exp_avg_slow: ademamix.tensor("exp_avg_slow", shape)?,
            slow_param: lookahead.tensor("slow_param", shape)?,
        })
    }
}

pub type Ranger25Optimizer = RuleOptimizer<Ranger25>;

impl Ranger25 {
    pub fn new(config: Ranger25Config) -> Result<Self, GradwiseError> {
        validate_learning_rate(config.lr)?;
        validate_betas(&[config.betas.0, config.betas.1, config.betas.2])?;
        validate_non_negative(config.alpha as f64, "alpha")?;
        validate_non_negative(config.weight_decay as f64, "weight_decay")?;
        validate_range(
            config.lookahead_blending_alpha as f64,
            "lookahead_blending_alpha",
            0.0,
            1.0,
            RangeType::Closed,
        )?;
        if config.lookahead_merge_time == 0 {
            return Err(GradwiseError::ConfigurationError(
                "lookahead_merge_time must be at least 1".to_string(),
            ));
        }
        if config.t_alpha_beta3 == Some(0) {
            return Err(GradwiseError::ConfigurationError(
                "t_alpha_beta3 must be positive when set".to_string(),
            ));
        }
        let orthograd = if config.orthograd {
            Some(OrthoGradTransform::new(config.orthograd_config.clone())?)
        } else {
            None
        };
        Ok(Ranger25 { config, orthograd })
    }

    pub fn settings(&self) -> &Ranger25Config {
        &self.config
    }

    pub fn orthograd(&self) -> Option<&OrthoGradTransform> {
        self.orthograd.as_ref()
    }

    /// The gradient as the stages after OrthoGrad see it.
    pub fn prepare_gradient<'g>(
        &self,
        param: &Tensor,
        grad: &'g Gradient,
    ) -> Result<Cow<'g, Gradient>, GradwiseError> {
        match &self.orthograd {
            Some(transform) => transform.transform(param, grad),
            None => Ok(Cow::Borrowed(grad)),
        }
    }

    /// Zeroes components of `update` whose sign disagrees with `grad` and
    /// rescales the rest by the surviving fraction.
    fn apply_cautious(update: &mut Tensor, grad: &Tensor) -> Result<(), GradwiseError> {
        let mask = update.zip_map(grad, "Ranger25 cautious", |u, g| {
            if u * g > 0.0 {
                1.0
            } else {
                0.0
            }
        })?;
        let scale = (1.0 / mask.mean().max(CAUTIOUS_MIN_FRACTION)) as f32;
        update.zip_apply_(&mask, "Ranger25 cautious", |u, m| u * m * scale)
    }
}

impl UpdateRule for Ranger25 {
    type State = Ranger25State;

    fn name(&self) -> String {
        "Ranger25".to_string()
    }

    fn learning_rate(&self) -> f32 {
        self.config.lr
    }

    fn init_state(&self, param: &Tensor) -> Ranger25State {
        Ranger25State {
            step: 0,
            exp_avg: tensor::zeros_like(param),
            exp_avg_sq: tensor::zeros_like(param),
            exp_avg_slow: tensor::zeros_like(param),
            slow_param: param.clone(),
        }
    }

    fn update(
        &self,
        param: &mut Tensor,
        grad: &Gradient,
        state: &mut Ranger25State,
        lr: f32,
    ) -> Result<(), GradwiseError> {
        let prepared = self.prepare_gradient(param, grad)?;
        let mut grad = dense_gradient(&prepared, param, "Ranger25")?.clone();
        let (beta1, beta2, beta3) = self.config.betas;
        let weight_decay = self.config.weight_decay;

        state.step += 1;
        let step = state.step;
        let bc1 = bias_correction(beta1, step);
        let bc2_sqrt = bias_correction(beta2, step).sqrt();
        let alpha_t = schedule_alpha(self.config.t_alpha_beta3, step, self.config.alpha);
        let beta3_t = schedule_beta3(self.config.t_alpha_beta3, step, beta1, beta3);

        if weight_decay != 0.0 {
            if self.config.weight_decouple {
                param.mul_scalar_(1.0 - lr * weight_decay);
            } else {
                grad.add_scaled_(param, weight_decay)?;
            }
        }

        state.exp_avg.ema_(&grad, beta1)?;
        state.exp_avg_sq.ema_sq_(&grad, beta2)?;
        state.exp_avg_slow.ema_(&grad, beta3_t)?;

        let mut momentum = state.exp_avg.clone();
        momentum.mul_scalar_(1.0 / bc1);
        if self.config.cautious {
            Self::apply_cautious(&mut momentum, &grad)?;
        }

        momentum.add_scaled_(&state.exp_avg_slow, alpha_t)?;
        let update = momentum.zip_map(&state.exp_avg_sq, "Ranger25 atan2", |num, sq| {
            num.atan2(sq.sqrt() / bc2_sqrt)
        })?;
        param.add_scaled_(&update, -lr)?;

        if step % self.config.lookahead_merge_time == 0 {
            state
                .slow_param
                .lerp_(param, self.config.lookahead_blending_alpha)?;
            param.copy_from_(&state.slow_param)?;
            log::trace!("Ranger25: lookahead merge at step {}", step);
        }
        Ok(())
    }

    fn config(&self) -> StateFields {
        let c = &self.config;
        let pipeline = c.pipeline().into_iter().map(String::from).collect();
        let orthograd_config = StateFields::new()
            .with("eps", StateValue::Scalar(c.orthograd_config.eps))
            .with("rescale", StateValue::Flag(c.orthograd_config.rescale));
        StateFields::new()
            .with("lr", StateValue::Scalar(c.lr as f64))
            .with("beta1", StateValue::Scalar(c.betas.0 as f64))
            .with("beta2", StateValue::Scalar(c.betas.1 as f64))
            .with("beta3", StateValue::Scalar(c.betas.2 as f64))
            .with("alpha", StateValue::Scalar(c.alpha as f64))
            .with("t_alpha_beta3", StateValue::Int(c.t_alpha_beta3.unwrap_or(0)))
            .with("lookahead_merge_time", StateValue::Int(c.lookahead_merge_time))
            .with("lookahead_blending_alpha", StateValue::Scalar(c.lookahead_blending_alpha as f64))
            .with("weight_decay", StateValue::Scalar(c.weight_decay as f64))
            .with("weight_decouple", StateValue::Flag(c.weight_decouple))
            .with("cautious", StateValue::Flag(c.cautious))
            .with("orthograd", StateValue::Flag(c.orthograd))
            .with("orthograd_config", StateValue::Section(orthograd_config))
            .with("pipeline", StateValue::Labels(pipeline))
    }

    fn from_config(&self, config: &FieldReader<'_>) -> Result<Self, GradwiseError> {
        // 0 is how a disabled warm-up is stored
        let t_alpha_beta3 = match config.int("t_alpha_beta3")? {
            0 => None,
            t => Some(t),
        };
        let stage = config.nested("Ranger25.orthograd_config", "orthograd_config")?;
        let restored = Ranger25Config {
            lr: config.scalar_f32("lr")?,
            betas: (
                config.scalar_f32("beta1")?,
                config.scalar_f32("beta2")?,
                config.scalar_f32("beta3")?,
            ),
            alpha: config.scalar_f32("alpha")?,
            t_alpha_beta3,
            lookahead_merge_time: config.int("lookahead_merge_time")?,
            lookahead_blending_alpha: config.scalar_f32("lookahead_blending_alpha")?,
            weight_decay: config.scalar_f32("weight_decay")?,
            weight_decouple: config.flag("weight_decouple")?,
            cautious: config.flag("cautious")?,
            orthograd: config.flag("orthograd")?,
            orthograd_config: OrthoGradConfig {
                eps: stage.scalar("eps")?,
                rescale: stage.flag("rescale")?,
            },
        };

        let recorded = config.labels("pipeline")?;
        let expected = restored.pipeline();
        if recorded.iter().map(String::as_str).ne(expected.iter().copied()) {
            return Err(GradwiseError::schema(
                config.component(),
                format!(
                    "pipeline {:?} does not match the configured stages {:?}",
                    recorded, expected
                ),
            ));
        }

        let mut rule = Ranger25::new(restored)?;
        // keep the projection counter running across restores
        if let (Some(restored), Some(current)) = (&mut rule.orthograd, &self.orthograd) {
            *restored = current.clone();
        }
        Ok(rule)
    }
}

#[cfg(test)]
#[path = "ranger25_test.rs"]
mod tests;
