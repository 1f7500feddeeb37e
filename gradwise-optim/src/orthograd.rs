use crate::optimizer::RuleOptimizer;
use crate::rule::{GradientTransform, UpdateRule};
use crate::snapshot::{FieldReader, StateFields, StateValue};
use crate::state::ParamState;
use crate::validation::validate_positive;
use gradwise_core::{Gradient, GradwiseError, Tensor};
use std::borrow::Cow;
use std::sync::atomic::{AtomicU64, Ordering};

#[derive(Clone, Debug, PartialEq)]
pub struct OrthoGradConfig {
    /// Added to `p.p` before dividing.
    pub eps: f64,
    /// Rescale the projected gradient back to the norm of the original.
    pub rescale: bool,
}

impl Default for OrthoGradConfig {
    fn default() -> Self {
        OrthoGradConfig {
            eps: 1e-30,
            rescale: false,
        }
    }
}

/// Removes the component of a dense gradient parallel to its parameter.
///
/// Sparse gradients are handed on untouched.
#[derive(Debug)]
pub struct OrthoGradTransform {
    config: OrthoGradConfig,
    projections: AtomicU64,
}

impl Clone for OrthoGradTransform {
    fn clone(&self) -> Self {
        OrthoGradTransform {
            config: self.config.clone(),
            projections: AtomicU64::new(self.projection_count()),
        }
    }
}

impl OrthoGradTransform {
    pub fn new(config: OrthoGradConfig) -> Result<Self, GradwiseError> {
        validate_positive(config.eps, "eps")?;
        Ok(OrthoGradTransform {
            config,
            projections: AtomicU64::new(0),
        })
    }

    pub fn settings(&self) -> &OrthoGradConfig {
        &self.config
    }

    /// Number of dense projections computed so far.
    pub fn projection_count(&self) -> u64 {
        self.projections.load(Ordering::Relaxed)
    }

    /// `grad - (grad.param / (param.param + eps)) * param`, optionally rescaled.
    pub fn project(&self, param: &Tensor, grad: &Tensor) -> Result<Tensor, GradwiseError> {
        let dot = grad.dot(param)?;
        let proj = dot / (param.sum_squares() + self.config.eps);
        let mut projected = grad.zip_map(param, "OrthoGrad", |g, p| {
            (g as f64 - proj * p as f64) as f32
        })?;
        if self.config.rescale {
            let scale = grad.norm() / (projected.norm() + self.config.eps);
            projected.map_(|x| (x as f64 * scale) as f32);
        }
        self.projections.fetch_add(1, Ordering::Relaxed);
        Ok(projected)
    }
}

impl GradientTransform for OrthoGradTransform {
    fn name(&self) -> &'static str {
        "OrthoGrad"
    }

    fn transform<'g>(
        &self,
        param: &Tensor,
        grad: &'g Gradient,
    ) -> Result<Cow<'g, Gradient>, GradwiseError> {
        grad.check_shape(param.shape(), "OrthoGrad")?;
        match grad {
            Gradient::Sparse(_) => {
                log::trace!("OrthoGrad: sparse gradient passed through unprojected");
                Ok(Cow::Borrowed(grad))
            }
            Gradient::Dense(g) => Ok(Cow::Owned(Gradient::Dense(self.project(param, g)?))),
            Gradient::Opaque { layout, .. } => Err(GradwiseError::UnsupportedGradientLayout {
                layout: layout.clone(),
                operation: "OrthoGrad".to_string(),
            }),
        }
    }

    fn config(&self) -> StateFields {
        StateFields::new()
            .with("eps", StateValue::Scalar(self.config.eps))
            .with("rescale", StateValue::Flag(self.config.rescale))
    }

    fn from_config(&self, config: &FieldReader<'_>) -> Result<Self, GradwiseError> {
        let transform = OrthoGradTransform::new(OrthoGradConfig {
            eps: config.scalar("eps")?,
            rescale: config.flag("rescale")?,
        })?;
        transform
            .projections
            .store(self.projection_count(), Ordering::Relaxed);
        Ok(transform)
    }
}

/// Runs every gradient through [`OrthoGradTransform`] before the inner rule.
#[derive(Clone, Debug)]
pub struct OrthoGrad<R> {
    transform: OrthoGradTransform,
    inner: R,
}

/// OrthoGrad keeps nothing of its own; the record wraps the inner state so
/// snapshots always carry the `inner` section.
#[derive(Clone, Debug, PartialEq)]
pub struct OrthoGradState<S> {
    pub inner: S,
}

impl<S: ParamState> ParamState for OrthoGradState<S> {
    fn to_fields(&self) -> StateFields {
        StateFields::new().with("inner", StateValue::Section(self.inner.to_fields()))
    }

    fn from_fields(fields: &FieldReader<'_>, shape: &[usize]) -> Result<Self, GradwiseError> {
        let inner = fields.nested(fields.component(), "inner")?;
        Ok(OrthoGradState {
            inner: S::from_fields(&inner, shape)?,
        })
    }
}

pub type OrthoGradOptimizer<R> = RuleOptimizer<OrthoGrad<R>>;

impl<R: UpdateRule> OrthoGrad<R> {
    pub fn new(inner: R, config: OrthoGradConfig) -> Result<Self, GradwiseError> {
        Ok(OrthoGrad {
            transform: OrthoGradTransform::new(config)?,
            inner,
        })
    }

    pub fn inner(&self) -> &R {
        &self.inner
    }

    pub fn transform(&self) -> &OrthoGradTransform {
        &self.transform
    }
}

impl<R: UpdateRule> UpdateRule for OrthoGrad<R> {
    type State = OrthoGradState<R::State>;

    fn name(&self) -> String {
        format!("OrthoGrad({})", self.inner.name())
    }

    fn learning_rate(&self) -> f32 {
        self.inner.learning_rate()
    }

    fn init_state(&self, param: &Tensor) -> Self::State {
        OrthoGradState {
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
        let grad = self.transform.transform(param, grad)?;
        self.inner.update(param, &grad, &mut state.inner, lr)
    }

    fn check_state(&self, state: &Self::State, param_index: usize) -> Result<(), GradwiseError> {
        self.inner.check_state(&state.inner, param_index)
    }

    fn config(&self) -> StateFields {
        let mut fields = self.transform.config();
        fields.insert("inner", StateValue::Section(self.inner.config()));
        fields
    }

    fn from_config(&self, config: &FieldReader<'_>) -> Result<Self, GradwiseError> {
        let inner_name = self.inner.name();
        let inner_config = config.nested(&inner_name, "inner")?;
        Ok(OrthoGrad {
            transform: self.transform.from_config(config)?,
            inner: self.inner.from_config(&inner_config)?,
        })
    }
}

#[cfg(test)]
#[path = "orthograd_test.rs"]
mod tests;
