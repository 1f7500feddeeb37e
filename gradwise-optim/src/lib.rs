//! Stateful optimizers over `gradwise-core` parameters.
//!
//! Rules ([`Focus`], [`Sgd`], [`Trac`], [`Ranger25`]) and the [`OrthoGrad`]
//! wrapper plug into [`RuleOptimizer`], which owns the per-parameter state
//! and implements [`Optimizer`], including `state_dict` / `load_state_dict`.

pub mod focus;
pub mod optimizer;
pub mod orthograd;
pub mod param_group;
pub mod ranger25;
pub mod rule;
pub mod sgd;
pub mod snapshot;
pub mod state;
pub mod trac;
pub mod validation;

pub use focus::{Focus, FocusConfig, FocusOptimizer, FocusState};
pub use optimizer::{Optimizer, RuleOptimizer};
pub use orthograd::{OrthoGrad, OrthoGradConfig, OrthoGradOptimizer, OrthoGradState, OrthoGradTransform};
pub use param_group::{ParamGroup, ParamGroupOptions};
pub use ranger25::{Ranger25, Ranger25Config, Ranger25Optimizer, Ranger25State};
pub use rule::{GradientTransform, UpdateRule};
pub use sgd::{Sgd, SgdConfig, SgdOptimizer, SgdState};
pub use snapshot::{FieldReader, GroupRecord, ParamRecord, Snapshot, StateFields, StateValue};
pub use state::{ParamId, ParamState, StateStore};
pub use trac::{Trac, TracConfig, TracOptimizer, TracState};
