use crate::param_group::ParamGroup;
use crate::rule::UpdateRule;
use crate::snapshot::{FieldReader, GroupRecord, Snapshot, SNAPSHOT_FORMAT_VERSION};
use crate::state::{ParamId, ParamState, StateStore};
use crate::validation::validate_learning_rate;
use gradwise_core::{GradwiseError, SharedParameter};
use std::collections::BTreeMap;
use std::sync::Arc;

/// Trait defining the common interface for all optimizers.
///
/// Optimizers update the parameters registered with them, using the gradient
/// each parameter carries for the current step.
pub trait Optimizer {
    /// Performs a single optimization step.
    ///
    /// Parameters without a gradient are skipped and their state is left
    /// as is. On error, parameters updated earlier in the same call keep
    /// their new values; the failing parameter and its state are untouched.
    fn step(&mut self) -> Result<(), GradwiseError>;

    /// Clears the gradients of all parameters managed by the optimizer.
    fn zero_grad(&mut self);

    /// Adds a new parameter group to the optimizer.
    ///
    /// Fails with `ConfigurationError` if a parameter is already registered.
    fn add_param_group(&mut self, param_group: ParamGroup) -> Result<(), GradwiseError>;

    fn param_groups(&self) -> &[ParamGroup];

    /// Mutable access to the groups, e.g. to change a learning rate.
    fn param_groups_mut(&mut self) -> &mut [ParamGroup];

    /// Sets the learning rate of every group; the hook for external schedules.
    fn set_learning_rate(&mut self, lr: f32) {
        for group in self.param_groups_mut() {
            group.set_lr(lr);
        }
    }

    /// Replaces configuration, group options and all per-parameter state.
    ///
    /// The snapshot is fully decoded and checked against the live parameters
    /// before anything is replaced, so on error the optimizer is unchanged.
    fn load_state_dict(&mut self, state_dict: &Snapshot) -> Result<(), GradwiseError>;

    /// Returns an independent copy of the configuration and all state.
    fn state_dict(&self) -> Result<Snapshot, GradwiseError>;

    /// Re-initialises every existing state record to its default.
    ///
    /// Records are reset in place; no parameter is forgotten.
    fn reset(&mut self) -> Result<(), GradwiseError>;
}

/// Optimizer facade driving an [`UpdateRule`] over parameter groups.
///
/// Owns the per-parameter state. Parameters get a [`ParamId`] when their
/// group is added; ids count up across groups and are never reused.
#[derive(Debug)]
pub struct RuleOptimizer<R: UpdateRule> {
    rule: R,
    param_groups: Vec<ParamGroup>,
    /// `handles[g][i]` is the id of `param_groups[g].params()[i]`.
    handles: Vec<Vec<ParamId>>,
    next_id: usize,
    state: StateStore<R::State>,
}

fn read_error(id: ParamId, reason: impl std::fmt::Display) -> GradwiseError {
    GradwiseError::LockError {
        lock_type: "read".to_string(),
        reason: format!("Failed to lock {}: {}", id, reason),
    }
}

impl<R: UpdateRule> RuleOptimizer<R> {
    /// Creates an optimizer with a single group holding `params`.
    pub fn new(params: Vec<SharedParameter>, rule: R) -> Result<Self, GradwiseError> {
        let mut optimizer = RuleOptimizer {
            rule,
            param_groups: Vec::new(),
            handles: Vec::new(),
            next_id: 0,
            state: StateStore::new(),
        };
        optimizer.add_param_group(ParamGroup::new(params))?;
        Ok(optimizer)
    }

    pub fn rule(&self) -> &R {
        &self.rule
    }

    /// The state of parameter `id`, if it has taken a step.
    pub fn state(&self, id: ParamId) -> Option<&R::State> {
        self.state.get(id)
    }

    pub fn state_store(&self) -> &StateStore<R::State> {
        &self.state
    }

    /// Forgets the state of parameter `id`; its next step starts afresh.
    pub fn drop_state(&mut self, id: ParamId) -> Option<R::State> {
        self.state.drop_entry(id)
    }

    /// Registered parameters with their ids, in registration order.
    pub fn parameters(&self) -> impl Iterator<Item = (ParamId, &SharedParameter)> {
        self.param_groups
            .iter()
            .zip(self.handles.iter())
            .flat_map(|(group, ids)| ids.iter().copied().zip(group.params().iter()))
    }

    pub fn parameter(&self, id: ParamId) -> Option<&SharedParameter> {
        self.parameters()
            .find(|(candidate, _)| *candidate == id)
            .map(|(_, param)| param)
    }

    fn live_shapes(&self) -> Result<BTreeMap<ParamId, Vec<usize>>, GradwiseError> {
        let mut shapes = BTreeMap::new();
        for (id, param) in self.parameters() {
            let guard = param.read().map_err(|e| read_error(id, e))?;
            shapes.insert(id, guard.shape().to_vec());
        }
        Ok(shapes)
    }
}

impl<R: UpdateRule> Optimizer for RuleOptimizer<R> {
    fn step(&mut self) -> Result<(), GradwiseError> {
        let rule = &self.rule;
        let mut updated = 0usize;
        for (group, ids) in self.param_groups.iter().zip(self.handles.iter()) {
            let lr = group.get_lr().unwrap_or_else(|| rule.learning_rate());
            for (param_arc, &id) in group.params().iter().zip(ids.iter()) {
                let mut param = param_arc.write().map_err(|e| GradwiseError::LockError {
                    lock_type: "write".to_string(),
                    reason: format!("Failed to lock {} in {} step: {}", id, rule.name(), e),
                })?;

                let (value, grad) = param.value_and_grad_mut();
                let grad = match grad {
                    Some(g) => g,
                    None => continue,
                };

                let state = self.state.get_or_init(id, || rule.init_state(value));
                rule.update(value, grad, state, lr)?;
                log::trace!("{} updated {} ({} layout)", rule.name(), id, grad.layout());
                updated += 1;
            }
        }
        log::debug!(
            "{} step: updated {} parameter(s), {} state record(s)",
            rule.name(),
            updated,
            self.state.len()
        );
        Ok(())
    }

    fn zero_grad(&mut self) {
        for group in &self.param_groups {
            for param_arc in group.params() {
                let mut param = match param_arc.write() {
                    Ok(guard) => guard,
                    Err(poisoned) => {
                        log::warn!("Parameter lock was poisoned in zero_grad. Recovering writer guard.");
                        poisoned.into_inner()
                    }
                };
                param.clear_grad();
            }
        }
    }

    fn add_param_group(&mut self, param_group: ParamGroup) -> Result<(), GradwiseError> {
        if let Some(lr) = param_group.get_lr() {
            validate_learning_rate(lr)?;
        }
        let new_params = param_group.params();
        for (i, param) in new_params.iter().enumerate() {
            let seen_before = new_params[..i].iter().any(|p| Arc::ptr_eq(p, param));
            let registered = self.parameters().any(|(_, p)| Arc::ptr_eq(p, param));
            if seen_before || registered {
                return Err(GradwiseError::ConfigurationError(
                    "some parameters appear in more than one parameter group".to_string(),
                ));
            }
        }

        let ids: Vec<ParamId> = (self.next_id..self.next_id + new_params.len())
            .map(ParamId)
            .collect();
        self.next_id += ids.len();
        log::debug!(
            "{}: added parameter group {} with {} parameter(s)",
            self.rule.name(),
            self.param_groups.len(),
            ids.len()
        );
        self.handles.push(ids);
        self.param_groups.push(param_group);
        Ok(())
    }

    fn param_groups(&self) -> &[ParamGroup] {
        &self.param_groups
    }

    fn param_groups_mut(&mut self) -> &mut [ParamGroup] {
        &mut self.param_groups
    }

    fn load_state_dict(&mut self, state_dict: &Snapshot) -> Result<(), GradwiseError> {
        let name = self.rule.name();
        if state_dict.format_version != SNAPSHOT_FORMAT_VERSION {
            return Err(GradwiseError::schema(
                name,
                format!(
                    "unsupported snapshot format version {} (expected {})",
                    state_dict.format_version, SNAPSHOT_FORMAT_VERSION
                ),
            ));
        }
        if state_dict.optimizer != name {
            return Err(GradwiseError::schema(
                name,
                format!("snapshot was produced by `{}`", state_dict.optimizer),
            ));
        }

        let rule = self
            .rule
            .from_config(&FieldReader::config(&name, &state_dict.config))?;

        if state_dict.groups.len() != self.param_groups.len() {
            return Err(GradwiseError::schema(
                name,
                format!(
                    "snapshot has {} parameter group(s), optimizer has {}",
                    state_dict.groups.len(),
                    self.param_groups.len()
                ),
            ));
        }
        for (g, (record, ids)) in state_dict.groups.iter().zip(self.handles.iter()).enumerate() {
            let live: Vec<usize> = ids.iter().map(|id| id.index()).collect();
            if record.params != live {
                return Err(GradwiseError::schema(
                    name,
                    format!(
                        "group {} holds parameters {:?} in the snapshot but {:?} here",
                        g, record.params, live
                    ),
                ));
            }
            if let Some(lr) = record.lr {
                validate_learning_rate(lr)?;
            }
        }

        let shapes = self.live_shapes()?;
        let mut restored = BTreeMap::new();
        for record in &state_dict.params {
            let id = ParamId(record.index);
            let live_shape = shapes.get(&id).ok_or_else(|| {
                GradwiseError::schema(
                    name.clone(),
                    format!("snapshot has state for unknown parameter index {}", record.index),
                )
            })?;
            if record.shape != *live_shape {
                return Err(GradwiseError::StateShapeMismatch {
                    param_index: record.index,
                    field: "shape".to_string(),
                    expected: live_shape.clone(),
                    actual: record.shape.clone(),
                });
            }
            let reader = FieldReader::param(&name, record.index, &record.state);
            let state = <R::State as ParamState>::from_fields(&reader, live_shape)?;
            rule.check_state(&state, record.index)?;
            if restored.insert(id, state).is_some() {
                return Err(GradwiseError::schema(
                    name,
                    format!("snapshot has two records for parameter index {}", record.index),
                ));
            }
        }

        if restored.is_empty() && !self.state.is_empty() {
            log::warn!(
                "{}: restoring an empty snapshot discards {} state record(s)",
                name,
                self.state.len()
            );
        }

        self.rule = rule;
        for (group, record) in self.param_groups.iter_mut().zip(state_dict.groups.iter()) {
            group.options.lr = record.lr;
        }
        let count = restored.len();
        self.state.restore(restored);
        log::debug!("{}: restored {} state record(s)", name, count);
        Ok(())
    }

    fn state_dict(&self) -> Result<Snapshot, GradwiseError> {
        let shapes = self.live_shapes()?;
        let groups = self
            .param_groups
            .iter()
            .zip(self.handles.iter())
            .map(|(group, ids)| GroupRecord {
                lr: group.get_lr(),
                params: ids.iter().map(|id| id.index()).collect(),
            })
            .collect();
        Ok(Snapshot {
            format_version: SNAPSHOT_FORMAT_VERSION,
            optimizer: self.rule.name(),
            config: self.rule.config(),
            groups,
            params: self
                .state
                .export(|id| shapes.get(&id).cloned().unwrap_or_default()),
        })
    }

    fn reset(&mut self) -> Result<(), GradwiseError> {
        let mut fresh = BTreeMap::new();
        for (id, param) in self.parameters() {
            if self.state.contains(id) {
                let guard = param.read().map_err(|e| read_error(id, e))?;
                fresh.insert(id, self.rule.init_state(guard.tensor()));
            }
        }
        log::debug!("{}: reset {} state record(s)", self.rule.name(), fresh.len());
        self.state.restore(fresh);
        Ok(())
    }
}

#[cfg(test)]
#[path = "optimizer_test.rs"]
mod tests;
