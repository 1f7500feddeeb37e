use crate::snapshot::{FieldReader, ParamRecord, StateFields};
use gradwise_core::GradwiseError;
use std::collections::BTreeMap;
use std::fmt;

/// Handle identifying a parameter within one optimizer.
///
/// Assigned at registration as the ordinal over all parameter groups and
/// never reused, so it is also the parameter's index in a [`Snapshot`].
///
/// [`Snapshot`]: crate::snapshot::Snapshot
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ParamId(pub usize);

impl ParamId {
    pub fn index(self) -> usize {
        self.0
    }
}

impl fmt::Display for ParamId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "param#{}", self.0)
    }
}

/// Per-parameter state of an update rule.
pub trait ParamState: Clone + fmt::Debug + Send + Sync {
    /// Deep copy of every field.
    fn to_fields(&self) -> StateFields;

    /// Rebuilds the state for a parameter of shape `shape`.
    ///
    /// Must reject absent fields and mismatched tensor shapes rather than
    /// fall back to defaults.
    fn from_fields(fields: &FieldReader<'_>, shape: &[usize]) -> Result<Self, GradwiseError>;
}

/// Lazily populated per-parameter state, keyed by [`ParamId`].
///
/// Records are only created by [`StateStore::get_or_init`] and only removed
/// by [`StateStore::drop_entry`]; iteration is in ascending id order.
#[derive(Clone, Debug)]
pub struct StateStore<S> {
    entries: BTreeMap<ParamId, S>,
}

impl<S> Default for StateStore<S> {
    fn default() -> Self {
        StateStore {
            entries: BTreeMap::new(),
        }
    }
}

impl<S: ParamState> StateStore<S> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the record for `id`, creating it with `init` on first use.
    pub fn get_or_init(&mut self, id: ParamId, init: impl FnOnce() -> S) -> &mut S {
        self.entries.entry(id).or_insert_with(|| {
            log::trace!("Initialising optimizer state for {}", id);
            init()
        })
    }

    pub fn get(&self, id: ParamId) -> Option<&S> {
        self.entries.get(&id)
    }

    pub fn get_mut(&mut self, id: ParamId) -> Option<&mut S> {
        self.entries.get_mut(&id)
    }

    pub fn contains(&self, id: ParamId) -> bool {
        self.entries.contains_key(&id)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn ids(&self) -> impl Iterator<Item = ParamId> + '_ {
        self.entries.keys().copied()
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = (ParamId, &mut S)> {
        self.entries.iter_mut().map(|(id, state)| (*id, state))
    }

    /// Removes the record for `id`, returning it if present.
    pub fn drop_entry(&mut self, id: ParamId) -> Option<S> {
        self.entries.remove(&id)
    }

    /// Deep copy of every record, by ascending id. `shape_of` supplies the
    /// live shape recorded alongside each entry.
    pub fn export(&self, shape_of: impl Fn(ParamId) -> Vec<usize>) -> Vec<ParamRecord> {
        self.entries
            .iter()
            .map(|(id, state)| ParamRecord {
                index: id.index(),
                shape: shape_of(*id),
                state: state.to_fields(),
            })
            .collect()
    }

    /// Replaces every record at once with already-decoded states.
    pub fn restore(&mut self, records: BTreeMap<ParamId, S>) {
        self.entries = records;
    }
}

#[cfg(test)]
#[path = "state_test.rs"]
mod tests;
