use gradwise_core::{GradwiseError, Tensor};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Bumped whenever the layout of [`Snapshot`] changes incompatibly.
pub const SNAPSHOT_FORMAT_VERSION: u32 = 1;

/// A complete, independent copy of an optimizer's configuration and state.
///
/// Produced by `Optimizer::state_dict` and consumed by
/// `Optimizer::load_state_dict`. Parameters are referred to by their
/// registration index, so a snapshot can be restored into a fresh optimizer
/// built over the same parameter layout.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Snapshot {
    pub format_version: u32,
    /// Name of the producing optimizer, e.g. `OrthoGrad(FOCUS)`.
    pub optimizer: String,
    pub config: StateFields,
    pub groups: Vec<GroupRecord>,
    /// Records for every parameter that has state, by ascending index.
    pub params: Vec<ParamRecord>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct GroupRecord {
    /// Group learning-rate override, if any.
    pub lr: Option<f32>,
    pub params: Vec<usize>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ParamRecord {
    pub index: usize,
    /// Shape of the parameter when the snapshot was taken.
    pub shape: Vec<usize>,
    pub state: StateFields,
}

impl Snapshot {
    pub fn param(&self, index: usize) -> Option<&ParamRecord> {
        self.params.iter().find(|record| record.index == index)
    }

    pub fn param_mut(&mut self, index: usize) -> Option<&mut ParamRecord> {
        self.params.iter_mut().find(|record| record.index == index)
    }

    pub fn to_json(&self) -> Result<String, GradwiseError> {
        serde_json::to_string(self).map_err(|e| GradwiseError::SerializationError(e.to_string()))
    }

    pub fn from_json(json: &str) -> Result<Self, GradwiseError> {
        serde_json::from_str(json).map_err(|e| GradwiseError::SerializationError(e.to_string()))
    }
}

/// One named value inside a state or configuration record.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum StateValue {
    Int(u64),
    Scalar(f64),
    Flag(bool),
    Vector(Vec<f64>),
    Labels(Vec<String>),
    Tensor(Tensor),
    /// A nested component's own record.
    Section(StateFields),
}

impl StateValue {
    fn kind(&self) -> &'static str {
        match self {
            StateValue::Int(_) => "Int",
            StateValue::Scalar(_) => "Scalar",
            StateValue::Flag(_) => "Flag",
            StateValue::Vector(_) => "Vector",
            StateValue::Labels(_) => "Labels",
            StateValue::Tensor(_) => "Tensor",
            StateValue::Section(_) => "Section",
        }
    }
}

/// Named values of one record, kept in key order so exports are stable.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct StateFields {
    entries: BTreeMap<String, StateValue>,
}

impl StateFields {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, key: impl Into<String>, value: StateValue) -> Option<StateValue> {
        self.entries.insert(key.into(), value)
    }

    /// Builder-style insert.
    pub fn with(mut self, key: impl Into<String>, value: StateValue) -> Self {
        self.insert(key, value);
        self
    }

    pub fn get(&self, key: &str) -> Option<&StateValue> {
        self.entries.get(key)
    }

    pub fn remove(&mut self, key: &str) -> Option<StateValue> {
        self.entries.remove(key)
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.entries.contains_key(key)
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Mutable access to a nested section, for callers editing snapshots.
    pub fn section_mut(&mut self, key: &str) -> Option<&mut StateFields> {
        match self.entries.get_mut(key) {
            Some(StateValue::Section(fields)) => Some(fields),
            _ => None,
        }
    }
}

/// Typed, error-reporting access to a [`StateFields`] record.
///
/// Missing or mistyped fields are reported as `StateSchemaMismatch`, tensors
/// of the wrong shape as `StateShapeMismatch`; nothing is defaulted.
#[derive(Clone, Copy, Debug)]
pub struct FieldReader<'a> {
    component: &'a str,
    param_index: Option<usize>,
    fields: &'a StateFields,
}

impl<'a> FieldReader<'a> {
    /// Reader over a configuration record.
    pub fn config(component: &'a str, fields: &'a StateFields) -> Self {
        FieldReader {
            component,
            param_index: None,
            fields,
        }
    }

    /// Reader over the state record of parameter `param_index`.
    pub fn param(component: &'a str, param_index: usize, fields: &'a StateFields) -> Self {
        FieldReader {
            component,
            param_index: Some(param_index),
            fields,
        }
    }

    pub fn component(&self) -> &'a str {
        self.component
    }

    pub fn fields(&self) -> &'a StateFields {
        self.fields
    }

    fn schema_error(&self, detail: String) -> GradwiseError {
        let component = match self.param_index {
            Some(index) => format!("{} (parameter {})", self.component, index),
            None => self.component.to_string(),
        };
        GradwiseError::schema(component, detail)
    }

    fn value(&self, key: &str) -> Result<&'a StateValue, GradwiseError> {
        self.fields
            .get(key)
            .ok_or_else(|| self.schema_error(format!("missing required field `{}`", key)))
    }

    fn wrong_kind(&self, key: &str, expected: &str, found: &StateValue) -> GradwiseError {
        self.schema_error(format!(
            "field `{}` holds {}, expected {}",
            key,
            found.kind(),
            expected
        ))
    }

    pub fn int(&self, key: &str) -> Result<u64, GradwiseError> {
        match self.value(key)? {
            StateValue::Int(v) => Ok(*v),
            other => Err(self.wrong_kind(key, "Int", other)),
        }
    }

    pub fn scalar(&self, key: &str) -> Result<f64, GradwiseError> {
        match self.value(key)? {
            StateValue::Scalar(v) => Ok(*v),
            other => Err(self.wrong_kind(key, "Scalar", other)),
        }
    }

    /// A scalar stored from an `f32` hyperparameter; the round trip is exact.
    pub fn scalar_f32(&self, key: &str) -> Result<f32, GradwiseError> {
        self.scalar(key).map(|v| v as f32)
    }

    pub fn flag(&self, key: &str) -> Result<bool, GradwiseError> {
        match self.value(key)? {
            StateValue::Flag(v) => Ok(*v),
            other => Err(self.wrong_kind(key, "Flag", other)),
        }
    }

    pub fn vector(&self, key: &str) -> Result<&'a [f64], GradwiseError> {
        match self.value(key)? {
            StateValue::Vector(v) => Ok(v),
            other => Err(self.wrong_kind(key, "Vector", other)),
        }
    }

    /// A vector that must hold exactly `len` entries.
    pub fn vector_of_len(&self, key: &str, len: usize) -> Result<Vec<f64>, GradwiseError> {
        let v = self.vector(key)?;
        if v.len() != len {
            return Err(self.schema_error(format!(
                "field `{}` holds {} entries, expected {}",
                key,
                v.len(),
                len
            )));
        }
        Ok(v.to_vec())
    }

    pub fn labels(&self, key: &str) -> Result<&'a [String], GradwiseError> {
        match self.value(key)? {
            StateValue::Labels(v) => Ok(v),
            other => Err(self.wrong_kind(key, "Labels", other)),
        }
    }

    /// A tensor that must have `expected_shape`.
    pub fn tensor(&self, key: &str, expected_shape: &[usize]) -> Result<Tensor, GradwiseError> {
        match self.value(key)? {
            StateValue::Tensor(t) if t.shape() == expected_shape => Ok(t.clone()),
            StateValue::Tensor(t) => Err(GradwiseError::StateShapeMismatch {
                param_index: self.param_index.unwrap_or_default(),
                field: format!("{}.{}", self.component, key),
                expected: expected_shape.to_vec(),
                actual: t.shape().to_vec(),
            }),
            other => Err(self.wrong_kind(key, "Tensor", other)),
        }
    }

    pub fn section(&self, key: &str) -> Result<&'a StateFields, GradwiseError> {
        match self.value(key)? {
            StateValue::Section(fields) => Ok(fields),
            other => Err(self.wrong_kind(key, "Section", other)),
        }
    }

    /// Reader over a nested section sharing this reader's parameter index.
    pub fn nested(&self, component: &'a str, key: &str) -> Result<FieldReader<'a>, GradwiseError> {
        let fields = self.section(key)?;
        Ok(FieldReader {
            component,
            param_index: self.param_index,
            fields,
        })
    }
}

#[cfg(test)]
#[path = "snapshot_test.rs"]
mod tests;
