use super::*;
use crate::snapshot::StateValue;
use gradwise_core::{tensor, Tensor};

#[derive(Clone, Debug, PartialEq)]
struct CounterState {
    step: u64,
    buf: Tensor,
}

impl ParamState for CounterState {
    fn to_fields(&self) -> StateFields {
        StateFields::new()
            .with("step", StateValue::Int(self.step))
            .with("buf", StateValue::Tensor(self.buf.clone()))
    }

    fn from_fields(fields: &FieldReader<'_>, shape: &[usize]) -> Result<Self, GradwiseError> {
        Ok(CounterState {
            step: fields.int("step")?,
            buf: fields.tensor("buf", shape)?,
        })
    }
}

fn fresh(shape: &[usize]) -> CounterState {
    CounterState {
        step: 0,
        buf: tensor::zeros(shape),
    }
}

#[test]
fn test_get_or_init_is_idempotent() {
    let mut store = StateStore::new();
    store.get_or_init(ParamId(0), || fresh(&[2])).step += 1;
    store.get_or_init(ParamId(0), || fresh(&[5])).step += 1;

    let state = store.get(ParamId(0)).map(|s| (s.step, s.buf.shape().to_vec()));
    assert_eq!(state, Some((2, vec![2])));
    assert_eq!(store.len(), 1);
}

#[test]
fn test_export_is_ordered_and_detached() -> Result<(), GradwiseError> {
    let mut store = StateStore::new();
    store.get_or_init(ParamId(3), || fresh(&[1]));
    store.get_or_init(ParamId(1), || fresh(&[2]));

    let records = store.export(|id| if id == ParamId(1) { vec![2] } else { vec![1] });
    let indices: Vec<usize> = records.iter().map(|r| r.index).collect();
    assert_eq!(indices, vec![1, 3]);
    assert_eq!(records[0].shape, vec![2]);

    if let Some(state) = store.get_mut(ParamId(1)) {
        state.buf.data_mut()[0] = 7.0;
    }
    let exported = FieldReader::param("test", 1, &records[0].state).tensor("buf", &[2])?;
    assert_eq!(exported.data(), &[0.0, 0.0]);
    Ok(())
}

#[test]
fn test_restore_replaces_everything() {
    let mut store = StateStore::new();
    store.get_or_init(ParamId(0), || fresh(&[1]));
    store.get_or_init(ParamId(1), || fresh(&[1]));

    let mut records = BTreeMap::new();
    records.insert(ParamId(2), fresh(&[3]));
    store.restore(records);

    assert_eq!(store.ids().collect::<Vec<_>>(), vec![ParamId(2)]);
    assert!(!store.contains(ParamId(0)));
}

#[test]
fn test_drop_entry() {
    let mut store = StateStore::new();
    store.get_or_init(ParamId(0), || fresh(&[1]));
    assert!(store.drop_entry(ParamId(0)).is_some());
    assert!(store.drop_entry(ParamId(0)).is_none());
    assert!(store.is_empty());
}

#[test]
fn test_param_id_display() {
    assert_eq!(ParamId(4).to_string(), "param#4");
    assert_eq!(ParamId(4).index(), 4);
}
