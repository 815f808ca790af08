//! Classification of a single attribute mutation.

use crate::types::{element_index, ChangeType, Descriptor, Value};
use tracing::trace;

/// The primitive operation that produced a before/after pair.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Mutation {
    Assign,
    Define,
    Delete,
}

/// A classified change, not yet bound to a record.
#[derive(Clone, Debug, PartialEq)]
pub struct Change {
    pub change_type: ChangeType,
    pub name: String,
    pub old_value: Option<Value>,
}

impl Change {
    pub fn new(change_type: ChangeType, name: impl Into<String>, old_value: Option<Value>) -> Self {
        Self {
            change_type,
            name: name.into(),
            old_value,
        }
    }
}

/// Classify the transition of attribute `name` from `before` to `after`.
///
/// `None` on either side means the attribute is absent. Returns `None`
/// when nothing observable changed. With `element_quirks`, index-named
/// attributes whose previous state was an accessor report a `null` old
/// value, and accessor-to-data redefinitions of them count as updates.
pub fn classify(
    mutation: Mutation,
    name: &str,
    before: Option<&Descriptor>,
    after: Option<&Descriptor>,
    element_quirks: bool,
) -> Option<Change> {
    let quirk = element_quirks && element_index(name).is_some();
    let old_value = |desc: &Descriptor| match desc.value() {
        Some(value) => Some(value.clone()),
        None if quirk => Some(Value::Null),
        None => None,
    };

    let change = match (before, after) {
        (None, None) => None,
        (None, Some(_)) => Some(Change::new(ChangeType::New, name, None)),
        (Some(before), None) => Some(Change::new(ChangeType::Deleted, name, old_value(before))),
        (Some(before), Some(after)) if before.same_as(after) => None,
        (Some(before), Some(after)) if before.is_data() && before.same_shape(after) => Some(
            Change::new(ChangeType::Updated, name, before.value().cloned()),
        ),
        (Some(before), Some(after)) if quirk && !before.is_data() && after.is_data() => {
            Some(Change::new(ChangeType::Updated, name, Some(Value::Null)))
        }
        (Some(before), Some(_)) => {
            Some(Change::new(ChangeType::Reconfigured, name, old_value(before)))
        }
    };

    match &change {
        Some(change) => trace!(?mutation, attribute = name, change_type = %change.change_type, "classified"),
        None => trace!(?mutation, attribute = name, "no-op mutation"),
    }
    change
}
