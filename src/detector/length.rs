//! Derived `length` maintenance for sequence records.
//!
//! Element writes at or past the end grow `length`; shrinking `length`
//! deletes the tail elements from the highest index down, stopping at the
//! first element that cannot be deleted.

use super::classify::{classify, Change, Mutation};
use crate::error::{ObserveError, Result};
use crate::records::Attributes;
use crate::types::{element_index, ChangeType, Descriptor, DescriptorPatch, Slot, Value};
use tracing::trace;

/// Name of the derived attribute.
pub const LENGTH: &str = "length";

/// Current `length` of a sequence (0 if absent or not a number).
pub fn current_length(attributes: &Attributes) -> u32 {
    attributes
        .get(LENGTH)
        .and_then(Descriptor::value)
        .and_then(Value::as_u64)
        .map(|len| len.min(u32::MAX as u64) as u32)
        .unwrap_or(0)
}

/// Convert a value to a sequence length, rejecting anything that is not an
/// integer in `0..2^32`.
pub fn to_length(value: &Value) -> Result<u32> {
    let invalid = || ObserveError::InvalidLength(value.to_string());
    if let Some(n) = value.as_u64() {
        return u32::try_from(n).map_err(|_| invalid());
    }
    match value.as_f64() {
        Some(n) if n.fract() == 0.0 && (0.0..=u32::MAX as f64).contains(&n) => Ok(n as u32),
        _ => Err(invalid()),
    }
}

/// Whether an element write at `index` may proceed given `length`'s flags.
pub(crate) fn index_write_allowed(attributes: &Attributes, index: u32) -> bool {
    index < current_length(attributes)
        || attributes.get(LENGTH).map_or(true, Descriptor::is_writable)
}

/// Grow `length` after an element write landed at `index`.
pub(crate) fn grow_for_index(attributes: &mut Attributes, index: u32) -> Option<Change> {
    let old = current_length(attributes);
    if index < old {
        return None;
    }
    set_length_value(attributes, index + 1);
    Some(length_updated(old))
}

/// Plain assignment to `length`. Returns `None` if the write is refused.
pub(crate) fn assign_length(
    attributes: &mut Attributes,
    value: &Value,
    element_quirks: bool,
) -> Result<Option<Vec<Change>>> {
    let new_len = to_length(value)?;
    if !attributes.get(LENGTH).map_or(true, Descriptor::is_writable) {
        trace!(new_len, "length is read-only, assignment ignored");
        return Ok(None);
    }

    let old = current_length(attributes);
    let (mut changes, final_len) = truncate(attributes, old, new_len, element_quirks);
    set_length_value(attributes, final_len);
    if final_len != old {
        changes.push(length_updated(old));
    }
    Ok(Some(changes))
}

/// Redefinition of `length`. A value change is reported as `updated`; a
/// flag change follows as a separate `reconfigured` record.
pub(crate) fn define_length(
    attributes: &mut Attributes,
    patch: &DescriptorPatch,
    element_quirks: bool,
) -> Result<Vec<Change>> {
    let current = attributes
        .get(LENGTH)
        .cloned()
        .unwrap_or_else(|| length_descriptor(0));
    let mut resolved = patch.resolve(LENGTH, Some(&current))?;
    if !resolved.is_data() {
        return Err(ObserveError::CannotRedefine(format!(
            "{LENGTH}: cannot become an accessor"
        )));
    }

    let old = current_length(attributes);
    let (mut changes, final_len) = match &patch.value {
        Some(value) => truncate(attributes, old, to_length(value)?, element_quirks),
        None => (Vec::new(), old),
    };

    if let Slot::Data { value, .. } = &mut resolved.slot {
        *value = Value::from(final_len);
    }
    if final_len != old {
        changes.push(length_updated(old));
    }
    if !current.same_shape(&resolved) {
        changes.push(Change::new(ChangeType::Reconfigured, LENGTH, None));
    }
    attributes.insert(LENGTH.to_string(), resolved);
    Ok(changes)
}

/// Initial `length` descriptor of a sequence record.
pub(crate) fn length_descriptor(len: u32) -> Descriptor {
    Descriptor {
        slot: Slot::Data {
            value: Value::from(len),
            writable: true,
        },
        enumerable: false,
        configurable: false,
    }
}

/// Delete elements at or above `new_len`, highest first. Returns the
/// deletions and the length actually reached.
fn truncate(
    attributes: &mut Attributes,
    old_len: u32,
    new_len: u32,
    element_quirks: bool,
) -> (Vec<Change>, u32) {
    let mut changes = Vec::new();
    if new_len >= old_len {
        return (changes, new_len);
    }

    let mut tail: Vec<u32> = attributes
        .keys()
        .filter_map(|name| element_index(name))
        .filter(|index| *index >= new_len)
        .collect();
    tail.sort_unstable_by(|a, b| b.cmp(a));

    for index in tail {
        let name = index.to_string();
        let Some(before) = attributes.get(&name) else {
            continue;
        };
        if !before.configurable {
            trace!(index, "truncation stopped at non-configurable element");
            return (changes, index + 1);
        }
        if let Some(before) = attributes.remove(&name) {
            changes.extend(classify(
                Mutation::Delete,
                &name,
                Some(&before),
                None,
                element_quirks,
            ));
        }
    }
    (changes, new_len)
}

fn set_length_value(attributes: &mut Attributes, len: u32) {
    match attributes.get_mut(LENGTH) {
        Some(Descriptor {
            slot: Slot::Data { value, .. },
            ..
        }) => *value = Value::from(len),
        _ => {
            attributes.insert(LENGTH.to_string(), length_descriptor(len));
        }
    }
}

fn length_updated(old: u32) -> Change {
    Change::new(ChangeType::Updated, LENGTH, Some(Value::from(old)))
}
