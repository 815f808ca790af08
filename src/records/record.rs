//! Record handle and its attribute store.

use crate::detector::{self, classify, Change, Mutation, LENGTH};
use crate::error::{ObserveError, Result};
use crate::subscriptions::manager;
use crate::types::{element_index, json_type_name, Descriptor, DescriptorPatch, RecordId, Slot, Value};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use tracing::trace;

/// Attribute table of a record.
pub(crate) type Attributes = HashMap<String, Descriptor>;

/// Counter for generating record IDs.
static NEXT_RECORD_ID: AtomicU64 = AtomicU64::new(1);

/// Whether a record maintains a derived `length`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RecordKind {
    Plain,
    Sequence,
}

struct RecordState {
    attributes: Attributes,
    extensible: bool,
}

struct RecordInner {
    id: RecordId,
    kind: RecordKind,
    state: Mutex<RecordState>,
}

impl Drop for RecordInner {
    fn drop(&mut self) {
        manager::global().release_record(self.id);
    }
}

/// Shared handle to an observable record. Clones refer to the same record.
///
/// Handles are `Send + Sync`. Writes from several threads are serialized
/// per record, and their change records are queued in that same order.
#[derive(Clone)]
pub struct Record {
    inner: Arc<RecordInner>,
}

/// Non-owning reference to a record.
#[derive(Clone)]
pub struct WeakRecord {
    inner: Weak<RecordInner>,
}

impl WeakRecord {
    pub fn upgrade(&self) -> Option<Record> {
        self.inner.upgrade().map(|inner| Record { inner })
    }
}

impl Record {
    fn with_attributes(kind: RecordKind, attributes: Attributes) -> Self {
        Self {
            inner: Arc::new(RecordInner {
                id: RecordId(NEXT_RECORD_ID.fetch_add(1, Ordering::SeqCst)),
                kind,
                state: Mutex::new(RecordState {
                    attributes,
                    extensible: true,
                }),
            }),
        }
    }

    /// Create an empty plain record.
    pub fn new() -> Self {
        Self::with_attributes(RecordKind::Plain, Attributes::new())
    }

    /// Create a sequence record holding `items` at indices `0..n`.
    pub fn sequence(items: impl IntoIterator<Item = Value>) -> Self {
        let mut attributes = Attributes::new();
        let mut len = 0u32;
        for item in items {
            attributes.insert(len.to_string(), Descriptor::data(item));
            len += 1;
        }
        attributes.insert(LENGTH.to_string(), detector::length_descriptor(len));
        Self::with_attributes(RecordKind::Sequence, attributes)
    }

    /// Build a record from JSON: objects become plain records, arrays
    /// become sequences. Anything else is not attribute-bearing.
    pub fn from_json(value: Value) -> Result<Self> {
        match value {
            Value::Object(map) => Ok(Self::with_attributes(
                RecordKind::Plain,
                map.into_iter()
                    .map(|(name, value)| (name, Descriptor::data(value)))
                    .collect(),
            )),
            Value::Array(items) => Ok(Self::sequence(items)),
            other => Err(ObserveError::InvalidTarget(format!(
                "{} is not attribute-bearing",
                json_type_name(&other)
            ))),
        }
    }

    pub fn id(&self) -> RecordId {
        self.inner.id
    }

    pub fn kind(&self) -> RecordKind {
        self.inner.kind
    }

    pub fn is_sequence(&self) -> bool {
        self.inner.kind == RecordKind::Sequence
    }

    pub fn downgrade(&self) -> WeakRecord {
        WeakRecord {
            inner: Arc::downgrade(&self.inner),
        }
    }

    pub fn ptr_eq(&self, other: &Record) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    // --- Reads ---

    /// Read an attribute. Accessors run their getter; missing attributes
    /// and accessors without a getter read as `None`.
    pub fn get(&self, name: &str) -> Option<Value> {
        let state = self.inner.state.lock();
        let getter = match &state.attributes.get(name)?.slot {
            Slot::Data { value, .. } => return Some(value.clone()),
            Slot::Accessor { getter, .. } => getter.clone()?,
        };
        drop(state);
        Some(getter.call())
    }

    pub fn has(&self, name: &str) -> bool {
        self.inner.state.lock().attributes.contains_key(name)
    }

    pub fn descriptor(&self, name: &str) -> Option<Descriptor> {
        self.inner.state.lock().attributes.get(name).cloned()
    }

    /// Attribute names, element indices first in ascending order.
    pub fn keys(&self) -> Vec<String> {
        let state = self.inner.state.lock();
        let mut keys: Vec<String> = state.attributes.keys().cloned().collect();
        keys.sort_by(|a, b| match (element_index(a), element_index(b)) {
            (Some(x), Some(y)) => x.cmp(&y),
            (Some(_), None) => std::cmp::Ordering::Less,
            (None, Some(_)) => std::cmp::Ordering::Greater,
            (None, None) => a.cmp(b),
        });
        keys
    }

    // --- Mutations ---

    /// Plain assignment.
    ///
    /// Returns `Ok(false)` when the store refuses the write: read-only
    /// attribute, accessor without a setter, new attribute on a
    /// non-extensible record, or element past a read-only `length`.
    pub fn set(&self, name: &str, value: impl Into<Value>) -> Result<bool> {
        let value = value.into();
        let quirks = manager::global().config().element_quirks;
        let mut state = self.inner.state.lock();

        let setter = match state.attributes.get(name) {
            Some(Descriptor {
                slot: Slot::Accessor { setter, .. },
                ..
            }) => Some(setter.clone()),
            Some(desc) if !desc.is_writable() => {
                trace!(record = %self.id(), attribute = name, "read-only, assignment ignored");
                return Ok(false);
            }
            None if !state.extensible => {
                trace!(record = %self.id(), attribute = name, "not extensible, assignment ignored");
                return Ok(false);
            }
            _ => None,
        };
        if let Some(setter) = setter {
            drop(state);
            return Ok(match setter {
                Some(setter) => {
                    setter.call(value);
                    true
                }
                None => false,
            });
        }

        let mut changes = Vec::new();
        if self.is_sequence() && name == LENGTH {
            match detector::assign_length(&mut state.attributes, &value, quirks)? {
                Some(length_changes) => changes = length_changes,
                None => return Ok(false),
            }
        } else {
            let index = self.element(name);
            if let Some(index) = index {
                if !detector::index_write_allowed(&state.attributes, index) {
                    return Ok(false);
                }
            }
            let before = state.attributes.get(name).cloned();
            let after = match &before {
                Some(desc) => Descriptor {
                    slot: Slot::Data {
                        value,
                        writable: true,
                    },
                    ..desc.clone()
                },
                None => Descriptor::data(value),
            };
            changes.extend(classify(
                Mutation::Assign,
                name,
                before.as_ref(),
                Some(&after),
                quirks,
            ));
            state.attributes.insert(name.to_string(), after);
            if let Some(index) = index {
                changes.extend(detector::grow_for_index(&mut state.attributes, index));
            }
        }

        self.emit(changes);
        drop(state);
        Ok(true)
    }

    /// Define or redefine an attribute from a partial descriptor.
    pub fn define(&self, name: &str, patch: DescriptorPatch) -> Result<()> {
        let quirks = manager::global().config().element_quirks;
        let mut state = self.inner.state.lock();

        let changes = if self.is_sequence() && name == LENGTH {
            detector::define_length(&mut state.attributes, &patch, quirks)?
        } else {
            let before = state.attributes.get(name).cloned();
            if before.is_none() && !state.extensible {
                return Err(ObserveError::NotExtensible(name.to_string()));
            }
            let index = self.element(name);
            if let Some(index) = index {
                if !detector::index_write_allowed(&state.attributes, index) {
                    return Err(ObserveError::CannotRedefine(format!(
                        "{name}: index beyond read-only length"
                    )));
                }
            }
            let after = patch.resolve(name, before.as_ref())?;
            let mut changes: Vec<Change> =
                classify(Mutation::Define, name, before.as_ref(), Some(&after), quirks)
                    .into_iter()
                    .collect();
            state.attributes.insert(name.to_string(), after);
            if let Some(index) = index {
                changes.extend(detector::grow_for_index(&mut state.attributes, index));
            }
            changes
        };

        self.emit(changes);
        drop(state);
        Ok(())
    }

    /// Delete an attribute. Returns `false` if it is not configurable;
    /// deleting a missing attribute succeeds silently.
    pub fn delete(&self, name: &str) -> bool {
        let quirks = manager::global().config().element_quirks;
        let mut state = self.inner.state.lock();

        match state.attributes.get(name) {
            None => return true,
            Some(desc) if !desc.configurable => {
                trace!(record = %self.id(), attribute = name, "not configurable, delete refused");
                return false;
            }
            Some(_) => {}
        }
        let before = state.attributes.remove(name);

        let changes: Vec<Change> = classify(Mutation::Delete, name, before.as_ref(), None, quirks)
            .into_iter()
            .collect();
        self.emit(changes);
        drop(state);
        true
    }

    // --- Integrity ---

    pub fn prevent_extensions(&self) {
        self.inner.state.lock().extensible = false;
    }

    /// Make the record non-extensible and every attribute non-configurable.
    pub fn seal(&self) {
        let mut state = self.inner.state.lock();
        state.extensible = false;
        for desc in state.attributes.values_mut() {
            desc.configurable = false;
        }
    }

    /// Seal the record and make every data attribute read-only.
    pub fn freeze(&self) {
        let mut state = self.inner.state.lock();
        state.extensible = false;
        for desc in state.attributes.values_mut() {
            desc.configurable = false;
            if let Slot::Data { writable, .. } = &mut desc.slot {
                *writable = false;
            }
        }
    }

    pub fn is_extensible(&self) -> bool {
        self.inner.state.lock().extensible
    }

    pub fn is_sealed(&self) -> bool {
        let state = self.inner.state.lock();
        !state.extensible && state.attributes.values().all(|desc| !desc.configurable)
    }

    pub fn is_frozen(&self) -> bool {
        let state = self.inner.state.lock();
        !state.extensible
            && state
                .attributes
                .values()
                .all(|desc| !desc.configurable && !desc.is_writable())
    }

    fn element(&self, name: &str) -> Option<u32> {
        if self.is_sequence() {
            element_index(name)
        } else {
            None
        }
    }

    /// Hand classified changes to the notifier, if anyone ever asked for one.
    ///
    /// Called with the record's lock held, so concurrent writers enqueue
    /// in the order their mutations were applied. The manager never takes
    /// a record lock.
    fn emit(&self, changes: Vec<Change>) {
        if changes.is_empty() {
            return;
        }
        let Some(notifier) = manager::global().existing_notifier(self.id()) else {
            return;
        };
        for change in changes {
            notifier.notify_change(change);
        }
    }
}

impl Default for Record {
    fn default() -> Self {
        Self::new()
    }
}

impl PartialEq for Record {
    fn eq(&self, other: &Self) -> bool {
        self.ptr_eq(other)
    }
}

impl Eq for Record {}

impl Hash for Record {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.inner.id.hash(state);
    }
}

impl fmt::Debug for Record {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Record")
            .field("id", &self.inner.id)
            .field("kind", &self.inner.kind)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Getter, Setter};
    use serde_json::json;

    #[test]
    fn test_from_json() {
        let record = Record::from_json(json!({"a": 1, "b": "two"})).unwrap();
        assert_eq!(record.kind(), RecordKind::Plain);
        assert_eq!(record.get("a"), Some(json!(1)));
        assert_eq!(record.get("missing"), None);

        let seq = Record::from_json(json!(["x", "y"])).unwrap();
        assert!(seq.is_sequence());
        assert_eq!(seq.get("length"), Some(json!(2)));
        assert_eq!(seq.keys(), vec!["0", "1", "length"]);

        assert!(matches!(
            Record::from_json(json!("text")),
            Err(ObserveError::InvalidTarget(_))
        ));
    }

    #[test]
    fn test_identity() {
        let a = Record::new();
        let b = Record::new();
        assert_eq!(a, a.clone());
        assert_ne!(a, b);
        assert_ne!(a.id(), b.id());
        assert!(a.downgrade().upgrade().unwrap().ptr_eq(&a));
    }

    #[test]
    fn test_read_only_assignment_ignored() {
        let record = Record::new();
        record
            .define("a", DescriptorPatch::value(1).with_writable(false))
            .unwrap();
        assert!(!record.set("a", 2).unwrap());
        assert_eq!(record.get("a"), Some(json!(1)));
    }

    #[test]
    fn test_accessor_get_and_set() {
        let record = Record::new();
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        record
            .define(
                "a",
                DescriptorPatch::getter(Getter::new(|| json!("computed")))
                    .with_setter(Setter::new(move |v| sink.lock().push(v))),
            )
            .unwrap();

        assert_eq!(record.get("a"), Some(json!("computed")));
        assert!(record.set("a", 5).unwrap());
        assert_eq!(*seen.lock(), vec![json!(5)]);
    }

    #[test]
    fn test_sequence_index_write_grows_length() {
        let seq = Record::sequence(vec![json!(1)]);
        seq.set("4", "x").unwrap();
        assert_eq!(seq.get("length"), Some(json!(5)));
        seq.set("length", 2).unwrap();
        assert!(!seq.has("4"));
        assert!(matches!(
            seq.set("length", -1),
            Err(ObserveError::InvalidLength(_))
        ));
    }

    #[test]
    fn test_integrity_levels() {
        let record = Record::from_json(json!({"a": 1})).unwrap();
        assert!(record.is_extensible());

        record.prevent_extensions();
        assert!(!record.set("b", 1).unwrap());
        assert!(matches!(
            record.define("b", DescriptorPatch::value(1)),
            Err(ObserveError::NotExtensible(_))
        ));
        assert!(!record.is_sealed());

        record.seal();
        assert!(record.is_sealed());
        assert!(!record.delete("a"));
        assert!(!record.is_frozen());

        record.freeze();
        assert!(record.is_frozen());
        assert!(!record.set("a", 2).unwrap());
    }

    #[test]
    fn test_delete_missing_succeeds() {
        let record = Record::new();
        assert!(record.delete("nothing"));
    }
}
