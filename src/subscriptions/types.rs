//! Subscription types: callbacks, change records and configuration.

use super::manager;
use super::notifier::Notifier;
use crate::detector::Change;
use crate::records::Record;
use crate::types::{CallbackId, ChangeType, Value};
use serde::ser::SerializeMap;
use serde::{Serialize, Serializer};
use serde_json::Map;
use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Weak};

/// Configuration for the observation engine.
#[derive(Clone, Debug)]
pub struct ObserveConfig {
    /// Reproduce the legacy element behaviour: index-named attributes that
    /// were accessors report a `null` old value, and accessor-to-data
    /// redefinition of them is an `updated` change.
    /// Default: true
    pub element_quirks: bool,

    /// Max callback invocations per `deliver_all_change_records` call.
    /// Default: 1024
    pub max_delivery_rounds: usize,
}

impl Default for ObserveConfig {
    fn default() -> Self {
        Self {
            element_quirks: true,
            max_delivery_rounds: 1024,
        }
    }
}

/// An immutable description of one change to a record.
///
/// Records produced by one notification are shared (by `Arc`) between
/// every callback that receives them.
#[derive(Clone, Debug)]
pub struct ChangeRecord {
    /// The record that changed (always the notifier's own record).
    pub object: Record,
    pub change_type: ChangeType,
    pub name: Option<String>,
    pub old_value: Option<Value>,
    /// Caller-supplied fields of a directly submitted event.
    pub extra: Map<String, Value>,
}

/// One delivery: the drained queue of a callback, in notification order.
pub type ChangeBatch = Vec<Arc<ChangeRecord>>;

impl ChangeRecord {
    pub(crate) fn from_change(object: Record, change: Change) -> Self {
        Self {
            object,
            change_type: change.change_type,
            name: Some(change.name),
            old_value: change.old_value,
            extra: Map::new(),
        }
    }

    /// Build from a validated event. `type` and `object` are not copied.
    pub(crate) fn from_event(
        object: Record,
        change_type: ChangeType,
        event: &Map<String, Value>,
    ) -> Self {
        let mut record = Self {
            object,
            change_type,
            name: None,
            old_value: None,
            extra: Map::new(),
        };
        for (key, value) in event {
            match (key.as_str(), value) {
                ("type" | "object", _) => {}
                ("name", Value::String(name)) => record.name = Some(name.clone()),
                ("oldValue", _) => record.old_value = Some(value.clone()),
                _ => {
                    record.extra.insert(key.clone(), value.clone());
                }
            }
        }
        record
    }

    /// JSON view without the `object` field:
    /// `{type, name?, oldValue?, ...extra}`.
    pub fn to_json(&self) -> Value {
        let mut map = self.extra.clone();
        map.insert("type".into(), Value::from(self.change_type.as_str()));
        if let Some(name) = &self.name {
            map.insert("name".into(), Value::from(name.as_str()));
        }
        if let Some(old_value) = &self.old_value {
            map.insert("oldValue".into(), old_value.clone());
        }
        Value::Object(map)
    }
}

impl Serialize for ChangeRecord {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(None)?;
        map.serialize_entry("object", &self.object.id())?;
        map.serialize_entry("type", &self.change_type)?;
        if let Some(name) = &self.name {
            map.serialize_entry("name", name)?;
        }
        if let Some(old_value) = &self.old_value {
            map.serialize_entry("oldValue", old_value)?;
        }
        for (key, value) in &self.extra {
            map.serialize_entry(key, value)?;
        }
        map.end()
    }
}

/// Counter for generating callback IDs.
static NEXT_CALLBACK_ID: AtomicU64 = AtomicU64::new(1);

type CallbackFn = dyn Fn(ChangeBatch) + Send + Sync;

struct CallbackInner {
    id: CallbackId,
    func: Box<CallbackFn>,
    frozen: AtomicBool,
}

impl Drop for CallbackInner {
    fn drop(&mut self) {
        manager::global().release_callback(self.id);
    }
}

/// Observer callback. Identity (not the function) decides subscription
/// membership; clones share identity and pending queue.
#[derive(Clone)]
pub struct Callback {
    inner: Arc<CallbackInner>,
}

#[derive(Clone)]
pub(crate) struct WeakCallback {
    inner: Weak<CallbackInner>,
}

impl WeakCallback {
    pub(crate) fn upgrade(&self) -> Option<Callback> {
        self.inner.upgrade().map(|inner| Callback { inner })
    }
}

impl Callback {
    pub fn new(f: impl Fn(ChangeBatch) + Send + Sync + 'static) -> Self {
        Self {
            inner: Arc::new(CallbackInner {
                id: CallbackId(NEXT_CALLBACK_ID.fetch_add(1, Ordering::SeqCst)),
                func: Box::new(f),
                frozen: AtomicBool::new(false),
            }),
        }
    }

    pub fn id(&self) -> CallbackId {
        self.inner.id
    }

    /// Frozen callbacks cannot start new observations.
    pub fn freeze(&self) {
        self.inner.frozen.store(true, Ordering::SeqCst);
    }

    pub fn is_frozen(&self) -> bool {
        self.inner.frozen.load(Ordering::SeqCst)
    }

    pub(crate) fn invoke(&self, batch: ChangeBatch) {
        (self.inner.func)(batch)
    }

    pub(crate) fn downgrade(&self) -> WeakCallback {
        WeakCallback {
            inner: Arc::downgrade(&self.inner),
        }
    }
}

impl PartialEq for Callback {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

impl Eq for Callback {}

impl fmt::Debug for Callback {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Callback")
            .field("id", &self.inner.id)
            .field("frozen", &self.is_frozen())
            .finish()
    }
}

// --- Argument views ---

/// Anything that may be passed where a record is expected.
pub trait AsTarget {
    /// The record, or `None` if the value is not attribute-bearing.
    fn as_record(&self) -> Option<&Record>;
}

impl AsTarget for Record {
    fn as_record(&self) -> Option<&Record> {
        Some(self)
    }
}

impl AsTarget for Value {
    fn as_record(&self) -> Option<&Record> {
        None
    }
}

/// Anything that may be passed where a callback is expected.
pub trait AsCallback {
    /// The callback, or `None` if the value is not invocable.
    fn as_callback(&self) -> Option<&Callback>;
}

impl AsCallback for Callback {
    fn as_callback(&self) -> Option<&Callback> {
        Some(self)
    }
}

impl AsCallback for Record {
    fn as_callback(&self) -> Option<&Callback> {
        None
    }
}

impl AsCallback for Value {
    fn as_callback(&self) -> Option<&Callback> {
        None
    }
}

/// Anything that may be used as the receiver of `notify`.
pub trait AsNotifier {
    fn as_notifier(&self) -> Option<&Notifier>;
}

impl AsNotifier for Notifier {
    fn as_notifier(&self) -> Option<&Notifier> {
        Some(self)
    }
}

impl AsNotifier for Option<Notifier> {
    fn as_notifier(&self) -> Option<&Notifier> {
        self.as_ref()
    }
}

impl AsNotifier for Record {
    fn as_notifier(&self) -> Option<&Notifier> {
        None
    }
}

impl AsNotifier for Value {
    fn as_notifier(&self) -> Option<&Notifier> {
        None
    }
}
