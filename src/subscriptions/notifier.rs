//! Per-record notification hub.

use super::manager;
use super::types::{AsNotifier, Callback, ChangeRecord};
use crate::detector::Change;
use crate::error::{ObserveError, Result};
use crate::records::{Record, WeakRecord};
use crate::types::{json_type_name, ChangeType, RecordId, Value};
use parking_lot::Mutex;
use std::fmt;
use std::sync::Arc;
use tracing::trace;

struct NotifierInner {
    record_id: RecordId,
    record: WeakRecord,
    /// Active observers in subscription order, unique by identity.
    observers: Mutex<Vec<Callback>>,
}

/// The notification handle of one record. Obtained through
/// `get_notifier`; every call for the same record returns the same hub.
#[derive(Clone)]
pub struct Notifier {
    inner: Arc<NotifierInner>,
}

impl Notifier {
    pub(crate) fn new(record: &Record) -> Self {
        Self {
            inner: Arc::new(NotifierInner {
                record_id: record.id(),
                record: record.downgrade(),
                observers: Mutex::new(Vec::new()),
            }),
        }
    }

    pub fn record_id(&self) -> RecordId {
        self.inner.record_id
    }

    /// The owning record, while it is alive.
    pub fn record(&self) -> Option<Record> {
        self.inner.record.upgrade()
    }

    pub fn ptr_eq(&self, other: &Notifier) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    pub fn observer_count(&self) -> usize {
        self.inner.observers.lock().len()
    }

    /// Submit a change event.
    ///
    /// `event` must be a JSON object with a string `type`. Any `object`
    /// field is ignored: delivered records always name this notifier's
    /// record. Nothing beyond `type` is read when nobody observes.
    pub fn notify(&self, event: &Value) -> Result<()> {
        let Value::Object(fields) = event else {
            return Err(ObserveError::InvalidEvent(format!(
                "expected an object, got {}",
                json_type_name(event)
            )));
        };
        let change_type = match fields.get("type") {
            Some(Value::String(name)) => ChangeType::from(name.as_str()),
            Some(other) => {
                return Err(ObserveError::InvalidEvent(format!(
                    "type must be a string, got {}",
                    json_type_name(other)
                )))
            }
            None => return Err(ObserveError::InvalidEvent("missing type".into())),
        };

        let observers = self.snapshot();
        if observers.is_empty() {
            trace!(record = %self.record_id(), %change_type, "notify with no observers");
            return Ok(());
        }
        let Some(record) = self.record() else {
            return Ok(());
        };
        let change = ChangeRecord::from_event(record, change_type, fields);
        manager::global().enqueue(&observers, Arc::new(change));
        Ok(())
    }

    /// Submit a change produced by the change detector.
    pub fn notify_change(&self, change: Change) {
        let observers = self.snapshot();
        if observers.is_empty() {
            return;
        }
        let Some(record) = self.record() else {
            return;
        };
        trace!(
            record = %record.id(),
            attribute = %change.name,
            change_type = %change.change_type,
            "attribute change"
        );
        manager::global().enqueue(&observers, Arc::new(ChangeRecord::from_change(record, change)));
    }

    /// Add an observer. Returns false if it was already active.
    pub(crate) fn add_observer(&self, callback: &Callback) -> bool {
        let mut observers = self.inner.observers.lock();
        if observers.contains(callback) {
            return false;
        }
        observers.push(callback.clone());
        true
    }

    /// Remove an observer. Returns false if it was not active.
    pub(crate) fn remove_observer(&self, callback: &Callback) -> bool {
        let removed = {
            let mut observers = self.inner.observers.lock();
            observers
                .iter()
                .position(|c| c == callback)
                .map(|pos| observers.remove(pos))
        };
        removed.is_some()
    }

    /// Copy of the observer set, so fan-out never runs under the lock.
    fn snapshot(&self) -> Vec<Callback> {
        self.inner.observers.lock().clone()
    }
}

impl PartialEq for Notifier {
    fn eq(&self, other: &Self) -> bool {
        self.ptr_eq(other)
    }
}

impl fmt::Debug for Notifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Notifier")
            .field("record", &self.inner.record_id)
            .field("observers", &self.observer_count())
            .finish()
    }
}

/// Call `notify` with an arbitrary receiver. Fails with `InvalidReceiver`
/// unless the receiver is a notifier.
pub fn notify_on<R: AsNotifier + ?Sized>(receiver: &R, event: &Value) -> Result<()> {
    let notifier = receiver
        .as_notifier()
        .ok_or_else(|| ObserveError::InvalidReceiver("notify called on a non-notifier".into()))?;
    notifier.notify(event)
}
