//! Subscription manager: notifier registry and per-callback delivery queues.

use super::notifier::Notifier;
use super::types::{AsCallback, AsTarget, Callback, ChangeBatch, ChangeRecord, ObserveConfig, WeakCallback};
use crate::error::{ObserveError, Result};
use crate::records::Record;
use crate::types::{CallbackId, RecordId};
use parking_lot::{Mutex, RwLock};
use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, OnceLock};
use tracing::{debug, warn};

static MANAGER: OnceLock<SubscriptionManager> = OnceLock::new();

/// The process-wide subscription manager.
pub(crate) fn global() -> &'static SubscriptionManager {
    MANAGER.get_or_init(SubscriptionManager::new)
}

/// Pending records of one callback.
struct DeliveryQueue {
    callback: WeakCallback,
    records: ChangeBatch,
}

#[derive(Default)]
struct ManagerState {
    /// Notifier of every record that has been observed or asked for one.
    notifiers: HashMap<RecordId, Notifier>,
    /// Non-empty queues, ordered by callback creation.
    queues: BTreeMap<CallbackId, DeliveryQueue>,
}

/// Maps records to notifiers and callbacks to their pending records.
///
/// Locks are never held while a callback, getter or setter runs: queues
/// are taken out before delivery, and anything removed from the tables is
/// dropped after the lock is released.
pub struct SubscriptionManager {
    state: Mutex<ManagerState>,
    config: RwLock<ObserveConfig>,
}

impl SubscriptionManager {
    fn new() -> Self {
        Self {
            state: Mutex::new(ManagerState::default()),
            config: RwLock::new(ObserveConfig::default()),
        }
    }

    /// The process-wide instance.
    pub fn global() -> &'static SubscriptionManager {
        global()
    }

    pub fn config(&self) -> ObserveConfig {
        self.config.read().clone()
    }

    pub fn configure(&self, config: ObserveConfig) {
        debug!(?config, "observe config updated");
        *self.config.write() = config;
    }

    // --- Subscriptions ---

    /// Start delivering changes of `target` to `callback`. Idempotent.
    pub fn observe<T, C>(&self, target: &T, callback: &C) -> Result<()>
    where
        T: AsTarget + ?Sized,
        C: AsCallback + ?Sized,
    {
        let record = target
            .as_record()
            .ok_or_else(|| ObserveError::InvalidTarget("observe: target is not a record".into()))?;
        let callback = callback.as_callback().ok_or_else(|| {
            ObserveError::InvalidCallback("observe: callback is not invocable".into())
        })?;
        if callback.is_frozen() {
            return Err(ObserveError::InvalidCallback(
                "observe: callback is frozen".into(),
            ));
        }

        let notifier = self.notifier_for(record);
        if notifier.add_observer(callback) {
            debug!(record = %record.id(), callback = ?callback.id(), "observing");
        }
        Ok(())
    }

    /// Stop delivering changes of `target` to `callback`. Records already
    /// queued stay queued. Idempotent.
    pub fn unobserve<T, C>(&self, target: &T, callback: &C) -> Result<()>
    where
        T: AsTarget + ?Sized,
        C: AsCallback + ?Sized,
    {
        let record = target.as_record().ok_or_else(|| {
            ObserveError::InvalidTarget("unobserve: target is not a record".into())
        })?;
        let callback = callback.as_callback().ok_or_else(|| {
            ObserveError::InvalidCallback("unobserve: callback is not invocable".into())
        })?;

        if let Some(notifier) = self.existing_notifier(record.id()) {
            if notifier.remove_observer(callback) {
                debug!(record = %record.id(), callback = ?callback.id(), "unobserved");
            }
        }
        Ok(())
    }

    /// The notifier of `target`, created on first request. `Ok(None)` for
    /// records that are no longer extensible.
    pub fn get_notifier<T: AsTarget + ?Sized>(&self, target: &T) -> Result<Option<Notifier>> {
        let record = target.as_record().ok_or_else(|| {
            ObserveError::InvalidTarget("getNotifier: target is not a record".into())
        })?;
        if !record.is_extensible() {
            return Ok(None);
        }
        Ok(Some(self.notifier_for(record)))
    }

    pub(crate) fn notifier_for(&self, record: &Record) -> Notifier {
        let mut state = self.state.lock();
        state
            .notifiers
            .entry(record.id())
            .or_insert_with(|| {
                debug!(record = %record.id(), "notifier created");
                Notifier::new(record)
            })
            .clone()
    }

    pub(crate) fn existing_notifier(&self, id: RecordId) -> Option<Notifier> {
        self.state.lock().notifiers.get(&id).cloned()
    }

    // --- Queues ---

    /// Append one shared record to the queue of every observer.
    pub(crate) fn enqueue(&self, observers: &[Callback], record: Arc<ChangeRecord>) {
        let mut state = self.state.lock();
        for callback in observers {
            state
                .queues
                .entry(callback.id())
                .or_insert_with(|| DeliveryQueue {
                    callback: callback.downgrade(),
                    records: Vec::new(),
                })
                .records
                .push(Arc::clone(&record));
        }
    }

    /// Number of records waiting for `callback`.
    pub fn pending_count(&self, callback: &Callback) -> usize {
        self.state
            .lock()
            .queues
            .get(&callback.id())
            .map_or(0, |queue| queue.records.len())
    }

    /// Number of live notifiers.
    pub fn notifier_count(&self) -> usize {
        self.state.lock().notifiers.len()
    }

    // --- Delivery ---

    /// Drain the queue of `callback` and invoke it once with the batch.
    ///
    /// Returns `Ok(false)` without invoking anything if the queue is
    /// empty. Records produced while the callback runs land in a new
    /// queue for the next delivery.
    pub fn deliver_change_records<C: AsCallback + ?Sized>(&self, callback: &C) -> Result<bool> {
        let callback = callback.as_callback().ok_or_else(|| {
            ObserveError::InvalidCallback("deliverChangeRecords: callback is not invocable".into())
        })?;

        let queue = self.state.lock().queues.remove(&callback.id());
        let Some(queue) = queue else {
            return Ok(false);
        };
        debug!(callback = ?callback.id(), records = queue.records.len(), "delivering change records");
        callback.invoke(queue.records);
        Ok(true)
    }

    /// Deliver every pending queue, oldest callback first, until none is
    /// left or `max_delivery_rounds` invocations have happened. Returns the
    /// number of invocations.
    pub fn deliver_all(&self) -> usize {
        let max_rounds = self.config().max_delivery_rounds;
        let mut delivered = 0;

        while delivered < max_rounds {
            let next = self.state.lock().queues.pop_first();
            let Some((id, queue)) = next else {
                return delivered;
            };
            let Some(callback) = queue.callback.upgrade() else {
                continue;
            };
            debug!(callback = ?id, records = queue.records.len(), "delivering change records");
            callback.invoke(queue.records);
            delivered += 1;
        }

        let remaining = self.state.lock().queues.len();
        if remaining > 0 {
            warn!(delivered, remaining, "delivery round limit reached, records left pending");
        }
        delivered
    }

    // --- Cleanup ---

    pub(crate) fn release_record(&self, id: RecordId) {
        let removed = self.state.lock().notifiers.remove(&id);
        drop(removed);
    }

    pub(crate) fn release_callback(&self, id: CallbackId) {
        let removed = self.state.lock().queues.remove(&id);
        drop(removed);
    }
}
