//! # Record Observe
//!
//! Change notifications for shared, mutable attribute records. Observers
//! subscribe to a record and receive ordered batches of change records
//! describing what happened, instead of polling.
//!
//! ## Core Concepts
//!
//! - **Records**: identity-bearing maps of named attributes, plain or
//!   sequence-like (with a derived `length`)
//! - **Change detection**: every assign/define/delete is classified as
//!   `new`, `updated`, `deleted` or `reconfigured`, or dropped as a no-op
//! - **Notifiers**: one per record; fan changes out to current observers
//! - **Delivery**: per-callback queues, flushed explicitly in one batch
//!
//! ## Example
//!
//! ```ignore
//! use record_observe::{deliver_change_records, observe, Callback, Record};
//! use serde_json::json;
//!
//! let record = Record::from_json(json!({"a": 1}))?;
//! let callback = Callback::new(|batch| {
//!     for change in &batch {
//!         println!("{}", change.to_json());
//!     }
//! });
//!
//! observe(&record, &callback)?;
//! record.set("a", 2)?;
//! record.delete("a");
//!
//! // One invocation with both changes, in order.
//! deliver_change_records(&callback)?;
//! ```

pub mod detector;
pub mod error;
pub mod records;
pub mod subscriptions;
pub mod types;

// Re-exports
pub use detector::{classify, Change, Mutation, LENGTH};
pub use error::{ObserveError, Result};
pub use records::{pop, push, shift, splice, unshift, Record, RecordKind, WeakRecord};
pub use subscriptions::{
    notify_on, AsCallback, AsNotifier, AsTarget, Callback, ChangeBatch, ChangeRecord, Notifier,
    ObserveConfig, SubscriptionManager,
};
pub use types::*;

/// Start delivering changes of `target` to `callback`.
///
/// Fails with `InvalidTarget` if `target` is not a record, and with
/// `InvalidCallback` if `callback` is not a callback or is frozen.
/// Observing an already observed pair does nothing.
pub fn observe<T, C>(target: &T, callback: &C) -> Result<()>
where
    T: AsTarget + ?Sized,
    C: AsCallback + ?Sized,
{
    SubscriptionManager::global().observe(target, callback)
}

/// Stop delivering changes of `target` to `callback`. Unobserving an
/// inactive pair does nothing.
pub fn unobserve<T, C>(target: &T, callback: &C) -> Result<()>
where
    T: AsTarget + ?Sized,
    C: AsCallback + ?Sized,
{
    SubscriptionManager::global().unobserve(target, callback)
}

/// The notifier of `target`; `None` if the record is not extensible.
pub fn get_notifier<T: AsTarget + ?Sized>(target: &T) -> Result<Option<Notifier>> {
    SubscriptionManager::global().get_notifier(target)
}

/// Invoke `callback` once with everything queued for it. Returns whether
/// it was invoked (an empty queue invokes nothing).
pub fn deliver_change_records<C: AsCallback + ?Sized>(callback: &C) -> Result<bool> {
    SubscriptionManager::global().deliver_change_records(callback)
}

/// Flush every pending queue. Returns the number of callback invocations.
pub fn deliver_all_change_records() -> usize {
    SubscriptionManager::global().deliver_all()
}

/// Replace the process-wide configuration.
pub fn configure(config: ObserveConfig) {
    SubscriptionManager::global().configure(config)
}

/// Current process-wide configuration.
pub fn config() -> ObserveConfig {
    SubscriptionManager::global().config()
}
