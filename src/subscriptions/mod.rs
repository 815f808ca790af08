//! Subscriptions: notifiers, observers and batched delivery.
//!
//! Each record gets at most one [`Notifier`]. Observing a record adds a
//! callback to that notifier's observer set; every change submitted to the
//! notifier is appended to the queue of each observer at that moment.
//! Queues are flushed explicitly, one callback at a time, with
//! `deliver_change_records`, or all together with
//! `deliver_all_change_records`.
//!
//! # Example
//!
//! ```ignore
//! let record = Record::from_json(json!({"a": 1}))?;
//! let callback = Callback::new(|batch| {
//!     for change in batch {
//!         println!("{} {:?}", change.change_type, change.name);
//!     }
//! });
//!
//! observe(&record, &callback)?;
//! record.set("a", 2)?;
//! deliver_change_records(&callback)?;
//! ```

pub(crate) mod manager;
mod notifier;
mod types;

pub use manager::SubscriptionManager;
pub use notifier::{notify_on, Notifier};
pub use types::{
    AsCallback, AsNotifier, AsTarget, Callback, ChangeBatch, ChangeRecord, ObserveConfig,
};
