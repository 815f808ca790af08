//! Observable records.
//!
//! A record is an identity-bearing map of named attributes. Every
//! mutation goes through the change detector, and the resulting changes
//! are handed to the record's notifier when one exists.

mod ops;
mod record;

pub use ops::{pop, push, shift, splice, unshift};
pub use record::{Record, RecordKind, WeakRecord};

pub(crate) use record::Attributes;
