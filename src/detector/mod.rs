//! Change detection for attribute mutations.
//!
//! Turns a before/after descriptor pair into at most one classified
//! change, and derives the extra `length` changes that sequence records
//! produce when elements are written past the end or `length` itself is
//! altered.

mod classify;
mod length;

pub use classify::{classify, Change, Mutation};
pub(crate) use length::{
    assign_length, define_length, grow_for_index, index_write_allowed, length_descriptor,
};
pub use length::{current_length, to_length, LENGTH};
