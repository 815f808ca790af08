//! Generic sequence operations.
//!
//! These work on any record with a numeric `length` and only use
//! `get`/`set`/`delete`, so every step is observed. On sequence records
//! the element writes already move `length` and the final `length`
//! assignment is usually silent; on plain records it is the single
//! `length` change.

use super::Record;
use crate::detector::LENGTH;
use crate::error::{ObserveError, Result};
use crate::types::Value;

/// `length` of a record as an unsigned 32-bit integer (0 if missing).
fn length_of(record: &Record) -> u32 {
    let Some(len) = record.get(LENGTH) else {
        return 0;
    };
    if let Some(n) = len.as_u64() {
        return n.min(u32::MAX as u64) as u32;
    }
    match len.as_f64() {
        Some(n) if n.is_finite() && n > 0.0 => n.min(u32::MAX as f64) as u32,
        _ => 0,
    }
}

/// `len + added`, or `InvalidLength` if that exceeds the largest length.
fn grown_length(len: u32, added: usize) -> Result<u32> {
    u32::try_from(added)
        .ok()
        .and_then(|added| len.checked_add(added))
        .ok_or_else(|| {
            ObserveError::InvalidLength(format!("{len} + {added} exceeds {}", u32::MAX))
        })
}

/// Copy element `from` to `to`, or delete `to` if `from` is a hole.
fn move_element(record: &Record, from: u32, to: u32) -> Result<()> {
    let from = from.to_string();
    let to = to.to_string();
    if record.has(&from) {
        record.set(&to, record.get(&from).unwrap_or(Value::Null))?;
    } else {
        record.delete(&to);
    }
    Ok(())
}

/// Append `items`; returns the new length. Fails without writing
/// anything if the result would exceed the largest length.
pub fn push(record: &Record, items: impl IntoIterator<Item = Value>) -> Result<u32> {
    let items: Vec<Value> = items.into_iter().collect();
    let len = length_of(record);
    let new_len = grown_length(len, items.len())?;
    for (index, item) in (len..new_len).zip(items) {
        record.set(&index.to_string(), item)?;
    }
    record.set(LENGTH, new_len)?;
    Ok(new_len)
}

/// Remove and return the last element.
pub fn pop(record: &Record) -> Result<Option<Value>> {
    let len = length_of(record);
    if len == 0 {
        record.set(LENGTH, 0)?;
        return Ok(None);
    }
    let last = (len - 1).to_string();
    let element = record.get(&last);
    record.delete(&last);
    record.set(LENGTH, len - 1)?;
    Ok(element)
}

/// Remove and return the first element, moving the rest down.
pub fn shift(record: &Record) -> Result<Option<Value>> {
    let len = length_of(record);
    if len == 0 {
        record.set(LENGTH, 0)?;
        return Ok(None);
    }
    let first = record.get("0");
    for k in 1..len {
        move_element(record, k, k - 1)?;
    }
    record.delete(&(len - 1).to_string());
    record.set(LENGTH, len - 1)?;
    Ok(first)
}

/// Insert `items` at the front; returns the new length.
pub fn unshift(record: &Record, items: Vec<Value>) -> Result<u32> {
    let len = length_of(record);
    let new_len = grown_length(len, items.len())?;
    let count = new_len - len;
    for k in (1..=len).rev() {
        move_element(record, k - 1, k + count - 1)?;
    }
    for (j, item) in (0..count).zip(items) {
        record.set(&j.to_string(), item)?;
    }
    record.set(LENGTH, new_len)?;
    Ok(new_len)
}

/// Remove `delete_count` elements at `start` (negative counts from the
/// end) and insert `items` in their place. Returns the removed elements.
pub fn splice(
    record: &Record,
    start: i64,
    delete_count: u32,
    items: Vec<Value>,
) -> Result<Vec<Value>> {
    let len = length_of(record);
    let start = if start < 0 {
        (len as i64 + start).max(0) as u32
    } else {
        start.min(len as i64) as u32
    };
    let delete_count = delete_count.min(len - start);
    let new_len = grown_length(len - delete_count, items.len())?;
    let item_count = new_len - (len - delete_count);

    let removed: Vec<Value> = (start..start + delete_count)
        .map(|k| record.get(&k.to_string()).unwrap_or(Value::Null))
        .collect();

    if item_count < delete_count {
        for k in start..len - delete_count {
            move_element(record, k + delete_count, k + item_count)?;
        }
        for k in ((len - delete_count + item_count)..len).rev() {
            record.delete(&k.to_string());
        }
    } else if item_count > delete_count {
        for k in ((start + 1)..=(len - delete_count)).rev() {
            move_element(record, k + delete_count - 1, k + item_count - 1)?;
        }
    }

    for (index, item) in (start..new_len).zip(items) {
        record.set(&index.to_string(), item)?;
    }
    record.set(LENGTH, new_len)?;
    Ok(removed)
}
