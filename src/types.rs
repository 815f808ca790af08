//! Core types shared by records, the change detector and subscriptions.

use crate::error::{ObserveError, Result};
use serde::{Serialize, Serializer};
use std::fmt;
use std::sync::Arc;

/// Attribute values. JSON `null` doubles as the "undefined" value.
pub type Value = serde_json::Value;

/// Unique identity of a record (never compared by contents).
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub struct RecordId(pub u64);

impl fmt::Debug for RecordId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "RecordId({})", self.0)
    }
}

impl fmt::Display for RecordId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Unique identity of a callback. Ordered by creation.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct CallbackId(pub u64);

impl fmt::Debug for CallbackId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "CallbackId({})", self.0)
    }
}

/// Classification of a change record.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum ChangeType {
    New,
    Updated,
    Deleted,
    Reconfigured,
    /// Any other type submitted directly through a notifier.
    Custom(String),
}

impl ChangeType {
    pub fn as_str(&self) -> &str {
        match self {
            ChangeType::New => "new",
            ChangeType::Updated => "updated",
            ChangeType::Deleted => "deleted",
            ChangeType::Reconfigured => "reconfigured",
            ChangeType::Custom(name) => name,
        }
    }
}

impl From<&str> for ChangeType {
    fn from(s: &str) -> Self {
        match s {
            "new" => ChangeType::New,
            "updated" => ChangeType::Updated,
            "deleted" => ChangeType::Deleted,
            "reconfigured" => ChangeType::Reconfigured,
            other => ChangeType::Custom(other.to_string()),
        }
    }
}

impl fmt::Display for ChangeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Serialize for ChangeType {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

/// Accessor getter. Equality is by identity of the function.
#[derive(Clone)]
pub struct Getter(Arc<dyn Fn() -> Value + Send + Sync>);

impl Getter {
    pub fn new(f: impl Fn() -> Value + Send + Sync + 'static) -> Self {
        Getter(Arc::new(f))
    }

    pub fn call(&self) -> Value {
        (self.0)()
    }
}

impl PartialEq for Getter {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }
}

impl fmt::Debug for Getter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Getter({:p})", Arc::as_ptr(&self.0))
    }
}

/// Accessor setter. Equality is by identity of the function.
#[derive(Clone)]
pub struct Setter(Arc<dyn Fn(Value) + Send + Sync>);

impl Setter {
    pub fn new(f: impl Fn(Value) + Send + Sync + 'static) -> Self {
        Setter(Arc::new(f))
    }

    pub fn call(&self, value: Value) {
        (self.0)(value)
    }
}

impl PartialEq for Setter {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }
}

impl fmt::Debug for Setter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Setter({:p})", Arc::as_ptr(&self.0))
    }
}

/// What an attribute holds: a value, or a getter/setter pair.
#[derive(Clone, Debug, PartialEq)]
pub enum Slot {
    Data { value: Value, writable: bool },
    Accessor { getter: Option<Getter>, setter: Option<Setter> },
}

/// Full attribute descriptor as held by a record.
#[derive(Clone, Debug, PartialEq)]
pub struct Descriptor {
    pub slot: Slot,
    pub enumerable: bool,
    pub configurable: bool,
}

impl Descriptor {
    /// Writable, enumerable, configurable data attribute (plain assignment).
    pub fn data(value: Value) -> Self {
        Self {
            slot: Slot::Data {
                value,
                writable: true,
            },
            enumerable: true,
            configurable: true,
        }
    }

    pub fn is_data(&self) -> bool {
        matches!(self.slot, Slot::Data { .. })
    }

    /// Stored value for data attributes.
    pub fn value(&self) -> Option<&Value> {
        match &self.slot {
            Slot::Data { value, .. } => Some(value),
            Slot::Accessor { .. } => None,
        }
    }

    pub fn is_writable(&self) -> bool {
        matches!(self.slot, Slot::Data { writable: true, .. })
    }

    /// Whether a transition from `self` to `other` changes nothing: same
    /// shape, and the same value (by [`same_value`]) or the same functions.
    pub fn same_as(&self, other: &Descriptor) -> bool {
        if !self.same_shape(other) {
            return false;
        }
        match (&self.slot, &other.slot) {
            (Slot::Data { value: a, .. }, Slot::Data { value: b, .. }) => same_value(a, b),
            (a, b) => a == b,
        }
    }

    /// Same kind and same flags, ignoring the stored value or functions.
    pub fn same_shape(&self, other: &Descriptor) -> bool {
        if self.enumerable != other.enumerable || self.configurable != other.configurable {
            return false;
        }
        match (&self.slot, &other.slot) {
            (Slot::Data { writable: a, .. }, Slot::Data { writable: b, .. }) => a == b,
            (Slot::Accessor { .. }, Slot::Accessor { .. }) => true,
            _ => false,
        }
    }
}

/// Partial descriptor passed to `Record::define`. Absent fields keep the
/// current setting, or default to `false`/absent for new attributes.
#[derive(Clone, Debug, Default)]
pub struct DescriptorPatch {
    pub value: Option<Value>,
    pub writable: Option<bool>,
    pub getter: Option<Option<Getter>>,
    pub setter: Option<Option<Setter>>,
    pub enumerable: Option<bool>,
    pub configurable: Option<bool>,
}

impl DescriptorPatch {
    pub fn new() -> Self {
        Self::default()
    }

    /// Patch that only sets the value.
    pub fn value(value: impl Into<Value>) -> Self {
        Self::new().with_value(value)
    }

    /// Patch that only installs a getter.
    pub fn getter(getter: Getter) -> Self {
        Self::new().with_getter(getter)
    }

    pub fn with_value(mut self, value: impl Into<Value>) -> Self {
        self.value = Some(value.into());
        self
    }

    pub fn with_writable(mut self, writable: bool) -> Self {
        self.writable = Some(writable);
        self
    }

    pub fn with_getter(mut self, getter: Getter) -> Self {
        self.getter = Some(Some(getter));
        self
    }

    pub fn with_setter(mut self, setter: Setter) -> Self {
        self.setter = Some(Some(setter));
        self
    }

    pub fn with_enumerable(mut self, enumerable: bool) -> Self {
        self.enumerable = Some(enumerable);
        self
    }

    pub fn with_configurable(mut self, configurable: bool) -> Self {
        self.configurable = Some(configurable);
        self
    }

    pub fn is_data(&self) -> bool {
        self.value.is_some() || self.writable.is_some()
    }

    pub fn is_accessor(&self) -> bool {
        self.getter.is_some() || self.setter.is_some()
    }

    /// True if the patch touches anything besides the value.
    pub fn touches_flags(&self) -> bool {
        self.writable.is_some()
            || self.enumerable.is_some()
            || self.configurable.is_some()
            || self.is_accessor()
    }

    /// Merge this patch over `current`, enforcing the redefinition rules
    /// for non-configurable and non-writable attributes.
    pub fn resolve(&self, name: &str, current: Option<&Descriptor>) -> Result<Descriptor> {
        if self.is_data() && self.is_accessor() {
            return Err(ObserveError::InvalidDescriptor(format!(
                "{name}: cannot mix value/writable with getter/setter"
            )));
        }

        let Some(current) = current else {
            let slot = if self.is_accessor() {
                Slot::Accessor {
                    getter: self.getter.clone().flatten(),
                    setter: self.setter.clone().flatten(),
                }
            } else {
                Slot::Data {
                    value: self.value.clone().unwrap_or(Value::Null),
                    writable: self.writable.unwrap_or(false),
                }
            };
            return Ok(Descriptor {
                slot,
                enumerable: self.enumerable.unwrap_or(false),
                configurable: self.configurable.unwrap_or(false),
            });
        };

        if !current.configurable {
            self.check_locked(name, current)?;
        }

        let slot = match (&current.slot, self.is_data(), self.is_accessor()) {
            (Slot::Data { value, writable }, _, false) => Slot::Data {
                value: self.value.clone().unwrap_or_else(|| value.clone()),
                writable: self.writable.unwrap_or(*writable),
            },
            (Slot::Accessor { getter, setter }, false, _) => Slot::Accessor {
                getter: self.getter.clone().unwrap_or_else(|| getter.clone()),
                setter: self.setter.clone().unwrap_or_else(|| setter.clone()),
            },
            (Slot::Data { .. }, _, true) => Slot::Accessor {
                getter: self.getter.clone().flatten(),
                setter: self.setter.clone().flatten(),
            },
            (Slot::Accessor { .. }, true, _) => Slot::Data {
                value: self.value.clone().unwrap_or(Value::Null),
                writable: self.writable.unwrap_or(false),
            },
        };

        Ok(Descriptor {
            slot,
            enumerable: self.enumerable.unwrap_or(current.enumerable),
            configurable: self.configurable.unwrap_or(current.configurable),
        })
    }

    fn check_locked(&self, name: &str, current: &Descriptor) -> Result<()> {
        let refuse = |why: &str| Err(ObserveError::CannotRedefine(format!("{name}: {why}")));

        if self.configurable == Some(true) {
            return refuse("attribute is not configurable");
        }
        if self.enumerable.is_some_and(|e| e != current.enumerable) {
            return refuse("cannot change enumerability");
        }
        match &current.slot {
            Slot::Data { .. } if self.is_accessor() => refuse("cannot change attribute kind"),
            Slot::Accessor { .. } if self.is_data() => refuse("cannot change attribute kind"),
            Slot::Data {
                value,
                writable: false,
            } => {
                if self.writable == Some(true) {
                    return refuse("cannot make read-only attribute writable");
                }
                if self.value.as_ref().is_some_and(|v| !same_value(v, value)) {
                    return refuse("cannot change read-only value");
                }
                Ok(())
            }
            Slot::Accessor { getter, setter } => {
                if self.getter.as_ref().is_some_and(|g| g != getter) {
                    return refuse("cannot replace getter");
                }
                if self.setter.as_ref().is_some_and(|s| s != setter) {
                    return refuse("cannot replace setter");
                }
                Ok(())
            }
            Slot::Data { .. } => Ok(()),
        }
    }
}

/// Value identity for change detection. Numbers compare numerically, so
/// `1` and `1.0` are the same value, but `0` and `-0.0` are not. Arrays
/// and objects compare element-wise.
pub fn same_value(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Number(x), Value::Number(y)) if x.is_f64() || y.is_f64() => {
            match (x.as_f64(), y.as_f64()) {
                (Some(x), Some(y)) => x == y && x.is_sign_negative() == y.is_sign_negative(),
                _ => false,
            }
        }
        (Value::Array(xs), Value::Array(ys)) => {
            xs.len() == ys.len() && xs.iter().zip(ys).all(|(x, y)| same_value(x, y))
        }
        (Value::Object(xs), Value::Object(ys)) => {
            xs.len() == ys.len()
                && xs
                    .iter()
                    .all(|(key, x)| ys.get(key).is_some_and(|y| same_value(x, y)))
        }
        _ => a == b,
    }
}

/// Short type name of a JSON value, for error messages.
pub(crate) fn json_type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

/// Parse a canonical element index ("0", "17", but not "017" or "-1").
pub fn element_index(name: &str) -> Option<u32> {
    if name.is_empty() || !name.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    if name.len() > 1 && name.starts_with('0') {
        return None;
    }
    match name.parse::<u32>() {
        Ok(u32::MAX) | Err(_) => None,
        Ok(index) => Some(index),
    }
}
