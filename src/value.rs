//! Schema-free values for scopes whose model is an open property bag.
//!
//! Most callers watch fields of their own typed model. [`Value`] and
//! [`Properties`] cover the other case: a model whose properties are assigned
//! at runtime with no fixed schema. Lists and maps are shared and mutable, so
//! the two comparison modes behave differently on them: reference mode only
//! notices a *different* list, value mode also notices an edited one.

use crate::compare::{Watchable, numbers_equal};
use crate::hash::PropertyMap;
use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

/// Dynamically typed watchable value.
///
/// Cloning is cheap: composites are reference counted and a clone shares the
/// same list or map.
#[derive(Clone, Default)]
pub enum Value {
    /// Property was never assigned.
    #[default]
    Undefined,
    /// Explicit absence of a value.
    Null,
    /// Boolean.
    Bool(bool),
    /// Number; NaN compares equal to NaN.
    Number(f64),
    /// Immutable string.
    Str(Rc<str>),
    /// Shared mutable list.
    List(Rc<RefCell<Vec<Value>>>),
    /// Shared mutable map with insertion-ordered keys.
    Map(Rc<RefCell<PropertyMap<Value>>>),
}

impl Value {
    /// Build a new list value.
    pub fn list<I, T>(items: I) -> Self
    where
        I: IntoIterator<Item = T>,
        T: Into<Value>,
    {
        Value::List(Rc::new(RefCell::new(
            items.into_iter().map(Into::into).collect(),
        )))
    }

    /// Build a new map value.
    pub fn map<I, K, T>(entries: I) -> Self
    where
        I: IntoIterator<Item = (K, T)>,
        K: Into<String>,
        T: Into<Value>,
    {
        Value::Map(Rc::new(RefCell::new(
            entries
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        )))
    }

    /// Returns `true` for [`Value::Undefined`].
    pub fn is_undefined(&self) -> bool {
        matches!(self, Value::Undefined)
    }

    /// JavaScript-style truthiness: `Undefined`, `Null`, `false`, `0`, NaN
    /// and `""` are falsy.
    pub fn is_truthy(&self) -> bool {
        match self {
            Value::Undefined | Value::Null => false,
            Value::Bool(b) => *b,
            Value::Number(n) => *n != 0.0 && !n.is_nan(),
            Value::Str(s) => !s.is_empty(),
            Value::List(_) | Value::Map(_) => true,
        }
    }

    /// The boolean, if this is one.
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    /// The number, if this is one.
    pub fn as_number(&self) -> Option<f64> {
        match self {
            Value::Number(n) => Some(*n),
            _ => None,
        }
    }

    /// The string, if this is one.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Str(s) => Some(&**s),
            _ => None,
        }
    }

    /// The shared list behind a [`Value::List`].
    pub fn as_list(&self) -> Option<&Rc<RefCell<Vec<Value>>>> {
        match self {
            Value::List(list) => Some(list),
            _ => None,
        }
    }

    /// The shared map behind a [`Value::Map`].
    pub fn as_map(&self) -> Option<&Rc<RefCell<PropertyMap<Value>>>> {
        match self {
            Value::Map(map) => Some(map),
            _ => None,
        }
    }

    /// Append to a list value in place. Returns `false` if `self` is not a list.
    pub fn push(&self, item: impl Into<Value>) -> bool {
        match self {
            Value::List(list) => {
                list.borrow_mut().push(item.into());
                true
            }
            _ => false,
        }
    }
}

impl Watchable for Value {
    fn identical(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::Undefined, Value::Undefined) | (Value::Null, Value::Null) => true,
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::Number(a), Value::Number(b)) => numbers_equal(*a, *b),
            (Value::Str(a), Value::Str(b)) => a == b,
            (Value::List(a), Value::List(b)) => Rc::ptr_eq(a, b),
            (Value::Map(a), Value::Map(b)) => Rc::ptr_eq(a, b),
            _ => false,
        }
    }

    fn structurally_equal(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::List(a), Value::List(b)) => a.structurally_equal(b),
            (Value::Map(a), Value::Map(b)) => a.structurally_equal(b),
            _ => self.identical(other),
        }
    }

    fn share(&self) -> Self {
        self.clone()
    }

    fn snapshot(&self) -> Self {
        match self {
            Value::List(list) => Value::List(list.snapshot()),
            Value::Map(map) => Value::Map(map.snapshot()),
            other => other.clone(),
        }
    }
}

/// Structural equality, so `Value::list([1, 2]) == Value::list([1, 2])`.
impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        self.structurally_equal(other)
    }
}

impl fmt::Debug for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Undefined => f.write_str("undefined"),
            Value::Null => f.write_str("null"),
            Value::Bool(b) => write!(f, "{b}"),
            Value::Number(n) => write!(f, "{n}"),
            Value::Str(s) => write!(f, "{s:?}"),
            Value::List(list) => f.debug_list().entries(list.borrow().iter()).finish(),
            Value::Map(map) => f.debug_map().entries(map.borrow().iter()).finish(),
        }
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<f64> for Value {
    fn from(n: f64) -> Self {
        Value::Number(n)
    }
}

impl From<i32> for Value {
    fn from(n: i32) -> Self {
        Value::Number(f64::from(n))
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::Str(Rc::from(s))
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::Str(Rc::from(s))
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(value: Option<T>) -> Self {
        value.map_or(Value::Null, Into::into)
    }
}

// ============================================================================
// Properties
// ============================================================================

/// Open-ended property bag usable as a scope model.
///
/// Reading a property that was never assigned yields [`Value::Undefined`].
#[derive(Clone, Debug, Default)]
pub struct Properties {
    values: PropertyMap<Value>,
}

impl Properties {
    /// An empty property bag.
    pub fn new() -> Self {
        Self::default()
    }

    /// Read a property. Composites are shared with the stored value.
    pub fn get(&self, key: &str) -> Value {
        self.values.get(key).cloned().unwrap_or_default()
    }

    /// Read a numeric property, treating anything else as `None`.
    pub fn number(&self, key: &str) -> Option<f64> {
        self.values.get(key).and_then(Value::as_number)
    }

    /// Assign a property, returning the previous value.
    pub fn set(&mut self, key: impl Into<String>, value: impl Into<Value>) -> Value {
        self.values
            .insert(key.into(), value.into())
            .unwrap_or_default()
    }

    /// Remove a property, returning its value.
    pub fn remove(&mut self, key: &str) -> Value {
        self.values.shift_remove(key).unwrap_or_default()
    }

    /// Returns `true` if the property was assigned.
    pub fn contains(&self, key: &str) -> bool {
        self.values.contains_key(key)
    }

    /// Number of assigned properties.
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// Returns `true` if no property was assigned.
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Add `delta` to a numeric property. A missing or non-numeric property
    /// counts as zero.
    pub fn increment(&mut self, key: &str, delta: f64) -> f64 {
        let next = self.number(key).unwrap_or(0.0) + delta;
        self.set(key, next);
        next
    }

    /// Iterate over properties in assignment order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.values.iter().map(|(k, v)| (k.as_str(), v))
    }
}

impl<K: Into<String>, T: Into<Value>> FromIterator<(K, T)> for Properties {
    fn from_iter<I: IntoIterator<Item = (K, T)>>(iter: I) -> Self {
        Self {
            values: iter
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compare::Compare;

    #[test]
    fn missing_properties_read_as_undefined() {
        let props = Properties::new();
        assert!(props.get("someValue").is_undefined());
        assert!(!props.contains("someValue"));
    }

    #[test]
    fn undefined_and_null_are_distinct() {
        assert!(!Value::Undefined.identical(&Value::Null));
        assert!(Value::Undefined.identical(&Value::Undefined));
    }

    #[test]
    fn cloned_lists_share_storage() {
        let list = Value::list([1, 2, 3]);
        let alias = list.clone();
        assert!(alias.push(4));
        assert_eq!(list.as_list().unwrap().borrow().len(), 4);
        assert!(list.identical(&alias));
    }

    #[test]
    fn snapshot_detaches_nested_lists() {
        let inner = Value::list([1]);
        let outer = Value::map([("inner", inner.clone())]);
        let copy = outer.snapshot();

        inner.push(2);

        assert!(!Compare::Value.unchanged(&outer, &copy));
        assert!(Compare::Value.unchanged(&copy, &Value::map([("inner", Value::list([1]))])));
    }

    #[test]
    fn nan_numbers_are_equal() {
        let nan = Value::from(f64::NAN);
        assert!(nan.identical(&nan.clone()));
        assert_eq!(Value::list([f64::NAN]), Value::list([f64::NAN]));
    }

    #[test]
    fn truthiness_follows_script_rules() {
        assert!(!Value::Undefined.is_truthy());
        assert!(!Value::from(0).is_truthy());
        assert!(!Value::from("").is_truthy());
        assert!(Value::from("ashish").is_truthy());
        assert!(Value::list(Vec::<Value>::new()).is_truthy());
    }

    #[test]
    fn increment_treats_missing_as_zero() {
        let mut props = Properties::new();
        assert_eq!(props.increment("counter", 1.0), 1.0);
        assert_eq!(props.increment("counter", 1.0), 2.0);
        assert_eq!(props.number("counter"), Some(2.0));
    }

    #[test]
    fn properties_keep_assignment_order() {
        let props: Properties = [("b", 1), ("a", 2)].into_iter().collect();
        let keys: Vec<_> = props.iter().map(|(k, _)| k).collect();
        assert_eq!(keys, ["b", "a"]);
    }
}
