//! Change detection for watched values.
//!
//! A watcher compares each freshly evaluated value against the one it stored
//! on the previous pass. Two comparison modes exist:
//!
//! - [`Compare::Reference`] asks whether the two values are *the same value*:
//!   shared composites (`Rc<T>`) compare by pointer, owned data compares by
//!   content. Mutating a shared composite in place is therefore invisible in
//!   this mode.
//! - [`Compare::Value`] asks whether the two values are *structurally equal*,
//!   recursing through composites. The watcher stores a [snapshot]
//!   of the value so that later in-place mutation of the original is detected.
//!
//! In both modes NaN compares equal to NaN. Ordinary float equality would keep
//! a NaN-valued watcher dirty forever.
//!
//! [snapshot]: Watchable::snapshot

use indexmap::IndexMap;
use std::cell::RefCell;
use std::collections::BTreeMap;
use std::hash::{BuildHasher, Hash};
use std::rc::Rc;

/// Comparison mode of a watcher.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum Compare {
    /// Identity comparison (the default).
    #[default]
    Reference,
    /// Deep structural comparison against a stored snapshot.
    Value,
}

impl Compare {
    /// Returns `true` when `new` counts as unchanged relative to `old`.
    #[inline]
    pub fn unchanged<V: Watchable + ?Sized>(self, new: &V, old: &V) -> bool {
        match self {
            Compare::Reference => new.identical(old),
            Compare::Value => new.structurally_equal(old),
        }
    }

    /// Produce the value a watcher should retain for the next comparison.
    #[inline]
    pub(crate) fn retain<V: Watchable>(self, value: &V) -> V {
        match self {
            Compare::Reference => value.share(),
            Compare::Value => value.snapshot(),
        }
    }
}

/// A value that can be returned from a watch function.
pub trait Watchable: 'static {
    /// Reference-mode equality.
    fn identical(&self, other: &Self) -> bool;

    /// Value-mode equality. Recurses into composites; NaN equals NaN.
    fn structurally_equal(&self, other: &Self) -> bool;

    /// A second handle to the same value: shares composites, copies scalars.
    fn share(&self) -> Self
    where
        Self: Sized;

    /// A structural copy that shares no mutable state with `self`.
    fn snapshot(&self) -> Self
    where
        Self: Sized;
}

/// Float equality where NaN equals NaN.
#[inline]
pub fn numbers_equal(a: f64, b: f64) -> bool {
    a == b || (a.is_nan() && b.is_nan())
}

// ============================================================================
// Scalars
// ============================================================================

macro_rules! impl_watchable_by_eq {
    ($($ty:ty),* $(,)?) => {$(
        impl Watchable for $ty {
            #[inline]
            fn identical(&self, other: &Self) -> bool {
                self == other
            }

            #[inline]
            fn structurally_equal(&self, other: &Self) -> bool {
                self == other
            }

            #[inline]
            fn share(&self) -> Self {
                self.clone()
            }

            #[inline]
            fn snapshot(&self) -> Self {
                self.clone()
            }
        }
    )*};
}

impl_watchable_by_eq!(
    (),
    bool,
    char,
    i8,
    i16,
    i32,
    i64,
    i128,
    isize,
    u8,
    u16,
    u32,
    u64,
    u128,
    usize,
    String,
    &'static str,
);

impl Watchable for f64 {
    #[inline]
    fn identical(&self, other: &Self) -> bool {
        numbers_equal(*self, *other)
    }

    #[inline]
    fn structurally_equal(&self, other: &Self) -> bool {
        numbers_equal(*self, *other)
    }

    #[inline]
    fn share(&self) -> Self {
        *self
    }

    #[inline]
    fn snapshot(&self) -> Self {
        *self
    }
}

impl Watchable for f32 {
    #[inline]
    fn identical(&self, other: &Self) -> bool {
        numbers_equal(f64::from(*self), f64::from(*other))
    }

    #[inline]
    fn structurally_equal(&self, other: &Self) -> bool {
        numbers_equal(f64::from(*self), f64::from(*other))
    }

    #[inline]
    fn share(&self) -> Self {
        *self
    }

    #[inline]
    fn snapshot(&self) -> Self {
        *self
    }
}

// ============================================================================
// Owned containers: identity means identical elements
// ============================================================================

impl<T: Watchable> Watchable for Option<T> {
    fn identical(&self, other: &Self) -> bool {
        match (self, other) {
            (Some(a), Some(b)) => a.identical(b),
            (None, None) => true,
            _ => false,
        }
    }

    fn structurally_equal(&self, other: &Self) -> bool {
        match (self, other) {
            (Some(a), Some(b)) => a.structurally_equal(b),
            (None, None) => true,
            _ => false,
        }
    }

    fn share(&self) -> Self {
        self.as_ref().map(Watchable::share)
    }

    fn snapshot(&self) -> Self {
        self.as_ref().map(Watchable::snapshot)
    }
}

impl<T: Watchable> Watchable for Vec<T> {
    fn identical(&self, other: &Self) -> bool {
        self.len() == other.len() && self.iter().zip(other).all(|(a, b)| a.identical(b))
    }

    fn structurally_equal(&self, other: &Self) -> bool {
        self.len() == other.len()
            && self
                .iter()
                .zip(other)
                .all(|(a, b)| a.structurally_equal(b))
    }

    fn share(&self) -> Self {
        self.iter().map(Watchable::share).collect()
    }

    fn snapshot(&self) -> Self {
        self.iter().map(Watchable::snapshot).collect()
    }
}

impl<K, V> Watchable for BTreeMap<K, V>
where
    K: Ord + Clone + 'static,
    V: Watchable,
{
    fn identical(&self, other: &Self) -> bool {
        self.len() == other.len()
            && self
                .iter()
                .zip(other)
                .all(|((ka, va), (kb, vb))| ka == kb && va.identical(vb))
    }

    fn structurally_equal(&self, other: &Self) -> bool {
        self.len() == other.len()
            && self
                .iter()
                .zip(other)
                .all(|((ka, va), (kb, vb))| ka == kb && va.structurally_equal(vb))
    }

    fn share(&self) -> Self {
        self.iter().map(|(k, v)| (k.clone(), v.share())).collect()
    }

    fn snapshot(&self) -> Self {
        self.iter().map(|(k, v)| (k.clone(), v.snapshot())).collect()
    }
}

// Key order is ignored, like field order in a record.
impl<K, V, S> Watchable for IndexMap<K, V, S>
where
    K: Hash + Eq + Clone + 'static,
    V: Watchable,
    S: BuildHasher + Default + 'static,
{
    fn identical(&self, other: &Self) -> bool {
        self.len() == other.len()
            && self
                .iter()
                .all(|(k, v)| other.get(k).is_some_and(|o| v.identical(o)))
    }

    fn structurally_equal(&self, other: &Self) -> bool {
        self.len() == other.len()
            && self
                .iter()
                .all(|(k, v)| other.get(k).is_some_and(|o| v.structurally_equal(o)))
    }

    fn share(&self) -> Self {
        self.iter().map(|(k, v)| (k.clone(), v.share())).collect()
    }

    fn snapshot(&self) -> Self {
        self.iter().map(|(k, v)| (k.clone(), v.snapshot())).collect()
    }
}

macro_rules! impl_watchable_tuple {
    ($(($($name:ident $idx:tt),+)),* $(,)?) => {$(
        impl<$($name: Watchable),+> Watchable for ($($name,)+) {
            fn identical(&self, other: &Self) -> bool {
                $(self.$idx.identical(&other.$idx))&&+
            }

            fn structurally_equal(&self, other: &Self) -> bool {
                $(self.$idx.structurally_equal(&other.$idx))&&+
            }

            fn share(&self) -> Self {
                ($(self.$idx.share(),)+)
            }

            fn snapshot(&self) -> Self {
                ($(self.$idx.snapshot(),)+)
            }
        }
    )*};
}

impl_watchable_tuple!(
    (A 0),
    (A 0, B 1),
    (A 0, B 1, C 2),
    (A 0, B 1, C 2, D 3),
);

// ============================================================================
// Shared containers: identity means the same allocation
// ============================================================================

impl<T: Watchable> Watchable for Rc<T> {
    #[inline]
    fn identical(&self, other: &Self) -> bool {
        Rc::ptr_eq(self, other)
    }

    fn structurally_equal(&self, other: &Self) -> bool {
        Rc::ptr_eq(self, other) || (**self).structurally_equal(&**other)
    }

    #[inline]
    fn share(&self) -> Self {
        Rc::clone(self)
    }

    fn snapshot(&self) -> Self {
        Rc::new((**self).snapshot())
    }
}

impl<T: Watchable> Watchable for RefCell<T> {
    fn identical(&self, other: &Self) -> bool {
        std::ptr::eq(self, other) || self.borrow().identical(&other.borrow())
    }

    fn structurally_equal(&self, other: &Self) -> bool {
        std::ptr::eq(self, other) || self.borrow().structurally_equal(&other.borrow())
    }

    fn share(&self) -> Self {
        RefCell::new(self.borrow().share())
    }

    fn snapshot(&self) -> Self {
        RefCell::new(self.borrow().snapshot())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn nan_is_equal_to_itself_in_both_modes() {
        assert!(Compare::Reference.unchanged(&f64::NAN, &f64::NAN));
        assert!(Compare::Value.unchanged(&f64::NAN, &f64::NAN));
        assert!(Compare::Value.unchanged(&vec![1.0, f64::NAN], &vec![1.0, f64::NAN]));
        assert!(!Compare::Reference.unchanged(&f64::NAN, &0.0));
    }

    #[test]
    fn shared_list_mutation_only_visible_by_value() {
        let list = Rc::new(RefCell::new(vec![1, 2, 3]));
        let by_reference = Compare::Reference.retain(&list);
        let by_value = Compare::Value.retain(&list);

        list.borrow_mut().push(4);

        assert!(Compare::Reference.unchanged(&list, &by_reference));
        assert!(!Compare::Value.unchanged(&list, &by_value));
    }

    #[test]
    fn distinct_allocations_differ_by_reference_only() {
        let a = Rc::new(vec![1, 2]);
        let b = Rc::new(vec![1, 2]);
        assert!(!Compare::Reference.unchanged(&a, &b));
        assert!(Compare::Value.unchanged(&a, &b));
    }

    #[test]
    fn snapshot_does_not_alias_nested_cells() {
        let inner = Rc::new(RefCell::new(vec![1]));
        let outer = vec![Rc::clone(&inner)];
        let copy = outer.snapshot();

        inner.borrow_mut().push(2);

        assert_eq!(*copy[0].borrow(), vec![1]);
        assert!(!outer.structurally_equal(&copy));
    }

    #[test]
    fn index_maps_ignore_key_order() {
        let a: IndexMap<&str, i32> = [("x", 1), ("y", 2)].into_iter().collect();
        let b: IndexMap<&str, i32> = [("y", 2), ("x", 1)].into_iter().collect();
        assert!(a.structurally_equal(&b));
        assert!(a.identical(&b));
    }

    #[test]
    fn tuples_compare_fieldwise() {
        assert!((1, String::from("a")).structurally_equal(&(1, String::from("a"))));
        assert!(!(1, f64::NAN).identical(&(2, f64::NAN)));
        assert!((1, f64::NAN).identical(&(1, f64::NAN)));
    }

    proptest! {
        #[test]
        fn snapshots_are_structurally_equal(values in prop::collection::vec(any::<f64>(), 0..32)) {
            let shared = Rc::new(RefCell::new(values));
            let copy = shared.snapshot();
            prop_assert!(Compare::Value.unchanged(&shared, &copy));
            prop_assert!(!Rc::ptr_eq(&shared, &copy));
        }

        #[test]
        fn reference_mode_is_reflexive_for_floats(x in any::<f64>()) {
            prop_assert!(Compare::Reference.unchanged(&x, &x));
        }
    }
}
