//! Points-to sets: `(target, offset)` pairs with the `Unknown`-offset
//! collapse rule (§3.4).

use crate::node::NodeId;
use slicer_utils::Offset;
use std::collections::HashSet;
use std::fmt;

/// A single points-to relation: "may point into `target` at `offset`".
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Pointer {
    pub target: NodeId,
    pub offset: Offset,
}

impl Pointer {
    pub fn new(target: NodeId, offset: Offset) -> Self {
        Pointer { target, offset }
    }

    pub fn unknown_offset(target: NodeId) -> Self {
        Pointer::new(target, Offset::Unknown)
    }
}

impl fmt::Display for Pointer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {})", self.target, self.offset)
    }
}

/// A set of [`Pointer`]s enforcing the collapse rule: once `(t, Unknown)`
/// is present, no `(t, k)` for concrete `k` may coexist with it — adding
/// `(t, Unknown)` evicts every existing `(t, k)`, and adding `(t, k)` while
/// `(t, Unknown)` is already present is a no-op.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PointsToSet {
    pointers: HashSet<Pointer>,
}

impl PointsToSet {
    pub fn new() -> Self {
        PointsToSet::default()
    }

    pub fn singleton(ptr: Pointer) -> Self {
        let mut set = PointsToSet::new();
        set.add(ptr);
        set
    }

    /// Inserts `ptr`, applying the collapse rule. Returns whether the set changed.
    pub fn add(&mut self, ptr: Pointer) -> bool {
        if self.pointers.contains(&Pointer::unknown_offset(ptr.target)) {
            return false;
        }
        if ptr.offset.is_unknown() {
            let evicted = self.remove_target(ptr.target);
            let inserted = self.pointers.insert(ptr);
            evicted || inserted
        } else {
            self.pointers.insert(ptr)
        }
    }

    /// Bulk-unions `other` into `self`, respecting the collapse rule pointer by pointer.
    pub fn union_with(&mut self, other: &PointsToSet) -> bool {
        let mut changed = false;
        for &ptr in &other.pointers {
            changed |= self.add(ptr);
        }
        changed
    }

    /// Removes every pointer with the given `target`, regardless of offset.
    fn remove_target(&mut self, target: NodeId) -> bool {
        let before = self.pointers.len();
        self.pointers.retain(|p| p.target != target);
        self.pointers.len() != before
    }

    pub fn has(&self, ptr: &Pointer) -> bool {
        self.pointers.contains(ptr)
    }

    pub fn points_to_target(&self, target: NodeId) -> bool {
        self.pointers.iter().any(|p| p.target == target)
    }

    /// True iff this set is exactly one concrete pointer, making a strong
    /// update to its target sound.
    pub fn must_point_to(&self, ptr: &Pointer) -> bool {
        !ptr.offset.is_unknown() && self.is_singleton() && self.has(ptr)
    }

    pub fn is_singleton(&self) -> bool {
        self.pointers.len() == 1
    }

    pub fn is_empty(&self) -> bool {
        self.pointers.is_empty()
    }

    pub fn len(&self) -> usize {
        self.pointers.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Pointer> {
        self.pointers.iter()
    }
}

impl FromIterator<Pointer> for PointsToSet {
    fn from_iter<I: IntoIterator<Item = Pointer>>(iter: I) -> Self {
        let mut set = PointsToSet::new();
        for ptr in iter {
            set.add(ptr);
        }
        set
    }
}
