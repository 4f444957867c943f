//! The pointer analysis's mutable store (§2 item 5): each memory object
//! maps `Offset -> PointsToSet`, and each flow-sensitive program point owns
//! a `MemoryMap` from allocation target to its `MemoryObject`.

use crate::node::NodeId;
use crate::points_to::{Pointer, PointsToSet};
use linked_hash_map::LinkedHashMap;
use slicer_utils::Offset;
use std::collections::HashMap;

/// The contents of one allocation: what each byte offset within it may hold.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MemoryObject {
    origin: Option<NodeId>,
    points_to: HashMap<Offset, PointsToSet>,
}

impl MemoryObject {
    pub fn new(origin: NodeId) -> Self {
        MemoryObject {
            origin: Some(origin),
            points_to: HashMap::new(),
        }
    }

    pub fn origin(&self) -> Option<NodeId> {
        self.origin
    }

    pub fn points_to(&self, offset: Offset) -> Option<&PointsToSet> {
        self.points_to.get(&offset)
    }

    pub fn points_to_mut(&mut self, offset: Offset) -> &mut PointsToSet {
        self.points_to.entry(offset).or_default()
    }

    pub fn add_points_to(&mut self, offset: Offset, ptr: Pointer) -> bool {
        self.points_to_mut(offset).add(ptr)
    }

    pub fn add_points_to_set(&mut self, offset: Offset, ptrs: &PointsToSet) -> bool {
        self.points_to_mut(offset).union_with(ptrs)
    }

    pub fn offsets(&self) -> impl Iterator<Item = Offset> + '_ {
        self.points_to.keys().copied()
    }

    pub fn is_empty(&self) -> bool {
        self.points_to.is_empty() || self.points_to.values().all(|s| s.is_empty())
    }
}

/// `Target -> MemoryObject`, one per flow-sensitive program point. Kept as
/// a [`LinkedHashMap`] so that two maps produced from the same construction
/// order compare and iterate deterministically — load-bearing for the
/// fixpoint's change detection, which compares successive snapshots.
#[derive(Debug, Clone, Default)]
pub struct MemoryMap {
    objects: LinkedHashMap<NodeId, MemoryObject>,
}

/// Structural equality, used by the flow-sensitive engines to detect
/// whether a node's memory state changed since its last visit without
/// needing `LinkedHashMap` itself to implement `PartialEq`.
impl PartialEq for MemoryMap {
    fn eq(&self, other: &Self) -> bool {
        self.objects.len() == other.objects.len()
            && self
                .objects
                .iter()
                .all(|(k, v)| other.objects.get(k) == Some(v))
    }
}

impl Eq for MemoryMap {}

impl MemoryMap {
    pub fn new() -> Self {
        MemoryMap::default()
    }

    pub fn get(&self, target: NodeId) -> Option<&MemoryObject> {
        self.objects.get(&target)
    }

    pub fn get_or_create(&mut self, target: NodeId) -> &mut MemoryObject {
        self.objects
            .entry(target)
            .or_insert_with(|| MemoryObject::new(target))
    }

    pub fn contains(&self, target: NodeId) -> bool {
        self.objects.contains_key(&target)
    }

    pub fn targets(&self) -> impl Iterator<Item = NodeId> + '_ {
        self.objects.keys().copied()
    }

    pub fn len(&self) -> usize {
        self.objects.len()
    }

    pub fn is_empty(&self) -> bool {
        self.objects.is_empty()
    }

    /// Merges `other` into `self` (copy-on-write join at a CFG merge
    /// point), returning whether anything changed. Per-target, per-offset
    /// points-to sets are unioned; a target present in only one map is
    /// adopted wholesale.
    pub fn merge(&mut self, other: &MemoryMap) -> bool {
        let mut changed = false;
        for (&target, obj) in other.objects.iter() {
            let mine = self.objects.entry(target).or_insert_with(MemoryObject::default);
            if mine.origin.is_none() {
                mine.origin = obj.origin;
            }
            for offset in obj.offsets() {
                if let Some(incoming) = obj.points_to(offset) {
                    changed |= mine.points_to_mut(offset).union_with(incoming);
                }
            }
        }
        changed
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn n(raw: u32) -> NodeId {
        NodeId::new(raw)
    }

    #[test]
    fn memory_object_tracks_per_offset_sets() {
        let mut obj = MemoryObject::new(n(1));
        assert!(obj.add_points_to(Offset::ZERO, Pointer::new(n(2), Offset::ZERO)));
        assert!(!obj.is_empty());
        assert_eq!(obj.points_to(Offset::ZERO).unwrap().len(), 1);
    }

    #[test]
    fn memory_map_merge_unions_matching_targets() {
        let mut a = MemoryMap::new();
        a.get_or_create(n(1)).add_points_to(Offset::ZERO, Pointer::new(n(2), Offset::ZERO));

        let mut b = MemoryMap::new();
        b.get_or_create(n(1)).add_points_to(Offset::ZERO, Pointer::new(n(3), Offset::ZERO));

        assert!(a.merge(&b));
        assert_eq!(a.get(n(1)).unwrap().points_to(Offset::ZERO).unwrap().len(), 2);
        assert!(!a.merge(&b));
    }

    #[test]
    fn memory_map_merge_adopts_new_targets() {
        let mut a = MemoryMap::new();
        let mut b = MemoryMap::new();
        b.get_or_create(n(9)).add_points_to(Offset::ZERO, Pointer::new(n(9), Offset::ZERO));
        assert!(a.merge(&b));
        assert!(a.contains(n(9)));
    }
}
