//! The reaching-definitions graph (§3.3): def sites, the RD map and its
//! merge algorithm (§4.5), and basic blocks with their SSA-builder sidecar.

use crate::node::{NodeBase, NodeId};
use slicer_utils::{Error, Interval, IntervalMap, Offset, Result};
use std::cmp::Ordering;
use std::collections::{BTreeMap, BTreeSet};

/// A write target: `target[offset .. offset+len)`. Either `offset` or `len`
/// may be `Unknown`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DefSite {
    pub target: NodeId,
    pub offset: Offset,
    pub len: Offset,
}

impl DefSite {
    pub fn new(target: NodeId, offset: Offset, len: Offset) -> Self {
        DefSite { target, offset, len }
    }

    pub fn whole(target: NodeId) -> Self {
        DefSite::new(target, Offset::Unknown, Offset::Unknown)
    }

    fn rank(o: Offset) -> (u8, u64) {
        match o {
            Offset::Concrete(v) => (0, v),
            Offset::Unknown => (1, 0),
        }
    }

    pub fn interval(&self) -> Interval {
        Interval::new(self.offset, self.len)
    }
}

/// Ordered first by `target` so that every def-site for a given target is
/// contiguous — mirroring the C++ map's `equal_range`-by-target lookups.
impl Ord for DefSite {
    fn cmp(&self, other: &Self) -> Ordering {
        self.target
            .cmp(&other.target)
            .then_with(|| Self::rank(self.offset).cmp(&Self::rank(other.offset)))
            .then_with(|| Self::rank(self.len).cmp(&Self::rank(other.len)))
    }
}

impl PartialOrd for DefSite {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// What [`RDMap::merge`] needs to know about a def-site's target that it
/// cannot determine on its own: its declared size (for whole-object strong
/// updates at an unknown offset) and whether it is dynamically allocated or
/// the designated unknown-memory sentinel (both exempt from the ordinary
/// strong-update check, per §4.5).
pub trait TargetInfo {
    fn size(&self, target: NodeId) -> Offset;
    fn is_dyn_alloc(&self, target: NodeId) -> bool;
    fn is_unknown(&self, target: NodeId) -> bool;
}

/// Outcome of one [`RDMap::merge`] call: whether anything changed, and
/// which def-sites were saturated to the caller-supplied `unknown_node`
/// this round (for the driver to turn into `Diagnostic::Saturated` warnings).
#[derive(Debug, Clone, Default)]
pub struct MergeOutcome {
    pub changed: bool,
    pub saturated: Vec<DefSite>,
}

/// `DefSite -> {reaching RDNode ids}`, with the weak-add/strong-update/merge
/// operations of §4.5.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RDMap {
    defs: BTreeMap<DefSite, BTreeSet<NodeId>>,
}

impl RDMap {
    pub fn new() -> Self {
        RDMap::default()
    }

    pub fn is_empty(&self) -> bool {
        self.defs.is_empty()
    }

    pub fn defines(&self, ds: &DefSite) -> bool {
        self.defs.contains_key(ds)
    }

    pub fn defines_with_any_offset(&self, target: NodeId) -> bool {
        self.defs.keys().any(|ds| ds.target == target)
    }

    /// Weak update: unions `node` into the def-site's reaching set.
    pub fn add(&mut self, ds: DefSite, node: NodeId) -> bool {
        self.defs.entry(ds).or_default().insert(node)
    }

    /// Strong update: replaces the def-site's reaching set with `{node}`.
    pub fn update(&mut self, ds: DefSite, node: NodeId) -> bool {
        let set = self.defs.entry(ds).or_default();
        let changed = set.len() != 1 || !set.contains(&node);
        set.clear();
        set.insert(node);
        changed
    }

    fn object_range(&self, target: NodeId) -> impl Iterator<Item = (&DefSite, &BTreeSet<NodeId>)> {
        self.defs.iter().filter(move |(ds, _)| ds.target == target)
    }

    /// Gathers the reaching definitions covering `query` on `target`.
    pub fn get(&self, target: NodeId, query: Interval) -> BTreeSet<NodeId> {
        let mut ret = BTreeSet::new();
        for (ds, nodes) in self.object_range(target) {
            let covers = query.is_unknown()
                || ds.offset.is_unknown()
                || ds.interval().overlaps(&query);
            if covers {
                ret.extend(nodes.iter().copied());
            }
        }
        ret
    }

    /// Merges `other` into `self` per §4.5: `no_update` (when given) names
    /// def-sites this branch of control flow is known to strongly
    /// overwrite, so the corresponding entries of `other` are dropped
    /// rather than unioned in; `merge_unknown` additionally folds every
    /// concrete-offset def-site for a target into its `Unknown`-offset
    /// def-site once one is seen.
    pub fn merge(
        &mut self,
        other: &RDMap,
        no_update: Option<&[DefSite]>,
        strong_update_unknown: bool,
        max_set_size: usize,
        merge_unknown: bool,
        info: &impl TargetInfo,
    ) -> MergeOutcome {
        let mut outcome = MergeOutcome::default();

        'outer: for (ds, nodes) in other.defs.iter() {
            let mut is_unknown = ds.offset.is_unknown();

            if let Some(no_update) = no_update {
                let matching: Vec<&DefSite> =
                    no_update.iter().filter(|d| d.target == ds.target).collect();

                if strong_update_unknown && is_unknown && info.size(ds.target).value().is_some_and(|s| s > 0) {
                    let whole = info.size(ds.target);
                    let overwrites_whole = matching.iter().any(|d2| {
                        matches!(d2.offset, Offset::Concrete(0))
                            && match (d2.len, whole) {
                                (Offset::Concrete(l), Offset::Concrete(s)) => l >= s,
                                _ => false,
                            }
                    });
                    if overwrites_whole {
                        continue 'outer;
                    }
                } else if !info.is_dyn_alloc(ds.target) {
                    let mut skip = false;
                    for d2 in &matching {
                        if d2.offset.is_unknown() {
                            is_unknown = true;
                            break;
                        }
                        if let (Offset::Concrete(a), Offset::Concrete(alen), Offset::Concrete(b), Offset::Concrete(blen)) =
                            (ds.offset, ds.len, d2.offset, d2.len)
                        {
                            if a >= b && a + alen <= b + blen {
                                skip = true;
                                break;
                            }
                        }
                    }
                    if skip {
                        continue 'outer;
                    }
                }
            }

            let key = if merge_unknown && is_unknown {
                let unknown_ds = DefSite::whole(ds.target);
                let stray: Vec<DefSite> = self
                    .defs
                    .keys()
                    .filter(|d| d.target == ds.target && **d != unknown_ds)
                    .copied()
                    .collect();
                let mut merged = self.defs.remove(&unknown_ds).unwrap_or_default();
                for key in stray {
                    if let Some(set) = self.defs.remove(&key) {
                        for node in set {
                            outcome.changed |= merged.insert(node);
                        }
                    }
                }
                self.defs.insert(unknown_ds, merged);
                unknown_ds
            } else {
                *ds
            };

            let our_vals = self.defs.entry(key).or_default();
            for &node in nodes {
                outcome.changed |= our_vals.insert(node);
            }

            if !info.is_unknown(ds.target) && our_vals.len() > max_set_size {
                outcome.saturated.push(key);
            }
        }

        outcome
    }
}

/// An id into [`RdGraph::blocks`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RdBlockId(u32);

/// A straight-line run of [`RdNode`]s, plus the `Definitions` sidecar the
/// SSA-style RD builder (§4.6.1) uses to resolve a read without rescanning
/// the whole block on every query.
#[derive(Debug, Clone)]
pub struct RdBasicBlock {
    id: RdBlockId,
    nodes: Vec<NodeId>,
    definitions: IntervalMap<NodeId>,
    /// Whether this is the graph's unique start block. The SSA builder's
    /// `readVariable` recursion must not treat a predecessor edge back into
    /// the start block as a normal loop-back merge (there is nothing to
    /// merge with before the first block), so it checks this flag rather
    /// than recursing.
    is_start_block: bool,
    /// Set by the slicer's block sweep once every node inside has been
    /// removed and a `remove_block` hook has approved dropping the block
    /// itself rather than leaving it behind as an orphan.
    removed: bool,
}

impl RdBasicBlock {
    pub fn id(&self) -> RdBlockId {
        self.id
    }

    pub fn nodes(&self) -> &[NodeId] {
        &self.nodes
    }

    pub fn is_start_block(&self) -> bool {
        self.is_start_block
    }

    pub fn is_removed(&self) -> bool {
        self.removed
    }

    pub fn definitions(&self) -> &IntervalMap<NodeId> {
        &self.definitions
    }

    pub fn record_definition(&mut self, interval: Interval, node: NodeId) {
        self.definitions.kill_overlapping(&interval);
        self.definitions.add(interval, node);
    }
}

/// The tag set of §3.3.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RdNodeTag {
    Alloc,
    DynAlloc,
    Store,
    Load,
    Phi,
    Call,
    CallReturn,
    Fork,
    Join,
    Return,
    Noop,
}

/// One reaching-definitions node: adjacency, its def/use sets, owning
/// block, and the per-node RD map the fixpoint accumulates into.
#[derive(Debug, Clone)]
pub struct RdNode {
    base: NodeBase,
    pub tag: RdNodeTag,
    size: Offset,
    defines: BTreeSet<DefSite>,
    overwrites: BTreeSet<DefSite>,
    uses: BTreeSet<DefSite>,
    block: Option<RdBlockId>,
    pub rd_map: RDMap,
}

impl RdNode {
    fn new(id: NodeId, tag: RdNodeTag) -> Self {
        RdNode {
            base: NodeBase::new(id),
            tag,
            size: Offset::Unknown,
            defines: BTreeSet::new(),
            overwrites: BTreeSet::new(),
            uses: BTreeSet::new(),
            block: None,
            rd_map: RDMap::new(),
        }
    }

    pub fn id(&self) -> NodeId {
        self.base.id()
    }

    pub fn base(&self) -> &NodeBase {
        &self.base
    }

    pub fn base_mut(&mut self) -> &mut NodeBase {
        &mut self.base
    }

    pub fn size(&self) -> Offset {
        self.size
    }

    pub fn defines(&self) -> &BTreeSet<DefSite> {
        &self.defines
    }

    pub fn overwrites(&self) -> &BTreeSet<DefSite> {
        &self.overwrites
    }

    pub fn uses(&self) -> &BTreeSet<DefSite> {
        &self.uses
    }

    pub fn block(&self) -> Option<RdBlockId> {
        self.block
    }
}

/// All nodes and basic blocks of one reaching-definitions graph, parallel
/// in structure to [`crate::pointer_graph::PointerGraph`].
#[derive(Debug)]
pub struct RdGraph {
    nodes: Vec<Option<RdNode>>,
    blocks: Vec<RdBasicBlock>,
    unknown_node: NodeId,
}

impl RdGraph {
    pub fn new() -> Self {
        let mut nodes = vec![None];
        let unknown_id = NodeId::new(nodes.len() as u32);
        nodes.push(Some(RdNode::new(unknown_id, RdNodeTag::Alloc)));

        RdGraph {
            nodes,
            blocks: Vec::new(),
            unknown_node: unknown_id,
        }
    }

    pub fn unknown_node(&self) -> NodeId {
        self.unknown_node
    }

    pub fn create_node(&mut self, tag: RdNodeTag) -> NodeId {
        let id = NodeId::new(self.nodes.len() as u32);
        self.nodes.push(Some(RdNode::new(id, tag)));
        id
    }

    pub fn get(&self, id: NodeId) -> Result<&RdNode> {
        self.nodes
            .get(id.raw() as usize)
            .and_then(|s| s.as_ref())
            .ok_or(Error::UnknownNode(id.raw()))
    }

    pub fn get_mut(&mut self, id: NodeId) -> Result<&mut RdNode> {
        self.nodes
            .get_mut(id.raw() as usize)
            .and_then(|s| s.as_mut())
            .ok_or(Error::UnknownNode(id.raw()))
    }

    pub fn node_ids(&self) -> impl Iterator<Item = NodeId> + '_ {
        self.nodes
            .iter()
            .enumerate()
            .filter_map(|(i, slot)| slot.as_ref().map(|_| NodeId::new(i as u32)))
    }

    pub fn set_size(&mut self, node: NodeId, size: Offset) -> Result<()> {
        self.get_mut(node)?.size = size;
        Ok(())
    }

    pub fn add_define(&mut self, node: NodeId, ds: DefSite) -> Result<()> {
        self.get(ds.target)?;
        self.get_mut(node)?.defines.insert(ds);
        Ok(())
    }

    pub fn add_overwrite(&mut self, node: NodeId, ds: DefSite) -> Result<()> {
        self.get(ds.target)?;
        self.get_mut(node)?.overwrites.insert(ds);
        Ok(())
    }

    pub fn add_use(&mut self, node: NodeId, ds: DefSite) -> Result<()> {
        self.get(ds.target)?;
        self.get_mut(node)?.uses.insert(ds);
        Ok(())
    }

    fn node_pair_mut(&mut self, a: NodeId, b: NodeId) -> Result<(&mut RdNode, &mut RdNode)> {
        let (ai, bi) = (a.raw() as usize, b.raw() as usize);
        if ai == bi {
            return Err(Error::malformed(format!("node {a} cannot be its own operand")));
        }
        let (lo, hi) = if ai < bi { (ai, bi) } else { (bi, ai) };
        let (left, right) = self.nodes.split_at_mut(hi);
        let lo_ref = left.get_mut(lo).and_then(|s| s.as_mut()).ok_or(Error::UnknownNode(lo as u32))?;
        let hi_ref = right.get_mut(0).and_then(|s| s.as_mut()).ok_or(Error::UnknownNode(hi as u32))?;
        if ai < bi {
            Ok((lo_ref, hi_ref))
        } else {
            Ok((hi_ref, lo_ref))
        }
    }

    pub fn add_successor(&mut self, from: NodeId, to: NodeId) -> Result<()> {
        let (f, t) = self.node_pair_mut(from, to)?;
        f.base.push_successor(to);
        t.base.push_predecessor(from);
        Ok(())
    }

    pub fn add_operand(&mut self, node: NodeId, operand: NodeId) -> Result<()> {
        let (n, op) = self.node_pair_mut(node, operand)?;
        n.base.push_operand(operand);
        op.base.push_user(node);
        Ok(())
    }

    pub fn create_block(&mut self, is_start_block: bool) -> RdBlockId {
        let id = RdBlockId(self.blocks.len() as u32);
        self.blocks.push(RdBasicBlock {
            id,
            nodes: Vec::new(),
            definitions: IntervalMap::new(),
            is_start_block,
            removed: false,
        });
        id
    }

    pub fn block(&self, id: RdBlockId) -> &RdBasicBlock {
        &self.blocks[id.0 as usize]
    }

    pub fn block_mut(&mut self, id: RdBlockId) -> &mut RdBasicBlock {
        &mut self.blocks[id.0 as usize]
    }

    pub fn blocks(&self) -> impl Iterator<Item = &RdBasicBlock> {
        self.blocks.iter()
    }

    pub fn assign_block(&mut self, node: NodeId, block: RdBlockId) -> Result<()> {
        self.get_mut(node)?.block = Some(block);
        self.blocks[block.0 as usize].nodes.push(node);
        Ok(())
    }

    /// Removes `node` from the arena, patching every predecessor's
    /// successor list, every successor's predecessor list, and every
    /// user's operand list (the φ-patching the slicer's node sweep needs)
    /// so no dangling id is left behind. Leaves `node`'s own block entry in
    /// place; callers sweeping a whole block drop it separately.
    pub fn delete_node(&mut self, node: NodeId) -> Result<()> {
        let removed = self.get(node)?.clone();
        for &pred in removed.base().predecessors() {
            if let Ok(p) = self.get_mut(pred) {
                p.base.remove_successor(node);
            }
        }
        for &succ in removed.base().successors() {
            if let Ok(s) = self.get_mut(succ) {
                s.base.remove_predecessor(node);
            }
        }
        for &operand in removed.base().operands() {
            if let Ok(o) = self.get_mut(operand) {
                o.base.remove_user(node);
            }
        }
        for &user in removed.base().users() {
            if let Ok(u) = self.get_mut(user) {
                u.base.remove_operand(node);
            }
        }
        if let Some(block) = removed.block {
            self.blocks[block.0 as usize].nodes.retain(|&n| n != node);
        }
        self.nodes[node.raw() as usize] = None;
        Ok(())
    }

    /// Marks an emptied block as removed. Does not patch any cross-block
    /// adjacency — that was already done when each of its nodes was
    /// deleted via [`RdGraph::delete_node`].
    pub fn remove_block(&mut self, block: RdBlockId) {
        self.blocks[block.0 as usize].removed = true;
    }
}

impl Default for RdGraph {
    fn default() -> Self {
        RdGraph::new()
    }
}

impl TargetInfo for RdGraph {
    fn size(&self, target: NodeId) -> Offset {
        self.get(target).map(|n| n.size()).unwrap_or(Offset::Unknown)
    }

    fn is_dyn_alloc(&self, target: NodeId) -> bool {
        self.get(target).map(|n| n.tag == RdNodeTag::DynAlloc).unwrap_or(false)
    }

    fn is_unknown(&self, target: NodeId) -> bool {
        target == self.unknown_node
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn n(raw: u32) -> NodeId {
        NodeId::new(raw)
    }

    #[test]
    fn add_is_weak_update_is_strong() {
        let mut map = RDMap::new();
        let ds = DefSite::new(n(1), Offset::ZERO, Offset::new(4));
        map.add(ds, n(10));
        map.add(ds, n(11));
        assert_eq!(map.get(n(1), ds.interval()).len(), 2);

        map.update(ds, n(12));
        assert_eq!(map.get(n(1), ds.interval()), BTreeSet::from([n(12)]));
    }

    struct FixedInfo {
        size: Offset,
        dyn_alloc: bool,
        unknown: NodeId,
    }

    impl TargetInfo for FixedInfo {
        fn size(&self, _t: NodeId) -> Offset {
            self.size
        }
        fn is_dyn_alloc(&self, _t: NodeId) -> bool {
            self.dyn_alloc
        }
        fn is_unknown(&self, t: NodeId) -> bool {
            t == self.unknown
        }
    }

    #[test]
    fn merge_unions_when_no_strong_update_given() {
        let mut a = RDMap::new();
        let mut b = RDMap::new();
        let ds = DefSite::new(n(1), Offset::ZERO, Offset::new(4));
        b.add(ds, n(20));

        let info = FixedInfo {
            size: Offset::Unknown,
            dyn_alloc: false,
            unknown: n(0),
        };
        let outcome = a.merge(&b, None, false, 1000, false, &info);
        assert!(outcome.changed);
        assert_eq!(a.get(n(1), ds.interval()), BTreeSet::from([n(20)]));
    }

    #[test]
    fn merge_skips_entries_overwritten_by_no_update() {
        let mut a = RDMap::new();
        let mut b = RDMap::new();
        let ds = DefSite::new(n(1), Offset::ZERO, Offset::new(4));
        b.add(ds, n(20));

        let no_update = vec![DefSite::new(n(1), Offset::ZERO, Offset::new(4))];
        let info = FixedInfo {
            size: Offset::Unknown,
            dyn_alloc: false,
            unknown: n(0),
        };
        let outcome = a.merge(&b, Some(&no_update), false, 1000, false, &info);
        assert!(!outcome.changed);
        assert!(a.get(n(1), ds.interval()).is_empty());
    }

    #[test]
    fn merge_saturates_past_max_set_size() {
        let mut a = RDMap::new();
        let mut b = RDMap::new();
        let ds = DefSite::new(n(1), Offset::ZERO, Offset::new(4));
        b.add(ds, n(20));
        b.add(ds, n(21));

        let info = FixedInfo {
            size: Offset::Unknown,
            dyn_alloc: false,
            unknown: n(0),
        };
        let outcome = a.merge(&b, None, false, 1, false, &info);
        assert_eq!(outcome.saturated, vec![ds]);
    }

    #[test]
    fn start_block_flag_is_preserved() {
        let mut g = RdGraph::new();
        let start = g.create_block(true);
        let other = g.create_block(false);
        assert!(g.block(start).is_start_block());
        assert!(!g.block(other).is_start_block());
    }
}
