//! Shared node skeleton for both graph kinds: a unique id, successor/predecessor
//! and operand/user adjacency lists, and an SCC/walk bookkeeping slot.
//!
//! Nodes never hold live references to each other the way the node
//! hierarchy this is adapted from does: all adjacency is a [`NodeId`]
//! resolved through the owning graph's arena, so it is the graph — not the
//! node — that keeps an operand edge and its matching user back-edge in
//! sync (see `PointerGraph::add_operand`, `RdGraph::add_operand`).

use smallvec::SmallVec;
use std::fmt;

/// An index into a graph's node arena. Id `0` is reserved as a sentinel by
/// every arena that uses it — the "no node yet" / pre-allocated-special-node
/// value, never a real node's id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(u32);

impl NodeId {
    pub const SENTINEL: NodeId = NodeId(0);

    pub fn new(raw: u32) -> Self {
        NodeId(raw)
    }

    pub fn raw(self) -> u32 {
        self.0
    }

    pub fn is_sentinel(self) -> bool {
        self.0 == 0
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

type AdjList = SmallVec<[NodeId; 2]>;

/// Adjacency and bookkeeping state shared by every node tag in both the
/// pointer graph and the reaching-definitions graph.
#[derive(Debug, Clone)]
pub struct NodeBase {
    id: NodeId,
    successors: AdjList,
    predecessors: AdjList,
    operands: AdjList,
    users: AdjList,
    scc_id: u32,
    walk_id: u32,
}

impl NodeBase {
    pub fn new(id: NodeId) -> Self {
        NodeBase {
            id,
            successors: AdjList::new(),
            predecessors: AdjList::new(),
            operands: AdjList::new(),
            users: AdjList::new(),
            scc_id: 0,
            walk_id: 0,
        }
    }

    pub fn id(&self) -> NodeId {
        self.id
    }

    pub fn successors(&self) -> &[NodeId] {
        &self.successors
    }

    pub fn predecessors(&self) -> &[NodeId] {
        &self.predecessors
    }

    pub fn operands(&self) -> &[NodeId] {
        &self.operands
    }

    pub fn users(&self) -> &[NodeId] {
        &self.users
    }

    pub fn has_operand(&self, n: NodeId) -> bool {
        self.operands.contains(&n)
    }

    pub fn scc_id(&self) -> u32 {
        self.scc_id
    }

    pub fn set_scc_id(&mut self, id: u32) {
        self.scc_id = id;
    }

    /// Per-traversal visited marker; walkers stamp their own generation
    /// counter here instead of allocating a separate visited set.
    pub fn walk_id(&self) -> u32 {
        self.walk_id
    }

    pub fn set_walk_id(&mut self, id: u32) {
        self.walk_id = id;
    }

    pub(crate) fn push_successor(&mut self, succ: NodeId) {
        self.successors.push(succ);
    }

    pub(crate) fn push_predecessor(&mut self, pred: NodeId) {
        self.predecessors.push(pred);
    }

    /// Appends `operand`, returning the index it lives at. The caller must
    /// also call `push_user(self.id())` on `operand`'s own `NodeBase`.
    pub(crate) fn push_operand(&mut self, operand: NodeId) -> usize {
        self.operands.push(operand);
        self.operands.len() - 1
    }

    pub(crate) fn set_operand(&mut self, idx: usize, operand: NodeId) -> Option<NodeId> {
        self.operands.get(idx).copied().map(|old| {
            self.operands[idx] = operand;
            old
        })
    }

    pub(crate) fn clear_operands(&mut self) -> AdjList {
        std::mem::take(&mut self.operands)
    }

    pub(crate) fn push_user(&mut self, user: NodeId) {
        if !self.users.contains(&user) {
            self.users.push(user);
        }
    }

    pub(crate) fn remove_user(&mut self, user: NodeId) {
        if let Some(pos) = self.users.iter().position(|&u| u == user) {
            self.users.remove(pos);
        }
    }

    pub(crate) fn remove_successor(&mut self, succ: NodeId) {
        if let Some(pos) = self.successors.iter().position(|&s| s == succ) {
            self.successors.remove(pos);
        }
    }

    pub(crate) fn remove_predecessor(&mut self, pred: NodeId) {
        if let Some(pos) = self.predecessors.iter().position(|&p| p == pred) {
            self.predecessors.remove(pos);
        }
    }

    /// Drops every occurrence of `operand`, the φ-patching this graph needs
    /// when one of its merge predecessors is swept away.
    pub(crate) fn remove_operand(&mut self, operand: NodeId) {
        self.operands.retain(|o| *o != operand);
    }

    pub fn single_successor(&self) -> Option<NodeId> {
        (self.successors.len() == 1).then(|| self.successors[0])
    }

    pub fn single_predecessor(&self) -> Option<NodeId> {
        (self.predecessors.len() == 1).then(|| self.predecessors[0])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sentinel_is_zero() {
        assert!(NodeId::SENTINEL.is_sentinel());
        assert!(!NodeId::new(1).is_sentinel());
    }

    #[test]
    fn operand_push_reports_index() {
        let mut base = NodeBase::new(NodeId::new(1));
        assert_eq!(base.push_operand(NodeId::new(2)), 0);
        assert_eq!(base.push_operand(NodeId::new(3)), 1);
        assert_eq!(base.operands(), &[NodeId::new(2), NodeId::new(3)]);
    }

    #[test]
    fn user_push_is_deduplicated() {
        let mut base = NodeBase::new(NodeId::new(1));
        base.push_user(NodeId::new(5));
        base.push_user(NodeId::new(5));
        assert_eq!(base.users().len(), 1);
        base.remove_user(NodeId::new(5));
        assert!(base.users().is_empty());
    }

    #[test]
    fn single_successor_requires_exactly_one() {
        let mut base = NodeBase::new(NodeId::new(1));
        assert_eq!(base.single_successor(), None);
        base.push_successor(NodeId::new(9));
        assert_eq!(base.single_successor(), Some(NodeId::new(9)));
        base.push_successor(NodeId::new(10));
        assert_eq!(base.single_successor(), None);
    }
}
