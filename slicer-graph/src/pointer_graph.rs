//! The pointer graph: node arena, per-procedure subgraphs, and the call
//! graph between them (§3.2). Construction goes exclusively through the
//! methods below (§6.1) so that every invariant in §3.2 holds by
//! construction rather than by later validation.

use crate::node::{NodeBase, NodeId};
use crate::points_to::{Pointer, PointsToSet};
use slicer_utils::{Error, Offset, Result};
use std::collections::HashMap;

/// Extra attributes carried only by `Alloc`/`DynAlloc` nodes.
#[derive(Debug, Clone, Default)]
pub struct AllocAttrs {
    pub heap: bool,
    pub global: bool,
    pub zero_initialized: bool,
    pub temporary: bool,
    pub size: Offset,
}

/// Extra attributes carried only by `Entry` nodes.
#[derive(Debug, Clone, Default)]
pub struct EntryAttrs {
    pub function_name: String,
    pub callers: Vec<NodeId>,
}

/// Extra attributes carried only by `Call` nodes: the set of subgraphs this
/// call may transfer control to, resolved incrementally as the pointer
/// analysis discovers new targets for indirect calls.
#[derive(Debug, Clone, Default)]
pub struct CallAttrs {
    pub callees: Vec<SubgraphId>,
}

/// A linked `Fork`/`Join` pair, identifying the two participating threads.
#[derive(Debug, Clone, Default)]
pub struct ForkJoinAttrs {
    pub partner: Option<NodeId>,
}

/// The tag set of §3.2, one variant per pointer-graph node kind.
#[derive(Debug, Clone)]
pub enum PsNodeTag {
    Alloc(AllocAttrs),
    DynAlloc(AllocAttrs),
    Load,
    Store,
    Gep { offset: Offset },
    Phi,
    Cast,
    Function,
    Call(CallAttrs),
    /// A call through a function-pointer value rather than a statically
    /// known target; its callee set starts empty and is discovered
    /// incrementally as the pointer analysis resolves the operand's
    /// points-to set (§4.2, §4.4).
    CallFuncPtr(CallAttrs),
    CallReturn,
    Entry(EntryAttrs),
    Return,
    Fork(ForkJoinAttrs),
    Join(ForkJoinAttrs),
    InvalidateLocals,
    Free,
    InvalidateObject,
    Constant,
    Noop,
    Memcpy { len: Offset },
    NullAddr,
    UnknownMem,
    Invalidated,
}

impl PsNodeTag {
    /// `Some(n)` for variants with a fixed operand count; `None` for the
    /// n-ary merge/interprocedural variants (`Phi`, `Call`, `CallReturn`,
    /// `Return`) which accept any number of operands.
    pub fn expected_operand_count(&self) -> Option<usize> {
        use PsNodeTag::*;
        match self {
            Alloc(_) | DynAlloc(_) | Function | Noop | Entry(_) | NullAddr | UnknownMem
            | Invalidated => Some(0),
            Load | Cast | InvalidateObject | InvalidateLocals | Free | Gep { .. } | Constant => {
                Some(1)
            }
            Store | Memcpy { .. } => Some(2),
            Fork(_) | Join(_) => Some(0),
            // `CallFuncPtr`'s first operand is the callee pointer, the rest
            // are arguments, so like `Call` it takes any number (>= 1).
            Phi | Call(_) | CallFuncPtr(_) | CallReturn | Return => None,
        }
    }

    pub fn name(&self) -> &'static str {
        use PsNodeTag::*;
        match self {
            Alloc(_) => "Alloc",
            DynAlloc(_) => "DynAlloc",
            Load => "Load",
            Store => "Store",
            Gep { .. } => "Gep",
            Phi => "Phi",
            Cast => "Cast",
            Function => "Function",
            Call(_) => "Call",
            CallFuncPtr(_) => "CallFuncPtr",
            CallReturn => "CallReturn",
            Entry(_) => "Entry",
            Return => "Return",
            Fork(_) => "Fork",
            Join(_) => "Join",
            InvalidateLocals => "InvalidateLocals",
            Free => "Free",
            InvalidateObject => "InvalidateObject",
            Constant => "Constant",
            Noop => "Noop",
            Memcpy { .. } => "Memcpy",
            NullAddr => "NullAddr",
            UnknownMem => "UnknownMem",
            Invalidated => "Invalidated",
        }
    }
}

/// A single pointer-graph node: adjacency (`base`), its tag, and the
/// fixpoint's running points-to set.
#[derive(Debug, Clone)]
pub struct PsNode {
    base: NodeBase,
    pub tag: PsNodeTag,
    pub points_to: PointsToSet,
    paired_node: Option<NodeId>,
    parent: Option<SubgraphId>,
}

impl PsNode {
    fn new(id: NodeId, tag: PsNodeTag) -> Self {
        let mut points_to = PointsToSet::new();
        if matches!(tag, PsNodeTag::Alloc(_) | PsNodeTag::DynAlloc(_) | PsNodeTag::Function) {
            points_to.add(Pointer::new(id, Offset::ZERO));
        }
        PsNode {
            base: NodeBase::new(id),
            tag,
            points_to,
            paired_node: None,
            parent: None,
        }
    }

    pub fn id(&self) -> NodeId {
        self.base.id()
    }

    pub fn base(&self) -> &NodeBase {
        &self.base
    }

    /// Exposed so analysis drivers can stamp SCC/walk bookkeeping without
    /// the graph needing a dedicated setter for every such field.
    pub fn base_mut(&mut self) -> &mut NodeBase {
        &mut self.base
    }

    pub fn paired_node(&self) -> Option<NodeId> {
        self.paired_node
    }

    pub fn parent(&self) -> Option<SubgraphId> {
        self.parent
    }

    pub fn is_null(&self) -> bool {
        matches!(self.tag, PsNodeTag::NullAddr)
    }

    pub fn is_unknown_memory(&self) -> bool {
        matches!(self.tag, PsNodeTag::UnknownMem)
    }

    pub fn is_invalidated(&self) -> bool {
        matches!(self.tag, PsNodeTag::Invalidated)
    }
}

/// An id into [`PointerGraph::subgraphs`]. Id `0` is never assigned to a
/// real subgraph (mirrors [`NodeId::SENTINEL`]'s reservation).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SubgraphId(u32);

/// One procedure's slice of the pointer graph: a unique entry and the set
/// of nodes that can return control to its callers.
#[derive(Debug, Clone)]
pub struct PointerSubgraph {
    id: SubgraphId,
    pub entry: NodeId,
    pub return_nodes: Vec<NodeId>,
    /// Formal parameter nodes, positional. A splice connects a callsite's
    /// argument operands into these by position (§4.4 "connect arguments").
    pub parameters: Vec<NodeId>,
    pub vararg: Option<NodeId>,
}

impl PointerSubgraph {
    pub fn id(&self) -> SubgraphId {
        self.id
    }
}

/// All nodes and subgraphs of one program, plus the call graph relating
/// subgraphs to each other. A graph is never shared; ownership lives with
/// whichever analysis driver constructed it.
#[derive(Debug)]
pub struct PointerGraph {
    nodes: Vec<Option<PsNode>>,
    subgraphs: Vec<PointerSubgraph>,
    globals: Vec<NodeId>,
    call_graph: HashMap<NodeId, Vec<NodeId>>,
    entry: Option<NodeId>,
    null_node: NodeId,
    unknown_node: NodeId,
    invalidated_node: NodeId,
}

impl PointerGraph {
    pub fn new() -> Self {
        // Slot 0 is the sentinel "no node" entry `NodeId::SENTINEL` refers to.
        let mut nodes = vec![None];

        let mut push_special = |nodes: &mut Vec<Option<PsNode>>, tag: PsNodeTag| -> NodeId {
            let id = NodeId::new(nodes.len() as u32);
            nodes.push(Some(PsNode::new(id, tag)));
            id
        };

        let null_node = push_special(&mut nodes, PsNodeTag::NullAddr);
        let unknown_node = push_special(&mut nodes, PsNodeTag::UnknownMem);
        let invalidated_node = push_special(&mut nodes, PsNodeTag::Invalidated);

        nodes[null_node.raw() as usize]
            .as_mut()
            .unwrap()
            .points_to
            .add(Pointer::new(null_node, Offset::ZERO));
        nodes[unknown_node.raw() as usize]
            .as_mut()
            .unwrap()
            .points_to
            .add(Pointer::unknown_offset(unknown_node));

        PointerGraph {
            nodes,
            subgraphs: Vec::new(),
            globals: Vec::new(),
            call_graph: HashMap::new(),
            entry: None,
            null_node,
            unknown_node,
            invalidated_node,
        }
    }

    pub fn null_node(&self) -> NodeId {
        self.null_node
    }

    pub fn unknown_node(&self) -> NodeId {
        self.unknown_node
    }

    pub fn invalidated_node(&self) -> NodeId {
        self.invalidated_node
    }

    pub fn entry(&self) -> Option<NodeId> {
        self.entry
    }

    pub fn set_entry(&mut self, node: NodeId) -> Result<()> {
        self.get(node)?;
        self.entry = Some(node);
        Ok(())
    }

    /// Creates a node of the given tag and returns its id. The id is
    /// permanent for the lifetime of the graph, even if the node is later
    /// removed.
    pub fn create_node(&mut self, tag: PsNodeTag) -> NodeId {
        let id = NodeId::new(self.nodes.len() as u32);
        self.nodes.push(Some(PsNode::new(id, tag)));
        id
    }

    /// Like [`create_node`](Self::create_node), but the node is recorded
    /// separately as a global, processed once before any subgraph runs.
    pub fn create_global(&mut self, tag: PsNodeTag) -> NodeId {
        let id = self.create_node(tag);
        self.globals.push(id);
        id
    }

    pub fn globals(&self) -> &[NodeId] {
        &self.globals
    }

    pub fn create_subgraph(&mut self, entry: NodeId, vararg: Option<NodeId>) -> Result<SubgraphId> {
        self.get(entry)?;
        let id = SubgraphId(self.subgraphs.len() as u32 + 1);
        self.subgraphs.push(PointerSubgraph {
            id,
            entry,
            return_nodes: Vec::new(),
            parameters: Vec::new(),
            vararg,
        });
        let parent = id;
        self.get_mut(entry)?.parent = Some(parent);
        Ok(id)
    }

    pub fn subgraph(&self, id: SubgraphId) -> &PointerSubgraph {
        &self.subgraphs[id.0 as usize - 1]
    }

    pub fn subgraph_mut(&mut self, id: SubgraphId) -> &mut PointerSubgraph {
        &mut self.subgraphs[id.0 as usize - 1]
    }

    pub fn subgraphs(&self) -> impl Iterator<Item = &PointerSubgraph> {
        self.subgraphs.iter()
    }

    /// Marks `parent` as the owning subgraph of `node` (used while walking
    /// a newly-built subgraph to stamp every reachable node, per the
    /// invariant in §3.2).
    pub fn set_parent(&mut self, node: NodeId, parent: SubgraphId) -> Result<()> {
        self.get_mut(node)?.parent = Some(parent);
        Ok(())
    }

    pub fn get(&self, id: NodeId) -> Result<&PsNode> {
        self.nodes
            .get(id.raw() as usize)
            .and_then(|slot| slot.as_ref())
            .ok_or(Error::UnknownNode(id.raw()))
    }

    pub fn get_mut(&mut self, id: NodeId) -> Result<&mut PsNode> {
        self.nodes
            .get_mut(id.raw() as usize)
            .and_then(|slot| slot.as_mut())
            .ok_or(Error::UnknownNode(id.raw()))
    }

    /// All live node ids, in arena order (sentinel and removed slots excluded).
    pub fn node_ids(&self) -> impl Iterator<Item = NodeId> + '_ {
        self.nodes
            .iter()
            .enumerate()
            .filter_map(|(i, slot)| slot.as_ref().map(|_| NodeId::new(i as u32)))
    }

    pub fn size(&self) -> usize {
        self.nodes.iter().filter(|n| n.is_some()).count()
    }

    fn node_pair_mut(&mut self, a: NodeId, b: NodeId) -> Result<(&mut PsNode, &mut PsNode)> {
        let (ai, bi) = (a.raw() as usize, b.raw() as usize);
        if ai == bi {
            return Err(Error::malformed(format!(
                "node {a} cannot reference itself as an operand or successor"
            )));
        }
        let (lo, hi) = if ai < bi { (ai, bi) } else { (bi, ai) };
        let (left, right) = self.nodes.split_at_mut(hi);
        let lo_ref = left
            .get_mut(lo)
            .and_then(|s| s.as_mut())
            .ok_or(Error::UnknownNode(lo as u32))?;
        let hi_ref = right
            .get_mut(0)
            .and_then(|s| s.as_mut())
            .ok_or(Error::UnknownNode(hi as u32))?;
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
        let current = self.get(node)?.base.operands().len();
        if let Some(expected) = self.get(node)?.tag.expected_operand_count() {
            if current >= expected {
                return Err(Error::WrongOperandCount {
                    node: node.raw(),
                    expected,
                    actual: current + 1,
                });
            }
        }
        let (n, op) = self.node_pair_mut(node, operand)?;
        n.base.push_operand(operand);
        op.base.push_user(node);
        Ok(())
    }

    pub fn set_paired_node(&mut self, node: NodeId, paired: NodeId) -> Result<()> {
        self.get(paired)?;
        self.get_mut(node)?.paired_node = Some(paired);
        Ok(())
    }

    pub fn register_call(&mut self, caller_entry: NodeId, callee_entry: NodeId) -> Result<()> {
        self.get(caller_entry)?;
        self.get(callee_entry)?;
        let callees = self.call_graph.entry(caller_entry).or_default();
        if !callees.contains(&callee_entry) {
            callees.push(callee_entry);
        }
        Ok(())
    }

    pub fn callees(&self, caller_entry: NodeId) -> &[NodeId] {
        self.call_graph
            .get(&caller_entry)
            .map(|v| v.as_slice())
            .unwrap_or(&[])
    }

    pub fn add_points_to(&mut self, node: NodeId, ptr: Pointer) -> Result<bool> {
        self.get(ptr.target)?;
        Ok(self.get_mut(node)?.points_to.add(ptr))
    }

    pub fn add_points_to_unknown_offset(&mut self, node: NodeId, target: NodeId) -> Result<bool> {
        self.add_points_to(node, Pointer::unknown_offset(target))
    }

    fn alloc_attrs_mut<'a>(node: &'a mut PsNode) -> Result<&'a mut AllocAttrs> {
        match &mut node.tag {
            PsNodeTag::Alloc(a) | PsNodeTag::DynAlloc(a) => Ok(a),
            other => Err(Error::malformed(format!(
                "{} is not an allocation node",
                other.name()
            ))),
        }
    }

    pub fn set_is_heap(&mut self, node: NodeId) -> Result<()> {
        Self::alloc_attrs_mut(self.get_mut(node)?)?.heap = true;
        Ok(())
    }

    pub fn set_is_global(&mut self, node: NodeId) -> Result<()> {
        Self::alloc_attrs_mut(self.get_mut(node)?)?.global = true;
        Ok(())
    }

    pub fn set_zero_initialized(&mut self, node: NodeId) -> Result<()> {
        Self::alloc_attrs_mut(self.get_mut(node)?)?.zero_initialized = true;
        Ok(())
    }

    pub fn set_is_temporary(&mut self, node: NodeId) -> Result<()> {
        Self::alloc_attrs_mut(self.get_mut(node)?)?.temporary = true;
        Ok(())
    }

    pub fn set_size(&mut self, node: NodeId, size: Offset) -> Result<()> {
        Self::alloc_attrs_mut(self.get_mut(node)?)?.size = size;
        Ok(())
    }

    /// `target`'s known allocation size (§3.2 `Alloc`/`DynAlloc` `size`
    /// attribute), or `Unknown` for any node that isn't an allocation or
    /// whose size was never set.
    pub fn alloc_size(&self, target: NodeId) -> Offset {
        match self.get(target).map(|n| &n.tag) {
            Ok(PsNodeTag::Alloc(attrs)) | Ok(PsNodeTag::DynAlloc(attrs)) => attrs.size,
            _ => Offset::Unknown,
        }
    }

    /// Whether `target` is an allocation flagged zero-initialised (§3.2,
    /// §4.4 load/memcpy rules).
    pub fn is_zero_initialized(&self, target: NodeId) -> bool {
        match self.get(target).map(|n| &n.tag) {
            Ok(PsNodeTag::Alloc(attrs)) | Ok(PsNodeTag::DynAlloc(attrs)) => attrs.zero_initialized,
            _ => false,
        }
    }

    pub fn add_callee(&mut self, call: NodeId, callee: SubgraphId) -> Result<()> {
        match &mut self.get_mut(call)?.tag {
            PsNodeTag::Call(attrs) | PsNodeTag::CallFuncPtr(attrs) => {
                if !attrs.callees.contains(&callee) {
                    attrs.callees.push(callee);
                }
                Ok(())
            }
            other => Err(Error::malformed(format!("{} is not a call node", other.name()))),
        }
    }
}

impl Default for PointerGraph {
    fn default() -> Self {
        PointerGraph::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn alloc_points_to_itself_at_zero() {
        let mut g = PointerGraph::new();
        let a = g.create_node(PsNodeTag::Alloc(AllocAttrs::default()));
        assert!(g.get(a).unwrap().points_to.must_point_to(&Pointer::new(a, Offset::ZERO)));
    }

    #[test]
    fn special_nodes_are_preallocated_and_self_referential() {
        let g = PointerGraph::new();
        assert!(g.get(g.null_node()).unwrap().is_null());
        assert!(g.get(g.unknown_node()).unwrap().is_unknown_memory());
        assert!(g.get(g.invalidated_node()).unwrap().is_invalidated());
        assert!(g
            .get(g.unknown_node())
            .unwrap()
            .points_to
            .has(&Pointer::unknown_offset(g.unknown_node())));
    }

    #[test]
    fn add_operand_enforces_arity_contract() {
        let mut g = PointerGraph::new();
        let src = g.create_node(PsNodeTag::Alloc(AllocAttrs::default()));
        let gep = g.create_node(PsNodeTag::Gep { offset: Offset::new(4) });
        g.add_operand(gep, src).unwrap();
        let other = g.create_node(PsNodeTag::Alloc(AllocAttrs::default()));
        assert!(g.add_operand(gep, other).is_err());
    }

    #[test]
    fn add_operand_registers_use_def_backedge() {
        let mut g = PointerGraph::new();
        let src = g.create_node(PsNodeTag::Alloc(AllocAttrs::default()));
        let load = g.create_node(PsNodeTag::Load);
        g.add_operand(load, src).unwrap();
        assert_eq!(g.get(load).unwrap().base().operands(), &[src]);
        assert_eq!(g.get(src).unwrap().base().users(), &[load]);
    }

    #[test]
    fn register_call_builds_call_graph() {
        let mut g = PointerGraph::new();
        let caller = g.create_node(PsNodeTag::Entry(EntryAttrs::default()));
        let callee = g.create_node(PsNodeTag::Entry(EntryAttrs::default()));
        g.register_call(caller, callee).unwrap();
        g.register_call(caller, callee).unwrap();
        assert_eq!(g.callees(caller), &[callee]);
    }

    #[test]
    fn unknown_node_reference_is_rejected() {
        let mut g = PointerGraph::new();
        let bogus = NodeId::new(999);
        assert!(g.add_successor(bogus, g.null_node()).is_err());
    }
}
