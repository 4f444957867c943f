//! Ergonomic construction on top of the graphs' raw factory methods (§6.1).
//!
//! `PointerGraph`/`RdGraph` already expose the full construction contract
//! directly; the builders here just save an external front end from
//! re-deriving the "create a node, then wire it as the successor of
//! whatever came before" boilerplate for straight-line code, the way
//! `ir::Builder` sits on top of `ir::Component`'s lower-level constructors.

use crate::node::NodeId;
use crate::pointer_graph::{AllocAttrs, CallAttrs, EntryAttrs, PointerGraph, PsNodeTag};
use crate::points_to::Pointer;
use crate::rd_graph::{DefSite, RdBlockId, RdGraph, RdNodeTag};
use slicer_utils::{Offset, Result};

/// Builds a single straight-line run of pointer-graph nodes, chaining each
/// newly created node as the successor of the previous one.
pub struct PointerGraphBuilder<'g> {
    graph: &'g mut PointerGraph,
    cursor: Option<NodeId>,
}

impl<'g> PointerGraphBuilder<'g> {
    pub fn new(graph: &'g mut PointerGraph) -> Self {
        PointerGraphBuilder { graph, cursor: None }
    }

    /// Resumes chaining after `node` instead of wherever the cursor last was.
    pub fn resume_after(mut self, node: NodeId) -> Self {
        self.cursor = Some(node);
        self
    }

    pub fn cursor(&self) -> Option<NodeId> {
        self.cursor
    }

    fn emit(&mut self, node: NodeId) -> Result<NodeId> {
        if let Some(prev) = self.cursor {
            self.graph.add_successor(prev, node)?;
        }
        self.cursor = Some(node);
        Ok(node)
    }

    pub fn entry(&mut self, function_name: impl Into<String>) -> Result<NodeId> {
        let node = self.graph.create_node(PsNodeTag::Entry(EntryAttrs {
            function_name: function_name.into(),
            callers: Vec::new(),
        }));
        self.emit(node)
    }

    pub fn alloc(&mut self, attrs: AllocAttrs) -> Result<NodeId> {
        let node = self.graph.create_node(PsNodeTag::Alloc(attrs));
        self.emit(node)
    }

    pub fn dyn_alloc(&mut self, attrs: AllocAttrs) -> Result<NodeId> {
        let node = self.graph.create_node(PsNodeTag::DynAlloc(attrs));
        self.emit(node)
    }

    pub fn load(&mut self, ptr: NodeId) -> Result<NodeId> {
        let node = self.graph.create_node(PsNodeTag::Load);
        self.graph.add_operand(node, ptr)?;
        self.emit(node)
    }

    pub fn store(&mut self, value: NodeId, ptr: NodeId) -> Result<NodeId> {
        let node = self.graph.create_node(PsNodeTag::Store);
        self.graph.add_operand(node, value)?;
        self.graph.add_operand(node, ptr)?;
        self.emit(node)
    }

    pub fn gep(&mut self, ptr: NodeId, offset: Offset) -> Result<NodeId> {
        let node = self.graph.create_node(PsNodeTag::Gep { offset });
        self.graph.add_operand(node, ptr)?;
        self.emit(node)
    }

    pub fn cast(&mut self, ptr: NodeId) -> Result<NodeId> {
        let node = self.graph.create_node(PsNodeTag::Cast);
        self.graph.add_operand(node, ptr)?;
        self.emit(node)
    }

    pub fn memcpy(&mut self, src: NodeId, dest: NodeId, len: Offset) -> Result<NodeId> {
        let node = self.graph.create_node(PsNodeTag::Memcpy { len });
        self.graph.add_operand(node, src)?;
        self.graph.add_operand(node, dest)?;
        self.emit(node)
    }

    pub fn phi(&mut self, inputs: &[NodeId]) -> Result<NodeId> {
        let node = self.graph.create_node(PsNodeTag::Phi);
        for &input in inputs {
            self.graph.add_operand(node, input)?;
        }
        self.emit(node)
    }

    pub fn constant(&mut self, target: NodeId, offset: Offset) -> Result<NodeId> {
        let node = self.graph.create_node(PsNodeTag::Constant);
        self.graph.add_operand(node, target)?;
        self.graph.add_points_to(node, Pointer::new(target, offset))?;
        self.emit(node)
    }

    /// A `Call` paired with its `CallReturn`, linked via `set_paired_node`.
    /// Returns `(call, call_return)`; the caller still needs
    /// `register_call`/`add_callee` once the target(s) are known.
    pub fn call(&mut self, args: &[NodeId]) -> Result<(NodeId, NodeId)> {
        let call = self.graph.create_node(PsNodeTag::Call(CallAttrs::default()));
        for &arg in args {
            self.graph.add_operand(call, arg)?;
        }
        self.emit(call)?;
        let call_return = self.graph.create_node(PsNodeTag::CallReturn);
        self.graph.set_paired_node(call, call_return)?;
        self.graph.set_paired_node(call_return, call)?;
        self.emit(call_return)?;
        Ok((call, call_return))
    }

    /// A `CallFuncPtr` paired with its `CallReturn`, mirroring
    /// [`call`](Self::call) for calls whose target is a runtime pointer
    /// value rather than a statically known entry. Its callee set starts
    /// empty and is discovered by the pointer analysis as `target_ptr`'s
    /// points-to set resolves.
    pub fn call_func_ptr(&mut self, target_ptr: NodeId, args: &[NodeId]) -> Result<(NodeId, NodeId)> {
        let call = self.graph.create_node(PsNodeTag::CallFuncPtr(CallAttrs::default()));
        self.graph.add_operand(call, target_ptr)?;
        for &arg in args {
            self.graph.add_operand(call, arg)?;
        }
        self.emit(call)?;
        let call_return = self.graph.create_node(PsNodeTag::CallReturn);
        self.graph.set_paired_node(call, call_return)?;
        self.graph.set_paired_node(call_return, call)?;
        self.emit(call_return)?;
        Ok((call, call_return))
    }

    pub fn ret(&mut self, values: &[NodeId]) -> Result<NodeId> {
        let node = self.graph.create_node(PsNodeTag::Return);
        for &value in values {
            self.graph.add_operand(node, value)?;
        }
        self.emit(node)
    }

    pub fn noop(&mut self) -> Result<NodeId> {
        let node = self.graph.create_node(PsNodeTag::Noop);
        self.emit(node)
    }
}

/// Builds one basic block of reaching-definitions nodes, chaining each node
/// as the successor of the previous one and assigning it to the block.
pub struct RdGraphBuilder<'g> {
    graph: &'g mut RdGraph,
    block: RdBlockId,
    cursor: Option<NodeId>,
}

impl<'g> RdGraphBuilder<'g> {
    pub fn new(graph: &'g mut RdGraph, is_start_block: bool) -> Self {
        let block = graph.create_block(is_start_block);
        RdGraphBuilder { graph, block, cursor: None }
    }

    pub fn block(&self) -> RdBlockId {
        self.block
    }

    fn emit(&mut self, node: NodeId) -> Result<NodeId> {
        if let Some(prev) = self.cursor {
            self.graph.add_successor(prev, node)?;
        }
        self.graph.assign_block(node, self.block)?;
        self.cursor = Some(node);
        Ok(node)
    }

    pub fn push(&mut self, tag: RdNodeTag) -> Result<NodeId> {
        let node = self.graph.create_node(tag);
        self.emit(node)
    }

    pub fn store(&mut self, overwrite: DefSite) -> Result<NodeId> {
        let node = self.push(RdNodeTag::Store)?;
        self.graph.add_overwrite(node, overwrite)?;
        Ok(node)
    }

    pub fn load(&mut self, used: DefSite) -> Result<NodeId> {
        let node = self.push(RdNodeTag::Load)?;
        self.graph.add_use(node, used)?;
        Ok(node)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pointer_graph::PointerGraph;

    #[test]
    fn straight_line_chain_wires_successors() {
        let mut graph = PointerGraph::new();
        let mut b = PointerGraphBuilder::new(&mut graph);
        let a = b.alloc(AllocAttrs::default()).unwrap();
        let load = b.load(a).unwrap();
        assert_eq!(graph.get(a).unwrap().base().successors(), &[load]);
        assert_eq!(graph.get(load).unwrap().base().operands(), &[a]);
    }

    #[test]
    fn call_pairs_with_its_return() {
        let mut graph = PointerGraph::new();
        let mut b = PointerGraphBuilder::new(&mut graph);
        let (call, call_return) = b.call(&[]).unwrap();
        assert_eq!(graph.get(call).unwrap().paired_node(), Some(call_return));
        assert_eq!(graph.get(call_return).unwrap().paired_node(), Some(call));
    }

    #[test]
    fn rd_builder_assigns_nodes_to_its_block() {
        let mut rd = RdGraph::new();
        let mut b = RdGraphBuilder::new(&mut rd, true);
        let n1 = b.push(RdNodeTag::Noop).unwrap();
        let n2 = b.push(RdNodeTag::Noop).unwrap();
        let block = b.block();
        assert_eq!(rd.block(block).nodes(), &[n1, n2]);
        assert_eq!(rd.get(n1).unwrap().base().successors(), &[n2]);
    }
}
