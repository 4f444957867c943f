//! Common pointer-analysis driver (§4.2): worklist fixpoint over the
//! pointer graph, optional GEP coarsening preprocessing, and indirect-call
//! splicing. The three engines differ only in how a dereference resolves
//! memory objects — that seam is the [`MemoryResolver`] trait (§9).

use crate::config::AnalysisConfig;
use petgraph::algo::tarjan_scc;
use petgraph::graphmap::DiGraphMap;
use slicer_graph::{MemoryMap, NodeId, PointerGraph, Pointer, PointsToSet, PsNodeTag};
use slicer_utils::{Diagnostic, Diagnostics, Offset, Result};
use std::collections::{HashSet, VecDeque};

/// Shared by every [`MemoryResolver::read`] override (§4.4 load rule): a
/// dereference that finds no memory object for one of `ptr`'s targets adds
/// `Null` when that target is a zero-initialised allocation rather than
/// simply contributing nothing.
pub(crate) fn read_memory(graph: &PointerGraph, state: &MemoryMap, ptr: &PointsToSet) -> PointsToSet {
    let mut result = PointsToSet::new();
    for p in ptr.iter() {
        let Some(obj) = state.get(p.target) else {
            if graph.is_zero_initialized(p.target) {
                result.add(Pointer::new(graph.null_node(), Offset::ZERO));
            }
            continue;
        };
        if p.offset.is_unknown() {
            for offset in obj.offsets() {
                if let Some(set) = obj.points_to(offset) {
                    result.union_with(set);
                }
            }
        } else if let Some(set) = obj.points_to(p.offset) {
            result.union_with(set);
        }
    }
    result
}

/// Shared by every [`MemoryResolver::copy`] override (§4.5 memcpy rule):
/// for each `(ts, os)` in `src`'s points-to set, every tracked offset `k`
/// inside `ts` that falls in `[os, os+len)` (or either bound is `Unknown`)
/// is re-homed into every `(td, od)` in `dest`'s set at `od + (k - os)`,
/// falling back to `Unknown` wherever that arithmetic isn't all-concrete.
/// When `ts` is a zero-initialised allocation, `Null` also flows into every
/// destination object — at concrete offset `0` when the copy covers `ts`
/// entirely from its own offset `0` (the destination becomes zero-
/// initialised too), otherwise at `Unknown` (`Null` merely *may* be
/// somewhere inside the destination).
pub(crate) fn copy_memory(
    graph: &PointerGraph,
    src_state: &MemoryMap,
    dest_state: &mut MemoryMap,
    src_pts: &PointsToSet,
    dest_pts: &PointsToSet,
    len: Offset,
) -> bool {
    let mut changed = false;
    for s in src_pts.iter() {
        let Some(obj) = src_state.get(s.target) else { continue };
        let offsets: Vec<Offset> = obj.offsets().collect();
        for k in offsets {
            let in_range = s.offset.is_unknown()
                || k.is_unknown()
                || len.is_unknown()
                || matches!((k.value(), s.offset.value(), len.value()),
                    (Some(kv), Some(ov), Some(lv)) if kv >= ov && kv < ov + lv);
            if !in_range {
                continue;
            }
            let Some(set) = obj.points_to(k).cloned() else { continue };
            for d in dest_pts.iter() {
                let dest_offset = match (d.offset.value(), s.offset.value(), k.value()) {
                    (Some(dv), Some(ov), Some(kv)) if kv >= ov => Offset::new(dv + (kv - ov)),
                    _ => Offset::Unknown,
                };
                let dest_obj = dest_state.get_or_create(d.target);
                changed |= dest_obj.add_points_to_set(dest_offset, &set);
            }
        }

        if graph.is_zero_initialized(s.target) {
            let covers_whole = len.is_unknown()
                || matches!((len.value(), graph.alloc_size(s.target).value()),
                    (Some(l), Some(sz)) if l >= sz);
            let null_offset = if s.offset == Offset::ZERO && covers_whole {
                Offset::ZERO
            } else {
                Offset::Unknown
            };
            for d in dest_pts.iter() {
                let dest_obj = dest_state.get_or_create(d.target);
                changed |= dest_obj.add_points_to(null_offset, Pointer::new(graph.null_node(), Offset::ZERO));
            }
        }
    }
    changed
}

/// What distinguishes the three pointer-analysis engines (§4.3): how a
/// load/store at a given program point resolves the memory object(s)
/// behind a pointer's points-to set.
pub trait MemoryResolver {
    /// The bulk union of memory contents reachable through `ptr`'s targets,
    /// as observed at node `at`.
    fn read(&mut self, graph: &PointerGraph, at: NodeId, ptr: &PointsToSet) -> PointsToSet;

    /// Writes `value` into every target `ptr` may refer to, performing a
    /// strong update when `ptr` licenses one (§3.4 `must_point_to`).
    /// Returns whether any stored memory content changed.
    fn write(
        &mut self,
        graph: &PointerGraph,
        at: NodeId,
        ptr: &PointsToSet,
        value: &PointsToSet,
    ) -> bool;

    /// Runs once per fixpoint round after every node has been processed, so
    /// flow-sensitive engines can propagate their per-node memory maps
    /// along control-flow edges before the next round starts. Returns
    /// whether anything changed (triggering another round).
    fn propagate(&mut self, graph: &PointerGraph) -> bool {
        let _ = graph;
        false
    }

    /// Called once per node, after any load/store handling, so flow-
    /// sensitive resolvers can forward their per-node memory state across
    /// nodes that don't themselves read or write memory (a `Phi` or `Gep`
    /// sitting between two `Store`s on the same path). The flow-insensitive
    /// resolver has no per-node state and leaves this a no-op.
    fn advance(&mut self, graph: &PointerGraph, at: NodeId) -> bool {
        let _ = (graph, at);
        false
    }

    /// Copies `len` bytes of memory reachable through `src` into every
    /// target `dest` may refer to (§4.5 memcpy). The default collapses the
    /// whole source object into one blob via `read`/`write`, losing the
    /// per-offset correspondence a real memcpy preserves; every resolver in
    /// this crate overrides it with the precise per-offset rule instead.
    fn copy(&mut self, graph: &PointerGraph, at: NodeId, src: &PointsToSet, dest: &PointsToSet, len: Offset) -> bool {
        let _ = len;
        let loaded = self.read(graph, at, src);
        self.write(graph, at, dest, &loaded)
    }
}

/// Drives one pointer-graph analysis to fixpoint for a given [`MemoryResolver`].
pub struct PointerAnalysis<R: MemoryResolver> {
    pub graph: PointerGraph,
    pub config: AnalysisConfig,
    pub resolver: R,
    pub diagnostics: Diagnostics,
}

impl<R: MemoryResolver> PointerAnalysis<R> {
    pub fn new(graph: PointerGraph, config: AnalysisConfig, resolver: R) -> Self {
        PointerAnalysis {
            graph,
            config,
            resolver,
            diagnostics: Diagnostics::new(),
        }
    }

    pub fn run(&mut self) -> Result<()> {
        if self.config.preprocess_geps {
            self.coarsen_geps()?;
        }

        loop {
            self.run_worklist()?;
            if !self.resolver.propagate(&self.graph) {
                break;
            }
            log::debug!("memory propagation changed state, re-running node worklist");
        }
        Ok(())
    }

    fn run_worklist(&mut self) -> Result<()> {
        let visits = self.drain(self.graph.node_ids().collect())?;
        log::debug!("pointer analysis worklist drained after {visits} node visits");
        Ok(())
    }

    /// Runs `process_node` to a local fixpoint over `seeds` and whatever
    /// their changes reach, without re-seeding the whole graph. Splicing
    /// writes directly into a callee's parameter/return nodes outside the
    /// normal per-tag dispatch (§4.4), so it re-drains from there to carry
    /// that write to its users the same way the main worklist would have.
    fn drain(&mut self, seeds: Vec<NodeId>) -> Result<u32> {
        let mut queue: VecDeque<NodeId> = seeds.into();
        let mut queued: HashSet<NodeId> = queue.iter().copied().collect();
        let mut visits = 0u32;

        while let Some(node) = queue.pop_front() {
            queued.remove(&node);
            visits += 1;
            log::trace!("processing {node}");
            let changed = self.process_node(node)?;
            if changed {
                let base = self.graph.get(node)?.base();
                let mut next: Vec<NodeId> = base.users().to_vec();
                next.extend_from_slice(base.successors());
                for n in next {
                    if queued.insert(n) {
                        queue.push_back(n);
                    }
                }
            }
        }
        Ok(visits)
    }

    fn process_node(&mut self, node: NodeId) -> Result<bool> {
        let tag = self.graph.get(node)?.tag.clone();
        let changed = match tag {
            PsNodeTag::Load => self.process_load(node)?,
            PsNodeTag::Store => self.process_store(node)?,
            PsNodeTag::Gep { offset } => self.process_gep(node, offset)?,
            PsNodeTag::Cast => self.process_merge_operands(node)?,
            PsNodeTag::Phi => self.process_merge_operands(node)?,
            PsNodeTag::Return => self.process_merge_operands(node)?,
            PsNodeTag::CallFuncPtr(_) => self.process_indirect_call(node)?,
            PsNodeTag::Call(_) | PsNodeTag::CallReturn => self.process_call_return(node)?,
            PsNodeTag::Memcpy { len } => self.process_memcpy(node, len)?,
            _ => false,
        };
        let advanced = self.resolver.advance(&self.graph, node);
        Ok(changed || advanced)
    }

    fn process_load(&mut self, node: NodeId) -> Result<bool> {
        let ptr = self.graph.get(node)?.base().operands()[0];
        let ptr_pts = self.graph.get(ptr)?.points_to.clone();
        let value = self.resolver.read(&self.graph, node, &ptr_pts);
        if value.is_empty() {
            self.diagnostics
                .push_warning(Diagnostic::EmptyPointsTo { node: node.raw() });
            log::warn!("{node}: load with empty points-to result");
        }
        let target = &mut self.graph.get_mut(node)?.points_to;
        Ok(target.union_with(&value))
    }

    fn process_store(&mut self, node: NodeId) -> Result<bool> {
        let operands = self.graph.get(node)?.base().operands().to_vec();
        let (value_node, ptr_node) = (operands[0], operands[1]);
        let value_pts = self.graph.get(value_node)?.points_to.clone();
        let ptr_pts = self.graph.get(ptr_node)?.points_to.clone();
        if ptr_pts.is_empty() {
            self.diagnostics
                .push_warning(Diagnostic::EmptyPointsTo { node: node.raw() });
        }
        Ok(self.resolver.write(&self.graph, node, &ptr_pts, &value_pts))
    }

    fn process_gep(&mut self, node: NodeId, gep_offset: slicer_utils::Offset) -> Result<bool> {
        let base_node = self.graph.get(node)?.base().operands()[0];
        let base_pts = self.graph.get(base_node)?.points_to.clone();
        let mut derived = PointsToSet::new();
        for ptr in base_pts.iter() {
            let raw_offset = ptr.offset + gep_offset;
            let offset = self.clamp_to_allocation(ptr.target, raw_offset);
            derived.add(slicer_graph::Pointer::new(ptr.target, offset));
        }
        Ok(self.graph.get_mut(node)?.points_to.union_with(&derived))
    }

    /// Applies the GEP/Memcpy offset-keeping rule (§4.4): an offset survives
    /// as concrete only at `0`, or strictly below both the field-sensitivity
    /// bound and `target`'s known allocation size; anything else saturates
    /// to `Unknown`.
    fn clamp_to_allocation(&self, target: NodeId, offset: Offset) -> Offset {
        let offset = self.config.clamp_offset(offset);
        if offset == Offset::ZERO {
            return offset;
        }
        match (offset.value(), self.graph.alloc_size(target).value()) {
            (Some(v), Some(size)) if v >= size => Offset::Unknown,
            _ => offset,
        }
    }

    fn process_merge_operands(&mut self, node: NodeId) -> Result<bool> {
        let operands = self.graph.get(node)?.base().operands().to_vec();
        let mut merged = PointsToSet::new();
        for op in operands {
            merged.union_with(&self.graph.get(op)?.points_to.clone());
        }
        if merged.len() > self.config.max_set_size {
            merged = PointsToSet::singleton(slicer_graph::Pointer::unknown_offset(
                self.graph.unknown_node(),
            ));
            self.diagnostics
                .push_warning(Diagnostic::Saturated { node: node.raw() });
            log::warn!("{node}: points-to set saturated past max_set_size, collapsed to Unknown");
        }
        Ok(self.graph.get_mut(node)?.points_to.union_with(&merged))
    }

    fn process_memcpy(&mut self, node: NodeId, len: slicer_utils::Offset) -> Result<bool> {
        let operands = self.graph.get(node)?.base().operands().to_vec();
        let (src, dest) = (operands[0], operands[1]);
        let src_pts = self.graph.get(src)?.points_to.clone();
        let dest_pts = self.graph.get(dest)?.points_to.clone();
        Ok(self.resolver.copy(&self.graph, node, &src_pts, &dest_pts, len))
    }

    /// Resolves a call-via-function-pointer: every `Function` target in the
    /// operand's points-to set whose node is a subgraph entry becomes a
    /// freshly spliced callee, and the call-return's value set is widened
    /// with the union of that subgraph's return nodes (§4.2, §4.4).
    fn process_indirect_call(&mut self, node: NodeId) -> Result<bool> {
        let target_ptr = self.graph.get(node)?.base().operands()[0];
        let candidates: Vec<NodeId> = self
            .graph
            .get(target_ptr)?
            .points_to
            .iter()
            .map(|p| p.target)
            .collect();

        let mut changed = false;
        for target in candidates {
            let Some(parent) = self.graph.get(target)?.parent() else {
                continue;
            };
            if self.graph.subgraph(parent).entry != target {
                continue;
            }
            let caller_entry = self.graph.get(node)?.parent();
            if let Some(caller_entry) = caller_entry {
                let caller_entry_id = self.graph.subgraph(caller_entry).entry;
                self.graph.register_call(caller_entry_id, target)?;
            }
            changed |= self.splice_callee(node, parent)?;
        }
        Ok(changed)
    }

    fn process_call_return(&mut self, node: NodeId) -> Result<bool> {
        let (call, callees) = match &self.graph.get(node)?.tag {
            PsNodeTag::Call(attrs) | PsNodeTag::CallFuncPtr(attrs) => (node, attrs.callees.clone()),
            PsNodeTag::CallReturn => {
                let call = self.graph.get(node)?.paired_node().unwrap_or(node);
                match &self.graph.get(call)?.tag {
                    PsNodeTag::Call(attrs) | PsNodeTag::CallFuncPtr(attrs) => (call, attrs.callees.clone()),
                    _ => return Ok(false),
                }
            }
            _ => return Ok(false),
        };
        let mut changed = false;
        for callee in callees {
            changed |= self.splice_callee(call, callee)?;
        }
        Ok(changed)
    }

    fn splice_callee(
        &mut self,
        call: NodeId,
        callee: slicer_graph::SubgraphId,
    ) -> Result<bool> {
        let (already_known, is_indirect) = match &self.graph.get(call)?.tag {
            PsNodeTag::Call(attrs) => (attrs.callees.contains(&callee), false),
            PsNodeTag::CallFuncPtr(attrs) => (attrs.callees.contains(&callee), true),
            _ => (false, false),
        };
        self.graph.add_callee(call, callee)?;
        let mut changed = !already_known;
        let call_return = self.graph.get(call)?.paired_node();

        // Splicing is idempotent per (callsite, callee): the graph-edge
        // half of it only needs to happen once, the first time this pair
        // is spliced (§4.4).
        if !already_known {
            let callee_entry = self.graph.subgraph(callee).entry;
            self.graph.add_successor(call, callee_entry)?;
            if let Some(call_return) = call_return {
                let return_nodes = self.graph.subgraph(callee).return_nodes.clone();
                for ret in return_nodes {
                    self.graph.add_successor(ret, call_return)?;
                }
            }
        }

        // Connect arguments to the callee's formal parameters, positionally
        // (§4.4 "connect arguments"). `CallFuncPtr`'s operand 0 is the
        // function-pointer value itself, not an argument.
        let operands = self.graph.get(call)?.base().operands().to_vec();
        let args = if is_indirect { &operands[1.min(operands.len())..] } else { &operands[..] };
        let parameters = self.graph.subgraph(callee).parameters.clone();
        let mut touched = Vec::new();
        for (arg, &param) in args.iter().zip(parameters.iter()) {
            let arg_pts = self.graph.get(*arg)?.points_to.clone();
            if self.graph.get_mut(param)?.points_to.union_with(&arg_pts) {
                changed = true;
                touched.push(param);
            }
        }

        let return_nodes = self.graph.subgraph(callee).return_nodes.clone();
        let mut merged = PointsToSet::new();
        for ret in return_nodes {
            merged.union_with(&self.graph.get(ret)?.points_to.clone());
        }
        if let Some(call_return) = call_return {
            if self.graph.get_mut(call_return)?.points_to.union_with(&merged) {
                changed = true;
                touched.push(call_return);
            }
        }

        // These writes landed outside the normal per-tag dispatch, on nodes
        // whose own tag dispatch (if any) wouldn't rediscover the change,
        // so carry it to their users/successors the way the main worklist
        // would have (§4.4).
        let mut dependents = Vec::new();
        for node in touched {
            let base = self.graph.get(node)?.base();
            dependents.extend_from_slice(base.users());
            dependents.extend_from_slice(base.successors());
        }
        if !dependents.is_empty() {
            self.drain(dependents)?;
        }
        Ok(changed)
    }

    /// SCC-GEP coarsening (§4.2): inside a non-trivial strongly-connected
    /// component (a pointer-arithmetic cycle through φ/Gep/Cast), a Gep's
    /// offset can no longer be tracked precisely, so it is widened to
    /// `Unknown` once, before the fixpoint starts.
    fn coarsen_geps(&mut self) -> Result<()> {
        let mut edges: Vec<(NodeId, NodeId)> = Vec::new();
        for node in self.graph.node_ids() {
            for &succ in self.graph.get(node)?.base().successors() {
                edges.push((node, succ));
            }
            for &user in self.graph.get(node)?.base().users() {
                edges.push((node, user));
            }
        }
        let mut dg: DiGraphMap<NodeId, ()> = DiGraphMap::new();
        for (a, b) in edges {
            dg.add_edge(a, b, ());
        }

        let mut next_scc = 1u32;
        for component in tarjan_scc(&dg) {
            if component.len() < 2 {
                continue;
            }
            let scc_id = next_scc;
            next_scc += 1;
            for &node in &component {
                self.graph.get_mut(node)?.base_mut().set_scc_id(scc_id);
                if let PsNodeTag::Gep { .. } = self.graph.get(node)?.tag {
                    self.graph.get_mut(node)?.tag = PsNodeTag::Gep {
                        offset: slicer_utils::Offset::Unknown,
                    };
                    log::debug!("{node}: coarsened Gep offset to Unknown (SCC size {})", component.len());
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pointer::fi::FlowInsensitive;
    use slicer_graph::{AllocAttrs, PointerGraphBuilder};

    #[test]
    fn load_after_store_sees_stored_value() {
        let mut graph = PointerGraph::new();
        let (target, ptr, value, store, load) = {
            let mut b = PointerGraphBuilder::new(&mut graph);
            let target = b.alloc(AllocAttrs::default()).unwrap();
            let ptr = b.alloc(AllocAttrs::default()).unwrap();
            let value = b.constant(target, slicer_utils::Offset::ZERO).unwrap();
            let store = b.store(value, ptr).unwrap();
            let load = b.load(ptr).unwrap();
            (target, ptr, value, store, load)
        };
        let _ = (value, store);

        let mut analysis =
            PointerAnalysis::new(graph, AnalysisConfig::new(), FlowInsensitive::new());
        analysis.run().unwrap();
        assert!(analysis
            .graph
            .get(load)
            .unwrap()
            .points_to
            .points_to_target(target));
        let _ = ptr;
    }
}
