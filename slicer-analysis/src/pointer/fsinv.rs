//! Flow-sensitive-with-invalidation engine (§4.3, §6.6 `invalidate_nodes`):
//! like [`FlowSensitive`](crate::pointer::fs::FlowSensitive), but `Free` and
//! `InvalidateObject` nodes poison every target they reach — their out-state
//! replaces the pointed-to object's contents with a reference to the
//! pointer graph's designated `Invalidated` node, so later dereferences
//! downstream of the free see dangling memory rather than stale data.

use crate::pointer::driver::{copy_memory, read_memory, MemoryResolver};
use slicer_graph::{MemoryMap, NodeId, PointerGraph, Pointer, PointsToSet, PsNodeTag};
use slicer_utils::Offset;
use std::collections::HashMap;

#[derive(Debug, Default)]
pub struct FlowSensitiveInvalidation {
    out: HashMap<NodeId, MemoryMap>,
}

impl FlowSensitiveInvalidation {
    pub fn new() -> Self {
        FlowSensitiveInvalidation::default()
    }

    fn entry_state(&self, graph: &PointerGraph, at: NodeId) -> MemoryMap {
        let mut merged = MemoryMap::new();
        let Ok(node) = graph.get(at) else {
            return merged;
        };
        for &pred in node.base().predecessors() {
            if let Some(state) = self.out.get(&pred) {
                merged.merge(state);
            }
        }
        merged
    }

    fn record_out(&mut self, at: NodeId, state: MemoryMap) -> bool {
        self.out.entry(at).or_default().merge(&state)
    }

    /// Replaces every tracked offset of `target` with a pointer to
    /// `invalidated`, in-place within `state`.
    fn poison(state: &mut MemoryMap, target: NodeId, invalidated: NodeId) {
        let obj = state.get_or_create(target);
        let offsets: Vec<Offset> = obj.offsets().collect();
        let poisoned = PointsToSet::singleton(Pointer::new(invalidated, Offset::Unknown));
        for offset in offsets {
            *obj.points_to_mut(offset) = poisoned.clone();
        }
        if offsets_is_empty(obj) {
            obj.add_points_to(Offset::Unknown, Pointer::new(invalidated, Offset::Unknown));
        }
    }
}

fn offsets_is_empty(obj: &slicer_graph::MemoryObject) -> bool {
    obj.offsets().next().is_none()
}

impl MemoryResolver for FlowSensitiveInvalidation {
    fn read(&mut self, graph: &PointerGraph, at: NodeId, ptr: &PointsToSet) -> PointsToSet {
        let state = self.entry_state(graph, at);
        read_memory(graph, &state, ptr)
    }

    fn write(
        &mut self,
        graph: &PointerGraph,
        at: NodeId,
        ptr: &PointsToSet,
        value: &PointsToSet,
    ) -> bool {
        let mut state = self.entry_state(graph, at);
        let strong = ptr.is_singleton() && ptr.iter().next().is_some_and(|p| !p.offset.is_unknown());
        for p in ptr.iter() {
            let obj = state.get_or_create(p.target);
            if strong {
                *obj.points_to_mut(p.offset) = value.clone();
            } else {
                obj.add_points_to_set(p.offset, value);
            }
        }
        self.record_out(at, state)
    }

    fn advance(&mut self, graph: &PointerGraph, at: NodeId) -> bool {
        let mut state = self.entry_state(graph, at);
        let Ok(node) = graph.get(at) else {
            return self.record_out(at, state);
        };
        match &node.tag {
            PsNodeTag::Free | PsNodeTag::InvalidateObject => {
                if let Some(&operand) = node.base().operands().first() {
                    let targets: Vec<NodeId> = graph
                        .get(operand)
                        .map(|n| n.points_to.iter().map(|p| p.target).collect())
                        .unwrap_or_default();
                    for target in targets {
                        Self::poison(&mut state, target, graph.invalidated_node());
                        log::debug!("{at}: invalidated object {target}");
                    }
                }
            }
            PsNodeTag::InvalidateLocals => {
                let targets: Vec<NodeId> = state.targets().collect();
                for target in targets {
                    Self::poison(&mut state, target, graph.invalidated_node());
                }
                log::debug!("{at}: invalidated all locally-tracked objects");
            }
            _ => {}
        }
        self.record_out(at, state)
    }

    fn copy(&mut self, graph: &PointerGraph, at: NodeId, src: &PointsToSet, dest: &PointsToSet, len: Offset) -> bool {
        let source = self.entry_state(graph, at);
        let mut state = source.clone();
        let changed = copy_memory(graph, &source, &mut state, src, dest, len);
        self.record_out(at, state) || changed
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AnalysisConfig;
    use crate::pointer::driver::PointerAnalysis;
    use slicer_graph::{AllocAttrs, PointerGraphBuilder};

    #[test]
    fn free_poisons_subsequent_reads() {
        let mut graph = PointerGraph::new();
        let (target, ptr, store) = {
            let mut b = PointerGraphBuilder::new(&mut graph);
            let target = b.alloc(AllocAttrs { heap: true, ..Default::default() }).unwrap();
            let ptr = b.alloc(AllocAttrs::default()).unwrap();
            let v = b.constant(target, Offset::ZERO).unwrap();
            let store = b.store(v, ptr).unwrap();
            (target, ptr, store)
        };
        let free = graph.create_node(PsNodeTag::Free);
        graph.add_operand(free, target).unwrap();
        graph.add_successor(store, free).unwrap();
        let load = {
            let mut b = PointerGraphBuilder::new(&mut graph).resume_after(free);
            b.load(ptr).unwrap()
        };

        let mut analysis = PointerAnalysis::new(
            graph,
            AnalysisConfig::new().with_invalidate_nodes(true),
            FlowSensitiveInvalidation::new(),
        );
        analysis.run().unwrap();
        let result = &analysis.graph.get(load).unwrap().points_to;
        assert!(result.points_to_target(analysis.graph.invalidated_node()));
    }
}
