//! Flow-sensitive engine (§4.3): one memory map per program point, merged
//! from predecessors at control-flow join points. Distinguishes reads and
//! writes that occur on different paths, at the cost of one `MemoryMap`
//! per live node instead of one per allocation.

use crate::pointer::driver::{copy_memory, read_memory, MemoryResolver};
use slicer_graph::{MemoryMap, NodeId, PointerGraph, PointsToSet};
use slicer_utils::Offset;
use std::collections::HashMap;

#[derive(Debug, Default)]
pub struct FlowSensitive {
    /// Memory state as of just after each node executes.
    out: HashMap<NodeId, MemoryMap>,
}

impl FlowSensitive {
    pub fn new() -> Self {
        FlowSensitive::default()
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

    /// Folds `state` into `at`'s recorded out-state, returning whether the
    /// out-state grew as a result (the fixpoint is monotonic: out-states
    /// only ever gain points-to relations, never lose them).
    fn record_out(&mut self, at: NodeId, state: MemoryMap) -> bool {
        self.out.entry(at).or_default().merge(&state)
    }

}

impl MemoryResolver for FlowSensitive {
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
        let state = self.entry_state(graph, at);
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
    use slicer_graph::{AllocAttrs, PointerGraphBuilder};
    use slicer_utils::Offset;

    #[test]
    fn second_store_strong_updates_over_first() {
        let mut graph = PointerGraph::new();
        let (target, ptr, v1, v2, load) = {
            let mut b = PointerGraphBuilder::new(&mut graph);
            let target = b.alloc(AllocAttrs::default()).unwrap();
            let other = b.alloc(AllocAttrs::default()).unwrap();
            let ptr = b.alloc(AllocAttrs::default()).unwrap();
            let v1 = b.constant(target, Offset::ZERO).unwrap();
            let v2 = b.constant(other, Offset::ZERO).unwrap();
            b.store(v1, ptr).unwrap();
            b.store(v2, ptr).unwrap();
            let load = b.load(ptr).unwrap();
            (target, ptr, v1, v2, load)
        };
        let _ = (v1, v2, ptr);

        let mut analysis = crate::pointer::driver::PointerAnalysis::new(
            graph,
            crate::config::AnalysisConfig::new(),
            FlowSensitive::new(),
        );
        analysis.run().unwrap();
        let result = &analysis.graph.get(load).unwrap().points_to;
        assert!(!result.points_to_target(target));
    }
}
