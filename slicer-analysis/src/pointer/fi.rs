//! Flow-insensitive engine (§4.3): one memory object per allocation shared
//! across the whole program, ignoring the program point a dereference
//! occurs at. The cheapest and least precise of the three variants.

use crate::pointer::driver::{copy_memory, read_memory, MemoryResolver};
use slicer_graph::{MemoryMap, NodeId, PointerGraph, PointsToSet};
use slicer_utils::Offset;

#[derive(Debug, Default)]
pub struct FlowInsensitive {
    memory: MemoryMap,
}

impl FlowInsensitive {
    pub fn new() -> Self {
        FlowInsensitive::default()
    }
}

impl MemoryResolver for FlowInsensitive {
    fn read(&mut self, graph: &PointerGraph, _at: NodeId, ptr: &PointsToSet) -> PointsToSet {
        read_memory(graph, &self.memory, ptr)
    }

    fn write(
        &mut self,
        _graph: &PointerGraph,
        _at: NodeId,
        ptr: &PointsToSet,
        value: &PointsToSet,
    ) -> bool {
        // A flow-insensitive engine never licenses a strong update: the
        // same object slot is shared by every call site along every path,
        // so every write can only ever widen what might be there.
        let mut changed = false;
        for p in ptr.iter() {
            changed |= self.memory.get_or_create(p.target).add_points_to_set(p.offset, value);
        }
        changed
    }

    fn copy(&mut self, graph: &PointerGraph, _at: NodeId, src: &PointsToSet, dest: &PointsToSet, len: Offset) -> bool {
        let src_snapshot = self.memory.clone();
        copy_memory(graph, &src_snapshot, &mut self.memory, src, dest, len)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use slicer_graph::Pointer;
    use slicer_utils::Offset;

    #[test]
    fn write_then_read_round_trips() {
        let mut r = FlowInsensitive::new();
        let graph = PointerGraph::new();
        let target = NodeId::new(5);
        let contents = PointsToSet::singleton(Pointer::new(NodeId::new(6), Offset::ZERO));
        let ptr = PointsToSet::singleton(Pointer::new(target, Offset::ZERO));

        assert!(r.write(&graph, NodeId::new(1), &ptr, &contents));
        let result = r.read(&graph, NodeId::new(2), &ptr);
        assert_eq!(result, contents);
    }
}
