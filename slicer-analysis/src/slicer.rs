//! The sweep phase that complements [`crate::walk::mark`] (§4.8): deletes
//! every node left unstamped by the current slice id, then drops whichever
//! blocks that emptied out — unless a hook vetoes leaving an orphan behind.

use slicer_graph::{NodeId, RdBlockId, RdGraph};
use slicer_utils::Result;

/// Counts kept by one [`slice`] call.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SlicerStatistics {
    pub nodes_total: usize,
    pub nodes_removed: usize,
    pub blocks_removed: usize,
}

/// Per-node and per-block veto points for the sweep. The defaults approve
/// every removal; override either method to keep something the walk itself
/// would otherwise have swept away (e.g. a logging call kept for its side
/// effects even though nothing depends on its result).
pub trait SliceHooks {
    fn remove_node(&mut self, node: NodeId) -> bool {
        let _ = node;
        true
    }

    fn remove_block(&mut self, block: RdBlockId) -> bool {
        let _ = block;
        true
    }
}

/// The hook set `slice` uses when the caller has no overrides.
pub struct DefaultHooks;

impl SliceHooks for DefaultHooks {}

/// Removes every node whose `walk_id` is not `slice_id`, then removes any
/// block that consequently holds no surviving nodes. A block a hook refuses
/// to drop is left in the graph empty rather than silently pruned — an
/// orphan the caller asked to keep, not a bug.
pub fn slice(graph: &mut RdGraph, slice_id: u32, hooks: &mut impl SliceHooks) -> Result<SlicerStatistics> {
    let mut stats = SlicerStatistics::default();

    let all_nodes: Vec<NodeId> = graph.node_ids().collect();
    stats.nodes_total = all_nodes.len();

    for node in all_nodes {
        if node == graph.unknown_node() {
            continue;
        }
        let keep = graph
            .get(node)
            .map(|n| n.base().walk_id() == slice_id)
            .unwrap_or(false);
        if keep {
            continue;
        }
        if !hooks.remove_node(node) {
            continue;
        }
        graph.delete_node(node)?;
        stats.nodes_removed += 1;
    }

    let empty_blocks: Vec<RdBlockId> = graph
        .blocks()
        .filter(|b| !b.is_removed() && !b.is_start_block() && b.nodes().is_empty())
        .map(|b| b.id())
        .collect();

    for block in empty_blocks {
        if !hooks.remove_block(block) {
            continue;
        }
        graph.remove_block(block);
        stats.blocks_removed += 1;
    }

    log::debug!(
        "slice {slice_id}: kept {}/{} nodes, removed {} blocks",
        stats.nodes_total - stats.nodes_removed,
        stats.nodes_total,
        stats.blocks_removed
    );
    Ok(stats)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AnalysisConfig;
    use crate::rd::ReachingDefinitionsAnalysis;
    use crate::walk::{self, SliceDirection};
    use slicer_graph::{DefSite, RdGraphBuilder, RdNodeTag};
    use slicer_utils::Offset;

    #[test]
    fn unmarked_chain_node_is_swept() {
        let mut graph = RdGraph::new();
        let target = graph.create_node(RdNodeTag::Alloc);
        let ds = DefSite::new(target, Offset::ZERO, Offset::new(4));
        let (store, noop, load) = {
            let mut b = RdGraphBuilder::new(&mut graph, true);
            let store = b.store(ds).unwrap();
            let noop = b.push(RdNodeTag::Noop).unwrap();
            let load = b.load(ds).unwrap();
            (store, noop, load)
        };

        let mut rda = ReachingDefinitionsAnalysis::new(graph, AnalysisConfig::new());
        rda.run().unwrap();
        walk::mark(&mut rda, &vec![load], 3, SliceDirection::Backward).unwrap();

        let mut hooks = DefaultHooks;
        let stats = slice(&mut rda.graph, 3, &mut hooks).unwrap();

        assert!(rda.graph.get(store).is_ok());
        assert!(rda.graph.get(load).is_ok());
        assert!(rda.graph.get(noop).is_err());
        assert_eq!(stats.nodes_removed, 1);
    }

    struct VetoAll;
    impl SliceHooks for VetoAll {
        fn remove_node(&mut self, _node: NodeId) -> bool {
            false
        }
    }

    #[test]
    fn veto_hook_keeps_the_node() {
        let mut graph = RdGraph::new();
        let noop = {
            let mut b = RdGraphBuilder::new(&mut graph, true);
            b.push(RdNodeTag::Noop).unwrap()
        };

        let mut hooks = VetoAll;
        let stats = slice(&mut graph, 1, &mut hooks).unwrap();
        assert!(graph.get(noop).is_ok());
        assert_eq!(stats.nodes_removed, 0);
    }
}
