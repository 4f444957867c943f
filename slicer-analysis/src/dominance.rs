//! Dominance and dominance-frontier computation over RD-graph basic blocks
//! (§2 item 13), used to seed the SSA-style RD builder's merge points.

use petgraph::algo::dominators::{self, Dominators as PetgraphDominators};
use petgraph::graphmap::DiGraphMap;
use slicer_graph::{RdBlockId, RdGraph};
use slicer_utils::{Error, Result};
use std::collections::{HashMap, HashSet};

/// Immediate-dominator tree over a graph's basic blocks.
pub struct Dominators {
    inner: PetgraphDominators<RdBlockId>,
    start: RdBlockId,
}

impl Dominators {
    pub fn start(&self) -> RdBlockId {
        self.start
    }

    pub fn immediate_dominator(&self, block: RdBlockId) -> Option<RdBlockId> {
        self.inner.immediate_dominator(block)
    }

    pub fn dominates(&self, a: RdBlockId, b: RdBlockId) -> bool {
        self.inner.dominators(b).is_some_and(|mut chain| chain.any(|d| d == a))
    }
}

fn block_graph(graph: &RdGraph) -> DiGraphMap<RdBlockId, ()> {
    let mut dg = DiGraphMap::new();
    for block in graph.blocks() {
        dg.add_node(block.id());
        for &node in block.nodes() {
            let Ok(n) = graph.get(node) else { continue };
            for &succ in n.base().successors() {
                if let Ok(succ_node) = graph.get(succ) {
                    if let Some(succ_block) = succ_node.block() {
                        if succ_block != block.id() {
                            dg.add_edge(block.id(), succ_block, ());
                        }
                    }
                }
            }
        }
    }
    dg
}

/// Computes the immediate-dominator tree over `graph`'s basic blocks,
/// rooted at the unique block with `is_start_block() == true`.
pub fn compute_dominators(graph: &RdGraph) -> Result<Dominators> {
    let start = graph
        .blocks()
        .find(|b| b.is_start_block())
        .map(|b| b.id())
        .ok_or_else(|| Error::malformed("reaching-definitions graph has no start block"))?;
    let dg = block_graph(graph);
    let inner = dominators::simple_fast(&dg, start);
    Ok(Dominators { inner, start })
}

/// The dominance frontier of every block: `DF(b)` is the set of blocks `x`
/// such that `b` dominates a predecessor of `x` but does not strictly
/// dominate `x` itself (Cooper/Harvey/Kennedy).
pub fn dominance_frontier(
    graph: &RdGraph,
    doms: &Dominators,
) -> HashMap<RdBlockId, HashSet<RdBlockId>> {
    let dg = block_graph(graph);
    let mut frontier: HashMap<RdBlockId, HashSet<RdBlockId>> = HashMap::new();

    for block in graph.blocks() {
        let preds: Vec<RdBlockId> = dg
            .nodes()
            .filter(|&p| dg.contains_edge(p, block.id()))
            .collect();
        if preds.len() < 2 {
            continue;
        }
        let Some(idom) = doms.immediate_dominator(block.id()) else {
            continue;
        };
        for pred in preds {
            let mut runner = pred;
            while runner != idom {
                frontier.entry(runner).or_default().insert(block.id());
                match doms.immediate_dominator(runner) {
                    Some(next) if next != runner => runner = next,
                    _ => break,
                }
            }
        }
    }
    frontier
}

#[cfg(test)]
mod tests {
    use super::*;
    use slicer_graph::RdNodeTag;

    #[test]
    fn diamond_cfg_join_has_both_branches_in_frontier() {
        let mut graph = RdGraph::new();
        let start_block = graph.create_block(true);
        let left_block = graph.create_block(false);
        let right_block = graph.create_block(false);
        let join_block = graph.create_block(false);

        let start = graph.create_node(RdNodeTag::Noop);
        graph.assign_block(start, start_block).unwrap();
        let left = graph.create_node(RdNodeTag::Noop);
        graph.assign_block(left, left_block).unwrap();
        let right = graph.create_node(RdNodeTag::Noop);
        graph.assign_block(right, right_block).unwrap();
        let join = graph.create_node(RdNodeTag::Noop);
        graph.assign_block(join, join_block).unwrap();

        graph.add_successor(start, left).unwrap();
        graph.add_successor(start, right).unwrap();
        graph.add_successor(left, join).unwrap();
        graph.add_successor(right, join).unwrap();

        let doms = compute_dominators(&graph).unwrap();
        assert_eq!(doms.immediate_dominator(join_block), Some(start_block));

        let df = dominance_frontier(&graph, &doms);
        assert!(df.get(&left_block).unwrap().contains(&join_block));
        assert!(df.get(&right_block).unwrap().contains(&join_block));
    }
}
