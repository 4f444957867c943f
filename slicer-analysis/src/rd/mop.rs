//! Classic meet-over-all-paths reaching-definitions fixpoint (§4.6): a
//! worklist over the RD graph where each node's out-map is the merge of its
//! predecessors' out-maps, with that node's own strong (`overwrites`) and
//! weak (`defines`) writes folded in afterwards.

use crate::config::AnalysisConfig;
use slicer_graph::{DefSite, NodeId, RDMap, RdGraph};
use slicer_utils::{Diagnostic, Diagnostics, Result};
use std::collections::{HashSet, VecDeque};

pub struct ReachingDefinitionsAnalysis {
    pub graph: RdGraph,
    pub config: AnalysisConfig,
    pub diagnostics: Diagnostics,
}

impl ReachingDefinitionsAnalysis {
    pub fn new(graph: RdGraph, config: AnalysisConfig) -> Self {
        ReachingDefinitionsAnalysis {
            graph,
            config,
            diagnostics: Diagnostics::new(),
        }
    }

    pub fn run(&mut self) -> Result<()> {
        let mut queue: VecDeque<NodeId> = self.graph.node_ids().collect();
        let mut queued: HashSet<NodeId> = queue.iter().copied().collect();
        let mut rounds = 0u32;

        while let Some(node) = queue.pop_front() {
            queued.remove(&node);
            rounds += 1;
            let changed = self.process_node(node)?;
            if changed {
                for &succ in self.graph.get(node)?.base().successors() {
                    if queued.insert(succ) {
                        queue.push_back(succ);
                    }
                }
            }
        }
        log::debug!("reaching-definitions fixpoint reached after {rounds} node visits");
        Ok(())
    }

    fn process_node(&mut self, node: NodeId) -> Result<bool> {
        let mut merged = RDMap::new();
        let predecessors = self.graph.get(node)?.base().predecessors().to_vec();
        // §4.6: "its incoming map is the point-wise merge of predecessor
        // maps using `overwrites` as the kill set" — a predecessor's weak
        // entry for a DefSite this node strongly overwrites must not
        // survive the merge.
        let overwrites: Vec<DefSite> = self.graph.get(node)?.overwrites().iter().copied().collect();
        for pred in predecessors {
            let pred_map = self.graph.get(pred)?.rd_map.clone();
            let outcome = merged.merge(
                &pred_map,
                Some(&overwrites),
                self.config.strong_update_unknown,
                self.config.max_set_size,
                false,
                &self.graph,
            );
            for ds in outcome.saturated {
                self.diagnostics
                    .push_warning(Diagnostic::Saturated { node: ds.target.raw() });
                log::warn!("{node}: reaching-definitions set for {ds:?} saturated to Unknown");
            }
        }

        for &ds in &overwrites {
            merged.update(ds, node);
        }
        let defines = self.graph.get(node)?.defines().clone();
        for ds in defines {
            merged.add(ds, node);
        }

        let changed = merged != self.graph.get(node)?.rd_map;
        if changed {
            self.graph.get_mut(node)?.rd_map = merged;
        }
        Ok(changed)
    }

    /// The set of definition nodes reaching a use at `node` (§6.2 `reaching_defs`).
    pub fn reaching_defs(&self, node: NodeId) -> Result<HashSet<NodeId>> {
        let n = self.graph.get(node)?;
        let mut result = HashSet::new();
        for ds in n.uses() {
            result.extend(n.rd_map.get(ds.target, ds.interval()));
        }
        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use slicer_graph::{RdGraphBuilder, RdNodeTag};
    use slicer_utils::Offset;

    #[test]
    fn strong_overwrite_replaces_prior_reaching_def() {
        let mut graph = RdGraph::new();
        let target = graph.create_node(RdNodeTag::Alloc);
        let ds = slicer_graph::DefSite::new(target, Offset::ZERO, Offset::new(4));

        let (store1, store2, load) = {
            let mut b = RdGraphBuilder::new(&mut graph, true);
            let store1 = b.store(ds).unwrap();
            let store2 = b.store(ds).unwrap();
            let load = b.load(ds).unwrap();
            (store1, store2, load)
        };

        let mut analysis = ReachingDefinitionsAnalysis::new(graph, AnalysisConfig::new());
        analysis.run().unwrap();
        let reaching = analysis.reaching_defs(load).unwrap();
        assert_eq!(reaching, HashSet::from([store2]));
        let _ = store1;
    }

    #[test]
    fn wider_overwrite_kills_a_narrower_predecessor_def() {
        // A weak store of [0,4) followed by a strong store of the wider
        // [0,8) must kill the first store's reaching def, even though the
        // two DefSites aren't identical.
        let mut graph = RdGraph::new();
        let target = graph.create_node(RdNodeTag::Alloc);
        let narrow = slicer_graph::DefSite::new(target, Offset::ZERO, Offset::new(4));
        let wide = slicer_graph::DefSite::new(target, Offset::ZERO, Offset::new(8));

        let block = graph.create_block(true);
        let weak_store = graph.create_node(RdNodeTag::Store);
        graph.assign_block(weak_store, block).unwrap();
        graph.add_define(weak_store, narrow).unwrap();

        let strong_store = graph.create_node(RdNodeTag::Store);
        graph.assign_block(strong_store, block).unwrap();
        graph.add_overwrite(strong_store, wide).unwrap();
        graph.add_successor(weak_store, strong_store).unwrap();

        let load = graph.create_node(RdNodeTag::Load);
        graph.assign_block(load, block).unwrap();
        graph.add_use(load, narrow).unwrap();
        graph.add_successor(strong_store, load).unwrap();

        let mut analysis = ReachingDefinitionsAnalysis::new(graph, AnalysisConfig::new());
        analysis.run().unwrap();
        let reaching = analysis.reaching_defs(load).unwrap();
        assert_eq!(reaching, HashSet::from([strong_store]));
        let _ = weak_store;
    }
}
