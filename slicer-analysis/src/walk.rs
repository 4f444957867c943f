//! PDG walk-and-mark (§4.7, §6.3 `mark`): breadth-first traversal along
//! dependence edges from a slicing criterion, stamping each reached node's
//! `walk_id` with the slice id so [`crate::slicer::Slicer`] can later sweep
//! everything left unstamped.
//!
//! Data dependence comes from the reaching-definitions result (a use's
//! dependence is its set of reaching defs); control dependence is
//! approximated here by the RD graph's own predecessor/successor edges,
//! since no separate control-dependence graph is modelled (§9) — precise
//! enough for the structured, reducible control flow a front end produces.

use crate::rd::ReachingDefinitionsAnalysis;
use slicer_graph::{NodeId, RdGraph};
use slicer_utils::Result;
use std::collections::{HashSet, VecDeque};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SliceDirection {
    /// Keep everything that can affect the criterion (the common case).
    Backward,
    /// Keep everything the criterion can affect, then recover the control
    /// dependences of whatever that reaches with a trailing backward pass.
    Forward,
}

/// One or more program points whose observable behaviour a slice must preserve.
pub type SliceCriterion = Vec<NodeId>;

/// The result of [`mark`]: every node reached from the criterion, already
/// stamped into the graph's `walk_id` slots under `slice_id`.
#[derive(Debug, Clone, Default)]
pub struct WalkResult {
    pub marked: HashSet<NodeId>,
}

pub fn mark(
    analysis: &mut ReachingDefinitionsAnalysis,
    criteria: &SliceCriterion,
    slice_id: u32,
    direction: SliceDirection,
) -> Result<WalkResult> {
    let mut marked: HashSet<NodeId> = HashSet::new();
    let mut queue: VecDeque<NodeId> = VecDeque::new();
    for &c in criteria {
        if marked.insert(c) {
            queue.push_back(c);
        }
    }

    while let Some(n) = queue.pop_front() {
        for def in analysis.reaching_defs(n)? {
            if marked.insert(def) {
                queue.push_back(def);
            }
        }
        let adjacent = match direction {
            SliceDirection::Backward => analysis.graph.get(n)?.base().predecessors().to_vec(),
            SliceDirection::Forward => analysis.graph.get(n)?.base().successors().to_vec(),
        };
        for next in adjacent {
            if marked.insert(next) {
                queue.push_back(next);
            }
        }
    }

    if direction == SliceDirection::Forward {
        let mut backward_queue: VecDeque<NodeId> = marked.iter().copied().collect();
        while let Some(n) = backward_queue.pop_front() {
            for &pred in analysis.graph.get(n)?.base().predecessors() {
                if marked.insert(pred) {
                    backward_queue.push_back(pred);
                }
            }
        }
    }

    for &node in &marked {
        analysis.graph.get_mut(node)?.base_mut().set_walk_id(slice_id);
    }

    Ok(WalkResult { marked })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AnalysisConfig;
    use slicer_graph::{DefSite, RdGraphBuilder, RdNodeTag};
    use slicer_utils::Offset;

    #[test]
    fn backward_mark_reaches_the_defining_store() {
        let mut graph = RdGraph::new();
        let target = graph.create_node(RdNodeTag::Alloc);
        let ds = DefSite::new(target, Offset::ZERO, Offset::new(4));
        let (store, load) = {
            let mut b = RdGraphBuilder::new(&mut graph, true);
            let store = b.store(ds).unwrap();
            let load = b.load(ds).unwrap();
            (store, load)
        };

        let mut rda = ReachingDefinitionsAnalysis::new(graph, AnalysisConfig::new());
        rda.run().unwrap();
        let result = mark(&mut rda, &vec![load], 7, SliceDirection::Backward).unwrap();
        assert!(result.marked.contains(&store));
        assert_eq!(rda.graph.get(store).unwrap().base().walk_id(), 7);
    }
}
