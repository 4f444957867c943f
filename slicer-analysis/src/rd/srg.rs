//! SSA-form reaching-definitions construction (§4.6.1): builds a "marker
//! SRG" by resolving each use directly to its (possibly φ-merged)
//! definition instead of iterating a MOP fixpoint, following the
//! recursive `readVariable`/`writeVariable` construction.
//!
//! Simplification from the general algorithm: predecessor blocks are
//! resolved once per query with a same-query recursion guard rather than
//! the full incomplete-phi/sealed-block bookkeeping needed for
//! correctness under arbitrary irreducible control flow — adequate for
//! the reducible CFGs a structured front end produces, and the guard still
//! honours the one invariant that matters here: recursion must stop at the
//! graph's unique start block rather than treating a back edge into it as
//! an ordinary predecessor to merge with (§9).

use slicer_graph::{DefSite, NodeId, RdBlockId, RdGraph, RdNodeTag};
use slicer_utils::Result;
use std::collections::{HashMap, HashSet};

pub struct SrgBuilder<'g> {
    graph: &'g mut RdGraph,
    visiting: HashSet<(RdBlockId, DefSite)>,
    cache: HashMap<(RdBlockId, DefSite), NodeId>,
}

impl<'g> SrgBuilder<'g> {
    pub fn new(graph: &'g mut RdGraph) -> Self {
        SrgBuilder {
            graph,
            visiting: HashSet::new(),
            cache: HashMap::new(),
        }
    }

    fn predecessor_blocks(&self, block: RdBlockId) -> Vec<RdBlockId> {
        let Some(&first) = self.graph.block(block).nodes().first() else {
            return Vec::new();
        };
        let Ok(node) = self.graph.get(first) else {
            return Vec::new();
        };
        let mut seen = HashSet::new();
        let mut blocks = Vec::new();
        for &pred in node.base().predecessors() {
            if let Some(b) = self.graph.get(pred).ok().and_then(|n| n.block()) {
                if seen.insert(b) {
                    blocks.push(b);
                }
            }
        }
        blocks
    }

    /// Resolves the value reaching a read of `ds` at the end of `block`,
    /// inserting φ nodes at merge points as needed.
    pub fn read_variable(&mut self, block: RdBlockId, ds: DefSite) -> Result<NodeId> {
        if let Some(node) = self.graph.block(block).definitions().collect_all(&ds.interval()).first() {
            return Ok(*node);
        }
        if let Some(&cached) = self.cache.get(&(block, ds)) {
            return Ok(cached);
        }
        self.read_variable_recursive(block, ds)
    }

    fn read_variable_recursive(&mut self, block: RdBlockId, ds: DefSite) -> Result<NodeId> {
        if self.graph.block(block).is_start_block() {
            return Ok(self.graph.unknown_node());
        }
        let key = (block, ds);
        if !self.visiting.insert(key) {
            // A cycle in the CFG reached this query again before it
            // resolved; break it with the unknown sentinel rather than
            // recursing forever. The enclosing φ (if any) still converges
            // once its other operands resolve.
            return Ok(self.graph.unknown_node());
        }

        let preds = self.predecessor_blocks(block);
        let result = if preds.is_empty() {
            self.graph.unknown_node()
        } else if preds.len() == 1 {
            self.read_variable(preds[0], ds)?
        } else {
            let phi = self.graph.create_node(RdNodeTag::Phi);
            self.graph.block_mut(block).record_definition(ds.interval(), phi);
            self.cache.insert(key, phi);
            for pred in preds {
                let operand = self.read_variable(pred, ds)?;
                self.graph.add_operand(phi, operand)?;
            }
            phi
        };

        self.visiting.remove(&key);
        self.cache.insert(key, result);
        if !self.graph.block(block).is_start_block() {
            self.graph.block_mut(block).record_definition(ds.interval(), result);
        }
        Ok(result)
    }

    /// Resolves every recorded `uses()` def-site of `node` against the
    /// block it lives in, returning the resolved `(DefSite, reaching node)`
    /// pairs. Call after every write in program order has been recorded
    /// via [`slicer_graph::RdGraphBuilder`]'s `store`/`load`.
    pub fn resolve_uses(&mut self, node: NodeId) -> Result<Vec<(DefSite, NodeId)>> {
        let block = self
            .graph
            .get(node)?
            .block()
            .ok_or_else(|| slicer_utils::Error::malformed(format!("{node} is not assigned to a block")))?;
        let uses: Vec<DefSite> = self.graph.get(node)?.uses().iter().copied().collect();
        let mut resolved = Vec::with_capacity(uses.len());
        for ds in uses {
            let def = self.read_variable(block, ds)?;
            resolved.push((ds, def));
        }
        Ok(resolved)
    }
}
