//! Graphviz `.dot` emission of the pointer graph (§6.4), coloured by edge
//! class. Dependency-free: this is plain string formatting, not a rendering
//! pipeline, so it deliberately doesn't pull in a dot-writing crate.

use slicer_graph::{NodeId, PointerGraph};
use std::fmt::Write as _;

bitflags::bitflags! {
    /// Which edge classes to emit. `ALL` matches the default CLI behaviour;
    /// narrower sets are for focused debugging of one dependence kind.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct DotOptions: u8 {
        /// Operand (data/def-use) edges, drawn `cyan4`.
        const DATA = 0b0001;
        /// Control-flow successor edges, drawn `blue`.
        const CONTROL = 0b0010;
        /// Use-to-user back edges, drawn dashed black.
        const USE = 0b0100;
        /// Plain successor chain with no dependence meaning, drawn `gray`.
        const CFG = 0b1000;
        const ALL = Self::DATA.bits() | Self::CONTROL.bits() | Self::USE.bits() | Self::CFG.bits();
    }
}

fn node_label(graph: &PointerGraph, id: NodeId) -> String {
    graph
        .get(id)
        .map(|n| format!("{} [{}]", id, n.tag.name()))
        .unwrap_or_else(|_| format!("{id} [?]"))
}

/// Renders `graph` as a Graphviz digraph, restricted to the edge classes
/// named in `options`.
pub fn to_dot(graph: &PointerGraph, options: DotOptions) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "digraph pdg {{");
    let _ = writeln!(out, "  rankdir=TB;");

    for id in graph.node_ids() {
        let _ = writeln!(out, "  n{} [label=\"{}\"];", id.raw(), node_label(graph, id));
    }

    for id in graph.node_ids() {
        let Ok(node) = graph.get(id) else { continue };

        if options.contains(DotOptions::CONTROL) {
            for &succ in node.base().successors() {
                let _ = writeln!(
                    out,
                    "  n{} -> n{} [color=blue];",
                    id.raw(),
                    succ.raw()
                );
            }
        } else if options.contains(DotOptions::CFG) {
            for &succ in node.base().successors() {
                let _ = writeln!(out, "  n{} -> n{} [color=gray];", id.raw(), succ.raw());
            }
        }

        if options.contains(DotOptions::DATA) {
            for &operand in node.base().operands() {
                let _ = writeln!(
                    out,
                    "  n{} -> n{} [color=cyan4];",
                    operand.raw(),
                    id.raw()
                );
            }
        }

        if options.contains(DotOptions::USE) {
            for &user in node.base().users() {
                let _ = writeln!(
                    out,
                    "  n{} -> n{} [color=black, style=dashed];",
                    id.raw(),
                    user.raw()
                );
            }
        }
    }

    let _ = writeln!(out, "}}");
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use slicer_graph::{AllocAttrs, PointerGraphBuilder};

    #[test]
    fn data_edges_use_cyan4() {
        let mut graph = PointerGraph::new();
        let mut b = PointerGraphBuilder::new(&mut graph);
        let a = b.alloc(AllocAttrs::default()).unwrap();
        b.load(a).unwrap();

        let dot = to_dot(&graph, DotOptions::DATA);
        assert!(dot.contains("color=cyan4"));
        assert!(!dot.contains("color=blue"));
    }

    #[test]
    fn control_edges_use_blue() {
        let mut graph = PointerGraph::new();
        let mut b = PointerGraphBuilder::new(&mut graph);
        let a = b.alloc(AllocAttrs::default()).unwrap();
        b.load(a).unwrap();

        let dot = to_dot(&graph, DotOptions::CONTROL);
        assert!(dot.contains("color=blue"));
    }

    #[test]
    fn empty_options_emits_only_node_declarations() {
        let mut graph = PointerGraph::new();
        let mut b = PointerGraphBuilder::new(&mut graph);
        let a = b.alloc(AllocAttrs::default()).unwrap();
        b.load(a).unwrap();

        let dot = to_dot(&graph, DotOptions::empty());
        assert!(!dot.contains("->"));
    }
}
