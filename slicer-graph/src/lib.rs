//! Data model for the pointer graph and the reaching-definitions graph
//! (§2 items 3–7, 11), plus the construction API (§6.1) external builders
//! use to populate them.
//!
//! Nodes are arena-indexed (`NodeId`) rather than reference-counted: both
//! graphs own their nodes outright and adjacency is expressed purely as
//! ids resolved through the owning graph (§9).

mod builder;
mod memory;
mod node;
mod points_to;
mod pointer_graph;
mod rd_graph;

pub use builder::{PointerGraphBuilder, RdGraphBuilder};
pub use memory::{MemoryMap, MemoryObject};
pub use node::{NodeBase, NodeId};
pub use points_to::{Pointer, PointsToSet};
pub use pointer_graph::{
    AllocAttrs, CallAttrs, EntryAttrs, ForkJoinAttrs, PointerGraph, PointerSubgraph, PsNode,
    PsNodeTag, SubgraphId,
};
pub use rd_graph::{
    DefSite, MergeOutcome, RDMap, RdBasicBlock, RdBlockId, RdGraph, RdNode, RdNodeTag, TargetInfo,
};
