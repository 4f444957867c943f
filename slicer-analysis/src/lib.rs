//! Engines for whole-program pointer analysis, reaching-definitions
//! analysis, and the PDG walk/mark/slice pipeline built on top of
//! `slicer-graph`'s data model.

pub mod config;
pub mod dominance;
pub mod dot;
pub mod pointer;
pub mod rd;
pub mod slicer;
pub mod validate;
pub mod walk;

pub use config::AnalysisConfig;
pub use dominance::{compute_dominators, dominance_frontier, Dominators};
pub use dot::{to_dot, DotOptions};
pub use pointer::{FlowInsensitive, FlowSensitive, FlowSensitiveInvalidation, MemoryResolver, PointerAnalysis};
pub use rd::{ReachingDefinitionsAnalysis, SrgBuilder};
pub use slicer::{slice, DefaultHooks, SliceHooks, SlicerStatistics};
pub use validate::{validate, Finding, ValidationReport};
pub use walk::{mark, SliceCriterion, SliceDirection, WalkResult};
