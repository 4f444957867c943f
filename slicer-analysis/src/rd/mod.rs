//! Reaching-definitions analysis: the classic MOP fixpoint and the SSA-form
//! marker SRG builder (§4.6–§4.6.1).

pub mod mop;
pub mod srg;

pub use mop::ReachingDefinitionsAnalysis;
pub use srg::SrgBuilder;
