//! Pointer analysis: the common driver plus the three engine variants that
//! plug into it (§4.2–§4.3).

pub mod driver;
pub mod fi;
pub mod fs;
pub mod fsinv;

pub use driver::{MemoryResolver, PointerAnalysis};
pub use fi::FlowInsensitive;
pub use fs::FlowSensitive;
pub use fsinv::FlowSensitiveInvalidation;
