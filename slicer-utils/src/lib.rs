//! Shared utilities for the slicer crates: offset/interval arithmetic,
//! error and diagnostics types, and the small caching containers the
//! pointer and reaching-definitions analyses use for per-node scratch state.

mod containers;
mod errors;
mod interval_map;
mod offset;

pub use containers::{CachingMap, SmallNumberSet, SparseBitSet};
pub use errors::{Diagnostic, Diagnostics, Error, MultiError, Result};
pub use interval_map::{DisjointIntervalSet, IntervalMap};
pub use offset::{Interval, Offset};
