//! `AnalysisConfig` (§6.6 / §11): a flat, `Clone + Debug + Default` option
//! struct with builder-style setters, consumed by the analysis
//! constructors — the same small-struct-plus-setters idiom used throughout
//! the pointer/RD driver helpers (cf. `ControlOrder<const BETTER_ERR: bool>`).

use slicer_utils::Offset;

#[derive(Debug, Clone)]
pub struct AnalysisConfig {
    pub field_sensitivity: Offset,
    pub preprocess_geps: bool,
    pub invalidate_nodes: bool,
    pub strong_update_unknown: bool,
    pub max_set_size: usize,
    pub entry_function: String,
    pub undefined_are_pure: bool,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        AnalysisConfig {
            field_sensitivity: Offset::Unknown,
            preprocess_geps: false,
            invalidate_nodes: false,
            strong_update_unknown: false,
            max_set_size: 1024,
            entry_function: "main".to_string(),
            undefined_are_pure: false,
        }
    }
}

impl AnalysisConfig {
    pub fn new() -> Self {
        AnalysisConfig::default()
    }

    pub fn with_field_sensitivity(mut self, bound: Offset) -> Self {
        self.field_sensitivity = bound;
        self
    }

    pub fn with_preprocess_geps(mut self, enabled: bool) -> Self {
        self.preprocess_geps = enabled;
        self
    }

    pub fn with_invalidate_nodes(mut self, enabled: bool) -> Self {
        self.invalidate_nodes = enabled;
        self
    }

    pub fn with_strong_update_unknown(mut self, enabled: bool) -> Self {
        self.strong_update_unknown = enabled;
        self
    }

    pub fn with_max_set_size(mut self, size: usize) -> Self {
        self.max_set_size = size;
        self
    }

    pub fn with_entry_function(mut self, name: impl Into<String>) -> Self {
        self.entry_function = name.into();
        self
    }

    pub fn with_undefined_are_pure(mut self, enabled: bool) -> Self {
        self.undefined_are_pure = enabled;
        self
    }

    /// Caps `offset` at `field_sensitivity`, saturating to `Unknown` above it.
    pub fn clamp_offset(&self, offset: Offset) -> Offset {
        match (offset, self.field_sensitivity) {
            (Offset::Concrete(v), Offset::Concrete(bound)) if v > bound => Offset::Unknown,
            _ => offset,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builder_setters_compose() {
        let cfg = AnalysisConfig::new()
            .with_max_set_size(8)
            .with_entry_function("start");
        assert_eq!(cfg.max_set_size, 8);
        assert_eq!(cfg.entry_function, "start");
    }

    #[test]
    fn clamp_offset_saturates_past_bound() {
        let cfg = AnalysisConfig::new().with_field_sensitivity(Offset::new(16));
        assert_eq!(cfg.clamp_offset(Offset::new(8)), Offset::new(8));
        assert_eq!(cfg.clamp_offset(Offset::new(32)), Offset::Unknown);
    }
}
