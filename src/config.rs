//! Store configuration

/// Default number of elements a freshly allocated column can hold
pub const DEFAULT_COLUMN_CAPACITY: usize = 2;

/// Default upper bound on distinct archetypes
pub const DEFAULT_MAX_ARCHETYPES: usize = 10_000;

/// Tunables for a [`World`](crate::world::World)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StoreConfig {
    /// Element capacity of new and reset columns. Columns double from here.
    pub initial_column_capacity: usize,
    /// Creating more archetypes than this fails with `ArchetypeLimitExceeded`
    pub max_archetypes: usize,
    /// When false every query recomputes its archetype list
    pub query_cache_enabled: bool,
}

impl StoreConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_initial_column_capacity(mut self, capacity: usize) -> Self {
        // A zero capacity would never double
        self.initial_column_capacity = capacity.max(1);
        self
    }

    pub fn with_max_archetypes(mut self, max: usize) -> Self {
        self.max_archetypes = max;
        self
    }

    pub fn with_query_cache(mut self, enabled: bool) -> Self {
        self.query_cache_enabled = enabled;
        self
    }
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            initial_column_capacity: DEFAULT_COLUMN_CAPACITY,
            max_archetypes: DEFAULT_MAX_ARCHETYPES,
            query_cache_enabled: true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builder_clamps_capacity() {
        let config = StoreConfig::new()
            .with_initial_column_capacity(0)
            .with_max_archetypes(8)
            .with_query_cache(false);
        assert_eq!(config.initial_column_capacity, 1);
        assert_eq!(config.max_archetypes, 8);
        assert!(!config.query_cache_enabled);
    }
}
