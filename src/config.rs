//! Cache configuration.

/// Configuration for a [`crate::Cache`].
///
/// Constructed via [`Default`] and adjusted with the setters, mirroring how
/// the teacher database's `DatabaseConfig` is shaped: a handful of
/// documented fields with sane embedded-library defaults rather than a
/// config-file format.
#[derive(Debug, Clone)]
pub struct CacheConfig {
    /// Size in bytes of every in-memory frame. Every mapped file's page size
    /// must be less than or equal to this value.
    pub cache_page_size: usize,
    /// Number of frames held by the pool. This is the cache's fixed capacity.
    pub max_pages: usize,
    /// Upper bound, in victim-search attempts, before a cursor advance that
    /// cannot find an unpinned frame fails with
    /// [`crate::CacheError::NoFrameAvailable`] instead of continuing to back off.
    pub max_victim_search_attempts: u32,
}

impl CacheConfig {
    /// Creates a configuration with the given page size and frame capacity,
    /// everything else at its default.
    #[must_use]
    pub fn new(cache_page_size: usize, max_pages: usize) -> Self {
        Self {
            cache_page_size,
            max_pages,
            ..Self::default()
        }
    }

    /// Sets the victim-search backoff bound.
    #[must_use]
    pub fn with_max_victim_search_attempts(mut self, attempts: u32) -> Self {
        self.max_victim_search_attempts = attempts;
        self
    }
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            cache_page_size: 4096,
            max_pages: 256,
            max_victim_search_attempts: 1_000,
        }
    }
}
