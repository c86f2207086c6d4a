use crate::core::{StoreError, StoreResult};
use std::time::Duration;

/// Path that opens a private in-memory database.
pub const MEMORY_PATH: &str = ":memory:";

const URL_SCHEME: &str = "sqlite://";
const MEMORY_URL: &str = "sqlite::memory:";

/// Document store configuration
///
/// Similar to a SQLite connection string plus a few store-level knobs.
#[derive(Debug, Clone)]
pub struct StoreConfig {
    /// Database file, or `:memory:`
    pub path: String,

    /// How long SQLite waits on a locked database before failing
    pub busy_timeout: Duration,

    /// Number of catalog entries kept in memory (0 disables the cache)
    pub metadata_cache_capacity: usize,

    /// Rows buffered between the database cursor and a stream consumer
    pub stream_buffer: usize,

    /// Reject malformed criteria instead of dropping them from the filter
    pub strict_criteria: bool,
}

impl StoreConfig {
    /// Create a configuration for the database at `path`
    pub fn new(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            busy_timeout: Duration::from_secs(5),
            metadata_cache_capacity: 64,
            stream_buffer: 64,
            strict_criteria: false,
        }
    }

    /// Configuration for a private in-memory database
    pub fn in_memory() -> Self {
        Self::new(MEMORY_PATH)
    }

    pub fn busy_timeout(mut self, timeout: Duration) -> Self {
        self.busy_timeout = timeout;
        self
    }

    pub fn metadata_cache_capacity(mut self, capacity: usize) -> Self {
        self.metadata_cache_capacity = capacity;
        self
    }

    pub fn stream_buffer(mut self, rows: usize) -> Self {
        self.stream_buffer = rows;
        self
    }

    pub fn strict_criteria(mut self, strict: bool) -> Self {
        self.strict_criteria = strict;
        self
    }

    pub fn is_in_memory(&self) -> bool {
        self.path == MEMORY_PATH
    }

    /// Parse from connection string
    ///
    /// Accepts `sqlite::memory:`, `sqlite://<path>`, `:memory:` or a bare path.
    ///
    /// # Examples
    ///
    /// ```
    /// # use jsonstore::StoreConfig;
    /// let config = StoreConfig::from_url("sqlite:///var/lib/app/docs.db").unwrap();
    /// assert_eq!(config.path, "/var/lib/app/docs.db");
    ///
    /// assert!(StoreConfig::from_url("sqlite::memory:").unwrap().is_in_memory());
    /// ```
    pub fn from_url(url: &str) -> StoreResult<Self> {
        let url = url.trim();

        if url == MEMORY_URL || url == MEMORY_PATH {
            return Ok(Self::in_memory());
        }

        let path = match url.strip_prefix(URL_SCHEME) {
            Some(path) => path,
            None if url.contains("://") => {
                return Err(StoreError::InvalidArgument(format!(
                    "unsupported database URL '{}': expected {}<path>",
                    url, URL_SCHEME
                )));
            }
            None => url,
        };

        let config = Self::new(path);
        config.validate()?;
        Ok(config)
    }

    /// Convert to connection string
    pub fn to_url(&self) -> String {
        if self.is_in_memory() {
            MEMORY_URL.to_string()
        } else {
            format!("{}{}", URL_SCHEME, self.path)
        }
    }

    /// Validate configuration
    pub fn validate(&self) -> StoreResult<()> {
        if self.path.is_empty() {
            return Err(StoreError::invalid("Missing parameter: config path"));
        }

        if self.stream_buffer == 0 {
            return Err(StoreError::invalid("stream_buffer must be > 0"));
        }

        Ok(())
    }
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self::in_memory()
    }
}
