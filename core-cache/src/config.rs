//! Cache configuration

use std::path::PathBuf;

/// Default name of the cache folder under the media root.
pub const DEFAULT_DIRECTORY_NAME: &str = "Media";

/// Configuration for the cache manager.
#[derive(Debug, Clone)]
pub struct CacheConfig {
    /// Durable directory the cache folder is created in (e.g. Documents)
    pub media_root: PathBuf,

    /// Name of the cache folder inside `media_root` (default: `Media`)
    pub directory_name: String,

    /// Log every lookup hit/miss at debug level (default: true)
    pub log_cache_lookups: bool,
}

impl CacheConfig {
    /// Create a configuration rooted at `media_root` with default values.
    pub fn new(media_root: impl Into<PathBuf>) -> Self {
        Self {
            media_root: media_root.into(),
            directory_name: DEFAULT_DIRECTORY_NAME.to_string(),
            log_cache_lookups: true,
        }
    }

    /// Set cache directory name.
    pub fn with_directory_name(mut self, name: impl Into<String>) -> Self {
        self.directory_name = name.into();
        self
    }

    /// Enable or disable lookup logging.
    pub fn with_lookup_logging(mut self, enabled: bool) -> Self {
        self.log_cache_lookups = enabled;
        self
    }

    /// Directory holding the cached files.
    pub fn cache_dir(&self) -> PathBuf {
        self.media_root.join(&self.directory_name)
    }

    /// Validate configuration.
    pub fn validate(&self) -> Result<(), String> {
        if self.media_root.as_os_str().is_empty() {
            return Err("media_root cannot be empty".to_string());
        }

        if self.directory_name.is_empty() {
            return Err("directory_name cannot be empty".to_string());
        }

        if self.directory_name == "."
            || self.directory_name == ".."
            || self.directory_name.contains(['/', '\\'])
        {
            return Err(format!(
                "directory_name must be a single folder name, got '{}'",
                self.directory_name
            ));
        }

        Ok(())
    }
}
