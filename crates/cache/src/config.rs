//! Cache configuration: storage strategy, byte budget and location.
//!
//! Configuration can be built programmatically or read from environment
//! variables. The options bitmask carries the texture filter settings; the
//! bits that change cached payloads form the config tag stamped into every
//! persisted file.

use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

/// Texture filter mode bits
pub const FILTER_MASK: u32 = 0x0000_00ff;

/// Texture enhancement (upscaler) bits
pub const ENHANCEMENT_MASK: u32 = 0x0000_0f00;

/// Option bits that change the bytes of cached payloads
pub const CONFIG_TAG_MASK: u32 = FILTER_MASK | ENHANCEMENT_MASK;

/// Where cached textures are kept
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum StorageStrategy {
    /// Bounded in-memory cache with LRU eviction
    #[default]
    Memory,
    /// Single backing file indexed by checksum
    IndexedFile,
}

impl fmt::Display for StorageStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StorageStrategy::Memory => write!(f, "memory"),
            StorageStrategy::IndexedFile => write!(f, "file"),
        }
    }
}

impl FromStr for StorageStrategy {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "memory" | "ram" => Ok(StorageStrategy::Memory),
            "file" | "disk" | "indexed" => Ok(StorageStrategy::IndexedFile),
            _ => Err(ConfigError::InvalidValue(format!("storage strategy '{s}'"))),
        }
    }
}

/// Configuration for a [`TextureCache`](crate::TextureCache).
#[derive(Debug, Clone, PartialEq)]
pub struct CacheConfig {
    /// Storage strategy, fixed for the lifetime of the cache
    pub strategy: StorageStrategy,
    /// Texture filter options bitmask
    pub options: u32,
    /// RAM cache size limit in bytes (zero for unbounded)
    pub cache_limit: u64,
    /// Directory holding dumps and indexed storage
    pub cache_dir: PathBuf,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            strategy: StorageStrategy::Memory,
            options: 0,
            cache_limit: 256 * 1024 * 1024, // 256 MB
            cache_dir: Self::default_cache_dir(),
        }
    }
}

impl CacheConfig {
    /// Creates a configuration with the limit given in megabytes.
    pub fn new(strategy: StorageStrategy, limit_mb: u64, cache_dir: PathBuf) -> Self {
        Self {
            strategy,
            options: 0,
            cache_limit: limit_mb.saturating_mul(1024 * 1024),
            cache_dir,
        }
    }

    pub fn with_strategy(mut self, strategy: StorageStrategy) -> Self {
        self.strategy = strategy;
        self
    }

    /// Sets the RAM cache size in megabytes.
    pub fn with_limit_mb(mut self, mb: u64) -> Self {
        self.cache_limit = mb.saturating_mul(1024 * 1024);
        self
    }

    pub fn with_options(mut self, options: u32) -> Self {
        self.options = options;
        self
    }

    /// Sets the cache directory.
    pub fn with_cache_dir<P: AsRef<Path>>(mut self, path: P) -> Self {
        self.cache_dir = path.as_ref().to_path_buf();
        self
    }

    /// Returns the default cache directory for the current platform.
    ///
    /// - macOS: ~/Library/Caches/texfilter/textures
    /// - Linux: ~/.cache/texfilter/textures
    /// - Windows: %LOCALAPPDATA%\texfilter\textures
    pub fn default_cache_dir() -> PathBuf {
        if let Some(cache_dir) = dirs::cache_dir() {
            cache_dir.join("texfilter").join("textures")
        } else {
            // Fallback to current directory if cache dir unavailable
            PathBuf::from("cache/textures")
        }
    }

    /// Loads configuration from environment variables.
    ///
    /// Environment variables:
    /// - `TEXCACHE_STRATEGY`: `memory` or `file` (default: memory)
    /// - `TEXCACHE_LIMIT_MB`: RAM cache size in MB (default: 256)
    /// - `TEXCACHE_DIR`: cache directory path
    /// - `TEXCACHE_OPTIONS`: options bitmask, decimal or `0x` hex (default: 0)
    ///
    /// # Errors
    /// Returns an error if any environment variable contains an invalid value.
    pub fn from_env() -> Result<Self, ConfigError> {
        let mut config = Self::default();

        if let Ok(val) = std::env::var("TEXCACHE_STRATEGY") {
            config.strategy = val.parse()?;
        }

        if let Ok(val) = std::env::var("TEXCACHE_LIMIT_MB") {
            config.cache_limit = val
                .trim()
                .parse::<u64>()
                .ok()
                .and_then(|mb| mb.checked_mul(1024 * 1024))
                .ok_or_else(|| ConfigError::InvalidValue("TEXCACHE_LIMIT_MB".to_string()))?;
        }

        if let Ok(val) = std::env::var("TEXCACHE_DIR") {
            config.cache_dir = PathBuf::from(val);
        }

        if let Ok(val) = std::env::var("TEXCACHE_OPTIONS") {
            config.options = parse_options(&val)
                .ok_or_else(|| ConfigError::InvalidValue("TEXCACHE_OPTIONS".to_string()))?;
        }

        Ok(config)
    }

    /// Returns the RAM cache size in megabytes.
    pub fn limit_mb(&self) -> u64 {
        self.cache_limit / (1024 * 1024)
    }

    /// Fingerprint of the settings that affect cached payloads
    ///
    /// Persisted files carry this tag; files with a different tag are not
    /// loaded unless forced.
    pub fn config_tag(&self) -> i32 {
        (self.options & CONFIG_TAG_MASK) as i32
    }
}

fn parse_options(value: &str) -> Option<u32> {
    let value = value.trim();
    match value
        .strip_prefix("0x")
        .or_else(|| value.strip_prefix("0X"))
    {
        Some(hex) => u32::from_str_radix(hex, 16).ok(),
        None => value.parse().ok(),
    }
}

/// Errors that can occur during configuration operations.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Invalid value for a configuration parameter
    #[error("Invalid value for configuration key: {0}")]
    InvalidValue(String),
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;
    use std::env;

    const ENV_VARS: &[&str] = &[
        "TEXCACHE_STRATEGY",
        "TEXCACHE_LIMIT_MB",
        "TEXCACHE_DIR",
        "TEXCACHE_OPTIONS",
    ];

    #[test]
    fn test_default_config() {
        let config = CacheConfig::default();
        assert_eq!(config.strategy, StorageStrategy::Memory);
        assert_eq!(config.cache_limit, 256 * 1024 * 1024);
        assert_eq!(config.options, 0);
        assert!(config.cache_dir.ends_with("textures"));
    }

    #[test]
    fn test_new_config() {
        let config = CacheConfig::new(StorageStrategy::IndexedFile, 128, PathBuf::from("/tmp/cache"));
        assert_eq!(config.strategy, StorageStrategy::IndexedFile);
        assert_eq!(config.cache_limit, 128 * 1024 * 1024);
        assert_eq!(config.cache_dir, PathBuf::from("/tmp/cache"));
    }

    #[test]
    fn test_builder_methods() {
        let config = CacheConfig::default()
            .with_strategy(StorageStrategy::IndexedFile)
            .with_limit_mb(512)
            .with_options(0x0304)
            .with_cache_dir("/custom/path");

        assert_eq!(config.strategy, StorageStrategy::IndexedFile);
        assert_eq!(config.cache_limit, 512 * 1024 * 1024);
        assert_eq!(config.limit_mb(), 512);
        assert_eq!(config.options, 0x0304);
        assert_eq!(config.cache_dir, PathBuf::from("/custom/path"));
    }

    #[test]
    fn test_huge_limit_saturates() {
        let config = CacheConfig::default().with_limit_mb(u64::MAX);
        assert_eq!(config.cache_limit, u64::MAX);

        let config = CacheConfig::new(StorageStrategy::Memory, u64::MAX, PathBuf::from("/tmp"));
        assert_eq!(config.cache_limit, u64::MAX);
    }

    #[test]
    fn test_config_tag_masks_unrelated_bits() {
        let config = CacheConfig::default().with_options(0x0100_0203);
        assert_eq!(config.config_tag(), 0x0203);

        let same = CacheConfig::default().with_options(0x0000_0203);
        assert_eq!(config.config_tag(), same.config_tag());
    }

    #[test]
    fn test_strategy_parsing() {
        assert_eq!("memory".parse::<StorageStrategy>().unwrap(), StorageStrategy::Memory);
        assert_eq!(" RAM ".parse::<StorageStrategy>().unwrap(), StorageStrategy::Memory);
        assert_eq!("file".parse::<StorageStrategy>().unwrap(), StorageStrategy::IndexedFile);
        assert_eq!("Disk".parse::<StorageStrategy>().unwrap(), StorageStrategy::IndexedFile);
        assert!("tape".parse::<StorageStrategy>().is_err());
        assert_eq!(StorageStrategy::IndexedFile.to_string(), "file");
    }

    #[test]
    fn test_parse_options() {
        assert_eq!(parse_options("42"), Some(42));
        assert_eq!(parse_options("0x1F"), Some(0x1f));
        assert_eq!(parse_options(" 0X200 "), Some(0x200));
        assert_eq!(parse_options("0xZZ"), None);
        assert_eq!(parse_options("-1"), None);
    }

    #[test]
    #[serial]
    fn test_from_env() {
        // Save and restore env vars to avoid test pollution
        let _guard = EnvGuard::new(ENV_VARS);

        env::set_var("TEXCACHE_STRATEGY", "file");
        env::set_var("TEXCACHE_LIMIT_MB", "128");
        env::set_var("TEXCACHE_DIR", "/tmp/test-cache");
        env::set_var("TEXCACHE_OPTIONS", "0x0102");

        let config = CacheConfig::from_env().unwrap();
        assert_eq!(config.strategy, StorageStrategy::IndexedFile);
        assert_eq!(config.cache_limit, 128 * 1024 * 1024);
        assert_eq!(config.cache_dir, PathBuf::from("/tmp/test-cache"));
        assert_eq!(config.options, 0x0102);
    }

    #[test]
    #[serial]
    fn test_from_env_partial() {
        let _guard = EnvGuard::new(ENV_VARS);

        for name in ENV_VARS {
            env::remove_var(name);
        }
        env::set_var("TEXCACHE_LIMIT_MB", "64");

        let config = CacheConfig::from_env().unwrap();
        assert_eq!(config.cache_limit, 64 * 1024 * 1024);
        assert_eq!(config.strategy, StorageStrategy::Memory); // default
        assert_eq!(config.options, 0); // default
    }

    #[test]
    #[serial]
    fn test_from_env_invalid() {
        let _guard = EnvGuard::new(ENV_VARS);

        for name in ENV_VARS {
            env::remove_var(name);
        }
        env::set_var("TEXCACHE_LIMIT_MB", "not_a_number");
        assert!(CacheConfig::from_env().is_err());

        // Megabytes that overflow a byte count
        env::set_var("TEXCACHE_LIMIT_MB", u64::MAX.to_string());
        assert!(CacheConfig::from_env().is_err());

        env::remove_var("TEXCACHE_LIMIT_MB");
        env::set_var("TEXCACHE_STRATEGY", "cloud");
        assert!(CacheConfig::from_env().is_err());
    }

    // Helper to save and restore environment variables
    struct EnvGuard {
        vars: Vec<(String, Option<String>)>,
    }

    impl EnvGuard {
        fn new(var_names: &[&str]) -> Self {
            let vars = var_names
                .iter()
                .map(|name| (name.to_string(), env::var(name).ok()))
                .collect();
            Self { vars }
        }
    }

    impl Drop for EnvGuard {
        fn drop(&mut self) {
            for (name, value) in &self.vars {
                match value {
                    Some(v) => env::set_var(name, v),
                    None => env::remove_var(name),
                }
            }
        }
    }
}
