//! Cache facade selecting a storage strategy once at construction

use std::path::{Path, PathBuf};

use tracing::{debug, info};

use crate::backend::{CacheBackend, CacheStats};
use crate::config::{CacheConfig, StorageStrategy};
use crate::disk::FileStorage;
use crate::ram::MemoryCache;
use crate::record::{Checksum, TextureRecord};

const MEMORY_SUFFIX: &str = "_MEMORYCACHE.htc";
const INDEXED_SUFFIX: &str = "_HIRESTEXTURES.hts";
const DEFAULT_IDENT: &str = "DEFAULT";

enum Backend {
    Memory(MemoryCache),
    IndexedFile(FileStorage),
}

/// A texture cache owned by the embedding application
///
/// The strategy, file location and config tag are fixed when the cache is
/// built; every operation forwards to the selected backend.
///
/// # Example
///
/// ```no_run
/// use texfilter_cache::{CacheConfig, Checksum, PixelFormat, StorageStrategy, TextureCache, TextureRecord};
///
/// let config = CacheConfig::default().with_strategy(StorageStrategy::IndexedFile);
/// let mut cache = TextureCache::new(&config, "SUPER MARIO 64");
/// cache.load(false);
///
/// let record = TextureRecord::new(2, 2, PixelFormat::Rgba8.code(), vec![0xFF; 16]);
/// cache.add(Checksum(0x1234_5678_9ABC_DEF0), &record, 0);
/// cache.save();
/// ```
pub struct TextureCache {
    backend: Backend,
    cache_dir: PathBuf,
    filename: String,
    config_tag: i32,
}

impl TextureCache {
    /// Build a cache for the content identified by `ident`
    pub fn new(config: &CacheConfig, ident: &str) -> Self {
        let filename = cache_filename(config.strategy, ident);
        let backend = match config.strategy {
            StorageStrategy::Memory => {
                let mut cache = MemoryCache::new(config.cache_limit);
                cache.set_options(config.options);
                Backend::Memory(cache)
            }
            StorageStrategy::IndexedFile => Backend::IndexedFile(FileStorage::new(
                config.options,
                &config.cache_dir,
                &filename,
            )),
        };

        info!(
            strategy = %config.strategy,
            file = %filename,
            "texture cache ready"
        );

        Self {
            backend,
            cache_dir: config.cache_dir.clone(),
            filename,
            config_tag: config.config_tag(),
        }
    }

    pub fn strategy(&self) -> StorageStrategy {
        match self.backend {
            Backend::Memory(_) => StorageStrategy::Memory,
            Backend::IndexedFile(_) => StorageStrategy::IndexedFile,
        }
    }

    /// File name used by `save` and `load`
    pub fn filename(&self) -> &str {
        &self.filename
    }

    pub fn cache_dir(&self) -> &Path {
        &self.cache_dir
    }

    pub fn config_tag(&self) -> i32 {
        self.config_tag
    }

    /// The selected backend
    pub fn backend(&self) -> &dyn CacheBackend {
        match &self.backend {
            Backend::Memory(cache) => cache,
            Backend::IndexedFile(storage) => storage,
        }
    }

    fn backend_mut(&mut self) -> &mut dyn CacheBackend {
        match &mut self.backend {
            Backend::Memory(cache) => cache,
            Backend::IndexedFile(storage) => storage,
        }
    }

    pub fn add(&mut self, checksum: Checksum, record: &TextureRecord, size_hint: usize) -> bool {
        self.backend_mut().add(checksum, record, size_hint)
    }

    pub fn get(&mut self, checksum: Checksum) -> Option<TextureRecord> {
        self.backend_mut().get(checksum)
    }

    pub fn del(&mut self, checksum: Checksum) -> bool {
        self.backend_mut().del(checksum)
    }

    pub fn is_cached(&self, checksum: Checksum) -> bool {
        self.backend().is_cached(checksum)
    }

    /// Persist to `cache_dir/filename` under this cache's config tag
    pub fn save(&mut self) -> bool {
        let dir = self.cache_dir.clone();
        let filename = self.filename.clone();
        let tag = self.config_tag;
        let saved = self.backend_mut().save(&dir, &filename, tag);
        debug!(file = %filename, saved, "save");
        saved
    }

    /// Restore from `cache_dir/filename`
    ///
    /// Files written under a different config tag are skipped unless `force`.
    pub fn load(&mut self, force: bool) -> bool {
        let dir = self.cache_dir.clone();
        let filename = self.filename.clone();
        let tag = self.config_tag;
        let loaded = self.backend_mut().load(&dir, &filename, tag, force);
        debug!(file = %filename, loaded, force, "load");
        loaded
    }

    pub fn clear(&mut self) {
        self.backend_mut().clear();
    }

    pub fn is_empty(&self) -> bool {
        self.backend().is_empty()
    }

    pub fn size(&self) -> usize {
        self.backend().size()
    }

    pub fn total_size(&self) -> u64 {
        self.backend().total_size()
    }

    pub fn cache_limit(&self) -> u64 {
        self.backend().cache_limit()
    }

    pub fn options(&self) -> u32 {
        self.backend().options()
    }

    pub fn set_options(&mut self, options: u32) {
        self.backend_mut().set_options(options);
    }

    pub fn stats(&self) -> CacheStats {
        self.backend().stats()
    }
}

/// Derive the cache file name for `ident` under `strategy`
pub fn cache_filename(strategy: StorageStrategy, ident: &str) -> String {
    let sanitized: String = ident
        .trim()
        .chars()
        .map(|c| {
            if c == '/' || c == '\\' || c == ':' || c.is_whitespace() || c.is_control() {
                '_'
            } else {
                c
            }
        })
        .collect();

    let stem = if sanitized.is_empty() {
        DEFAULT_IDENT
    } else {
        sanitized.as_str()
    };

    let suffix = match strategy {
        StorageStrategy::Memory => MEMORY_SUFFIX,
        StorageStrategy::IndexedFile => INDEXED_SUFFIX,
    };

    format!("{stem}{suffix}")
}
