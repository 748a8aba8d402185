//! Texture Filter Cache Library
//!
//! Checksum-addressed cache for filtered and upscaled texture payloads, with a
//! bounded RAM store (LRU eviction) and an indexed disk store.

pub mod backend;
pub mod codec;
pub mod config;
pub mod disk;
pub mod dump;
pub mod format;
pub mod ram;
pub mod record;
pub mod texture_cache;

pub use backend::{CacheBackend, CacheStats};
pub use codec::Codec;
pub use config::{CacheConfig, ConfigError, StorageStrategy};
pub use disk::FileStorage;
pub use dump::DumpWriter;
pub use format::{PixelFormat, SizeCalculator, COMPRESSED};
pub use ram::MemoryCache;
pub use record::{Checksum, TextureRecord};
pub use texture_cache::TextureCache;

/// Error type for codec and on-disk format operations.
///
/// Cache operations themselves report failure as `bool` / `Option`; these
/// errors are logged at the backend boundary.
#[derive(Debug, thiserror::Error)]
pub enum CacheError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("decompression failed: {0}")]
    Decompress(String),

    #[error("decompressed payload exceeds {limit} bytes")]
    PayloadTooLarge { limit: usize },

    #[error("invalid file header: {0}")]
    InvalidHeader(String),

    #[error("config tag mismatch: file has {found}, expected {expected}")]
    ConfigMismatch { found: i32, expected: i32 },
}

pub type CacheResult<T> = Result<T, CacheError>;
