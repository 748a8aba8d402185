//! The contract shared by every cache storage strategy

use std::path::Path;

use tracing::debug;

use crate::format::SizeCalculator;
use crate::record::{Checksum, TextureRecord};

/// Statistics about cache usage
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheStats {
    /// Number of successful lookups
    pub hits: u64,

    /// Number of failed lookups
    pub misses: u64,

    /// Number of entries evicted due to memory pressure
    pub evictions: u64,
}

impl CacheStats {
    /// Calculate the cache hit rate (0.0 to 1.0)
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }
}

/// Uniform cache contract implemented by [`MemoryCache`](crate::MemoryCache)
/// and [`FileStorage`](crate::FileStorage)
///
/// Failures are reported as `false` / `None` and never poison the backend;
/// callers treat any failure as a cache miss.
pub trait CacheBackend {
    /// Store a copy of `record` under `checksum`
    ///
    /// `size_hint` is the payload size to store; zero derives it from the
    /// record's dimensions and format. It must be given for compressed
    /// payloads.
    fn add(&mut self, checksum: Checksum, record: &TextureRecord, size_hint: usize) -> bool;

    /// Fetch an owned, decompressed copy of the record stored under `checksum`
    fn get(&mut self, checksum: Checksum) -> Option<TextureRecord>;

    /// Remove the entry stored under `checksum`
    fn del(&mut self, checksum: Checksum) -> bool;

    /// Check membership without touching recency or disk
    fn is_cached(&self, checksum: Checksum) -> bool;

    /// Persist the backend's state to `dir/filename`, tagged with `config`
    fn save(&mut self, dir: &Path, filename: &str, config: i32) -> bool;

    /// Restore state from `dir/filename` if its tag matches `config` (or `force`)
    fn load(&mut self, dir: &Path, filename: &str, config: i32, force: bool) -> bool;

    /// Drop every entry
    fn clear(&mut self);

    fn is_empty(&self) -> bool;

    /// Number of cached entries
    fn size(&self) -> usize;

    /// Sum of stored payload sizes in bytes
    fn total_size(&self) -> u64;

    /// Byte budget, zero when unbounded
    fn cache_limit(&self) -> u64;

    fn options(&self) -> u32;

    fn set_options(&mut self, options: u32);

    fn stats(&self) -> CacheStats;
}

/// Resolve how many payload bytes an `add` stores
///
/// Returns `None` when the size cannot be derived or the payload is shorter
/// than the resolved size.
pub(crate) fn stored_size(
    record: &TextureRecord,
    size_hint: usize,
    sizer: SizeCalculator,
) -> Option<usize> {
    let size = if size_hint == 0 {
        sizer(record.width, record.height, record.base_format())?
    } else {
        size_hint
    };

    if record.data.len() < size {
        debug!(
            size,
            available = record.data.len(),
            "payload shorter than its declared size"
        );
        return None;
    }

    Some(size)
}

/// Copy the first `size` payload bytes of `record` into a new record
pub(crate) fn owned_copy(record: &TextureRecord, size: usize) -> TextureRecord {
    TextureRecord {
        width: record.width,
        height: record.height,
        format: record.format,
        texture_format: record.texture_format,
        pixel_type: record.pixel_type,
        is_hires_tex: record.is_hires_tex,
        data: record.data[..size].to_vec(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::format::{texture_size, PixelFormat};

    #[test]
    fn test_stored_size_derives_from_format() {
        let record = TextureRecord::new(4, 4, PixelFormat::Rgba8.code(), vec![0u8; 64]);
        assert_eq!(stored_size(&record, 0, texture_size), Some(64));
        assert_eq!(stored_size(&record, 10, texture_size), Some(10));
    }

    #[test]
    fn test_stored_size_rejects_short_payload() {
        let record = TextureRecord::new(4, 4, PixelFormat::Rgba8.code(), vec![0u8; 63]);
        assert_eq!(stored_size(&record, 0, texture_size), None);

        let unknown = TextureRecord::new(4, 4, 0xBEEF, vec![0u8; 64]);
        assert_eq!(stored_size(&unknown, 0, texture_size), None);
    }

    #[test]
    fn test_owned_copy_truncates() {
        let record = TextureRecord::new(1, 1, PixelFormat::Rgba8.code(), vec![1, 2, 3, 4, 5, 6]);
        let copy = owned_copy(&record, 4);
        assert_eq!(copy.data, vec![1, 2, 3, 4]);
        assert_eq!(copy.width, 1);
    }

    #[test]
    fn test_hit_rate() {
        let stats = CacheStats {
            hits: 3,
            misses: 1,
            evictions: 0,
        };
        assert!((stats.hit_rate() - 0.75).abs() < f64::EPSILON);
        assert_eq!(CacheStats::default().hit_rate(), 0.0);
    }
}
