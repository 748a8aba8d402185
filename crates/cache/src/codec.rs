//! zlib payload compression
//!
//! Compressed payloads use the zlib container (the same bytes zlib's
//! `compress`/`uncompress` produce), so caches written by other tools load
//! unchanged. Every call returns a freshly owned buffer.

use std::io::{Read, Write};

use flate2::read::ZlibDecoder;
use flate2::write::ZlibEncoder;
use flate2::Compression;

use crate::{CacheError, CacheResult};

/// Largest payload a decompression may produce by default (4096x4096 RGBA8)
pub const DEFAULT_MAX_PAYLOAD: usize = 4096 * 4096 * 4;

/// zlib compress/decompress pair with a bound on decompressed output
#[derive(Debug, Clone, Copy)]
pub struct Codec {
    level: Compression,
    max_payload: usize,
}

impl Default for Codec {
    fn default() -> Self {
        Self {
            level: Compression::default(),
            max_payload: DEFAULT_MAX_PAYLOAD,
        }
    }
}

impl Codec {
    /// Create a codec that rejects payloads expanding past `max_payload` bytes
    pub fn new(max_payload: usize) -> Self {
        Self {
            max_payload,
            ..Default::default()
        }
    }

    /// Set the compression level (0-9)
    pub fn with_level(mut self, level: u32) -> Self {
        self.level = Compression::new(level.min(9));
        self
    }

    pub fn max_payload(&self) -> usize {
        self.max_payload
    }

    /// Compress `data` into a new zlib stream
    pub fn compress(&self, data: &[u8]) -> CacheResult<Vec<u8>> {
        let mut encoder = ZlibEncoder::new(Vec::with_capacity(data.len() / 2), self.level);
        encoder.write_all(data)?;
        Ok(encoder.finish()?)
    }

    /// Expand a zlib stream into a new buffer
    ///
    /// # Errors
    /// `Decompress` for malformed streams, `PayloadTooLarge` when the output
    /// would exceed the configured bound.
    pub fn decompress(&self, data: &[u8]) -> CacheResult<Vec<u8>> {
        let mut out = Vec::new();
        let limit = self.max_payload as u64 + 1;

        ZlibDecoder::new(data)
            .take(limit)
            .read_to_end(&mut out)
            .map_err(|e| CacheError::Decompress(e.to_string()))?;

        if out.len() > self.max_payload {
            return Err(CacheError::PayloadTooLarge {
                limit: self.max_payload,
            });
        }

        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::Rng;

    #[test]
    fn test_round_trip_random_payload() {
        let codec = Codec::default();
        let mut rng = rand::thread_rng();
        let data: Vec<u8> = (0..64 * 1024).map(|_| rng.gen()).collect();

        let packed = codec.compress(&data).unwrap();
        assert_eq!(codec.decompress(&packed).unwrap(), data);
    }

    #[test]
    fn test_compresses_uniform_payload() {
        let codec = Codec::default();
        let data = vec![0u8; 256 * 256 * 4];
        let packed = codec.compress(&data).unwrap();
        assert!(packed.len() < data.len() / 10);
    }

    #[test]
    fn test_malformed_stream() {
        let codec = Codec::default();
        let result = codec.decompress(b"definitely not zlib");
        assert!(matches!(result, Err(CacheError::Decompress(_))));
    }

    #[test]
    fn test_payload_bound() {
        let packed = Codec::default().compress(&vec![1u8; 4096]).unwrap();

        let strict = Codec::new(1024);
        assert!(matches!(
            strict.decompress(&packed),
            Err(CacheError::PayloadTooLarge { limit: 1024 })
        ));

        let exact = Codec::new(4096);
        assert_eq!(exact.decompress(&packed).unwrap().len(), 4096);
    }

    #[test]
    fn test_level_is_clamped() {
        let codec = Codec::default().with_level(42);
        let data = vec![3u8; 1000];
        let packed = codec.compress(&data).unwrap();
        assert_eq!(codec.decompress(&packed).unwrap(), data);
    }
}
