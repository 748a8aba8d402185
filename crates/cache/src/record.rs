//! Cache keys and cached texture records

use std::fmt;

use crate::codec::Codec;
use crate::format::COMPRESSED;
use crate::CacheResult;

/// Content checksum identifying a cached texture
///
/// Computed by the caller from the source texture data. Zero is reserved as
/// the invalid key and is never stored.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub struct Checksum(pub u64);

impl Checksum {
    /// Build a checksum from its high and low 32-bit halves
    pub fn from_parts(hi: u32, low: u32) -> Self {
        Self(((hi as u64) << 32) | low as u64)
    }

    /// High 32 bits
    pub fn hi(self) -> u32 {
        (self.0 >> 32) as u32
    }

    /// Low 32 bits
    pub fn low(self) -> u32 {
        self.0 as u32
    }

    /// Whether this checksum may be used as a cache key
    pub fn is_valid(self) -> bool {
        self.0 != 0
    }
}

impl From<u64> for Checksum {
    fn from(value: u64) -> Self {
        Self(value)
    }
}

impl fmt::Display for Checksum {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:08X}{:08X}", self.hi(), self.low())
    }
}

/// A texture payload plus the metadata needed to upload it
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct TextureRecord {
    /// Width in pixels
    pub width: u32,

    /// Height in pixels
    pub height: u32,

    /// Internal pixel format, with [`COMPRESSED`] set when `data` is zlib data
    pub format: u32,

    /// Upload format of the texture
    pub texture_format: u16,

    /// Upload pixel type of the texture
    pub pixel_type: u16,

    /// Whether the payload came from a hi-res texture pack
    pub is_hires_tex: bool,

    /// Raw (or compressed) payload bytes
    pub data: Vec<u8>,
}

impl TextureRecord {
    /// Create an uncompressed record
    pub fn new(width: u32, height: u32, format: u32, data: Vec<u8>) -> Self {
        Self {
            width,
            height,
            format,
            data,
            ..Default::default()
        }
    }

    /// Payload length in bytes
    pub fn payload_size(&self) -> usize {
        self.data.len()
    }

    /// Whether the payload is stored compressed
    pub fn is_compressed(&self) -> bool {
        self.format & COMPRESSED != 0
    }

    /// Format with the compressed flag masked off
    pub fn base_format(&self) -> u32 {
        self.format & !COMPRESSED
    }

    /// Return a copy of this record with its payload compressed
    ///
    /// Records that are already compressed are returned unchanged.
    pub fn compressed(&self, codec: &Codec) -> CacheResult<Self> {
        if self.is_compressed() {
            return Ok(self.clone());
        }

        Ok(Self {
            format: self.format | COMPRESSED,
            data: codec.compress(&self.data)?,
            ..self.clone()
        })
    }

    /// Return a copy of this record with its payload expanded
    pub fn decompressed(&self, codec: &Codec) -> CacheResult<Self> {
        if !self.is_compressed() {
            return Ok(self.clone());
        }

        Ok(Self {
            format: self.base_format(),
            data: codec.decompress(&self.data)?,
            ..self.clone()
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::format::PixelFormat;

    #[test]
    fn test_checksum_parts() {
        let checksum = Checksum::from_parts(0xDEAD_BEEF, 0x0123_4567);
        assert_eq!(checksum.0, 0xDEAD_BEEF_0123_4567);
        assert_eq!(checksum.hi(), 0xDEAD_BEEF);
        assert_eq!(checksum.low(), 0x0123_4567);
        assert_eq!(checksum.to_string(), "DEADBEEF01234567");
    }

    #[test]
    fn test_zero_checksum_is_invalid() {
        assert!(!Checksum(0).is_valid());
        assert!(!Checksum::default().is_valid());
        assert!(Checksum(1).is_valid());
    }

    #[test]
    fn test_compress_clears_on_decompress() {
        let codec = Codec::default();
        let record = TextureRecord::new(8, 8, PixelFormat::Rgba8.code(), vec![7u8; 256]);

        let packed = record.compressed(&codec).unwrap();
        assert!(packed.is_compressed());
        assert_eq!(packed.base_format(), PixelFormat::Rgba8.code());

        let unpacked = packed.decompressed(&codec).unwrap();
        assert_eq!(unpacked, record);
    }

    #[test]
    fn test_compressed_is_idempotent() {
        let codec = Codec::default();
        let record = TextureRecord::new(4, 4, PixelFormat::Rgba8.code(), vec![1u8; 64]);
        let once = record.compressed(&codec).unwrap();
        let twice = once.compressed(&codec).unwrap();
        assert_eq!(once, twice);
    }
}
