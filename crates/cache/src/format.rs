//! Pixel formats and payload size calculation

/// Format flag marking a zlib-compressed payload
pub const COMPRESSED: u32 = 0x8000_0000;

/// Computes the uncompressed payload size of a texture
///
/// Takes `(width, height, format)` and returns `None` for formats it cannot
/// size. Embedding applications may supply their own; the default is
/// [`texture_size`].
pub type SizeCalculator = fn(u32, u32, u32) -> Option<usize>;

/// Internal pixel formats the cache knows how to size
///
/// Codes are the matching OpenGL internal format enums.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PixelFormat {
    /// 8-bit palette index
    ColorIndex8,
    /// 16-bit RGBA 4:4:4:4
    Rgba4,
    /// 16-bit RGBA 5:5:5:1
    Rgb5A1,
    /// 16-bit RGB 5:6:5
    Rgb565,
    /// 32-bit RGBA 8:8:8:8
    Rgba8,
}

impl PixelFormat {
    /// Look up a format by its code, ignoring the compressed flag
    pub fn from_code(code: u32) -> Option<Self> {
        match code & !COMPRESSED {
            0x80E5 => Some(PixelFormat::ColorIndex8),
            0x8056 => Some(PixelFormat::Rgba4),
            0x8057 => Some(PixelFormat::Rgb5A1),
            0x8D62 => Some(PixelFormat::Rgb565),
            0x8058 => Some(PixelFormat::Rgba8),
            _ => None,
        }
    }

    /// OpenGL internal format code
    pub fn code(self) -> u32 {
        match self {
            PixelFormat::ColorIndex8 => 0x80E5,
            PixelFormat::Rgba4 => 0x8056,
            PixelFormat::Rgb5A1 => 0x8057,
            PixelFormat::Rgb565 => 0x8D62,
            PixelFormat::Rgba8 => 0x8058,
        }
    }

    pub fn bytes_per_pixel(self) -> usize {
        match self {
            PixelFormat::ColorIndex8 => 1,
            PixelFormat::Rgba4 | PixelFormat::Rgb5A1 | PixelFormat::Rgb565 => 2,
            PixelFormat::Rgba8 => 4,
        }
    }
}

/// Default size calculator for the supported pixel formats
///
/// Returns `None` for unknown formats, zero-sized textures and sizes that do
/// not fit in `usize`.
pub fn texture_size(width: u32, height: u32, format: u32) -> Option<usize> {
    let format = PixelFormat::from_code(format)?;
    let size = (width as usize)
        .checked_mul(height as usize)?
        .checked_mul(format.bytes_per_pixel())?;

    if size == 0 {
        None
    } else {
        Some(size)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sizes_per_format() {
        assert_eq!(texture_size(16, 16, PixelFormat::ColorIndex8.code()), Some(256));
        assert_eq!(texture_size(16, 16, PixelFormat::Rgba4.code()), Some(512));
        assert_eq!(texture_size(16, 16, PixelFormat::Rgb5A1.code()), Some(512));
        assert_eq!(texture_size(16, 16, PixelFormat::Rgb565.code()), Some(512));
        assert_eq!(texture_size(16, 16, PixelFormat::Rgba8.code()), Some(1024));
    }

    #[test]
    fn test_compressed_flag_is_ignored() {
        let code = PixelFormat::Rgba8.code() | COMPRESSED;
        assert_eq!(PixelFormat::from_code(code), Some(PixelFormat::Rgba8));
        assert_eq!(texture_size(2, 2, code), Some(16));
    }

    #[test]
    fn test_unknown_or_empty() {
        assert_eq!(texture_size(16, 16, 0x1234), None);
        assert_eq!(texture_size(0, 16, PixelFormat::Rgba8.code()), None);
    }

    #[test]
    fn test_code_round_trip() {
        for format in [
            PixelFormat::ColorIndex8,
            PixelFormat::Rgba4,
            PixelFormat::Rgb5A1,
            PixelFormat::Rgb565,
            PixelFormat::Rgba8,
        ] {
            assert_eq!(PixelFormat::from_code(format.code()), Some(format));
        }
    }
}
