//! Combined dump files and the shared record layout
//!
//! A dump is a config tag followed by checksummed records until end of stream,
//! all little-endian with no padding:
//!
//! ```text
//! i32 config_tag
//! repeat until EOF:
//!   u64 checksum
//!   i32 width, i32 height, i32 format
//!   i16 texture_format, i16 pixel_type, u8 is_hires_tex
//!   i32 payload_length
//!   payload_length bytes
//! ```
//!
//! Dumps are normally gzip-wrapped; raw dumps are read as well. The indexed
//! disk store reuses the record layout without the leading checksum.

use std::fs::File;
use std::io::{self, BufRead, BufReader, BufWriter, Read, Write};
use std::path::Path;

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use flate2::bufread::MultiGzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;

use crate::record::{Checksum, TextureRecord};
use crate::{CacheError, CacheResult};

/// Size of a record header (everything before the payload, minus checksum)
pub const RECORD_HEADER_LEN: usize = 4 + 4 + 4 + 2 + 2 + 1 + 4;

const GZIP_MAGIC: [u8; 2] = [0x1f, 0x8b];

/// Fixed-layout metadata that precedes every stored payload
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct RecordHeader {
    pub width: u32,
    pub height: u32,
    pub format: u32,
    pub texture_format: u16,
    pub pixel_type: u16,
    pub is_hires_tex: bool,
    pub payload_len: usize,
}

impl RecordHeader {
    pub fn of(record: &TextureRecord) -> Self {
        Self {
            width: record.width,
            height: record.height,
            format: record.format,
            texture_format: record.texture_format,
            pixel_type: record.pixel_type,
            is_hires_tex: record.is_hires_tex,
            payload_len: record.data.len(),
        }
    }

    pub fn read_from<R: Read>(reader: &mut R) -> CacheResult<Self> {
        let width = reader.read_i32::<LittleEndian>()? as u32;
        let height = reader.read_i32::<LittleEndian>()? as u32;
        let format = reader.read_i32::<LittleEndian>()? as u32;
        let texture_format = reader.read_i16::<LittleEndian>()? as u16;
        let pixel_type = reader.read_i16::<LittleEndian>()? as u16;
        let is_hires_tex = reader.read_u8()? != 0;
        let payload_len = reader.read_i32::<LittleEndian>()?;

        if payload_len < 0 {
            return Err(CacheError::InvalidHeader(format!(
                "negative payload length {payload_len}"
            )));
        }

        Ok(Self {
            width,
            height,
            format,
            texture_format,
            pixel_type,
            is_hires_tex,
            payload_len: payload_len as usize,
        })
    }

    pub fn write_to<W: Write>(&self, writer: &mut W) -> io::Result<()> {
        let payload_len = i32::try_from(self.payload_len).map_err(|_| {
            io::Error::new(io::ErrorKind::InvalidInput, "payload longer than i32::MAX")
        })?;

        writer.write_i32::<LittleEndian>(self.width as i32)?;
        writer.write_i32::<LittleEndian>(self.height as i32)?;
        writer.write_i32::<LittleEndian>(self.format as i32)?;
        writer.write_i16::<LittleEndian>(self.texture_format as i16)?;
        writer.write_i16::<LittleEndian>(self.pixel_type as i16)?;
        writer.write_u8(self.is_hires_tex as u8)?;
        writer.write_i32::<LittleEndian>(payload_len)
    }

    pub fn into_record(self, data: Vec<u8>) -> TextureRecord {
        TextureRecord {
            width: self.width,
            height: self.height,
            format: self.format,
            texture_format: self.texture_format,
            pixel_type: self.pixel_type,
            is_hires_tex: self.is_hires_tex,
            data,
        }
    }
}

/// Read a header and its payload, refusing payloads longer than `max_len`
pub(crate) fn read_record<R: Read>(reader: &mut R, max_len: usize) -> CacheResult<TextureRecord> {
    let header = RecordHeader::read_from(reader)?;
    if header.payload_len > max_len {
        return Err(CacheError::InvalidHeader(format!(
            "payload length {} exceeds {max_len}",
            header.payload_len
        )));
    }

    let mut data = vec![0u8; header.payload_len];
    reader.read_exact(&mut data)?;
    Ok(header.into_record(data))
}

/// Write a header followed by the payload
pub(crate) fn write_record<W: Write>(writer: &mut W, record: &TextureRecord) -> io::Result<()> {
    RecordHeader::of(record).write_to(writer)?;
    writer.write_all(&record.data)
}

/// Fill `buf` completely, or report a clean end of stream if nothing was read
fn read_exact_or_eof<R: Read>(reader: &mut R, buf: &mut [u8]) -> io::Result<bool> {
    let mut filled = 0;
    while filled < buf.len() {
        match reader.read(&mut buf[filled..]) {
            Ok(0) if filled == 0 => return Ok(false),
            Ok(0) => return Err(io::ErrorKind::UnexpectedEof.into()),
            Ok(n) => filled += n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
            Err(e) => return Err(e),
        }
    }
    Ok(true)
}

/// Sequential reader over a dump file
pub struct DumpReader {
    reader: Box<dyn Read>,
    config_tag: i32,
    max_len: usize,
}

impl DumpReader {
    /// Open a dump and read its config tag
    ///
    /// Gzip-wrapped and raw dumps are both accepted.
    pub fn open<P: AsRef<Path>>(path: P, max_len: usize) -> CacheResult<Self> {
        let mut buffered = BufReader::new(File::open(path.as_ref())?);
        let gzipped = buffered.fill_buf()?.starts_with(&GZIP_MAGIC);

        let mut reader: Box<dyn Read> = if gzipped {
            Box::new(MultiGzDecoder::new(buffered))
        } else {
            Box::new(buffered)
        };

        let config_tag = reader.read_i32::<LittleEndian>()?;

        Ok(Self {
            reader,
            config_tag,
            max_len,
        })
    }

    pub fn config_tag(&self) -> i32 {
        self.config_tag
    }

    /// Read the next record, or `None` at end of stream
    pub fn next_record(&mut self) -> CacheResult<Option<(Checksum, TextureRecord)>> {
        let mut checksum = [0u8; 8];
        if !read_exact_or_eof(&mut self.reader, &mut checksum)? {
            return Ok(None);
        }

        let record = read_record(&mut self.reader, self.max_len)?;
        Ok(Some((Checksum(u64::from_le_bytes(checksum)), record)))
    }
}

/// Writes gzip-wrapped dump files
///
/// # Example
///
/// ```no_run
/// use texfilter_cache::{Checksum, DumpWriter, PixelFormat, TextureRecord};
///
/// let mut writer = DumpWriter::create("/tmp/cache/GAME_MEMORYCACHE.htc", 0x12).unwrap();
/// let record = TextureRecord::new(2, 2, PixelFormat::Rgba8.code(), vec![0u8; 16]);
/// writer.append(Checksum(0xABCD), &record).unwrap();
/// writer.finish().unwrap();
/// ```
pub struct DumpWriter {
    encoder: GzEncoder<BufWriter<File>>,
    records: usize,
}

impl DumpWriter {
    /// Create (or truncate) a dump and write its config tag
    pub fn create<P: AsRef<Path>>(path: P, config_tag: i32) -> CacheResult<Self> {
        let file = File::create(path.as_ref())?;
        let mut encoder = GzEncoder::new(BufWriter::new(file), Compression::default());
        encoder.write_i32::<LittleEndian>(config_tag)?;

        Ok(Self {
            encoder,
            records: 0,
        })
    }

    /// Append one record
    pub fn append(&mut self, checksum: Checksum, record: &TextureRecord) -> CacheResult<()> {
        self.encoder.write_u64::<LittleEndian>(checksum.0)?;
        write_record(&mut self.encoder, record)?;
        self.records += 1;
        Ok(())
    }

    /// Number of records appended so far
    pub fn len(&self) -> usize {
        self.records
    }

    pub fn is_empty(&self) -> bool {
        self.records == 0
    }

    /// Finish the gzip stream and flush it to disk
    pub fn finish(self) -> CacheResult<()> {
        let mut writer = self.encoder.finish()?;
        writer.flush()?;
        Ok(())
    }
}
