//! Indexed disk storage for texture payloads
//!
//! All records live in one backing file. An in-memory index maps checksums to
//! byte offsets; payloads are read lazily on `get`. File layout, little-endian:
//!
//! ```text
//! header:       i32 config_tag, i64 index_offset
//! records:      record header + payload, at the offsets listed in the index
//! index block:  i32 entry_count, entry_count x (u64 checksum, i64 offset)
//! ```
//!
//! `add` appends records straight to the data region. `save` writes the index
//! block after the last record and stamps the header with the config tag. A
//! file that was created but never saved keeps the tag `-1` and is refused by
//! `load`.

use std::collections::HashMap;
use std::fs::{self, File, OpenOptions};
use std::io::{self, BufReader, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use tracing::{debug, info, warn};

use crate::backend::{stored_size, CacheBackend, CacheStats};
use crate::codec::Codec;
use crate::dump::{read_record, RecordHeader, RECORD_HEADER_LEN};
use crate::format::{texture_size, SizeCalculator};
use crate::record::{Checksum, TextureRecord};
use crate::{CacheError, CacheResult};

/// Size of the file header in bytes
pub const HEADER_LEN: i64 = 4 + 8;

/// Config tag of a file that has never been saved
pub const UNSAVED_TAG: i32 = -1;

/// Size of one index entry in bytes
const INDEX_ENTRY_LEN: u64 = 8 + 8;

/// Leading header of the backing file
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct FileHeader {
    config_tag: i32,
    index_offset: i64,
}

impl FileHeader {
    fn read_from<R: Read>(reader: &mut R) -> io::Result<Self> {
        Ok(Self {
            config_tag: reader.read_i32::<LittleEndian>()?,
            index_offset: reader.read_i64::<LittleEndian>()?,
        })
    }

    fn write_to<W: Write>(&self, writer: &mut W) -> io::Result<()> {
        writer.write_i32::<LittleEndian>(self.config_tag)?;
        writer.write_i64::<LittleEndian>(self.index_offset)
    }
}

/// Where a record lives and how large its stored payload is
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct IndexEntry {
    offset: i64,
    size: usize,
}

/// Disk-backed texture storage indexed by checksum
///
/// Bound at construction to `cache_dir/filename`; `save` and `load` refuse
/// any other location. Has no byte budget.
pub struct FileStorage {
    cache_dir: PathBuf,
    filename: String,

    /// Map from checksum to record location
    index: HashMap<Checksum, IndexEntry>,

    /// Sum of stored payload sizes in bytes
    total_size: u64,

    /// Open handle to the backing file
    file: Option<File>,

    /// Whether `file` was opened for writing
    writable: bool,

    /// End of the record region; `None` until the file is created or loaded
    data_end: Option<i64>,

    /// Index differs from what is on disk
    dirty: bool,

    /// Config tag currently in the file header, if the file was saved or loaded
    disk_tag: Option<i32>,

    options: u32,
    sizer: SizeCalculator,
    codec: Codec,
    stats: CacheStats,
}

impl FileStorage {
    /// Create storage backed by `cache_dir/filename`
    ///
    /// Nothing touches disk until the first `add` or `load`.
    pub fn new<P: AsRef<Path>>(options: u32, cache_dir: P, filename: &str) -> Self {
        Self {
            cache_dir: cache_dir.as_ref().to_path_buf(),
            filename: filename.to_string(),
            index: HashMap::new(),
            total_size: 0,
            file: None,
            writable: false,
            data_end: None,
            dirty: false,
            disk_tag: None,
            options,
            sizer: texture_size,
            codec: Codec::default(),
            stats: CacheStats::default(),
        }
    }

    /// Use a custom size calculator for `add`
    pub fn with_sizer(mut self, sizer: SizeCalculator) -> Self {
        self.sizer = sizer;
        self
    }

    /// Replace the codec used to expand compressed payloads
    pub fn with_codec(mut self, codec: Codec) -> Self {
        self.codec = codec;
        self
    }

    /// Path of the backing file
    pub fn path(&self) -> PathBuf {
        self.cache_dir.join(&self.filename)
    }

    /// Whether the index has changes not yet written by `save`
    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    fn is_bound_to(&self, dir: &Path, filename: &str) -> bool {
        self.cache_dir == dir && self.filename == filename
    }

    fn close(&mut self) {
        self.file = None;
        self.writable = false;
    }

    /// Get a handle that can at least read the backing file
    fn open_read(&mut self) -> CacheResult<&mut File> {
        if self.file.is_none() {
            let file = File::open(self.path())?;
            debug!(path = %self.path().display(), "opened texture storage for read");
            self.file = Some(file);
            self.writable = false;
        }

        self.file
            .as_mut()
            .ok_or_else(|| io::Error::from(io::ErrorKind::NotFound).into())
    }

    /// Get a read/write handle, creating the backing file if needed
    ///
    /// A file that was neither created nor loaded by this instance is
    /// truncated and given a fresh unsaved header.
    fn open_write(&mut self) -> CacheResult<&mut File> {
        if !(self.writable && self.file.is_some()) {
            self.close();
            let path = self.path();

            let file = match self.data_end {
                Some(_) => OpenOptions::new().read(true).write(true).open(&path)?,
                None => {
                    fs::create_dir_all(&self.cache_dir)?;
                    let mut file = OpenOptions::new()
                        .read(true)
                        .write(true)
                        .create(true)
                        .truncate(true)
                        .open(&path)?;

                    FileHeader {
                        config_tag: UNSAVED_TAG,
                        index_offset: HEADER_LEN,
                    }
                    .write_to(&mut file)?;
                    self.data_end = Some(HEADER_LEN);
                    self.disk_tag = Some(UNSAVED_TAG);
                    debug!(path = %path.display(), "created texture storage");
                    file
                }
            };

            self.file = Some(file);
            self.writable = true;
        }

        self.file
            .as_mut()
            .ok_or_else(|| io::Error::from(io::ErrorKind::NotFound).into())
    }

    /// Append a record at the end of the data region
    fn append_record(&mut self, record: &TextureRecord, size: usize) -> CacheResult<IndexEntry> {
        let mut bytes = Vec::with_capacity(RECORD_HEADER_LEN + size);
        RecordHeader {
            payload_len: size,
            ..RecordHeader::of(record)
        }
        .write_to(&mut bytes)?;
        bytes.extend_from_slice(&record.data[..size]);

        self.open_write()?;
        let offset = self
            .data_end
            .ok_or_else(|| CacheError::InvalidHeader("data region not initialised".into()))?;

        file_write_at(self.file.as_mut(), offset, &bytes)?;
        self.data_end = Some(offset + bytes.len() as i64);

        Ok(IndexEntry { offset, size })
    }

    fn read_entry(&mut self, entry: IndexEntry) -> CacheResult<TextureRecord> {
        let max_len = self.codec.max_payload();
        let file = self.open_read()?;
        file.seek(SeekFrom::Start(entry.offset as u64))?;

        let record = {
            let mut reader = BufReader::with_capacity(RECORD_HEADER_LEN + entry.size, file);
            read_record(&mut reader, max_len)?
        };

        if record.data.is_empty() || record.data.len() != entry.size {
            return Err(CacheError::InvalidHeader(format!(
                "record at {} holds {} bytes, index expects {}",
                entry.offset,
                record.data.len(),
                entry.size
            )));
        }

        if record.is_compressed() {
            let expanded = record.decompressed(&self.codec)?;
            debug!(
                stored = record.data.len(),
                expanded = expanded.data.len(),
                "decompressed texture"
            );
            Ok(expanded)
        } else {
            Ok(record)
        }
    }

    /// Write the index block and stamp the header with `config`
    fn write_index(&mut self, config: i32) -> CacheResult<()> {
        let count = i32::try_from(self.index.len())
            .map_err(|_| CacheError::InvalidHeader("too many index entries".into()))?;

        let mut entries: Vec<_> = self.index.iter().map(|(k, e)| (*k, e.offset)).collect();
        entries.sort_by_key(|&(_, offset)| offset);

        let mut block = Vec::with_capacity(4 + entries.len() * INDEX_ENTRY_LEN as usize);
        block.write_i32::<LittleEndian>(count)?;
        for (checksum, offset) in entries {
            block.write_u64::<LittleEndian>(checksum.0)?;
            block.write_i64::<LittleEndian>(offset)?;
        }

        self.open_write()?;
        let index_offset = self.data_end.unwrap_or(HEADER_LEN);

        file_write_at(self.file.as_mut(), index_offset, &block)?;

        let mut header = Vec::with_capacity(HEADER_LEN as usize);
        FileHeader {
            config_tag: config,
            index_offset,
        }
        .write_to(&mut header)?;
        file_write_at(self.file.as_mut(), 0, &header)?;

        if let Some(file) = self.file.as_mut() {
            file.set_len(index_offset as u64 + block.len() as u64)?;
            file.sync_all()?;
        }

        Ok(())
    }

    /// Read and validate the header and index block of the backing file
    fn read_index(
        &mut self,
        config: i32,
        force: bool,
    ) -> CacheResult<(HashMap<Checksum, IndexEntry>, FileHeader)> {
        self.close();
        let file = self.open_read()?;
        let file_len = file.metadata()?.len() as i64;

        file.seek(SeekFrom::Start(0))?;
        let header = FileHeader::read_from(file)?;

        if header.config_tag == UNSAVED_TAG {
            return Err(CacheError::InvalidHeader("storage was never saved".into()));
        }
        if header.config_tag != config && !force {
            return Err(CacheError::ConfigMismatch {
                found: header.config_tag,
                expected: config,
            });
        }
        // file_len >= HEADER_LEN once the header was read
        if header.index_offset <= HEADER_LEN || header.index_offset > file_len - 4 {
            return Err(CacheError::InvalidHeader(format!(
                "index offset {} outside file of {file_len} bytes",
                header.index_offset
            )));
        }

        file.seek(SeekFrom::Start(header.index_offset as u64))?;
        let mut reader = BufReader::new(&mut *file);

        let count = reader.read_i32::<LittleEndian>()?;
        let room = (file_len - header.index_offset - 4) as u64 / INDEX_ENTRY_LEN;
        if count <= 0 || count as u64 > room {
            return Err(CacheError::InvalidHeader(format!(
                "index entry count {count}"
            )));
        }

        let mut offsets = Vec::with_capacity(count as usize);
        for _ in 0..count {
            let checksum = Checksum(reader.read_u64::<LittleEndian>()?);
            let offset = reader.read_i64::<LittleEndian>()?;

            if !checksum.is_valid()
                || offset < HEADER_LEN
                || offset > header.index_offset - RECORD_HEADER_LEN as i64
            {
                return Err(CacheError::InvalidHeader(format!(
                    "index entry {checksum} points at {offset}"
                )));
            }
            offsets.push((checksum, offset));
        }
        drop(reader);

        // Payload sizes live in the record headers
        let mut index = HashMap::with_capacity(offsets.len());
        for (checksum, offset) in offsets {
            file.seek(SeekFrom::Start(offset as u64))?;
            let record = RecordHeader::read_from(file)?;
            let span = header.index_offset - offset - RECORD_HEADER_LEN as i64;
            if record.payload_len as i64 > span {
                return Err(CacheError::InvalidHeader(format!(
                    "record {checksum} overruns the index block"
                )));
            }
            index.insert(
                checksum,
                IndexEntry {
                    offset,
                    size: record.payload_len,
                },
            );
        }

        Ok((index, header))
    }
}

/// Seek to `offset` and write all of `bytes`
fn file_write_at(file: Option<&mut File>, offset: i64, bytes: &[u8]) -> CacheResult<()> {
    let file = file.ok_or_else(|| io::Error::from(io::ErrorKind::NotFound))?;
    file.seek(SeekFrom::Start(offset as u64))?;
    file.write_all(bytes)?;
    Ok(())
}

impl CacheBackend for FileStorage {
    fn add(&mut self, checksum: Checksum, record: &TextureRecord, size_hint: usize) -> bool {
        if !checksum.is_valid() || record.data.is_empty() || self.index.contains_key(&checksum) {
            return false;
        }

        let Some(size) = stored_size(record, size_hint, self.sizer) else {
            return false;
        };

        match self.append_record(record, size) {
            Ok(entry) => {
                self.index.insert(checksum, entry);
                self.total_size += size as u64;
                self.dirty = true;
                debug!(
                    checksum = %checksum,
                    offset = entry.offset,
                    size,
                    entries = self.index.len(),
                    "stored texture"
                );
                true
            }
            Err(e) => {
                warn!(path = %self.path().display(), error = %e, "failed to store texture");
                self.close();
                false
            }
        }
    }

    fn get(&mut self, checksum: Checksum) -> Option<TextureRecord> {
        let Some(&entry) = self.index.get(&checksum) else {
            self.stats.misses += 1;
            return None;
        };

        match self.read_entry(entry) {
            Ok(record) => {
                self.stats.hits += 1;
                Some(record)
            }
            Err(e) => {
                warn!(checksum = %checksum, error = %e, "failed to read texture from storage");
                self.stats.misses += 1;
                None
            }
        }
    }

    fn del(&mut self, checksum: Checksum) -> bool {
        match self.index.remove(&checksum) {
            Some(entry) => {
                self.total_size -= entry.size as u64;
                self.dirty = true;
                debug!(checksum = %checksum, "removed texture from storage index");
                true
            }
            None => false,
        }
    }

    fn is_cached(&self, checksum: Checksum) -> bool {
        self.index.contains_key(&checksum)
    }

    fn save(&mut self, dir: &Path, filename: &str, config: i32) -> bool {
        if !self.is_bound_to(dir, filename) {
            warn!(
                dir = %dir.display(),
                filename,
                bound = %self.path().display(),
                "refusing to save texture storage to a different file"
            );
            return false;
        }

        if !self.dirty && self.disk_tag.map_or(true, |tag| tag == config) {
            return true;
        }

        match self.write_index(config) {
            Ok(()) => {
                self.dirty = false;
                self.disk_tag = Some(config);
                info!(
                    path = %self.path().display(),
                    entries = self.index.len(),
                    config,
                    "saved texture storage"
                );
                true
            }
            Err(e) => {
                warn!(path = %self.path().display(), error = %e, "failed to save texture storage");
                self.close();
                false
            }
        }
    }

    fn load(&mut self, dir: &Path, filename: &str, config: i32, force: bool) -> bool {
        if !self.is_bound_to(dir, filename) {
            warn!(
                dir = %dir.display(),
                filename,
                bound = %self.path().display(),
                "refusing to load texture storage from a different file"
            );
            return false;
        }

        match self.read_index(config, force) {
            Ok((index, header)) => {
                self.total_size = index.values().map(|e| e.size as u64).sum();
                self.index = index;
                self.data_end = Some(header.index_offset);
                self.dirty = false;
                self.disk_tag = Some(header.config_tag);
                info!(
                    path = %self.path().display(),
                    entries = self.index.len(),
                    total = self.total_size,
                    "loaded texture storage"
                );
                !self.index.is_empty()
            }
            Err(e) => {
                debug!(path = %self.path().display(), error = %e, "texture storage not loaded");
                self.close();
                false
            }
        }
    }

    fn clear(&mut self) {
        self.close();
        self.index.clear();
        self.total_size = 0;
        self.data_end = None;
        self.dirty = false;
        self.disk_tag = None;

        if let Err(e) = fs::remove_file(self.path()) {
            if e.kind() != io::ErrorKind::NotFound {
                warn!(path = %self.path().display(), error = %e, "failed to remove texture storage");
            }
        }
    }

    fn is_empty(&self) -> bool {
        self.index.is_empty()
    }

    fn size(&self) -> usize {
        self.index.len()
    }

    fn total_size(&self) -> u64 {
        self.total_size
    }

    fn cache_limit(&self) -> u64 {
        0
    }

    fn options(&self) -> u32 {
        self.options
    }

    fn set_options(&mut self, options: u32) {
        self.options = options;
    }

    fn stats(&self) -> CacheStats {
        self.stats
    }
}
