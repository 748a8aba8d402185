//! RAM texture cache with LRU eviction
//!
//! Keeps texture payloads in memory under a byte budget. Entries live in an
//! arena of slots; recency is a doubly-linked list threaded through the slots
//! by index, least recently used at the head.

use std::collections::HashMap;
use std::path::Path;

use tracing::{debug, warn};

use crate::backend::{owned_copy, stored_size, CacheBackend, CacheStats};
use crate::codec::Codec;
use crate::dump::DumpReader;
use crate::format::{texture_size, SizeCalculator};
use crate::record::{Checksum, TextureRecord};

/// A cached texture and its position in the recency list
struct Slot {
    checksum: Checksum,

    /// Stored record, payload possibly still compressed
    record: TextureRecord,

    /// Neighbour towards the least recently used end
    prev: Option<usize>,

    /// Neighbour towards the most recently used end
    next: Option<usize>,
}

impl Slot {
    fn size(&self) -> u64 {
        self.record.data.len() as u64
    }
}

/// RAM texture cache with LRU eviction
///
/// When adding an entry would push the total payload size over the limit,
/// least recently used entries are evicted first. A limit of zero disables
/// eviction.
///
/// # Example
///
/// ```
/// use texfilter_cache::{CacheBackend, Checksum, MemoryCache, PixelFormat, TextureRecord};
///
/// // Create a cache with 100MB limit
/// let mut cache = MemoryCache::with_mb_limit(100);
///
/// // Store a 64x64 RGBA texture
/// let record = TextureRecord::new(64, 64, PixelFormat::Rgba8.code(), vec![0u8; 64 * 64 * 4]);
/// assert!(cache.add(Checksum(0x1234), &record, 0));
///
/// // Retrieve it
/// if let Some(texture) = cache.get(Checksum(0x1234)) {
///     println!("Cache hit! Texture size: {}x{}", texture.width, texture.height);
/// }
/// ```
pub struct MemoryCache {
    /// Arena of entries; `None` marks a free slot
    slots: Vec<Option<Slot>>,

    /// Indices of free slots, reused before the arena grows
    free: Vec<usize>,

    /// Map from checksum to slot index
    index: HashMap<Checksum, usize>,

    /// Least recently used slot
    head: Option<usize>,

    /// Most recently used slot
    tail: Option<usize>,

    /// Sum of stored payload sizes in bytes
    total_size: u64,

    /// Maximum bytes allowed, zero for unbounded
    cache_limit: u64,

    options: u32,
    sizer: SizeCalculator,
    codec: Codec,
    stats: CacheStats,
}

impl MemoryCache {
    /// Create a new RAM texture cache with the specified byte limit
    pub fn new(cache_limit: u64) -> Self {
        Self::with_sizer(cache_limit, texture_size)
    }

    /// Create a new RAM texture cache with a limit in megabytes
    pub fn with_mb_limit(megabytes: u64) -> Self {
        Self::new(megabytes.saturating_mul(1024 * 1024))
    }

    /// Create a cache that derives payload sizes with a custom calculator
    pub fn with_sizer(cache_limit: u64, sizer: SizeCalculator) -> Self {
        Self {
            slots: Vec::new(),
            free: Vec::new(),
            index: HashMap::new(),
            head: None,
            tail: None,
            total_size: 0,
            cache_limit,
            options: 0,
            sizer,
            codec: Codec::default(),
            stats: CacheStats::default(),
        }
    }

    /// Replace the codec used to expand compressed payloads
    pub fn with_codec(mut self, codec: Codec) -> Self {
        self.codec = codec;
        self
    }

    /// Update the byte limit
    ///
    /// If the new limit is smaller than current usage, entries are evicted
    /// until usage fits.
    pub fn set_cache_limit(&mut self, new_limit: u64) {
        self.cache_limit = new_limit;

        if new_limit != 0 {
            self.evict_to_fit(0);
        }
    }

    /// Checksums from least to most recently used
    pub fn recency_order(&self) -> Vec<Checksum> {
        let mut order = Vec::with_capacity(self.index.len());
        let mut cursor = self.head;
        while let Some(idx) = cursor {
            let Some(slot) = self.slot(idx) else { break };
            order.push(slot.checksum);
            cursor = slot.next;
        }
        order
    }

    fn slot(&self, idx: usize) -> Option<&Slot> {
        self.slots.get(idx).and_then(Option::as_ref)
    }

    fn slot_mut(&mut self, idx: usize) -> Option<&mut Slot> {
        self.slots.get_mut(idx).and_then(Option::as_mut)
    }

    /// Append a slot at the most recently used end
    fn link_tail(&mut self, idx: usize) {
        let old_tail = self.tail;
        if let Some(slot) = self.slot_mut(idx) {
            slot.prev = old_tail;
            slot.next = None;
        }

        match old_tail {
            Some(tail) => {
                if let Some(slot) = self.slot_mut(tail) {
                    slot.next = Some(idx);
                }
            }
            None => self.head = Some(idx),
        }
        self.tail = Some(idx);
    }

    /// Detach a slot from the recency list
    fn unlink(&mut self, idx: usize) {
        let Some((prev, next)) = self.slot(idx).map(|slot| (slot.prev, slot.next)) else {
            return;
        };

        match prev {
            Some(prev) => {
                if let Some(slot) = self.slot_mut(prev) {
                    slot.next = next;
                }
            }
            None => self.head = next,
        }

        match next {
            Some(next) => {
                if let Some(slot) = self.slot_mut(next) {
                    slot.prev = prev;
                }
            }
            None => self.tail = prev,
        }

        if let Some(slot) = self.slot_mut(idx) {
            slot.prev = None;
            slot.next = None;
        }
    }

    /// Move a slot to the most recently used end
    fn touch(&mut self, idx: usize) {
        if self.tail != Some(idx) {
            self.unlink(idx);
            self.link_tail(idx);
        }
    }

    /// Take a slot out of the arena, index and size accounting
    fn remove_slot(&mut self, idx: usize) -> Option<Slot> {
        self.unlink(idx);
        let slot = self.slots.get_mut(idx)?.take()?;
        self.free.push(idx);
        self.index.remove(&slot.checksum);
        self.total_size -= slot.size();
        Some(slot)
    }

    /// Evict the least recently used entry
    fn evict_lru(&mut self) -> Option<Checksum> {
        let slot = self.remove_slot(self.head?)?;
        self.stats.evictions += 1;
        debug!(
            checksum = %slot.checksum,
            size = slot.size(),
            total = self.total_size,
            "evicted texture"
        );
        Some(slot.checksum)
    }

    /// Evict entries until `required_size` more bytes fit under the limit
    fn evict_to_fit(&mut self, required_size: u64) {
        while self.total_size + required_size > self.cache_limit && self.head.is_some() {
            if self.evict_lru().is_none() {
                break;
            }
        }
    }

    fn insert_slot(&mut self, slot: Slot) -> usize {
        match self.free.pop() {
            Some(idx) => {
                self.slots[idx] = Some(slot);
                idx
            }
            None => {
                self.slots.push(Some(slot));
                self.slots.len() - 1
            }
        }
    }
}

impl Default for MemoryCache {
    /// Create a cache with a default 256MB limit
    fn default() -> Self {
        Self::with_mb_limit(256)
    }
}

impl CacheBackend for MemoryCache {
    fn add(&mut self, checksum: Checksum, record: &TextureRecord, size_hint: usize) -> bool {
        if !checksum.is_valid() || record.data.is_empty() || self.index.contains_key(&checksum) {
            return false;
        }

        let Some(size) = stored_size(record, size_hint, self.sizer) else {
            return false;
        };

        if self.cache_limit != 0 {
            self.evict_to_fit(size as u64);
        }

        let idx = self.insert_slot(Slot {
            checksum,
            record: owned_copy(record, size),
            prev: None,
            next: None,
        });
        self.link_tail(idx);
        self.index.insert(checksum, idx);
        self.total_size += size as u64;

        debug!(
            checksum = %checksum,
            width = record.width,
            height = record.height,
            format = record.format & 0xffff,
            entries = self.index.len(),
            total = self.total_size,
            "added texture"
        );

        true
    }

    fn get(&mut self, checksum: Checksum) -> Option<TextureRecord> {
        let Some(&idx) = self.index.get(&checksum) else {
            self.stats.misses += 1;
            return None;
        };

        self.touch(idx);

        let stored = &self.slot(idx)?.record;
        let result = if stored.is_compressed() {
            match stored.decompressed(&self.codec) {
                Ok(record) => {
                    debug!(
                        checksum = %checksum,
                        stored = stored.data.len(),
                        expanded = record.data.len(),
                        "decompressed texture"
                    );
                    Some(record)
                }
                Err(e) => {
                    warn!(checksum = %checksum, error = %e, "texture decompression failed");
                    None
                }
            }
        } else {
            Some(stored.clone())
        };

        match result {
            Some(_) => self.stats.hits += 1,
            None => self.stats.misses += 1,
        }
        result
    }

    fn del(&mut self, checksum: Checksum) -> bool {
        let Some(&idx) = self.index.get(&checksum) else {
            return false;
        };

        let removed = self.remove_slot(idx).is_some();
        if removed {
            debug!(checksum = %checksum, "removed texture from cache");
        }
        removed
    }

    fn is_cached(&self, checksum: Checksum) -> bool {
        self.index.contains_key(&checksum)
    }

    /// RAM caches are persisted through dumps written by [`DumpWriter`](crate::DumpWriter)
    fn save(&mut self, _dir: &Path, _filename: &str, _config: i32) -> bool {
        false
    }

    fn load(&mut self, dir: &Path, filename: &str, config: i32, force: bool) -> bool {
        let path = dir.join(filename);

        let mut reader = match DumpReader::open(&path, self.codec.max_payload()) {
            Ok(reader) => reader,
            Err(e) => {
                debug!(path = %path.display(), error = %e, "no texture dump to load");
                return false;
            }
        };

        if reader.config_tag() != config && !force {
            debug!(
                path = %path.display(),
                found = reader.config_tag(),
                expected = config,
                "texture dump config mismatch; skipping"
            );
            return false;
        }

        let mut absorbed = 0usize;
        loop {
            match reader.next_record() {
                Ok(Some((checksum, record))) => {
                    let size_hint = if record.is_compressed() {
                        record.data.len()
                    } else {
                        0
                    };
                    if self.add(checksum, &record, size_hint) {
                        absorbed += 1;
                    }
                }
                Ok(None) => break,
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "texture dump is truncated or corrupt");
                    break;
                }
            }
        }

        debug!(path = %path.display(), absorbed, "loaded texture dump");
        absorbed > 0
    }

    fn clear(&mut self) {
        self.slots.clear();
        self.free.clear();
        self.index.clear();
        self.head = None;
        self.tail = None;
        self.total_size = 0;
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
        self.cache_limit
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
