//! End-to-end flows through the public cache facade

use texfilter_cache::{
    CacheConfig, Checksum, Codec, DumpWriter, PixelFormat, StorageStrategy, TextureCache,
    TextureRecord, COMPRESSED,
};
use tempfile::TempDir;

fn rgba(side: u32, fill: u8) -> TextureRecord {
    let len = (side * side * 4) as usize;
    TextureRecord::new(side, side, PixelFormat::Rgba8.code(), vec![fill; len])
}

#[test]
fn test_session_with_indexed_storage() {
    let dir = TempDir::new().unwrap();
    let config = CacheConfig::default()
        .with_strategy(StorageStrategy::IndexedFile)
        .with_cache_dir(dir.path())
        .with_options(0x0011);

    let codec = Codec::default();
    let plain = rgba(8, 0x40);
    let packed = plain.compressed(&codec).unwrap();
    assert!(packed.format & COMPRESSED != 0);

    // First session fills and saves
    {
        let mut cache = TextureCache::new(&config, "Session Test");
        assert!(!cache.load(false));
        assert!(cache.add(Checksum::from_parts(1, 2), &plain, 0));
        assert!(cache.add(Checksum::from_parts(3, 4), &packed, packed.data.len()));
        assert!(cache.save());
    }

    // Second session sees both, decompressed
    let mut cache = TextureCache::new(&config, "Session Test");
    assert!(cache.load(false));
    assert_eq!(cache.size(), 2);

    let restored = cache.get(Checksum::from_parts(3, 4)).unwrap();
    assert!(!restored.is_compressed());
    assert_eq!(restored.data, plain.data);
    assert_eq!(restored.width, 8);

    // Changing payload-affecting options invalidates the file
    let mut stale = TextureCache::new(&config.clone().with_options(0x0012), "Session Test");
    assert!(!stale.load(false));
    assert!(stale.is_empty());
}

#[test]
fn test_memory_cache_from_dump_respects_budget() {
    let dir = TempDir::new().unwrap();
    let config = CacheConfig::default()
        .with_strategy(StorageStrategy::Memory)
        .with_cache_dir(dir.path())
        .with_limit_mb(1);

    let path = dir.path().join("BUDGET_MEMORYCACHE.htc");
    let mut writer = DumpWriter::create(&path, config.config_tag()).unwrap();
    // Five 256 KiB textures against a 1 MiB budget
    for i in 1..=5u64 {
        writer.append(Checksum(i), &rgba(256, i as u8)).unwrap();
    }
    assert_eq!(writer.len(), 5);
    writer.finish().unwrap();

    let mut cache = TextureCache::new(&config, "BUDGET");
    assert!(cache.load(false));
    assert_eq!(cache.size(), 4);
    assert_eq!(cache.total_size(), 4 * 256 * 1024);
    assert_eq!(cache.stats().evictions, 1);

    // The oldest record went first
    assert!(!cache.is_cached(Checksum(1)));
    assert_eq!(cache.get(Checksum(5)).unwrap().data[0], 5);
}
