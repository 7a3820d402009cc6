//! End-to-end scenarios run against every compiled-in back-end to check
//! backend equivalence.

use prioblock_store::content_index::{ContentIndex, ContentKind};
use prioblock_store::hash::Hash160;
use prioblock_store::highdb::HighDb;
use prioblock_store::low::BackendKind;

fn k(byte: u8) -> Hash160 {
    Hash160([byte; 20])
}

fn block(byte: u8) -> Vec<u8> {
    vec![byte; 46]
}

fn ce(priority: u32, hash: Hash160) -> ContentIndex {
    ContentIndex::new(ContentKind::Chk, priority, hash)
}

fn open(backend: BackendKind) -> (tempfile::TempDir, HighDb) {
    let dir = tempfile::tempdir().unwrap();
    let db = HighDb::open(0, 4, dir.path(), backend).unwrap();
    (dir, db)
}

/// Scenario 1: basic round-trip.
fn scenario_basic_round_trip(backend: BackendKind) {
    let (_d, db) = open(backend);
    let k0 = k(0x00);
    db.write(&ce(10, k0), &block(0x2A)).unwrap();
    let (got_ce, got_block) = db.read(&k0, 0).unwrap().unwrap();
    assert_eq!(got_ce.importance, 10);
    assert_eq!(got_ce.hash, k0);
    assert_eq!(got_block, block(0x2A));
    assert_eq!(db.count(), 1);
}

/// Scenario 2: priority boost.
fn scenario_priority_boost(backend: BackendKind) {
    let (_d, db) = open(backend);
    let k0 = k(0x00);
    db.write(&ce(10, k0), &block(0x2A)).unwrap();
    let (got_ce, got_block) = db.read(&k0, 7).unwrap().unwrap();
    assert_eq!(got_ce.importance, 17);
    assert_eq!(got_block, block(0x2A));
}

/// Scenario 3: eviction order — the lower-priority entry goes first.
fn scenario_eviction_order(backend: BackendKind) {
    let (_d, db) = open(backend);
    let k0 = k(0x00);
    let k1 = k(0x01);
    db.write(&ce(5, k0), &block(0)).unwrap();
    db.write(&ce(3, k1), &block(1)).unwrap();
    db.delete_n(1, None).unwrap();
    assert!(db.read(&k0, 0).unwrap().is_some());
    assert!(db.read(&k1, 0).unwrap().is_none());
}

/// `write` with a zero-length block stores an on-demand-encoded entry:
/// when the block length after the header is zero, the entry represents
/// content that's reconstructed on demand rather than stored directly.
fn scenario_on_demand_encoded_entry(backend: BackendKind) {
    let (_d, db) = open(backend);
    let k0 = k(0x00);
    db.write(&ce(1, k0), &[]).unwrap();
    let (got_ce, got_block) = db.read(&k0, 0).unwrap().unwrap();
    assert_eq!(got_ce.importance, 1);
    assert!(got_block.is_empty());
}

/// Scenario 4: corruption recovery on read — a low-level value shorter
/// than a `ContentIndex` header is deleted as part of the read, not
/// returned. Exercised directly against the directory back-end's on-disk
/// layout, since corrupting a value bypasses the public write API.
#[test]
fn scenario_corruption_recovery_on_read() {
    let (dir, db) = open(BackendKind::Dir);
    let k0 = k(0x00);

    let shard = format!("{:02x}", k0.as_bytes()[0]);
    let path = dir
        .path()
        .join("content")
        .join("bucket.4.0")
        .join(shard)
        .join(hex::encode(k0.as_bytes()));
    std::fs::write(&path, [1u8, 2, 3, 4]).unwrap();

    assert!(db.read(&k0, 0).unwrap().is_none());
    assert!(!path.exists());
}

/// Scenario 5: random sampling termination.
fn scenario_random_sampling(backend: BackendKind) {
    let (_d, db) = open(backend);
    assert!(db.random().unwrap_err().is_not_found());
    let k0 = k(0x00);
    db.write(&ce(1, k0), &block(0)).unwrap();
    let (got_ce, got_block) = db.random().unwrap();
    assert_eq!(got_ce.importance, 1);
    assert_eq!(got_ce.hash, k0);
    assert_eq!(got_block, block(0));
}

/// Scenario 6: backend equivalence — write K0, write K1, boost K0 by 3,
/// delete K1, count.
fn scenario_backend_equivalence(backend: BackendKind) {
    let (_d, db) = open(backend);
    let k0 = k(0x00);
    let k1 = k(0x01);
    db.write(&ce(1, k0), &block(0)).unwrap();
    db.write(&ce(2, k1), &block(1)).unwrap();
    let (boosted, _) = db.read(&k0, 3).unwrap().unwrap();
    assert_eq!(boosted.importance, 4);
    db.delete_key(&k1).unwrap();
    assert_eq!(db.count(), 1);
    assert!(db.read(&k1, 0).unwrap().is_none());
}

macro_rules! backend_scenarios {
    ($backend:expr) => {
        scenario_basic_round_trip($backend);
        scenario_priority_boost($backend);
        scenario_eviction_order($backend);
        scenario_on_demand_encoded_entry($backend);
        scenario_random_sampling($backend);
        scenario_backend_equivalence($backend);
    };
}

#[test]
fn dir_backend_scenarios() {
    backend_scenarios!(BackendKind::Dir);
}

#[cfg(feature = "backend-sled")]
#[test]
fn sled_backend_scenarios() {
    backend_scenarios!(BackendKind::Sled);
}

#[cfg(feature = "backend-rocksdb")]
#[test]
fn rocksdb_backend_scenarios() {
    backend_scenarios!(BackendKind::RocksDb);
}

#[cfg(feature = "backend-redb")]
#[test]
fn redb_backend_scenarios() {
    backend_scenarios!(BackendKind::Redb);
}

#[test]
fn count_conservation_across_writes_and_deletes() {
    let (_d, db) = open(BackendKind::Dir);
    let keys: Vec<_> = (0..10u8).map(k).collect();
    for (i, key) in keys.iter().enumerate() {
        db.write(&ce(i as u32, *key), &block(i as u8)).unwrap();
    }
    assert_eq!(db.count(), 10);
    for key in &keys[..4] {
        db.delete_key(key).unwrap();
    }
    assert_eq!(db.count(), 6);
}

#[test]
fn pidx_file_length_always_a_multiple_of_20() {
    let (dir, db) = open(BackendKind::Dir);
    for i in 0..8u8 {
        db.write(&ce(1, k(i)), &block(i)).unwrap();
    }
    let pidx_dir = dir.path().join("content").join("pindex.dir.4.0.pidx");
    let path = pidx_dir.join("1");
    let len = std::fs::metadata(&path).unwrap().len();
    assert_eq!(len % 20, 0);
}

#[test]
fn eviction_respects_count_target_across_many_entries() {
    let (_d, db) = open(BackendKind::Dir);
    for i in 0..20u8 {
        db.write(&ce(i as u32 % 5, k(i)), &block(i)).unwrap();
    }
    assert_eq!(db.count(), 20);
    db.delete_n(7, None).unwrap();
    assert_eq!(db.count(), 13);
}
