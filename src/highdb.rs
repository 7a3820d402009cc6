//!
//! `HighDb`: composes `LowDb` + `PIdx`, owns the mutex, implements the
//! `ContentIndex`-prefixed block layout, the eviction loop, the random
//! sampler and priority bookkeeping.
//!

use crate::common::{CONTENT_INDEX_SIZE, EVICTION_ADVANCE_LIMIT, SAMPLE_ATTEMPT_LIMIT};
use crate::content_index::ContentIndex;
use crate::error::{Result, StoreError};
use crate::hash::Hash160;
use crate::low::engines::EmbeddedLowDb;
use crate::low::{BackendKind, LowDb, LowDirBackend};
use crate::pidx::PriorityIndex;
use crate::sidecar::MinPrioritySidecar;
use parking_lot::ReentrantMutex;
use rand::Rng;
use std::cell::RefCell;
use std::path::Path;

/// One of `n` independent buckets sharing a parent directory.
pub struct HighDb {
    low: Box<dyn LowDb>,
    pidx: PriorityIndex,
    sidecar: MinPrioritySidecar,
    lock: ReentrantMutex<RefCell<u32>>,
}

impl HighDb {
    /// Opens bucket `i` of `n` under `afs_dir`, on the chosen back-end.
    /// Loads `min_priority` from the state sidecar if present, else `0`.
    pub fn open(i: u32, n: u32, afs_dir: impl AsRef<Path>, backend: BackendKind) -> Result<Self> {
        let afs_dir = afs_dir.as_ref();
        let content_dir = afs_dir.join("content");
        std::fs::create_dir_all(&content_dir)?;

        let bucket_dir = content_dir.join(format!("bucket.{n}.{i}"));
        let low: Box<dyn LowDb> = open_low_db(backend, &bucket_dir)?;

        let pidx_dir = content_dir.join(format!("pindex.{}.{n}.{i}.pidx", backend.tag()));
        let pidx = PriorityIndex::open(pidx_dir)?;

        let sidecar = MinPrioritySidecar::new(afs_dir.join("state"), i, n)?;
        let min_priority = sidecar.load()?.unwrap_or(0);

        Ok(HighDb {
            low,
            pidx,
            sidecar,
            lock: ReentrantMutex::new(RefCell::new(min_priority)),
        })
    }

    /// Persists the current `min_priority` and closes both sub-stores.
    pub fn close(&self) -> Result<()> {
        let g = self.lock.lock();
        let min_priority = *g.borrow();
        self.sidecar.store(min_priority)?;
        self.low.close()?;
        self.pidx.close()
    }

    /// Closes and deletes every file this bucket owns.
    pub fn drop_store(&self) -> Result<()> {
        self.low.drop_store()?;
        self.pidx.drop_store()
    }

    pub fn count(&self) -> u64 {
        self.low.count()
    }

    fn track_min_priority_down(&self, priority: u32) -> Result<()> {
        let g = self.lock.lock();
        if priority < *g.borrow() {
            *g.borrow_mut() = priority;
            drop(g);
            self.sidecar.store(priority)?;
        }
        Ok(())
    }

    /// Computes the low-level key, replaces any prior entry at that key,
    /// writes `ContentIndex || block`, and appends the key to `PIdx` at
    /// its importance.
    pub fn write(&self, ce: &ContentIndex, block: &[u8]) -> Result<()> {
        let _g = self.lock.lock();
        let key = ce.low_key();

        match self.delete_key(&key) {
            Ok(()) | Err(StoreError::NotFound) => {}
            Err(e) => return Err(e),
        }

        let mut buf = Vec::with_capacity(CONTENT_INDEX_SIZE + block.len());
        buf.extend_from_slice(&ce.encode());
        buf.extend_from_slice(block);
        self.low.write(&key, &buf)?;

        self.pidx.append(ce.importance, &key)?;
        self.track_min_priority_down(ce.importance)?;
        Ok(())
    }

    /// A non-zero `prio_delta` boosts the entry's priority atomically:
    /// either the delta is fully
    /// applied (PIdx moved, LowDb header rewritten) or nothing changes,
    /// enforced by holding this bucket's lock across all three steps.
    pub fn read(&self, key: &Hash160, prio_delta: u32) -> Result<Option<(ContentIndex, Vec<u8>)>> {
        let _g = self.lock.lock();

        let Some(mut buf) = self.low.read(key)? else {
            return Ok(None);
        };
        if buf.len() < CONTENT_INDEX_SIZE {
            log::warn!("low-level value for a key is shorter than the content index header; deleting");
            let _ = self.low.delete(key);
            return Ok(None);
        }

        let ce = ContentIndex::decode(&buf[..CONTENT_INDEX_SIZE])?;
        if prio_delta == 0 {
            let block = buf.split_off(CONTENT_INDEX_SIZE);
            return Ok(Some((ce, block)));
        }

        let old_priority = ce.importance;
        let new_priority = old_priority.saturating_add(prio_delta);

        if !self.pidx.remove_value(old_priority, key)? {
            log::warn!(
                "pidx has no entry for key at priority {old_priority}; proceeding with boost anyway"
            );
        }
        self.pidx.append(new_priority, key)?;

        ContentIndex::rewrite_importance(&mut buf[..CONTENT_INDEX_SIZE], new_priority);
        self.low.write(key, &buf)?;

        let boosted = ContentIndex::new(ce.kind, new_priority, ce.hash);
        let block = buf.split_off(CONTENT_INDEX_SIZE);
        Ok(Some((boosted, block)))
    }

    /// Looks up the entry's current priority, removes it from `PIdx`,
    /// then deletes it from `LowDb`.
    /// If `PIdx` doesn't have the entry at its expected priority, logs a
    /// corruption warning and proceeds with the `LowDb` delete anyway,
    /// the invariant repair happens lazily in the eviction loop.
    pub fn delete_key(&self, key: &Hash160) -> Result<()> {
        let _g = self.lock.lock();
        let Some((ce, _)) = self.read(key, 0)? else {
            return Err(StoreError::NotFound);
        };
        if !self.pidx.remove_value(ce.importance, key)? {
            log::warn!(
                "pidx missing entry for key being deleted at priority {}; deleting from low-level store regardless",
                ce.importance
            );
        }
        self.low.delete(key)
    }

    /// Frees up to `n` blocks starting at the lowest stored priority.
    /// Returns `Ok(())` once `n`
    /// entries were removed, `Err(Corrupt)` if the iteration-guard bailed
    /// out first (persistent on-disk corruption).
    pub fn delete_n(
        &self,
        mut n: u64,
        mut callback: Option<&mut dyn FnMut(&Hash160, &ContentIndex, &[u8])>,
    ) -> Result<()> {
        let g = self.lock.lock();
        let mut advance_counter = 0u32;

        while n > 0 && self.low.count() > 0 && advance_counter < EVICTION_ADVANCE_LIMIT {
            advance_counter += 1;
            let min_priority = *g.borrow();

            let Some(list) = self.pidx.read_all(min_priority)? else {
                *g.borrow_mut() = min_priority + 1;
                continue;
            };
            if list.is_empty() {
                self.pidx.unlink(min_priority)?;
                continue;
            }

            let mut i = list.len();
            while n > 0 && i > 0 {
                i -= 1;
                match self.read(&list[i], 0)? {
                    Some((ce, block)) => {
                        if let Some(cb) = callback.as_deref_mut() {
                            cb(&list[i], &ce, &block);
                        }
                        if self.low.delete(&list[i]).is_ok() {
                            n -= 1;
                        }
                    }
                    None => {
                        // Stale PIdx entry: skip. The loop guard bails
                        // out eventually if this never converges.
                    }
                }
            }

            if i == 0 {
                self.pidx.unlink(min_priority)?;
                *g.borrow_mut() = min_priority + 1;
            } else {
                self.pidx.truncate_to(min_priority, i)?;
            }
        }

        if n == 0 {
            self.sidecar.store(*g.borrow())?;
            Ok(())
        } else {
            Err(StoreError::Corrupt(format!(
                "delete_n could not free the requested count; {n} entries still owed"
            )))
        }
    }

    /// Returns one entry biased toward low priorities: the same cohorts
    /// the eviction loop would consume first, so they're worth
    /// replicating elsewhere before loss.
    pub fn random(&self) -> Result<(ContentIndex, Vec<u8>)> {
        let _g = self.lock.lock();
        for _ in 0..SAMPLE_ATTEMPT_LIMIT {
            let total = self.pidx.total_hash_count()?;
            if total == 0 {
                return Err(StoreError::NotFound);
            }
            let r = rand::thread_rng().gen_range(0..total);

            let cohorts = self.pidx.priorities_with_counts()?;
            let mut cum = 0u64;
            let mut chosen = None;
            for (p, c) in cohorts {
                cum += c;
                if r < cum {
                    chosen = Some(p);
                    break;
                }
            }
            let Some(priority) = chosen else { continue };

            let Some(key) = self.pidx.read_random(priority)? else {
                continue;
            };
            if let Some(entry) = self.read(&key, 0)? {
                return Ok(entry);
            }
        }
        Err(StoreError::NotFound)
    }
}

fn open_low_db(backend: BackendKind, dir: &Path) -> Result<Box<dyn LowDb>> {
    match backend {
        BackendKind::Dir => Ok(Box::new(LowDirBackend::open(dir)?)),
        #[cfg(feature = "backend-sled")]
        BackendKind::Sled => Ok(Box::new(
            EmbeddedLowDb::<crate::low::engines::sled_backend::SledEngine>::open(dir)?,
        )),
        #[cfg(not(feature = "backend-sled"))]
        BackendKind::Sled => Err(StoreError::Refused(
            "sled back-end not compiled in; enable the \"backend-sled\" feature".into(),
        )),
        #[cfg(feature = "backend-rocksdb")]
        BackendKind::RocksDb => Ok(Box::new(
            EmbeddedLowDb::<crate::low::engines::rocks_backend::RocksEngine>::open(dir)?,
        )),
        #[cfg(not(feature = "backend-rocksdb"))]
        BackendKind::RocksDb => Err(StoreError::Refused(
            "rocksdb back-end not compiled in; enable the \"backend-rocksdb\" feature".into(),
        )),
        #[cfg(feature = "backend-redb")]
        BackendKind::Redb => Ok(Box::new(
            EmbeddedLowDb::<crate::low::engines::redb_backend::RedbEngine>::open(dir)?,
        )),
        #[cfg(not(feature = "backend-redb"))]
        BackendKind::Redb => Err(StoreError::Refused(
            "redb back-end not compiled in; enable the \"backend-redb\" feature".into(),
        )),
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::content_index::ContentKind;

    fn ce(priority: u32, hash: Hash160) -> ContentIndex {
        ContentIndex::new(ContentKind::Chk, priority, hash)
    }

    fn open_dir_backend() -> (tempfile::TempDir, HighDb) {
        let dir = tempfile::tempdir().unwrap();
        let db = HighDb::open(0, 4, dir.path(), BackendKind::Dir).unwrap();
        (dir, db)
    }

    #[test]
    fn basic_round_trip() {
        let (_d, db) = open_dir_backend();
        let k0 = Hash160([0u8; 20]);
        let block = vec![0x2Au8; 46];
        db.write(&ce(10, k0), &block).unwrap();
        let (got_ce, got_block) = db.read(&k0, 0).unwrap().unwrap();
        assert_eq!(got_ce.importance, 10);
        assert_eq!(got_block, block);
        assert_eq!(db.count(), 1);
    }

    #[test]
    fn priority_boost_moves_pidx_entry() {
        let (_d, db) = open_dir_backend();
        let k0 = Hash160([0u8; 20]);
        db.write(&ce(10, k0), &[0x2Au8; 46]).unwrap();
        let (boosted, _) = db.read(&k0, 7).unwrap().unwrap();
        assert_eq!(boosted.importance, 17);
        assert!(db.pidx.read_all(10).unwrap().is_none());
        let at_17 = db.pidx.read_all(17).unwrap().unwrap();
        assert_eq!(at_17, vec![k0]);
    }

    #[test]
    fn eviction_removes_lowest_priority_first() {
        let (_d, db) = open_dir_backend();
        let k0 = Hash160([0u8; 20]);
        let k1 = Hash160([1u8; 20]);
        db.write(&ce(5, k0), &[0u8; 1]).unwrap();
        db.write(&ce(3, k1), &[1u8; 1]).unwrap();
        db.delete_n(1, None).unwrap();
        assert!(db.read(&k0, 0).unwrap().is_some());
        assert!(db.read(&k1, 0).unwrap().is_none());
    }

    #[test]
    fn idempotent_write_keeps_one_entry() {
        let (_d, db) = open_dir_backend();
        let k0 = Hash160([0u8; 20]);
        db.write(&ce(1, k0), &[0u8; 4]).unwrap();
        db.write(&ce(1, k0), &[1u8; 4]).unwrap();
        assert_eq!(db.count(), 1);
        let at_1 = db.pidx.read_all(1).unwrap().unwrap();
        assert_eq!(at_1.len(), 1);
    }

    #[test]
    fn random_on_empty_store_is_not_found() {
        let (_d, db) = open_dir_backend();
        assert!(db.random().unwrap_err().is_not_found());
    }

    #[test]
    fn random_returns_the_only_entry() {
        let (_d, db) = open_dir_backend();
        let k0 = Hash160([0u8; 20]);
        db.write(&ce(1, k0), &[0u8; 1]).unwrap();
        let (got_ce, _) = db.random().unwrap();
        assert_eq!(got_ce.hash, k0);
    }

    #[test]
    fn corrupt_low_level_value_is_deleted_on_read() {
        let (_d, db) = open_dir_backend();
        let k0 = Hash160([4u8; 20]);
        db.low.write(&k0, &[1, 2, 3, 4]).unwrap();
        assert!(db.read(&k0, 0).unwrap().is_none());
        assert!(db.low.read(&k0).unwrap().is_none());
    }

    #[test]
    fn close_persists_min_priority_for_next_open() {
        let dir = tempfile::tempdir().unwrap();
        {
            let db = HighDb::open(0, 4, dir.path(), BackendKind::Dir).unwrap();
            let k0 = Hash160([0u8; 20]);
            let k1 = Hash160([1u8; 20]);
            db.write(&ce(5, k0), &[0u8; 1]).unwrap();
            db.write(&ce(3, k1), &[1u8; 1]).unwrap();
            db.delete_n(1, None).unwrap();
            db.close().unwrap();
        }
        let db2 = HighDb::open(0, 4, dir.path(), BackendKind::Dir).unwrap();
        assert_eq!(*db2.lock.lock().borrow(), 4);
    }
}
