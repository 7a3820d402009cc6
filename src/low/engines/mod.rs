//!
//! Back-ends B/C/D: three structurally-identical embedded key-value
//! engines, differing only in which library's bindings back them.
//!

#[cfg(feature = "backend-sled")]
pub mod sled_backend;
#[cfg(feature = "backend-rocksdb")]
pub mod rocks_backend;
#[cfg(feature = "backend-redb")]
pub mod redb_backend;

#[cfg(feature = "backend-sled")]
pub type SledLowDb = EmbeddedLowDb<sled_backend::SledEngine>;
#[cfg(feature = "backend-rocksdb")]
pub type RocksLowDb = EmbeddedLowDb<rocks_backend::RocksEngine>;
#[cfg(feature = "backend-redb")]
pub type RedbLowDb = EmbeddedLowDb<redb_backend::RedbEngine>;

use crate::common::{
    EMBEDDED_FILE_SIZE_CEILING, MIN_FREE_SPACE, MIN_FREE_SPACE_FOR_DELETE, RESERVED_COUNT_KEY,
};
use crate::error::{Result, StoreError};
use crate::hash::Hash160;
use crate::low::LowDb;
use parking_lot::ReentrantMutex;
use std::cell::RefCell;
use std::path::{Path, PathBuf};

/// What a single embedded engine must expose. Each impl owns one on-disk
/// file under the directory it was opened on; the reserved `COUNT` key
/// and quota bookkeeping live one layer up, in [`EmbeddedLowDb`], so the
/// three engines stay structurally identical.
pub trait EmbeddedEngine: Sized + Send + Sync {
    fn open(dir: &Path) -> Result<Self>;
    fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>>;
    fn insert(&self, key: &[u8], value: &[u8]) -> Result<()>;
    fn remove(&self, key: &[u8]) -> Result<bool>;
    /// Visits every key except `RESERVED_COUNT_KEY`.
    fn for_each(&self, cb: &mut dyn FnMut(&[u8]) -> bool) -> u64;
    fn flush(&self);
    /// Approximate size on disk of the underlying file(s), in bytes.
    fn file_size_bytes(&self) -> u64;
    fn destroy(dir: &Path) -> Result<()>;
}

/// Cached bookkeeping shared by every embedded back-end: entry count and
/// pending-delete byte counter.
struct State {
    count: u64,
    pending_delete_bytes: u64,
}

/// Generic wrapper giving any [`EmbeddedEngine`] the full `LowDb`
/// contract: cached count with a reserved `COUNT` key, size-cap
/// heuristics, and free-space floor checks.
pub struct EmbeddedLowDb<E: EmbeddedEngine> {
    engine: E,
    dir: PathBuf,
    state: ReentrantMutex<RefCell<State>>,
}

impl<E: EmbeddedEngine> EmbeddedLowDb<E> {
    pub fn open(dir: impl AsRef<Path>) -> Result<Self> {
        let dir = dir.as_ref().to_path_buf();
        std::fs::create_dir_all(&dir)?;
        let engine = E::open(&dir)?;
        let count = match engine.get(RESERVED_COUNT_KEY)? {
            Some(bytes) if bytes.len() == 8 => {
                u64::from_be_bytes(bytes[..8].try_into().unwrap())
            }
            _ => {
                // Cold start with no (or malformed) cached count:
                // recompute by full iteration, taking care not to count
                // the reserved key itself.
                let mut n = 0u64;
                engine.for_each(&mut |k| {
                    if k != RESERVED_COUNT_KEY {
                        n += 1;
                    }
                    true
                });
                engine.insert(RESERVED_COUNT_KEY, &n.to_be_bytes())?;
                n
            }
        };
        Ok(EmbeddedLowDb {
            engine,
            dir,
            state: ReentrantMutex::new(RefCell::new(State {
                count,
                pending_delete_bytes: 0,
            })),
        })
    }

    fn persist_count(&self, count: u64) -> Result<()> {
        self.engine.insert(RESERVED_COUNT_KEY, &count.to_be_bytes())
    }

    fn check_free_space(&self, minimum: u64) -> Result<()> {
        match crate::low::engines::free_space_bytes(&self.dir) {
            Ok(free) if free < minimum => Err(StoreError::Refused(format!(
                "free space {free} bytes below floor {minimum} bytes"
            ))),
            Ok(_) => Ok(()),
            Err(_) => Ok(()), // statvfs unsupported on this platform/fs: don't block writes
        }
    }

    fn check_size_ceiling(&self, incoming_len: usize) -> Result<()> {
        const SLACK: u64 = 3;
        let projected = self.engine.file_size_bytes() + SLACK * incoming_len as u64;
        if projected > EMBEDDED_FILE_SIZE_CEILING {
            return Err(StoreError::Quota(format!(
                "projected file size {projected} exceeds ceiling {EMBEDDED_FILE_SIZE_CEILING}"
            )));
        }
        Ok(())
    }
}

impl<E: EmbeddedEngine> LowDb for EmbeddedLowDb<E> {
    fn write(&self, key: &Hash160, bytes: &[u8]) -> Result<()> {
        let guard = self.state.lock();
        self.check_free_space(MIN_FREE_SPACE)?;
        self.check_size_ceiling(key.as_bytes().len() + bytes.len())?;

        let existed = self.engine.get(key.as_bytes())?.is_some();
        self.engine.insert(key.as_bytes(), bytes)?;
        if !existed {
            let mut st = guard.borrow_mut();
            st.count += 1;
            let new_count = st.count;
            drop(st);
            self.persist_count(new_count)?;
        }
        Ok(())
    }

    fn read(&self, key: &Hash160) -> Result<Option<Vec<u8>>> {
        self.engine.get(key.as_bytes())
    }

    fn delete(&self, key: &Hash160) -> Result<()> {
        let guard = self.state.lock();
        self.check_free_space(MIN_FREE_SPACE_FOR_DELETE)?;
        let old_len = self.engine.get(key.as_bytes())?.map(|v| v.len() as u64);
        let removed = self.engine.remove(key.as_bytes())?;
        if !removed {
            return Err(StoreError::NotFound);
        }
        let mut st = guard.borrow_mut();
        st.count = st.count.saturating_sub(1);
        st.pending_delete_bytes += old_len.unwrap_or(0);
        let new_count = st.count;
        drop(st);
        self.persist_count(new_count)
    }

    fn count(&self) -> u64 {
        self.state.lock().borrow().count
    }

    fn for_each(&self, cb: &mut dyn FnMut(&Hash160) -> bool) -> u64 {
        let mut n = 0u64;
        self.engine.for_each(&mut |raw| {
            if raw == RESERVED_COUNT_KEY {
                return true;
            }
            if let Some(h) = Hash160::from_slice(raw) {
                n += 1;
                return cb(&h);
            }
            true
        });
        n
    }

    fn estimate_size_kb(&self) -> u64 {
        let st = self.state.lock();
        let st = st.borrow();
        let size = self.engine.file_size_bytes();
        let adjusted = (size as f64 * 1.2) as u64;
        let adjusted = adjusted.saturating_sub(st.pending_delete_bytes);
        let with_index = adjusted + 20 * st.count;
        with_index.div_ceil(1024)
    }

    fn close(&self) -> Result<()> {
        self.engine.flush();
        Ok(())
    }

    fn drop_store(&self) -> Result<()> {
        self.engine.flush();
        E::destroy(&self.dir)
    }
}

/// Free space (bytes) of the filesystem containing `path`.
pub(crate) fn free_space_bytes(path: &Path) -> std::io::Result<u64> {
    use nix::sys::statvfs::statvfs;
    let stat = statvfs(path)
        .map_err(|e| std::io::Error::new(std::io::ErrorKind::Other, e.to_string()))?;
    Ok(stat.blocks_available() as u64 * stat.fragment_size() as u64)
}
