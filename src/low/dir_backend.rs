//!
//! Back-end A: one file per hash, sharded under 256 two-hex-nibble
//! sub-directories.
//!

use crate::common::shard_of;
use crate::error::{Result, StoreError};
use crate::hash::Hash160;
use crate::low::LowDb;
use parking_lot::ReentrantMutex;
use std::cell::RefCell;
use std::fs;
use std::path::{Path, PathBuf};

/// Cached entry count plus pending-delete byte counter, guarded by the
/// same recursive mutex as every other mutating operation.
struct State {
    count: u64,
    pending_delete_bytes: u64,
}

pub struct LowDirBackend {
    root: PathBuf,
    state: ReentrantMutex<RefCell<State>>,
}

impl LowDirBackend {
    pub fn open(dir: impl AsRef<Path>) -> Result<Self> {
        let root = dir.as_ref().to_path_buf();
        fs::create_dir_all(&root)?;
        for hi in 0u16..256 {
            fs::create_dir_all(root.join(format!("{hi:02x}")))?;
        }
        let count = Self::count_by_scan(&root)?;
        Ok(LowDirBackend {
            root,
            state: ReentrantMutex::new(RefCell::new(State {
                count,
                pending_delete_bytes: 0,
            })),
        })
    }

    fn path_for(&self, key: &Hash160) -> PathBuf {
        self.root.join(shard_of(key.as_bytes())).join(crate::common::hex_of(key.as_bytes()))
    }

    fn count_by_scan(root: &Path) -> Result<u64> {
        let mut n = 0u64;
        for hi in 0u16..256 {
            let shard = root.join(format!("{hi:02x}"));
            if !shard.is_dir() {
                continue;
            }
            for entry in fs::read_dir(&shard)? {
                let entry = entry?;
                if entry.file_type()?.is_file() {
                    n += 1;
                }
            }
        }
        Ok(n)
    }
}

impl LowDb for LowDirBackend {
    fn write(&self, key: &Hash160, bytes: &[u8]) -> Result<()> {
        let guard = self.state.lock();
        let path = self.path_for(key);
        let existed = path.exists();
        fs::write(&path, bytes)?;
        if !existed {
            guard.borrow_mut().count += 1;
        }
        Ok(())
    }

    fn read(&self, key: &Hash160) -> Result<Option<Vec<u8>>> {
        let path = self.path_for(key);
        match fs::read(&path) {
            Ok(bytes) => Ok(Some(bytes)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    fn delete(&self, key: &Hash160) -> Result<()> {
        let guard = self.state.lock();
        let path = self.path_for(key);
        let len = fs::metadata(&path).map(|m| m.len()).unwrap_or(0);
        match fs::remove_file(&path) {
            Ok(()) => {
                let mut st = guard.borrow_mut();
                st.count = st.count.saturating_sub(1);
                st.pending_delete_bytes += len;
                Ok(())
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Err(StoreError::NotFound),
            Err(e) => Err(e.into()),
        }
    }

    fn count(&self) -> u64 {
        self.state.lock().borrow().count
    }

    fn for_each(&self, cb: &mut dyn FnMut(&Hash160) -> bool) -> u64 {
        let mut n = 0u64;
        'outer: for hi in 0u16..256 {
            let shard = self.root.join(format!("{hi:02x}"));
            let entries = match fs::read_dir(&shard) {
                Ok(e) => e,
                Err(_) => continue,
            };
            for entry in entries.flatten() {
                if !entry.file_type().map(|t| t.is_file()).unwrap_or(false) {
                    continue;
                }
                let name = entry.file_name();
                let name = name.to_string_lossy();
                if let Some(hash) = decode_hex_hash(&name) {
                    n += 1;
                    if !cb(&hash) {
                        break 'outer;
                    }
                }
            }
        }
        n
    }

    fn estimate_size_kb(&self) -> u64 {
        // Cheap heuristic: entry count times a small per-file overhead
        // constant.
        const AVG_FILE_OVERHEAD_BYTES: u64 = 36 * 1024;
        let st = self.state.lock();
        let st = st.borrow();
        (st.count * AVG_FILE_OVERHEAD_BYTES).saturating_sub(st.pending_delete_bytes) / 1024
    }

    fn close(&self) -> Result<()> {
        Ok(())
    }

    fn drop_store(&self) -> Result<()> {
        fs::remove_dir_all(&self.root)?;
        Ok(())
    }
}

fn decode_hex_hash(name: &str) -> Option<Hash160> {
    if name.len() != 40 {
        return None;
    }
    let mut buf = [0u8; 20];
    for (i, byte) in buf.iter_mut().enumerate() {
        *byte = u8::from_str_radix(&name[2 * i..2 * i + 2], 16).ok()?;
    }
    Some(Hash160(buf))
}
