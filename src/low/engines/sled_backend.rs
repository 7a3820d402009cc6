//!
//! Back-end B: `sled`, an embedded BTree-based key-value store.
//!

use crate::error::{Result, StoreError};
use crate::low::engines::EmbeddedEngine;
use std::path::Path;

pub struct SledEngine {
    db: sled::Db,
}

impl EmbeddedEngine for SledEngine {
    fn open(dir: &Path) -> Result<Self> {
        let db = sled::Config::default()
            .path(dir)
            .cache_capacity(64 * 1024 * 1024)
            .open()
            .map_err(sled_err)?;
        Ok(SledEngine { db })
    }

    fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>> {
        Ok(self.db.get(key).map_err(sled_err)?.map(|iv| iv.to_vec()))
    }

    fn insert(&self, key: &[u8], value: &[u8]) -> Result<()> {
        self.db.insert(key, value).map_err(sled_err)?;
        Ok(())
    }

    fn remove(&self, key: &[u8]) -> Result<bool> {
        Ok(self.db.remove(key).map_err(sled_err)?.is_some())
    }

    fn for_each(&self, cb: &mut dyn FnMut(&[u8]) -> bool) -> u64 {
        let mut n = 0u64;
        for item in self.db.iter() {
            let Ok((k, _v)) = item else { continue };
            n += 1;
            if !cb(&k) {
                break;
            }
        }
        n
    }

    fn flush(&self) {
        let _ = self.db.flush();
    }

    fn file_size_bytes(&self) -> u64 {
        self.db.size_on_disk().unwrap_or(0)
    }

    fn destroy(dir: &Path) -> Result<()> {
        std::fs::remove_dir_all(dir)?;
        Ok(())
    }
}

fn sled_err(e: sled::Error) -> StoreError {
    StoreError::IoError(std::io::Error::new(std::io::ErrorKind::Other, e.to_string()))
}
