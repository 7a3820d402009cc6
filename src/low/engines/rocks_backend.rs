//!
//! Back-end C: `rocksdb`, an embedded LSM-tree key-value store.
//!

use crate::error::{Result, StoreError};
use crate::low::engines::EmbeddedEngine;
use rocksdb::{IteratorMode, Options, DB};
use std::path::Path;

pub struct RocksEngine {
    db: DB,
    dir: std::path::PathBuf,
}

impl EmbeddedEngine for RocksEngine {
    fn open(dir: &Path) -> Result<Self> {
        let mut opts = Options::default();
        opts.create_if_missing(true);
        let db = DB::open(&opts, dir).map_err(rocks_err)?;
        Ok(RocksEngine {
            db,
            dir: dir.to_path_buf(),
        })
    }

    fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>> {
        Ok(self.db.get(key).map_err(rocks_err)?)
    }

    fn insert(&self, key: &[u8], value: &[u8]) -> Result<()> {
        self.db.put(key, value).map_err(rocks_err)
    }

    fn remove(&self, key: &[u8]) -> Result<bool> {
        let existed = self.db.get(key).map_err(rocks_err)?.is_some();
        self.db.delete(key).map_err(rocks_err)?;
        Ok(existed)
    }

    fn for_each(&self, cb: &mut dyn FnMut(&[u8]) -> bool) -> u64 {
        let mut n = 0u64;
        for item in self.db.iterator(IteratorMode::Start) {
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
        dir_size(&self.dir)
    }

    fn destroy(dir: &Path) -> Result<()> {
        let opts = Options::default();
        DB::destroy(&opts, dir).map_err(rocks_err)
    }
}

fn dir_size(dir: &Path) -> u64 {
    let mut total = 0u64;
    if let Ok(entries) = std::fs::read_dir(dir) {
        for entry in entries.flatten() {
            if let Ok(meta) = entry.metadata() {
                if meta.is_file() {
                    total += meta.len();
                }
            }
        }
    }
    total
}

fn rocks_err(e: rocksdb::Error) -> StoreError {
    StoreError::IoError(std::io::Error::new(std::io::ErrorKind::Other, e.to_string()))
}
