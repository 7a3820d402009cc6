//!
//! Back-end D: `redb`, an embedded pure-Rust single-file key-value store.
//!

use crate::error::{Result, StoreError};
use crate::low::engines::EmbeddedEngine;
use redb::{Database, ReadableTable, TableDefinition};
use std::path::{Path, PathBuf};

const TABLE: TableDefinition<&[u8], &[u8]> = TableDefinition::new("blocks");
const FILE_NAME: &str = "blocks.redb";

pub struct RedbEngine {
    db: Database,
    path: PathBuf,
}

impl EmbeddedEngine for RedbEngine {
    fn open(dir: &Path) -> Result<Self> {
        let path = dir.join(FILE_NAME);
        let db = Database::create(&path).map_err(redb_err)?;
        // Ensure the table exists so reads against an empty store don't
        // need a special case.
        let txn = db.begin_write().map_err(redb_err)?;
        {
            let _ = txn.open_table(TABLE).map_err(redb_err)?;
        }
        txn.commit().map_err(redb_err)?;
        Ok(RedbEngine { db, path })
    }

    fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>> {
        let txn = self.db.begin_read().map_err(redb_err)?;
        let table = txn.open_table(TABLE).map_err(redb_err)?;
        Ok(table.get(key).map_err(redb_err)?.map(|v| v.value().to_vec()))
    }

    fn insert(&self, key: &[u8], value: &[u8]) -> Result<()> {
        let txn = self.db.begin_write().map_err(redb_err)?;
        {
            let mut table = txn.open_table(TABLE).map_err(redb_err)?;
            table.insert(key, value).map_err(redb_err)?;
        }
        txn.commit().map_err(redb_err)
    }

    fn remove(&self, key: &[u8]) -> Result<bool> {
        let txn = self.db.begin_write().map_err(redb_err)?;
        let existed = {
            let mut table = txn.open_table(TABLE).map_err(redb_err)?;
            table.remove(key).map_err(redb_err)?.is_some()
        };
        txn.commit().map_err(redb_err)?;
        Ok(existed)
    }

    fn for_each(&self, cb: &mut dyn FnMut(&[u8]) -> bool) -> u64 {
        let mut n = 0u64;
        let Ok(txn) = self.db.begin_read() else {
            return 0;
        };
        let Ok(table) = txn.open_table(TABLE) else {
            return 0;
        };
        let Ok(iter) = table.iter() else {
            return 0;
        };
        for item in iter {
            let Ok((k, _v)) = item else { continue };
            n += 1;
            if !cb(k.value()) {
                break;
            }
        }
        n
    }

    fn flush(&self) {
        // redb commits are durable per-transaction; nothing to flush.
    }

    fn file_size_bytes(&self) -> u64 {
        std::fs::metadata(&self.path).map(|m| m.len()).unwrap_or(0)
    }

    fn destroy(dir: &Path) -> Result<()> {
        let path = dir.join(FILE_NAME);
        if path.exists() {
            std::fs::remove_file(path)?;
        }
        Ok(())
    }
}

fn redb_err(e: impl std::fmt::Display) -> StoreError {
    StoreError::IoError(std::io::Error::new(std::io::ErrorKind::Other, e.to_string()))
}
