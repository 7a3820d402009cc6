//!
//! `PriorityIndex` (`PIdx`): a directory where the filename is a priority
//! and the file body is a tightly-packed array of 160-bit hashes at that
//! priority.
//!

use crate::common::HASH_SIZE;
use crate::error::Result;
use crate::hash::Hash160;
use parking_lot::ReentrantMutex;
use std::fs::{self, File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

pub struct PriorityIndex {
    root: PathBuf,
    lock: ReentrantMutex<()>,
}

impl PriorityIndex {
    pub fn open(dir: impl AsRef<Path>) -> Result<Self> {
        let root = dir.as_ref().to_path_buf();
        fs::create_dir_all(&root)?;
        Ok(PriorityIndex {
            root,
            lock: ReentrantMutex::new(()),
        })
    }

    fn file_path(&self, priority: u32) -> PathBuf {
        self.root.join(priority.to_string())
    }

    /// Opens the file for `priority`, truncating it to a multiple of 20
    /// bytes and logging a warning if it wasn't already one.
    fn open_and_repair(&self, priority: u32) -> Result<Option<File>> {
        let path = self.file_path(priority);
        if !path.exists() {
            return Ok(None);
        }
        let mut f = OpenOptions::new().read(true).write(true).open(&path)?;
        let len = f.metadata()?.len();
        let rem = len % HASH_SIZE as u64;
        if rem != 0 {
            let truncated = len - rem;
            log::warn!(
                "pidx file {:?} has length {len}, not a multiple of {HASH_SIZE}; truncating to {truncated}",
                path
            );
            f.set_len(truncated)?;
        }
        Ok(Some(f))
    }

    /// Appends `hash` to the file for `priority`, creating it if absent.
    pub fn append(&self, priority: u32, hash: &Hash160) -> Result<()> {
        let _g = self.lock.lock();
        let mut f = match self.open_and_repair(priority)? {
            Some(f) => f,
            None => OpenOptions::new()
                .create(true)
                .read(true)
                .write(true)
                .open(self.file_path(priority))?,
        };
        f.seek(SeekFrom::End(0))?;
        f.write_all(hash.as_bytes())?;
        Ok(())
    }

    /// Reads every hash stored at `priority`. `None` if the file is absent.
    pub fn read_all(&self, priority: u32) -> Result<Option<Vec<Hash160>>> {
        let _g = self.lock.lock();
        let Some(mut f) = self.open_and_repair(priority)? else {
            return Ok(None);
        };
        f.seek(SeekFrom::Start(0))?;
        let mut buf = Vec::new();
        f.read_to_end(&mut buf)?;
        Ok(Some(chunks_to_hashes(&buf)))
    }

    /// Picks one hash uniformly at random from the cohort at `priority`.
    /// `None` if the file is absent or empty.
    pub fn read_random(&self, priority: u32) -> Result<Option<Hash160>> {
        use rand::Rng;
        let _g = self.lock.lock();
        let Some(mut f) = self.open_and_repair(priority)? else {
            return Ok(None);
        };
        let len = f.metadata()?.len();
        let n = len / HASH_SIZE as u64;
        if n == 0 {
            return Ok(None);
        }
        let idx = rand::thread_rng().gen_range(0..n);
        f.seek(SeekFrom::Start(idx * HASH_SIZE as u64))?;
        let mut buf = [0u8; HASH_SIZE];
        f.read_exact(&mut buf)?;
        Ok(Some(Hash160(buf)))
    }

    /// Truncates and rewrites the file with exactly `list`.
    pub fn write(&self, priority: u32, list: &[Hash160]) -> Result<()> {
        let _g = self.lock.lock();
        if list.is_empty() {
            return self.unlink(priority);
        }
        let mut f = OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(true)
            .open(self.file_path(priority))?;
        for h in list {
            f.write_all(h.as_bytes())?;
        }
        Ok(())
    }

    /// Keeps only the first `n` entries of the file at `priority`.
    /// Removes the file entirely if `n == 0`.
    pub fn truncate_to(&self, priority: u32, n: usize) -> Result<()> {
        let _g = self.lock.lock();
        if n == 0 {
            return self.unlink(priority);
        }
        let path = self.file_path(priority);
        let f = OpenOptions::new().write(true).open(&path)?;
        f.set_len((n * HASH_SIZE) as u64)?;
        Ok(())
    }

    /// Removes the file for `priority` if present; a no-op otherwise.
    pub fn unlink(&self, priority: u32) -> Result<()> {
        let _g = self.lock.lock();
        let path = self.file_path(priority);
        match fs::remove_file(&path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    /// Removes `key` from the cohort at `priority` using
    /// swap-with-last-then-shrink: the entry at the matched index is
    /// overwritten with the current last entry, and the file is shrunk
    /// by one record. Empty files are then removed. Returns `true` if
    /// `key` was found and removed.
    pub fn remove_value(&self, priority: u32, key: &Hash160) -> Result<bool> {
        let _g = self.lock.lock();
        let Some(mut list) = self.read_all(priority)? else {
            return Ok(false);
        };
        let Some(idx) = list.iter().position(|h| h == key) else {
            return Ok(false);
        };
        let last = list.len() - 1;
        list.swap(idx, last);
        list.truncate(last);
        self.write(priority, &list)?;
        Ok(true)
    }

    /// Total number of hash records across every priority file, summed
    /// as `file_size / 20` without reading file bodies, used by the
    /// random-sampling weighting.
    pub fn total_hash_count(&self) -> Result<u64> {
        let _g = self.lock.lock();
        let mut total = 0u64;
        for entry in fs::read_dir(&self.root)? {
            let entry = entry?;
            if !entry.file_type()?.is_file() {
                continue;
            }
            let len = entry.metadata()?.len();
            total += len / HASH_SIZE as u64;
        }
        Ok(total)
    }

    /// Lists every priority that currently has a (non-empty) file,
    /// together with its hash count, in the same directory-walk pass
    /// used by [`Self::total_hash_count`].
    pub fn priorities_with_counts(&self) -> Result<Vec<(u32, u64)>> {
        let _g = self.lock.lock();
        let mut out = Vec::new();
        for entry in fs::read_dir(&self.root)? {
            let entry = entry?;
            if !entry.file_type()?.is_file() {
                continue;
            }
            let name = entry.file_name();
            let Some(p) = name.to_str().and_then(|s| s.parse::<u32>().ok()) else {
                continue;
            };
            let len = entry.metadata()?.len();
            let count = len / HASH_SIZE as u64;
            if count > 0 {
                out.push((p, count));
            }
        }
        Ok(out)
    }

    pub fn close(&self) -> Result<()> {
        Ok(())
    }

    pub fn drop_store(&self) -> Result<()> {
        fs::remove_dir_all(&self.root)?;
        Ok(())
    }
}

fn chunks_to_hashes(buf: &[u8]) -> Vec<Hash160> {
    buf.chunks_exact(HASH_SIZE)
        .map(|c| {
            let mut a = [0u8; HASH_SIZE];
            a.copy_from_slice(c);
            Hash160(a)
        })
        .collect()
}
