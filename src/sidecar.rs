//!
//! State sidecar: persists the integer low-water-mark priority across
//! restarts, under a name keyed by the bucket's `(i, n)` identity.
//!
//! Body format: 4-byte host-order `i32`, kept for on-disk compatibility
//! with the legacy layout.
//!

use crate::common::sidecar_key;
use crate::error::Result;
use std::fs;
use std::path::{Path, PathBuf};

pub struct MinPrioritySidecar {
    path: PathBuf,
}

impl MinPrioritySidecar {
    pub fn new(state_dir: impl AsRef<Path>, i: u32, n: u32) -> Result<Self> {
        let dir = state_dir.as_ref().to_path_buf();
        fs::create_dir_all(&dir)?;
        Ok(MinPrioritySidecar {
            path: dir.join(sidecar_key(i, n)),
        })
    }

    /// `None` if the sidecar file does not exist yet (fresh bucket).
    pub fn load(&self) -> Result<Option<u32>> {
        match fs::read(&self.path) {
            Ok(bytes) if bytes.len() == 4 => {
                let v = i32::from_ne_bytes(bytes[..4].try_into().unwrap());
                Ok(Some(v.max(0) as u32))
            }
            Ok(_) => Ok(None),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    pub fn store(&self, value: u32) -> Result<()> {
        let v = value as i32;
        fs::write(&self.path, v.to_ne_bytes())?;
        Ok(())
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn fresh_sidecar_has_no_value() {
        let dir = tempfile::tempdir().unwrap();
        let sc = MinPrioritySidecar::new(dir.path(), 0, 4).unwrap();
        assert_eq!(sc.load().unwrap(), None);
    }

    #[test]
    fn store_then_load_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let sc = MinPrioritySidecar::new(dir.path(), 2, 4).unwrap();
        sc.store(17).unwrap();
        assert_eq!(sc.load().unwrap(), Some(17));
    }

    #[test]
    fn key_is_parameterised_by_bucket() {
        let dir = tempfile::tempdir().unwrap();
        let a = MinPrioritySidecar::new(dir.path(), 0, 4).unwrap();
        let b = MinPrioritySidecar::new(dir.path(), 1, 4).unwrap();
        a.store(3).unwrap();
        assert_eq!(b.load().unwrap(), None);
    }
}
