//!
//! `ContentIndex`: the fixed 32-byte network-byte-order header every
//! `LowDb` value is prefixed with.
//!

use crate::common::{CONTENT_INDEX_SIZE, HASH_SIZE};
use crate::error::{Result, StoreError};
use crate::hash::Hash160;

/// The kind of content a `ContentIndex` describes. `Chk`, `ThreeHash`
/// and `OnDemand` are the indirection-relevant kinds; `Super` marks a
/// manifest/superblock entry, and `Unknown` keeps forward-compatibility
/// with kinds this core doesn't interpret.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContentKind {
    Chk,
    ThreeHash,
    OnDemand,
    Super,
    Unknown(u16),
}

impl ContentKind {
    fn to_u16(self) -> u16 {
        match self {
            ContentKind::Chk => 0,
            ContentKind::ThreeHash => 1,
            ContentKind::OnDemand => 2,
            ContentKind::Super => 3,
            ContentKind::Unknown(v) => v,
        }
    }

    fn from_u16(v: u16) -> Self {
        match v {
            0 => ContentKind::Chk,
            1 => ContentKind::ThreeHash,
            2 => ContentKind::OnDemand,
            3 => ContentKind::Super,
            other => ContentKind::Unknown(other),
        }
    }

    pub fn is_three_hash(self) -> bool {
        matches!(self, ContentKind::ThreeHash)
    }
}

/// Layout (all integers network byte order, 32 bytes total):
/// `kind(2) | reserved(4) | importance(4) | hash(20) | reserved(2)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ContentIndex {
    pub kind: ContentKind,
    pub importance: u32,
    pub hash: Hash160,
}

impl ContentIndex {
    pub fn new(kind: ContentKind, importance: u32, hash: Hash160) -> Self {
        ContentIndex {
            kind,
            importance,
            hash,
        }
    }

    /// The `LowDb` key this entry is stored under: a rehash for 3HASH
    /// indirection entries, the literal hash otherwise.
    pub fn low_key(&self) -> Hash160 {
        if self.kind.is_three_hash() {
            self.hash.rehash()
        } else {
            self.hash
        }
    }

    pub fn encode(&self) -> [u8; CONTENT_INDEX_SIZE] {
        let mut buf = [0u8; CONTENT_INDEX_SIZE];
        buf[0..2].copy_from_slice(&self.kind.to_u16().to_be_bytes());
        // bytes 2..=5 reserved, left zero
        buf[6..10].copy_from_slice(&self.importance.to_be_bytes());
        buf[10..30].copy_from_slice(self.hash.as_bytes());
        // bytes 30..=31 reserved, left zero
        buf
    }

    pub fn decode(buf: &[u8]) -> Result<Self> {
        if buf.len() < CONTENT_INDEX_SIZE {
            return Err(StoreError::Corrupt(format!(
                "content index truncated: {} bytes, need {CONTENT_INDEX_SIZE}",
                buf.len()
            )));
        }
        let kind = ContentKind::from_u16(u16::from_be_bytes([buf[0], buf[1]]));
        let importance = u32::from_be_bytes([buf[6], buf[7], buf[8], buf[9]]);
        let mut hash_buf = [0u8; HASH_SIZE];
        hash_buf.copy_from_slice(&buf[10..30]);
        Ok(ContentIndex {
            kind,
            importance,
            hash: Hash160(hash_buf),
        })
    }

    /// Rewrites only the `importance` field in an already-encoded buffer,
    /// used by the priority-boost path so the rest of the header (and the
    /// trailing block bytes) are left untouched.
    pub fn rewrite_importance(buf: &mut [u8], importance: u32) {
        buf[6..10].copy_from_slice(&importance.to_be_bytes());
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn round_trips() {
        let ce = ContentIndex::new(ContentKind::Chk, 42, Hash160([9u8; HASH_SIZE]));
        let buf = ce.encode();
        assert_eq!(buf.len(), CONTENT_INDEX_SIZE);
        let back = ContentIndex::decode(&buf).unwrap();
        assert_eq!(back, ce);
    }

    #[test]
    fn decode_rejects_short_buffers() {
        let buf = [0u8; 4];
        assert!(ContentIndex::decode(&buf).unwrap_err().is_corrupt());
    }

    #[test]
    fn three_hash_key_differs_from_stored_hash() {
        let h = Hash160([3u8; HASH_SIZE]);
        let ce = ContentIndex::new(ContentKind::ThreeHash, 1, h);
        assert_ne!(ce.low_key(), h);
        let normal = ContentIndex::new(ContentKind::Chk, 1, h);
        assert_eq!(normal.low_key(), h);
    }

    #[test]
    fn unknown_kind_round_trips_opaquely() {
        let ce = ContentIndex::new(ContentKind::Unknown(999), 0, Hash160::ZERO);
        let buf = ce.encode();
        let back = ContentIndex::decode(&buf).unwrap();
        assert_eq!(back.kind, ContentKind::Unknown(999));
    }
}
