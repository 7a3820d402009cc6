//!
//! `Hash160`: the 160-bit opaque key every block is addressed by.
//!

use crate::common::HASH_SIZE;
use std::fmt;

/// 160 bits of opaque key material. Equality is by value; encodings such
/// as hex or Z-base32 live outside this core.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Hash160(pub [u8; HASH_SIZE]);

impl Hash160 {
    pub const ZERO: Hash160 = Hash160([0u8; HASH_SIZE]);

    #[inline(always)]
    pub fn as_bytes(&self) -> &[u8; HASH_SIZE] {
        &self.0
    }

    #[inline(always)]
    pub fn from_slice(s: &[u8]) -> Option<Self> {
        if s.len() != HASH_SIZE {
            return None;
        }
        let mut buf = [0u8; HASH_SIZE];
        buf.copy_from_slice(s);
        Some(Hash160(buf))
    }

    /// Rehash used for 3HASH indirection entries: the `LowDb` key is
    /// `hash(ContentIndex.hash)`, not `ContentIndex.hash` itself.
    pub fn rehash(&self) -> Hash160 {
        let digest = blake3::hash(&self.0);
        let mut buf = [0u8; HASH_SIZE];
        buf.copy_from_slice(&digest.as_bytes()[..HASH_SIZE]);
        Hash160(buf)
    }
}

impl fmt::Debug for Hash160 {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Hash160({})", crate::common::hex_of(&self.0))
    }
}

impl AsRef<[u8]> for Hash160 {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn rehash_is_deterministic_and_distinct() {
        let h = Hash160([7u8; HASH_SIZE]);
        let r1 = h.rehash();
        let r2 = h.rehash();
        assert_eq!(r1, r2);
        assert_ne!(r1, h);
    }

    #[test]
    fn from_slice_rejects_wrong_length() {
        assert!(Hash160::from_slice(&[0u8; 19]).is_none());
        assert!(Hash160::from_slice(&[0u8; 20]).is_some());
    }
}
