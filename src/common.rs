//!
//! Shared constants and small helpers used across the crate.
//!

/// Size in bytes of a `Hash160`.
pub const HASH_SIZE: usize = 20;

/// Size in bytes of a packed `ContentIndex` header.
pub const CONTENT_INDEX_SIZE: usize = 32;

/// Default maximum payload size of one block (32 KiB).
pub const MAX_BLOCK_SIZE: usize = 32 * 1024;

pub const KB: u64 = 1 << 10;
pub const MB: u64 = 1 << 20;
pub const GB: u64 = 1 << 30;

/// Hard ceiling some embedded back-ends impose on a single database file.
pub const EMBEDDED_FILE_SIZE_CEILING: u64 = 2 * GB;

/// Minimum free space (bytes) a write may not cross.
pub const MIN_FREE_SPACE: u64 = 32 * MB;

/// Deletes are refused below half of [`MIN_FREE_SPACE`], to avoid
/// fragmentation that would grow the underlying file on delete.
pub const MIN_FREE_SPACE_FOR_DELETE: u64 = MIN_FREE_SPACE / 2;

/// Hard bound on the eviction loop's scan, guarding against persistent
/// on-disk corruption turning `delete_n` into an infinite loop.
pub const EVICTION_ADVANCE_LIMIT: u32 = 100_000;

/// Hard bound on the random-sampling retry loop.
pub const SAMPLE_ATTEMPT_LIMIT: u32 = 1_000;

/// Name of the reserved back-end-internal key holding the packed entry
/// count. Never returned from `for_each`/`count`.
pub const RESERVED_COUNT_KEY: &[u8] = b"COUNT";

/// Builds the sidecar state key for one `(i, n)` bucket: the
/// `(i,n)`-parameterised name is the only one ever written.
pub fn sidecar_key(i: u32, n: u32) -> String {
    format!("AFS-MINPRIORITY{i}{n}")
}

/// Directory-sharded layout: two hex nibbles of the hash name the
/// sub-directory a hash's file lives under.
pub fn shard_of(hash: &[u8; HASH_SIZE]) -> String {
    format!("{:02x}", hash[0])
}

pub fn hex_of(hash: &[u8; HASH_SIZE]) -> String {
    hash.iter().map(|b| format!("{b:02x}")).collect()
}
