#![doc = include_str!("../README.md")]

pub mod common;
pub mod content_index;
pub mod error;
pub mod hash;
pub mod highdb;
pub mod low;
pub mod pidx;
pub mod sidecar;

pub use content_index::{ContentIndex, ContentKind};
pub use error::{Result, StoreError};
pub use hash::Hash160;
pub use highdb::HighDb;
pub use low::{BackendKind, LowDb};
pub use pidx::PriorityIndex;
