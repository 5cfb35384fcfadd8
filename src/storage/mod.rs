//! Byte-level storage for serialized tiers.
//!
//! - [`codec`]: JSON value encoding with optional zstd framing
//! - [`disk_io`]: entry files, index checkpoints and recovery for the disk tier

pub mod codec;
pub mod disk_io;
