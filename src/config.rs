//! Configuration helpers for TideKv.

/// Byte size at which the active segment is retired. Checked after a full
/// append completes, so one record may push a segment slightly over.
pub const SEGMENT_SIZE_LIMIT: u64 = 4 * 1024 * 100;

/// Appends longer than this are written and flushed in two phases.
pub const APPEND_CHUNK_SIZE: usize = 4 * 1024;

/// Number of independent read handles opened per segment.
pub const READER_POOL_SIZE: usize = 5;

/// Tunable parameters for the storage engine.
#[derive(Clone, Debug)]
pub struct EngineConfig {
    /// Rotation threshold for the active segment, in bytes.
    pub segment_size_limit: u64,
    /// Chunk size for the two-phase append path, in bytes.
    pub append_chunk_size: usize,
    /// Width of each segment's reader pool.
    pub reader_pool_size: usize,
}

impl EngineConfig {
    /// Returns a configuration with explicit sizing parameters.
    pub fn new(segment_size_limit: u64, append_chunk_size: usize, reader_pool_size: usize) -> Self {
        Self {
            segment_size_limit,
            append_chunk_size,
            reader_pool_size,
        }
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            segment_size_limit: SEGMENT_SIZE_LIMIT,
            append_chunk_size: APPEND_CHUNK_SIZE,
            reader_pool_size: READER_POOL_SIZE,
        }
    }
}
