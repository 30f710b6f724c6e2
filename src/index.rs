//! In-memory index pointing to values stored in the segment files.

use crate::error::Result;
use dashmap::DashMap;
use std::fmt;

/// Location of a value within the log.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct ValuePointer {
    /// Segment holding the record.
    pub segment_id: u32,
    /// Byte offset of the value payload inside the segment file.
    pub offset: u64,
    /// Length of the value payload in bytes; -1 marks a tombstone.
    pub value_size: i16,
    /// Write timestamp carried by the record.
    pub timestamp: i64,
}

impl ValuePointer {
    /// Creates a pointer describing a record written to the log.
    pub fn new(segment_id: u32, offset: u64, value_size: i16, timestamp: i64) -> Self {
        Self {
            segment_id,
            offset,
            value_size,
            timestamp,
        }
    }

    /// Whether the pointer marks a deleted key.
    pub fn is_tombstone(&self) -> bool {
        self.value_size < 0
    }
}

impl fmt::Display for ValuePointer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "segment={}, offset={}, value_size={}",
            self.segment_id, self.offset, self.value_size
        )
    }
}

/// Concurrent mapping from key to the pointer of its most recent value.
///
/// Lookups take no global lock. Updates to a single key are serialized so
/// concurrent writers of the same key cannot lose an update; independent
/// keys do not wait on each other.
#[derive(Debug, Default)]
pub struct Index {
    map: DashMap<i32, ValuePointer>,
}

impl Index {
    pub fn new() -> Self {
        Self::default()
    }

    /// Rebuilds the index from replayed `(key, pointer)` pairs in append
    /// order; the last pair for a key wins.
    pub fn rebuild(entries: impl IntoIterator<Item = (i32, ValuePointer)>) -> Self {
        let index = Self::new();
        for (key, pointer) in entries {
            index.map.insert(key, pointer);
        }
        index
    }

    /// Returns the current pointer for the key. Tombstoned keys report
    /// their tombstone pointer rather than absence.
    pub fn get(&self, key: i32) -> Option<ValuePointer> {
        self.map.get(&key).map(|pointer| *pointer)
    }

    /// Runs `write` and installs the resulting pointer while holding the
    /// key's entry, so same-key writers cannot interleave between append
    /// and installation. A failed write installs nothing.
    pub fn update_with<F>(&self, key: i32, write: F) -> Result<()>
    where
        F: FnOnce() -> Result<ValuePointer>,
    {
        let entry = self.map.entry(key);
        let pointer = write()?;
        entry.insert(pointer);
        Ok(())
    }

    /// Whether the key has an entry, tombstoned or not.
    pub fn contains(&self, key: i32) -> bool {
        self.map.contains_key(&key)
    }

    /// Number of keys tracked, tombstones included.
    pub fn len(&self) -> usize {
        self.map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }
}
