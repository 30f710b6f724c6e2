//! Binary record format for the append-only segment files.

use crate::error::{Result, TideError};
use std::io::{self, ErrorKind, Read};

/// Byte offset of the value payload within an encoded record: one checksum
/// byte, eight timestamp bytes, one key-size byte, two value-size bytes and
/// four key bytes.
pub const VALUE_OFFSET: usize = 1 + 8 + 1 + 2 + 4;

const KEY_SIZE: u8 = 4;

/// A single key/value write or tombstone, as stored in a segment file.
///
/// Multi-byte integers are big-endian on disk. The leading checksum byte is
/// the XOR fold of every byte that follows it.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Record {
    /// Write time in milliseconds, non-decreasing within one process.
    pub timestamp: i64,
    pub key: i32,
    /// `None` marks the key deleted (a tombstone, `value_size = -1`).
    pub value: Option<String>,
}

/// Outcome of reading one record from a positioned byte stream.
#[derive(Debug)]
pub enum Decoded {
    /// A fully readable record whose checksum matched.
    Entry(Record),
    /// Zero bytes were available where the next record's checksum byte
    /// would start.
    EndOfLog,
    /// The stream ended inside the header or value, the checksum did not
    /// match, or a length field was nonsensical. The decoded bytes are not
    /// trustworthy; callers must fall back to the last confirmed good
    /// offset.
    Corrupt,
}

impl Record {
    /// Builds a record, rejecting values whose UTF-8 byte length does not
    /// fit the 16-bit size field.
    pub fn new(timestamp: i64, key: i32, value: Option<String>) -> Result<Self> {
        if let Some(value) = &value {
            if value.len() > i16::MAX as usize {
                return Err(TideError::ValueTooLarge(value.len()));
            }
        }
        Ok(Self {
            timestamp,
            key,
            value,
        })
    }

    /// Value length in bytes, or -1 for a tombstone.
    pub fn value_size(&self) -> i16 {
        match &self.value {
            Some(value) => value.len() as i16,
            None => -1,
        }
    }

    /// Total encoded length: header plus value payload.
    pub fn encoded_len(&self) -> usize {
        VALUE_OFFSET + self.value.as_ref().map_or(0, |value| value.len())
    }

    /// Encodes the record into its on-disk byte layout.
    pub fn encode(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(self.encoded_len());
        buf.push(0);
        buf.extend_from_slice(&self.timestamp.to_be_bytes());
        buf.push(KEY_SIZE);
        buf.extend_from_slice(&self.value_size().to_be_bytes());
        buf.extend_from_slice(&self.key.to_be_bytes());
        if let Some(value) = &self.value {
            buf.extend_from_slice(value.as_bytes());
        }
        buf[0] = xor_fold(&buf[1..]);
        buf
    }

    /// Reads exactly one record from the stream.
    ///
    /// I/O failures other than running out of bytes propagate; running out
    /// of bytes is either [`Decoded::EndOfLog`] (before the first byte) or
    /// [`Decoded::Corrupt`] (mid-record).
    pub fn read_from<R: Read>(reader: &mut R) -> io::Result<Decoded> {
        let mut checksum = [0u8; 1];
        if reader.read(&mut checksum)? == 0 {
            return Ok(Decoded::EndOfLog);
        }

        let mut acc = 0u8;

        let mut timestamp_buf = [0u8; 8];
        if !read_full(reader, &mut timestamp_buf)? {
            return Ok(Decoded::Corrupt);
        }
        acc ^= xor_fold(&timestamp_buf);
        let timestamp = i64::from_be_bytes(timestamp_buf);

        // The key-size byte is constant; it participates in the checksum
        // but is not interpreted.
        let mut key_size_buf = [0u8; 1];
        if !read_full(reader, &mut key_size_buf)? {
            return Ok(Decoded::Corrupt);
        }
        acc ^= key_size_buf[0];

        let mut value_size_buf = [0u8; 2];
        if !read_full(reader, &mut value_size_buf)? {
            return Ok(Decoded::Corrupt);
        }
        acc ^= xor_fold(&value_size_buf);
        let value_size = i16::from_be_bytes(value_size_buf);

        let mut key_buf = [0u8; 4];
        if !read_full(reader, &mut key_buf)? {
            return Ok(Decoded::Corrupt);
        }
        acc ^= xor_fold(&key_buf);
        let key = i32::from_be_bytes(key_buf);

        if value_size < -1 {
            return Ok(Decoded::Corrupt);
        }

        let value_buf = if value_size == -1 {
            None
        } else {
            let mut buf = vec![0u8; value_size as usize];
            if !read_full(reader, &mut buf)? {
                return Ok(Decoded::Corrupt);
            }
            acc ^= xor_fold(&buf);
            Some(buf)
        };

        if acc != checksum[0] {
            return Ok(Decoded::Corrupt);
        }

        let value = match value_buf {
            None => None,
            Some(buf) => match String::from_utf8(buf) {
                Ok(value) => Some(value),
                Err(_) => return Ok(Decoded::Corrupt),
            },
        };

        Ok(Decoded::Entry(Record {
            timestamp,
            key,
            value,
        }))
    }
}

fn xor_fold(bytes: &[u8]) -> u8 {
    bytes.iter().fold(0, |acc, byte| acc ^ byte)
}

fn read_full<R: Read>(reader: &mut R, buf: &mut [u8]) -> io::Result<bool> {
    match reader.read_exact(buf) {
        Ok(()) => Ok(true),
        Err(err) if err.kind() == ErrorKind::UnexpectedEof => Ok(false),
        Err(err) => Err(err),
    }
}
