//! Endianness-aware random access over a loaded binary image.
//!
//! `BinaryStream` is the lowest layer of the engine: an owned byte buffer
//! with a current endianness, bounds-checked integer and bulk accessors, and
//! nothing else. Everything above it (memory areas, cells, disassembly)
//! addresses bytes exclusively through stream offsets handed out by the
//! memory map, so the contract here is deliberately small:
//!
//! - Integer reads/writes of width `W` at `pos` succeed iff
//!   `pos + W <= len` with overflow-checked arithmetic, and byte-swap when
//!   the stream endianness differs from the host. The endianness check is
//!   made on every call; callers may retarget a stream with
//!   [`BinaryStream::set_endianness`] at any time before sharing it.
//! - Bulk reads/writes never swap.
//! - Read failures are expected during analysis (probing past a section
//!   end, odd trailing bytes) and surface as `None`. Write failures are
//!   rejections and surface as [`StreamError`].
//!
//! Streams loaded from a file are read-only; in-memory streams are
//! writable. Analysis passes only ever read, so a shared reference is safe
//! to hand to any number of worker threads.

use std::fs;
use std::path::Path;

use thiserror::Error;

/// Byte order used to interpret multi-byte integers in a stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Endianness {
    Little,
    Big,
}

impl Endianness {
    /// The byte order of the machine running the analysis.
    pub const fn host() -> Self {
        if cfg!(target_endian = "big") {
            Endianness::Big
        } else {
            Endianness::Little
        }
    }
}

/// Write-side failures. Read-side failures are reported as absence.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum StreamError {
    #[error("access of {len} bytes at offset {pos:#x} is outside the stream (size {size:#x})")]
    OutOfRange { pos: u64, len: usize, size: usize },
    #[error("stream backing is read-only")]
    ReadOnly,
}

/// An owned contiguous byte buffer with a current endianness.
pub struct BinaryStream {
    buffer: Vec<u8>,
    endianness: Endianness,
    writable: bool,
}

macro_rules! int_accessors {
    ($($read:ident, $write:ident: $ty:ty),+ $(,)?) => {
        $(
            /// Read a fixed-width integer at `pos`, swapped to host order
            /// when the stream endianness differs.
            pub fn $read(&self, pos: u64) -> Option<$ty> {
                let bytes = self.slice(pos, size_of::<$ty>())?;
                let raw: [u8; size_of::<$ty>()] = bytes.try_into().ok()?;
                Some(match self.endianness {
                    Endianness::Little => <$ty>::from_le_bytes(raw),
                    Endianness::Big => <$ty>::from_be_bytes(raw),
                })
            }

            /// Write a fixed-width integer at `pos` in the stream's byte
            /// order. Fails without mutating on range or mutability errors.
            pub fn $write(&mut self, pos: u64, value: $ty) -> Result<(), StreamError> {
                let raw = match self.endianness {
                    Endianness::Little => value.to_le_bytes(),
                    Endianness::Big => value.to_be_bytes(),
                };
                self.write_bytes(pos, &raw)
            }
        )+
    };
}

impl BinaryStream {
    /// Build a writable stream from an owned buffer.
    pub fn from_vec(buffer: Vec<u8>) -> Self {
        Self {
            buffer,
            endianness: Endianness::host(),
            writable: true,
        }
    }

    /// Build a writable stream by copying a borrowed buffer.
    pub fn from_bytes(bytes: &[u8]) -> Self {
        Self::from_vec(bytes.to_vec())
    }

    /// Load a file into a read-only stream.
    pub fn from_file(path: impl AsRef<Path>) -> std::io::Result<Self> {
        let buffer = fs::read(path)?;
        Ok(Self {
            buffer,
            endianness: Endianness::host(),
            writable: false,
        })
    }

    pub fn len(&self) -> usize {
        self.buffer.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }

    pub fn endianness(&self) -> Endianness {
        self.endianness
    }

    /// Retarget the stream's byte order. Subsequent integer accesses use
    /// the new order; in-flight data is unaffected.
    pub fn set_endianness(&mut self, endianness: Endianness) {
        self.endianness = endianness;
    }

    /// Borrow `len` bytes starting at `pos`, or `None` when the range falls
    /// outside the buffer (including offset overflow).
    pub fn slice(&self, pos: u64, len: usize) -> Option<&[u8]> {
        let end = pos.checked_add(len as u64)?;
        if end > self.buffer.len() as u64 {
            return None;
        }
        let start = pos as usize;
        Some(&self.buffer[start..start + len])
    }

    /// Copy bytes at `pos` into `out`. No swap is performed.
    pub fn read_bytes(&self, pos: u64, out: &mut [u8]) -> Option<()> {
        let src = self.slice(pos, out.len())?;
        out.copy_from_slice(src);
        Some(())
    }

    /// Overwrite bytes at `pos`. No swap is performed. The stream is left
    /// untouched on failure.
    pub fn write_bytes(&mut self, pos: u64, data: &[u8]) -> Result<(), StreamError> {
        if !self.writable {
            return Err(StreamError::ReadOnly);
        }
        let end = pos
            .checked_add(data.len() as u64)
            .ok_or(StreamError::OutOfRange {
                pos,
                len: data.len(),
                size: self.buffer.len(),
            })?;
        if end > self.buffer.len() as u64 {
            return Err(StreamError::OutOfRange {
                pos,
                len: data.len(),
                size: self.buffer.len(),
            });
        }
        let start = pos as usize;
        self.buffer[start..start + data.len()].copy_from_slice(data);
        Ok(())
    }

    int_accessors! {
        read_u8, write_u8: u8,
        read_u16, write_u16: u16,
        read_u32, write_u32: u32,
        read_u64, write_u64: u64,
        read_i8, write_i8: i8,
        read_i16, write_i16: i16,
        read_i32, write_i32: i32,
        read_i64, write_i64: i64,
    }
}

impl std::fmt::Debug for BinaryStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BinaryStream")
            .field("len", &self.buffer.len())
            .field("endianness", &self.endianness)
            .field("writable", &self.writable)
            .finish()
    }
}
