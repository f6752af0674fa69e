//! Award module header parsing.
//!
//! Each module is an LZH level-0/1 archive member.  The marker found by the scanner is the
//! method id inside the member header, two bytes in.  Everything else is located relative to it:
//!
//! ```text
//!  header_begin  marker (S)
//!  |             |
//!  v             v
//!  +------+------+----------+-----------+-----------+-----------+------+-------+----------+------
//!  | size | csum | -lhN-    | comp size | orig size | timestamp | attr | level | name len | name
//!  +------+------+----------+-----------+-----------+-----------+------+-------+----------+------
//!  0x00   0x01   0x02       0x07        0x0B        0x0F        0x13   0x14    0x15       0x16
//! ```
//!
//! The header size byte counts from the marker onwards, so the compressed data ends at
//! `S + size + comp size`.  The module we hand to the archiver is the whole member, starting at
//! the header size byte.

// Field layout is fixed by the LZH format; nothing here is configurable.

use core::mem::size_of;
use std::ops::Range;

use thiserror::Error;
use zerocopy::{little_endian::U32, FromBytes, Immutable, IntoBytes, KnownLayout};

use crate::{signature::SignatureMatch, tag::decode_tag};

/// Distance from the start of the header to the marker.
pub const MARKER_OFFSET: usize = 0x02;
/// Distance from the start of the header to the tag (file name) bytes.
pub const TAG_OFFSET: usize = 0x16;

#[derive(Debug, Default, FromBytes, Immutable, IntoBytes, KnownLayout)]
#[repr(C)]
pub struct LzhHeader {
    pub header_size: u8,
    pub checksum: u8,
    pub method: [u8; 5],
    pub compressed_size: U32,
    pub original_size: U32,
    pub timestamp: U32,
    pub attribute: u8,
    pub level: u8,
    pub name_len: u8,
}

const _: () = assert!(size_of::<LzhHeader>() == TAG_OFFSET);

#[derive(Debug, Error, PartialEq, Eq)]
pub enum HeaderError {
    #[error("marker at 0x{offset:06X} leaves no room for a header before it")]
    NoRoomForHeader { offset: usize },
    #[error("header at 0x{header_begin:06X} is truncated ({available} of 22 bytes)")]
    Truncated {
        header_begin: usize,
        available: usize,
    },
    #[error("tag 0x{tag_begin:06X}-0x{tag_end:06X} runs past the end of the buffer (0x{len:06X})")]
    TagOutOfBounds {
        tag_begin: usize,
        tag_end: usize,
        len: usize,
    },
    #[error(
        "module 0x{header_begin:06X}-0x{module_end:06X} runs past the end of the buffer (0x{len:06X})"
    )]
    ModuleOutOfBounds {
        header_begin: usize,
        module_end: u64,
        len: usize,
    },
}

/// One module located in a buffer, borrowing its bytes from that buffer.
#[derive(Debug)]
pub struct Module<'buf> {
    pub marker: SignatureMatch,
    pub header_begin: usize,
    /// The header size byte: the number of header bytes from the marker onwards.
    pub header_length: u8,
    /// Compressed size of the member data.
    pub module_length: u32,
    /// Uncompressed size, as recorded in the header.  Informational only.
    pub original_length: u32,
    pub module_end: usize,
    pub tag_begin: usize,
    pub tag_length: u8,
    /// The decoded tag.  Not yet safe to use as a file name.
    pub tag_text: String,
    /// `buffer[header_begin..module_end]`: a complete single-member LZH archive.
    pub payload: &'buf [u8],
}

impl<'buf> Module<'buf> {
    /// Computes the boundaries of the module whose marker is `marker`.
    ///
    /// Fails, without panicking, if any of the computed ranges falls outside of the buffer.
    pub fn parse(buffer: &'buf [u8], marker: SignatureMatch) -> Result<Self, HeaderError> {
        let start = marker.offset;
        let header_begin = start
            .checked_sub(MARKER_OFFSET)
            .ok_or(HeaderError::NoRoomForHeader { offset: start })?;

        let tail = buffer.get(header_begin..).unwrap_or_default();
        let (header, rest) =
            LzhHeader::ref_from_prefix(tail).map_err(|_| HeaderError::Truncated {
                header_begin,
                available: tail.len(),
            })?;

        let tag_begin = header_begin + TAG_OFFSET;
        let tag_length = header.name_len;
        let tag = rest
            .get(..tag_length as usize)
            .ok_or(HeaderError::TagOutOfBounds {
                tag_begin,
                tag_end: tag_begin + tag_length as usize,
                len: buffer.len(),
            })?;

        let module_length = header.compressed_size.get();
        let module_end = start as u64 + header.header_size as u64 + module_length as u64;
        if module_end > buffer.len() as u64 {
            return Err(HeaderError::ModuleOutOfBounds {
                header_begin,
                module_end,
                len: buffer.len(),
            });
        }
        let module_end = module_end as usize;

        Ok(Module {
            marker,
            header_begin,
            header_length: header.header_size,
            module_length,
            original_length: header.original_size.get(),
            module_end,
            tag_begin,
            tag_length,
            tag_text: decode_tag(tag),
            payload: &buffer[header_begin..module_end],
        })
    }

    pub fn range(&self) -> Range<usize> {
        self.header_begin..self.module_end
    }

    pub fn tag_range(&self) -> Range<usize> {
        self.tag_begin..self.tag_begin + self.tag_length as usize
    }
}
