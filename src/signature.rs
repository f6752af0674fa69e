//! Locating LZH method markers inside an image buffer.
//!
//! Every module embedded in an Award BIOS image is an LZH archive member, and each member header
//! carries a 5-byte compression method id such as `-lh5-`.  Finding those ids is how we find the
//! modules.  The search is unanchored, left to right and non-overlapping, and it can be resumed
//! at any offset so that a caller can interleave other work between matches.

use std::{fmt, ops::Range};

use once_cell::sync::Lazy;
use regex_automata::{meta::Regex, util::syntax, Input};

/// Length of every marker, in bytes.
pub const MARKER_LEN: usize = 5;

static LZH_MARKER: Lazy<Regex> = Lazy::new(|| {
    Regex::builder()
        .syntax(syntax::Config::new().unicode(false).utf8(false))
        .build(r"-lh[04567]-")
        .expect("LZH marker pattern must compile")
});

/// The LZH compression methods used by Award BIOS modules.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum MarkerKind {
    /// `-lh0-`: stored, no compression
    Lh0,
    /// `-lh4-`
    Lh4,
    /// `-lh5-`: by far the most common
    Lh5,
    /// `-lh6-`
    Lh6,
    /// `-lh7-`
    Lh7,
}

impl MarkerKind {
    pub fn from_method(method: &[u8]) -> Option<Self> {
        match method {
            b"-lh0-" => Some(Self::Lh0),
            b"-lh4-" => Some(Self::Lh4),
            b"-lh5-" => Some(Self::Lh5),
            b"-lh6-" => Some(Self::Lh6),
            b"-lh7-" => Some(Self::Lh7),
            _ => None,
        }
    }

    /// The method id as it appears on disk.
    pub fn method(self) -> &'static [u8; MARKER_LEN] {
        match self {
            Self::Lh0 => b"-lh0-",
            Self::Lh4 => b"-lh4-",
            Self::Lh5 => b"-lh5-",
            Self::Lh6 => b"-lh6-",
            Self::Lh7 => b"-lh7-",
        }
    }
}

impl fmt::Display for MarkerKind {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let level = match self {
            Self::Lh0 => 0,
            Self::Lh4 => 4,
            Self::Lh5 => 5,
            Self::Lh6 => 6,
            Self::Lh7 => 7,
        };
        write!(f, "LZH-LH{level}")
    }
}

/// One marker occurrence.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SignatureMatch {
    /// Position of the first byte of the marker in the scanned buffer.
    pub offset: usize,
    pub kind: MarkerKind,
}

impl SignatureMatch {
    /// The offset just past the marker.  Scanning resumes here, which is what keeps matches from
    /// overlapping.
    pub fn end(&self) -> usize {
        self.offset + MARKER_LEN
    }

    pub fn range(&self) -> Range<usize> {
        self.offset..self.end()
    }
}

/// Finds the first marker starting at or after `from`.
///
/// Returns None if there is none, including when `from` lies beyond the end of the buffer.
pub fn find_marker(buffer: &[u8], from: usize) -> Option<SignatureMatch> {
    if from > buffer.len() {
        return None;
    }

    let found = LZH_MARKER.find(Input::new(buffer).range(from..))?;
    let kind = MarkerKind::from_method(&buffer[found.range()])?;

    Some(SignatureMatch {
        offset: found.start(),
        kind,
    })
}

/// Lazy iterator over the markers of a buffer.
///
/// Cloning the iterator (or calling [`Markers::resume_at`]) restarts the scan from an arbitrary
/// point; nothing is cached between calls.
#[derive(Clone, Debug)]
pub struct Markers<'buf> {
    buffer: &'buf [u8],
    cursor: usize,
}

impl<'buf> Markers<'buf> {
    pub fn resume_at(buffer: &'buf [u8], cursor: usize) -> Self {
        Markers { buffer, cursor }
    }

    /// The offset where the next search will begin.
    pub fn cursor(&self) -> usize {
        self.cursor
    }
}

impl Iterator for Markers<'_> {
    type Item = SignatureMatch;

    fn next(&mut self) -> Option<SignatureMatch> {
        let found = find_marker(self.buffer, self.cursor)?;
        self.cursor = found.end();
        Some(found)
    }
}

/// Scans the whole buffer from the start.
pub fn scan(buffer: &[u8]) -> Markers<'_> {
    Markers::resume_at(buffer, 0)
}

/// Whether the buffer contains at least one marker.
///
/// This is the "is this an Award image" test at the top level and the "does this module have
/// nested modules" test during recursion.
pub fn contains_marker(buffer: &[u8]) -> bool {
    find_marker(buffer, 0).is_some()
}
