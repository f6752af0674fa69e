//! Module tag decoding.

/// Decodes tag bytes as UTF-8, dropping every byte sequence that isn't valid UTF-8.
///
/// Award tags are almost always plain ASCII file names (`awardext.rom`, `_EN_CODE.BIN`, ...),
/// but some images carry vendor-specific bytes in there.  Those are dropped rather than replaced
/// with U+FFFD so that they don't end up in file names.  This never fails; the result may be
/// empty, which callers must tolerate.
pub fn decode_tag(bytes: &[u8]) -> String {
    bytes.utf8_chunks().map(|chunk| chunk.valid()).collect()
}
