use std::{
    ffi::OsString,
    fmt,
    fs::{create_dir_all, remove_dir_all},
    io::ErrorKind,
    path::{Path, PathBuf},
};

use anyhow::Result;
use fn_error_context::context;

/// Used when a tag sanitizes down to nothing.
pub const PLACEHOLDER_NAME: &str = "unnamed";

/// Turns arbitrary tag text into something usable as a single path component.
///
/// Path separators, the characters that Windows refuses in file names and control characters are
/// replaced with `_`.  Surrounding whitespace and trailing dots are removed.  The result is never
/// empty and never `.` or `..`.
pub fn safe_name(text: &str) -> String {
    let replaced: String = text
        .chars()
        .map(|c| match c {
            '\\' | '/' | ':' | '*' | '?' | '"' | '<' | '>' | '|' => '_',
            c if c.is_control() => '_',
            c => c,
        })
        .collect();

    match replaced.trim().trim_end_matches('.').trim_end() {
        "" | "." | ".." => PLACEHOLDER_NAME.to_string(),
        name => name.to_string(),
    }
}

/// Appends `suffix` to the final component of `path`: `dir/x` becomes `dir/x{suffix}`.
pub fn with_suffix(path: impl AsRef<Path>, suffix: &str) -> PathBuf {
    let mut name = OsString::from(path.as_ref().as_os_str());
    name.push(suffix);
    name.into()
}

/// Deletes `path` (if it exists) and creates it again, empty.
///
/// Running an extraction twice must give the same tree as running it once, so we never extract
/// on top of an old result.
#[context("Recreating directory {}", path.display())]
pub fn recreate_dir(path: &Path) -> Result<()> {
    match remove_dir_all(path) {
        Ok(()) => {}
        Err(err) if err.kind() == ErrorKind::NotFound => {}
        Err(err) => return Err(err.into()),
    }
    create_dir_all(path)?;
    Ok(())
}

/// Renders as `n` spaces: the indentation of progress output.
#[derive(Clone, Copy, Debug)]
pub struct Padding(pub usize);

impl Padding {
    /// Module lines at recursion depth `depth`.
    pub fn for_depth(depth: usize) -> Self {
        Padding(4 + 8 * depth)
    }

    /// Nested one level below `self` (archiver status lines).
    pub fn inner(self) -> Self {
        Padding(self.0 + 4)
    }
}

impl fmt::Display for Padding {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{:width$}", "", width = self.0)
    }
}

#[cfg(test)]
mod test {
    use similar_asserts::assert_eq;

    use super::*;

    #[test]
    fn test_safe_name() {
        assert_eq!(safe_name("awardext.rom"), "awardext.rom");
        assert_eq!(safe_name("_EN_CODE.BIN"), "_EN_CODE.BIN");
        assert_eq!(safe_name("a/b\\c:d*e?f\"g<h>i|j"), "a_b_c_d_e_f_g_h_i_j");
        assert_eq!(safe_name("tab\there\0"), "tab_here_");
        assert_eq!(safe_name("  spaced  "), "spaced");
        assert_eq!(safe_name("trailing. . "), "trailing");
    }

    #[test]
    fn test_safe_name_never_escapes() {
        for name in ["", "   ", ".", "..", "...", " .. "] {
            assert_eq!(safe_name(name), PLACEHOLDER_NAME, "{name:?}");
        }
        assert_eq!(safe_name("../../etc/passwd"), ".._.._etc_passwd");
        assert!(!safe_name("../x").contains('/'));
    }

    #[test]
    fn test_with_suffix() {
        assert_eq!(
            with_suffix("out/bios.bin", "_extracted"),
            PathBuf::from("out/bios.bin_extracted")
        );
    }

    #[test]
    fn test_recreate_dir() {
        let tmp = crate::test::tempdir();
        let dir = tmp.path().join("a/b");

        recreate_dir(&dir).unwrap();
        assert!(dir.is_dir());

        std::fs::write(dir.join("stale"), b"old").unwrap();
        std::fs::create_dir(dir.join("stale_extracted")).unwrap();
        recreate_dir(&dir).unwrap();
        assert!(dir.is_dir());
        assert_eq!(std::fs::read_dir(&dir).unwrap().count(), 0);
    }

    #[test]
    fn test_padding() {
        assert_eq!(format!("[{}]", Padding(3)), "[   ]");
        assert_eq!(Padding::for_depth(0).0, 4);
        assert_eq!(Padding::for_depth(2).inner().0, 24);
    }
}
