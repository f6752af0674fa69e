//! Interface to the external archiver that does the actual LZH decompression.
//!
//! We don't decompress anything ourselves.  The [`Decompressor`] trait is the seam: the real
//! implementation ([`SevenZip`]) runs a 7-Zip executable, and tests plug in something
//! deterministic instead.  Neither operation ever returns an error to the caller: a failure to run
//! the tool is just another kind of outcome.

use std::{
    io,
    path::{Path, PathBuf},
    process::{Command, ExitStatus, Stdio},
};

use log::debug;
use thiserror::Error;

/// How the archiver process ended.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ExitKind {
    /// Exit code 0
    Clean,
    /// Exit code 1: non-fatal warnings
    Warning,
    /// Any other exit code, or None if the process was killed by a signal
    Abnormal(Option<i32>),
}

impl ExitKind {
    pub fn from_code(code: Option<i32>) -> Self {
        match code {
            Some(0) => ExitKind::Clean,
            Some(1) => ExitKind::Warning,
            other => ExitKind::Abnormal(other),
        }
    }

    pub fn from_status(status: ExitStatus) -> Self {
        Self::from_code(status.code())
    }

    /// Clean and Warning both mean that the tool did its job.
    pub fn is_accepted(self) -> bool {
        !matches!(self, ExitKind::Abnormal(_))
    }
}

#[derive(Debug, Error)]
pub enum ArchiverError {
    #[error("failed to run {}: {source}", program.display())]
    Spawn {
        program: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("bad exit code {0:?}")]
    BadExitCode(Option<i32>),
    #[error("output directory {} is missing after extraction", .0.display())]
    OutputDirMissing(PathBuf),
}

/// The result of an extract operation.
#[derive(Debug)]
pub enum ExtractOutcome {
    /// The tool ran.  This says nothing about whether it produced the expected output: callers
    /// have to check for that themselves.
    Ran(ExitKind),
    Failed(ArchiverError),
}

impl ExtractOutcome {
    pub fn ran(&self) -> bool {
        matches!(self, ExtractOutcome::Ran(_))
    }
}

/// Something that can test and extract LZH archives.
pub trait Decompressor {
    /// Whether the tool is able to process the archive at `path`.
    fn probe(&self, path: &Path) -> bool;

    /// Extracts the archive at `archive` into the existing directory `out_dir`.
    fn extract(&self, archive: &Path, out_dir: &Path) -> ExtractOutcome;
}

/// The 7-Zip command line tool.
///
/// 7-Zip verifies the CRC of LZH members and exits with code 2 when it doesn't match, but it
/// still writes the file.  Award images are full of such modules, which is why `strict` is off by
/// default and why callers confirm an extraction by looking for its output.
#[derive(Clone, Debug)]
pub struct SevenZip {
    pub program: PathBuf,
    /// Treat exit codes other than 0 and 1 as failures.
    pub strict: bool,
}

impl Default for SevenZip {
    fn default() -> Self {
        SevenZip {
            program: PathBuf::from("7z"),
            strict: false,
        }
    }
}

impl SevenZip {
    pub fn new(program: impl Into<PathBuf>, strict: bool) -> Self {
        SevenZip {
            program: program.into(),
            strict,
        }
    }

    fn run(&self, cmd: &mut Command) -> Result<ExitKind, ArchiverError> {
        debug!("running {cmd:?}");
        let status = cmd
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status()
            .map_err(|source| ArchiverError::Spawn {
                program: self.program.clone(),
                source,
            })?;
        let kind = ExitKind::from_status(status);
        debug!("{} exited with {status} ({kind:?})", self.program.display());
        Ok(kind)
    }
}

impl Decompressor for SevenZip {
    fn probe(&self, path: &Path) -> bool {
        let mut cmd = Command::new(&self.program);
        cmd.arg("t").arg(path).args(["-bso0", "-bse0", "-bsp0"]);

        match self.run(&mut cmd) {
            Ok(kind) => kind.is_accepted(),
            Err(err) => {
                debug!("{err}");
                false
            }
        }
    }

    fn extract(&self, archive: &Path, out_dir: &Path) -> ExtractOutcome {
        let mut out_arg = std::ffi::OsString::from("-o");
        out_arg.push(out_dir);

        let mut cmd = Command::new(&self.program);
        cmd.args(["x", "-aou", "-bso0", "-bse0", "-bsp0"])
            .arg(out_arg)
            .arg(archive);

        let kind = match self.run(&mut cmd) {
            Ok(kind) => kind,
            Err(err) => return ExtractOutcome::Failed(err),
        };

        if self.strict {
            if let ExitKind::Abnormal(code) = kind {
                return ExtractOutcome::Failed(ArchiverError::BadExitCode(code));
            }
        }

        if !out_dir.is_dir() {
            return ExtractOutcome::Failed(ArchiverError::OutputDirMissing(out_dir.to_path_buf()));
        }

        ExtractOutcome::Ran(kind)
    }
}

#[cfg(test)]
mod test {
    use similar_asserts::assert_eq;

    use super::*;

    #[test]
    fn test_exit_kind() {
        assert_eq!(ExitKind::from_code(Some(0)), ExitKind::Clean);
        assert_eq!(ExitKind::from_code(Some(1)), ExitKind::Warning);
        assert_eq!(ExitKind::from_code(Some(2)), ExitKind::Abnormal(Some(2)));
        assert_eq!(ExitKind::from_code(None), ExitKind::Abnormal(None));

        assert!(ExitKind::Clean.is_accepted());
        assert!(ExitKind::Warning.is_accepted());
        assert!(!ExitKind::Abnormal(Some(2)).is_accepted());
        assert!(!ExitKind::Abnormal(None).is_accepted());
    }

    #[test]
    fn test_missing_program_is_an_outcome() {
        let tmp = crate::test::tempdir();
        let archive = tmp.path().join("x.lzh");
        std::fs::write(&archive, b"not really").unwrap();

        let tool = SevenZip::new(tmp.path().join("no-such-7z"), false);
        assert!(!tool.probe(&archive));
        assert!(matches!(
            tool.extract(&archive, tmp.path()),
            ExtractOutcome::Failed(ArchiverError::Spawn { .. })
        ));
    }

    #[cfg(unix)]
    mod script {
        use std::{fs, os::unix::fs::PermissionsExt};

        use super::*;

        // Stand-in for 7z that ignores its arguments and exits with a fixed code.
        fn exits_with(dir: &Path, code: i32) -> SevenZip {
            let path = dir.join(format!("exit-{code}"));
            fs::write(&path, format!("#!/bin/sh\nexit {code}\n")).unwrap();
            fs::set_permissions(&path, fs::Permissions::from_mode(0o755)).unwrap();
            SevenZip::new(path, false)
        }

        #[test]
        fn test_probe() {
            let tmp = crate::test::tempdir();
            let archive = tmp.path().join("x.lzh");
            assert!(exits_with(tmp.path(), 0).probe(&archive));
            assert!(exits_with(tmp.path(), 1).probe(&archive));
            assert!(!exits_with(tmp.path(), 2).probe(&archive));
        }

        #[test]
        fn test_extract_exit_codes() {
            let tmp = crate::test::tempdir();
            let archive = tmp.path().join("x.lzh");

            let crc_error = exits_with(tmp.path(), 2);
            assert!(matches!(
                crc_error.extract(&archive, tmp.path()),
                ExtractOutcome::Ran(ExitKind::Abnormal(Some(2)))
            ));

            let strict = SevenZip {
                strict: true,
                ..crc_error
            };
            assert!(matches!(
                strict.extract(&archive, tmp.path()),
                ExtractOutcome::Failed(ArchiverError::BadExitCode(Some(2)))
            ));

            let warning = SevenZip {
                strict: true,
                ..exits_with(tmp.path(), 1)
            };
            assert!(warning.extract(&archive, tmp.path()).ran());
        }

        #[test]
        fn test_extract_missing_out_dir() {
            let tmp = crate::test::tempdir();
            let out = tmp.path().join("gone");
            assert!(matches!(
                exits_with(tmp.path(), 0).extract(&tmp.path().join("x.lzh"), &out),
                ExtractOutcome::Failed(ArchiverError::OutputDirMissing(path)) if path == out
            ));
        }
    }
}
