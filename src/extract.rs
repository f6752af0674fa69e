//! Extraction of every module of an image, recursively.
//!
//! For an image (or module) written to `X`, the modules go into `X_extracted/`:
//!
//! ```text
//! X_extracted/
//!     awardext.rom                 decompressed module
//!     awardext.rom_extracted/      modules found inside of awardext.rom
//!         ...
//!     _EN_CODE.BIN.lzh             module that could not be decompressed, kept for inspection
//! ```
//!
//! Work is kept on an explicit stack instead of recursing.  Each frame remembers how far its
//! buffer has been scanned, so a nested module is completely processed before the scan of its
//! parent resumes, exactly as a recursive implementation would do it.

use std::{
    collections::HashSet,
    fs, io,
    ops::Range,
    path::{Path, PathBuf},
};

use anyhow::Result;
use log::{debug, info, warn};
use thiserror::Error;

use crate::{
    archiver::{ArchiverError, Decompressor, ExtractOutcome},
    header::{HeaderError, Module},
    signature::{contains_marker, find_marker, SignatureMatch},
    util::{recreate_dir, safe_name, with_suffix, Padding},
};

/// Suffix of the directory that receives the modules of a file.
pub const EXTRACTED_SUFFIX: &str = "_extracted";
/// Extension of the module archives that we hand to the archiver.
pub const ARCHIVE_EXT: &str = "lzh";
/// Default bound on nesting.  Real images nest one or two levels deep.
pub const DEFAULT_MAX_DEPTH: usize = 16;

#[derive(Clone, Debug)]
pub struct ExtractOptions {
    /// Modules found at this depth are extracted but not searched for further modules.
    pub max_depth: usize,
}

impl Default for ExtractOptions {
    fn default() -> Self {
        ExtractOptions {
            max_depth: DEFAULT_MAX_DEPTH,
        }
    }
}

#[derive(Debug, Error)]
pub enum ModuleError {
    #[error("failed to write {}: {source}", path.display())]
    WriteArchive {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("failed to create a staging directory: {0}")]
    Staging(#[source] io::Error),
    #[error("archiver cannot process {}", .0.display())]
    Unsupported(PathBuf),
    #[error("archiver produced no {}", .0.display())]
    NotConfirmed(PathBuf),
    #[error("archiver failed: {0}")]
    Rejected(#[source] ArchiverError),
    #[error("failed to move {} into place: {source}", path.display())]
    Rename {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("failed to read back {}: {source}", path.display())]
    ReadBack {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("failed to prepare nested extraction: {0:#}")]
    Nested(anyhow::Error),
}

#[derive(Debug)]
pub enum ModuleOutcome {
    /// Decompressed, and `nested` says whether we went on to extract modules from inside of it.
    Extracted { nested: bool },
    /// Not decompressed.  The archive is left next to where the output would have been.
    Failed(ModuleError),
    /// The header around the marker doesn't fit in the buffer; nothing was written.
    Skipped(HeaderError),
}

/// What happened to one marker.
#[derive(Debug)]
pub struct ModuleResult {
    pub depth: usize,
    /// The module's byte range in its parent (just the marker, for skipped matches).
    pub range: Range<usize>,
    pub tag: Option<String>,
    /// The decompressed output, or the archive left behind.
    pub path: Option<PathBuf>,
    pub outcome: ModuleOutcome,
}

#[derive(Debug, Default)]
pub struct ExtractReport {
    pub results: Vec<ModuleResult>,
}

impl ExtractReport {
    pub fn extracted(&self) -> usize {
        self.results
            .iter()
            .filter(|r| matches!(r.outcome, ModuleOutcome::Extracted { .. }))
            .count()
    }

    pub fn failed(&self) -> usize {
        self.results.len() - self.extracted()
    }

    /// True if every marker turned into an extracted module.
    pub fn is_success(&self) -> bool {
        self.failed() == 0
    }
}

/// Hands out file names that are unique within one extraction directory.
///
/// A module named `NAME` may leave `NAME`, `NAME.lzh` and `NAME_extracted/` behind, so the whole
/// family is reserved: no later module gets a name that is already part of another's family.
#[derive(Debug, Default)]
struct NameAllocator {
    used: HashSet<String>,
}

impl NameAllocator {
    fn family(name: &str) -> [String; 3] {
        [
            name.to_string(),
            format!("{name}.{ARCHIVE_EXT}"),
            format!("{name}{EXTRACTED_SUFFIX}"),
        ]
    }

    fn allocate(&mut self, base: &str) -> String {
        let mut name = base.to_string();
        let mut n = 1;
        while Self::family(&name).iter().any(|f| self.used.contains(f)) {
            name = format!("{base}_{n}");
            n += 1;
        }
        self.used.extend(Self::family(&name));
        name
    }
}

struct Frame {
    buffer: Vec<u8>,
    extract_dir: PathBuf,
    depth: usize,
    cursor: usize,
    names: NameAllocator,
}

/// A confirmed module that contains modules of its own.
struct Nested {
    buffer: Vec<u8>,
    path: PathBuf,
    depth: usize,
}

pub struct Extractor<'a> {
    decompressor: &'a dyn Decompressor,
    options: ExtractOptions,
}

impl<'a> Extractor<'a> {
    pub fn new(decompressor: &'a dyn Decompressor, options: ExtractOptions) -> Self {
        Extractor {
            decompressor,
            options,
        }
    }

    /// Extracts all modules of `buffer`, which is (the content of) `output`, into
    /// `output_extracted/`, descending into modules that contain modules.
    ///
    /// The extraction directory is deleted and recreated first.  Failing to do that is the only
    /// error; everything that goes wrong with individual modules ends up in the report.
    pub fn extract_image(&self, buffer: Vec<u8>, output: &Path) -> Result<ExtractReport> {
        let mut report = ExtractReport::default();
        let mut stack = vec![open_frame(buffer, output, 0)?];

        while let Some(frame) = stack.last_mut() {
            let Some(marker) = find_marker(&frame.buffer, frame.cursor) else {
                stack.pop();
                continue;
            };
            frame.cursor = marker.end();

            let Some(nested) = self.extract_module(frame, marker, &mut report) else {
                continue;
            };

            match open_frame(nested.buffer, &nested.path, nested.depth) {
                Ok(frame) => stack.push(frame),
                Err(err) => {
                    warn!("{}Error: {err:#}", Padding::for_depth(nested.depth));
                    if let Some(result) = report.results.last_mut() {
                        result.outcome = ModuleOutcome::Failed(ModuleError::Nested(err));
                    }
                }
            }
        }

        Ok(report)
    }

    fn extract_module(
        &self,
        frame: &mut Frame,
        marker: SignatureMatch,
        report: &mut ExtractReport,
    ) -> Option<Nested> {
        let padding = Padding::for_depth(frame.depth);

        let module = match Module::parse(&frame.buffer, marker) {
            Ok(module) => module,
            Err(err) => {
                warn!("{padding}{} > skipping match: {err}", marker.kind);
                report.results.push(ModuleResult {
                    depth: frame.depth,
                    range: marker.range(),
                    tag: None,
                    path: None,
                    outcome: ModuleOutcome::Skipped(err),
                });
                return None;
            }
        };

        info!(
            "{padding}{} > {} [0x{:06X}-0x{:06X}]",
            marker.kind, module.tag_text, module.header_begin, module.module_end
        );

        let expected = safe_name(&module.tag_text);
        let name = frame.names.allocate(&expected);
        let module_path = frame.extract_dir.join(&name);
        let archive_path = frame.extract_dir.join(format!("{name}.{ARCHIVE_EXT}"));

        let mut result = ModuleResult {
            depth: frame.depth,
            range: module.range(),
            tag: Some(module.tag_text.clone()),
            path: Some(archive_path.clone()),
            outcome: ModuleOutcome::Extracted { nested: false },
        };

        let confirmed = self.decompress(
            module.payload,
            &archive_path,
            &frame.extract_dir,
            &expected,
            &module_path,
            padding.inner(),
        );
        if let Err(err) = confirmed {
            warn!("{}Error: {err}", padding.inner());
            result.outcome = ModuleOutcome::Failed(err);
            report.results.push(result);
            return None;
        }
        result.path = Some(module_path.clone());

        // Decompressed; the archive has served its purpose.
        if let Err(err) = fs::remove_file(&archive_path) {
            warn!("{}failed to remove {}: {err}", padding.inner(), archive_path.display());
        }

        let nested = match fs::read(&module_path) {
            Ok(content) if contains_marker(&content) => Some(content),
            Ok(_) => None,
            Err(source) => {
                result.outcome = ModuleOutcome::Failed(ModuleError::ReadBack {
                    path: module_path,
                    source,
                });
                report.results.push(result);
                return None;
            }
        };

        let nested = nested.and_then(|buffer| {
            if frame.depth + 1 > self.options.max_depth {
                warn!(
                    "{}{name} contains modules, but the maximum depth ({}) has been reached",
                    padding.inner(),
                    self.options.max_depth
                );
                None
            } else {
                Some(Nested {
                    buffer,
                    path: module_path,
                    depth: frame.depth + 1,
                })
            }
        });

        result.outcome = ModuleOutcome::Extracted {
            nested: nested.is_some(),
        };
        report.results.push(result);
        nested
    }

    /// Writes `payload` to `archive_path` and has it decompressed, leaving the output at
    /// `module_path`.
    ///
    /// The archiver names its output after the tag stored in the archive, so two modules with the
    /// same tag would collide if both were extracted straight into `extract_dir`.  Each one gets a
    /// private staging directory instead, and its output is moved to the unique `module_path`.
    ///
    /// Success is decided by the presence of the output, not by what the archiver returned: 7-Zip
    /// fails the CRC check of plenty of modules that it decompresses just fine.  The exception is
    /// an archiver that was asked to be strict about its exit code and reported a bad one.
    fn decompress(
        &self,
        payload: &[u8],
        archive_path: &Path,
        extract_dir: &Path,
        expected: &str,
        module_path: &Path,
        padding: Padding,
    ) -> Result<(), ModuleError> {
        fs::write(archive_path, payload).map_err(|source| ModuleError::WriteArchive {
            path: archive_path.to_path_buf(),
            source,
        })?;

        let staging = tempfile::Builder::new()
            .prefix(".staging-")
            .tempdir_in(extract_dir)
            .map_err(ModuleError::Staging)?;

        match self.decompressor.extract(archive_path, staging.path()) {
            ExtractOutcome::Ran(kind) => debug!("{padding}archiver finished: {kind:?}"),
            // Only reported in strict mode; whatever was written doesn't count.
            ExtractOutcome::Failed(err @ ArchiverError::BadExitCode(_)) => {
                return Err(ModuleError::Rejected(err));
            }
            ExtractOutcome::Failed(err) => debug!("{padding}archiver failed: {err}"),
        }

        let staged = staging.path().join(expected);
        if !staged.is_file() {
            if !self.decompressor.probe(archive_path) {
                return Err(ModuleError::Unsupported(archive_path.to_path_buf()));
            }
            return Err(ModuleError::NotConfirmed(module_path.to_path_buf()));
        }

        fs::rename(&staged, module_path).map_err(|source| ModuleError::Rename {
            path: module_path.to_path_buf(),
            source,
        })?;

        info!("{padding}Successful LZH decompression!");
        Ok(())
    }
}

fn open_frame(buffer: Vec<u8>, output: &Path, depth: usize) -> Result<Frame> {
    let extract_dir = with_suffix(output, EXTRACTED_SUFFIX);
    recreate_dir(&extract_dir)?;

    Ok(Frame {
        buffer,
        extract_dir,
        depth,
        cursor: 0,
        names: NameAllocator::default(),
    })
}
