//! Processing a list of input images.

use std::{
    fs,
    path::{Path, PathBuf},
};

use anyhow::{Context, Result};
use fn_error_context::context;
use log::{error, info};

use crate::{extract::Extractor, signature::contains_marker, util::Padding};

/// Quick check for whether a buffer looks like an Award BIOS image: it must contain at least one
/// module marker.
pub fn is_award_bios(buffer: &[u8]) -> bool {
    contains_marker(buffer)
}

/// Expands the inputs given on the command line: files are taken as they are, directories are
/// walked recursively for the regular files they contain, in sorted order.
#[context("Collecting input files")]
pub fn collect_inputs(paths: &[PathBuf]) -> Result<Vec<PathBuf>> {
    fn walk(dir: &Path, files: &mut Vec<PathBuf>) -> Result<()> {
        let mut entries = fs::read_dir(dir)
            .with_context(|| format!("Reading directory {}", dir.display()))?
            .map(|entry| entry.map(|e| e.path()))
            .collect::<Result<Vec<_>, _>>()?;
        entries.sort();

        for path in entries {
            if path.is_dir() {
                walk(&path, files)?;
            } else if path.is_file() {
                files.push(path);
            }
        }
        Ok(())
    }

    let mut files = vec![];
    for path in paths {
        if path.is_dir() {
            walk(path, &mut files)?;
        } else {
            // Missing files are reported when we try to read them.
            files.push(path.clone());
        }
    }
    Ok(files)
}

/// Extracts each input into `output_dir/<input name>_extracted/`.
///
/// Every input is attempted, whatever happened to the previous ones.  Returns the number of
/// inputs that were not completely extracted: inputs that can't be read, that aren't Award BIOS
/// images, or that had at least one module fail.  A marker whose header doesn't fit in the image
/// counts as a failed module here: it doesn't stop the extraction, but the input is incomplete.
pub fn process_inputs(inputs: &[PathBuf], output_dir: &Path, extractor: &Extractor) -> usize {
    let mut failures = inputs.len();

    for input in inputs {
        let name = input
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| input.display().to_string());
        info!("*** {name}");

        match process_input(input, &name, output_dir, extractor) {
            Ok(true) => failures -= 1,
            Ok(false) => {}
            Err(err) => error!("{}Error: {err:#}", Padding(4)),
        }
    }

    failures
}

fn process_input(
    input: &Path,
    name: &str,
    output_dir: &Path,
    extractor: &Extractor,
) -> Result<bool> {
    let buffer = fs::read(input).with_context(|| format!("Reading {}", input.display()))?;

    if !is_award_bios(&buffer) {
        error!("{}Error: This is not an Award BIOS image!", Padding(4));
        return Ok(false);
    }

    let report = extractor.extract_image(buffer, &output_dir.join(name))?;
    if !report.is_success() {
        error!(
            "{}Error: {} of {} modules could not be extracted",
            Padding(4),
            report.failed(),
            report.results.len()
        );
    }
    Ok(report.is_success())
}
