use std::{path::PathBuf, process::ExitCode};

use anyhow::Result;
use clap::Parser;
use log::{error, info};

use award_extract::{
    archiver::SevenZip,
    batch::{collect_inputs, process_inputs},
    extract::{ExtractOptions, Extractor, DEFAULT_MAX_DEPTH},
};

const TITLE: &str = concat!("Award BIOS Module Extractor v", env!("CARGO_PKG_VERSION"));

/// Extract the LZH modules embedded in Award BIOS images
///
/// Each input X is extracted to OUTPUT_DIR/X_extracted/.  Modules that contain modules are
/// extracted again, into <module>_extracted/ next to them.  The exit status is the number of
/// inputs that could not be completely extracted.
#[derive(Debug, Parser)]
#[clap(name = "award-extract", version)]
struct App {
    /// Award BIOS images, or directories to search for them
    #[clap(required = true)]
    inputs: Vec<PathBuf>,

    /// Directory that receives the extracted trees
    #[clap(long, short, default_value = ".")]
    output_dir: PathBuf,

    /// The 7-Zip executable used for decompression
    #[clap(long, env = "AWARD_EXTRACT_7Z", default_value = "7z")]
    sevenzip: PathBuf,

    /// Treat 7-Zip exit codes other than 0 (ok) and 1 (warning) as failures
    #[clap(long)]
    strict: bool,

    /// Don't look for modules inside of modules nested deeper than this
    #[clap(long, default_value_t = DEFAULT_MAX_DEPTH)]
    max_depth: usize,
}

fn run(args: App) -> Result<usize> {
    let inputs = collect_inputs(&args.inputs)?;
    let sevenzip = SevenZip::new(args.sevenzip, args.strict);
    let extractor = Extractor::new(
        &sevenzip,
        ExtractOptions {
            max_depth: args.max_depth,
        },
    );

    Ok(process_inputs(&inputs, &args.output_dir, &extractor))
}

fn main() -> ExitCode {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .format_timestamp(None)
        .format_target(false)
        .init();

    let args = App::parse();
    info!("{TITLE}");

    let failures = match run(args) {
        Ok(failures) => failures,
        Err(err) => {
            error!("{err:#}");
            return ExitCode::FAILURE;
        }
    };

    info!("Done!");

    // The count would wrap around to "success" past 255.
    ExitCode::from(u8::try_from(failures).unwrap_or(u8::MAX))
}
