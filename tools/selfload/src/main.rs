//! SELF module inspector.
//!
//! Maps a SELF shared library into this process and prints the module name
//! and the modules it imports. Exits non-zero if any load step fails.

mod cli;
mod logger;
mod report;

use anyhow::{Context, Result};
use clap::Parser;
use sce_elf::{LoadOptions, SelfLibrary};

fn main() -> Result<()> {
    let cli = cli::Cli::parse();
    logger::init(cli.quiet, cli.verbose);

    let options = LoadOptions {
        verify_ident: !cli.no_verify_ident,
    };
    let lib = SelfLibrary::load(&cli.path, &options)
        .with_context(|| format!("failed to load {}", cli.path.display()))?;

    let report = report::Report::new(&lib);
    let mut out = std::io::stdout().lock();
    if cli.json {
        report.write_json(&mut out)?;
    } else {
        report.write_text(&mut out)?;
    }
    Ok(())
}
