//! Command-line interface definitions for selfload.

use std::path::PathBuf;

use clap::Parser;

/// Map a SELF shared library and list the modules it imports.
#[derive(Parser)]
#[command(name = "selfload", version, about)]
pub struct Cli {
    /// Path to the SELF module.
    pub path: PathBuf,

    /// Print the report as JSON instead of text.
    #[arg(long)]
    pub json: bool,

    /// Accept files whose ELF identification bytes are not ELF32 little-endian.
    #[arg(long)]
    pub no_verify_ident: bool,

    /// Suppress diagnostics; show only errors.
    #[arg(long, short = 'q', conflicts_with = "verbose")]
    pub quiet: bool,

    /// Enable debug diagnostics.
    #[arg(long, short = 'v')]
    pub verbose: bool,
}
