//! Stderr backend for the `log` facade.
//!
//! Three levels controlled by CLI flags:
//! - **Quiet** (`-q`): errors only
//! - **Default** (no flag): info and above
//! - **Verbose** (`-v`): everything, with the emitting module

use std::io::Write;

use log::{LevelFilter, Log, Metadata, Record};

/// Writes every enabled record to stderr.
struct StderrLogger;

static LOGGER: StderrLogger = StderrLogger;

/// Install the logger with a level chosen from the CLI flags.
///
/// Calling this more than once keeps the first logger and only updates the level.
pub fn init(quiet: bool, verbose: bool) {
    let level = if quiet {
        LevelFilter::Error
    } else if verbose {
        LevelFilter::Debug
    } else {
        LevelFilter::Info
    };
    let _ = log::set_logger(&LOGGER);
    log::set_max_level(level);
}

impl Log for StderrLogger {
    fn enabled(&self, metadata: &Metadata) -> bool {
        metadata.level() <= log::max_level()
    }

    fn log(&self, record: &Record) {
        if !self.enabled(record.metadata()) {
            return;
        }
        let mut err = std::io::stderr().lock();
        let _ = if log::max_level() >= LevelFilter::Debug {
            writeln!(
                err,
                "[{:5}] {}: {}",
                record.level(),
                record.target(),
                record.args()
            )
        } else {
            writeln!(err, "[{:5}] {}", record.level(), record.args())
        };
    }

    fn flush(&self) {
        let _ = std::io::stderr().flush();
    }
}
