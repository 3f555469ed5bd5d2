//! Logging setup for front ends embedding hdlbuild
//!
//! The library only emits `tracing` events; installing a subscriber is left to
//! the caller. [`init`] is the default fmt subscriber used by command shells.

use tracing::Level;
use tracing_subscriber::EnvFilter;

/// Level selected by the verbosity flags
pub fn level_for(verbose: u8, quiet: bool) -> Level {
    if quiet {
        return Level::ERROR;
    }
    match verbose {
        0 => Level::WARN,
        1 => Level::INFO,
        2 => Level::DEBUG,
        _ => Level::TRACE,
    }
}

/// Install a fmt subscriber honouring `RUST_LOG`
///
/// Returns `false` when a global subscriber was already installed.
pub fn init(verbose: u8, quiet: bool) -> bool {
    let filter = EnvFilter::from_default_env().add_directive(level_for(verbose, quiet).into());

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(verbose > 1)
        .try_init()
        .is_ok()
}
