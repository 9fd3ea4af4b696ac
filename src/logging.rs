//! Log output setup.
//!
//! Library code only emits `tracing` events; nothing is printed until a
//! subscriber is installed. Targets follow the module tree
//! (`dexopt::pass`, `dexopt::regalloc`, `dexopt::reachability`, ...).

use tracing::level_filters::LevelFilter;

use crate::config::ConfigError;

pub fn parse_level(level: &str) -> Result<LevelFilter, ConfigError> {
    level
        .trim()
        .parse::<LevelFilter>()
        .map_err(|_| ConfigError::Invalid(format!("unknown log level '{}'", level)))
}

/// Install a formatting subscriber at `level`. A subscriber that is already
/// installed is kept.
pub fn init_logging(level: &str) -> Result<(), ConfigError> {
    let filter = parse_level(level)?;
    let _ = tracing_subscriber::fmt()
        .with_max_level(filter)
        .with_target(true)
        .try_init();
    Ok(())
}
