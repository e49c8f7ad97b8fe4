// dwi-connectome/src/logging.rs

//! Subscriber setup for binaries and examples.

use tracing::Level;
use tracing_subscriber::fmt::format::FmtSpan;
use tracing_subscriber::EnvFilter;

/// 0 -> WARN, 1 -> INFO, 2+ -> DEBUG.
pub fn level_for_verbosity(verbosity: u8) -> Level {
  match verbosity {
    0 => Level::WARN,
    1 => Level::INFO,
    _ => Level::DEBUG,
  }
}

/// Installs a global `fmt` subscriber. `RUST_LOG`, when set, overrides the
/// verbosity-derived level. Calling it twice is harmless.
pub fn init_tracing(verbosity: u8) {
  let level = level_for_verbosity(verbosity);
  let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level.as_str().to_ascii_lowercase()));
  let _ = tracing_subscriber::fmt()
    .with_env_filter(filter)
    .with_span_events(FmtSpan::CLOSE)
    .with_target(false)
    .try_init();
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn verbosity_levels() {
    assert_eq!(level_for_verbosity(0), Level::WARN);
    assert_eq!(level_for_verbosity(1), Level::INFO);
    assert_eq!(level_for_verbosity(7), Level::DEBUG);
  }
}
