use tracing::Level;
use tracing_subscriber::EnvFilter;

/// Build the log filter. Directives from `RUST_LOG` replace `--log-level`
/// entirely when present; an empty or unparseable value falls back to it.
pub fn env_filter(rust_log: Option<&str>, level: Level) -> EnvFilter {
    rust_log
        .map(str::trim)
        .filter(|directives| !directives.is_empty())
        .and_then(|directives| EnvFilter::try_new(directives).ok())
        .unwrap_or_else(|| EnvFilter::default().add_directive(level.into()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tracing::level_filters::LevelFilter;

    #[test]
    fn log_level_applies_without_rust_log() {
        let filter = env_filter(None, Level::DEBUG);
        assert_eq!(filter.max_level_hint(), Some(LevelFilter::DEBUG));
    }

    #[test]
    fn bare_rust_log_level_wins_over_log_level() {
        let filter = env_filter(Some("warn"), Level::INFO);
        assert_eq!(filter.max_level_hint(), Some(LevelFilter::WARN));
    }

    #[test]
    fn rust_log_targets_are_kept() {
        let filter = env_filter(Some("hookrun_core=trace"), Level::INFO);
        assert_eq!(filter.max_level_hint(), Some(LevelFilter::TRACE));
    }

    #[test]
    fn empty_or_invalid_rust_log_falls_back() {
        let empty = env_filter(Some("  "), Level::WARN);
        assert_eq!(empty.max_level_hint(), Some(LevelFilter::WARN));

        let invalid = env_filter(Some("hookrun=loud"), Level::WARN);
        assert_eq!(invalid.max_level_hint(), Some(LevelFilter::WARN));
    }
}
