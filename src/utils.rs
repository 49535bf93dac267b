use slog::Drain;

pub fn get_root_logger(process: String, level: slog::Level) -> slog::Logger {
    let decorator = slog_term::TermDecorator::new().stderr().build();
    let drain = slog_term::FullFormat::new(decorator).build().fuse();
    let drain = slog_async::Async::new(drain).build().fuse();
    let drain = slog::LevelFilter::new(drain, level).fuse();
    slog::Logger::root(drain, o!("process" => process))
}

/// A logger that drops every record.
pub fn discard_logger() -> slog::Logger {
    slog::Logger::root(slog::Discard, o!())
}

/// Pool size used when none is configured.
pub fn default_workers() -> usize {
    num_cpus::get()
}

pub fn parse_level(level: &str) -> anyhow::Result<slog::Level> {
    level
        .parse::<slog::Level>()
        .map_err(|_| anyhow::anyhow!("invalid log level: {}", level))
}

#[test]
fn test_parse_level() {
    assert_eq!(parse_level("debug").unwrap(), slog::Level::Debug);
    assert_eq!(parse_level("warn").unwrap(), slog::Level::Warning);
    assert!(parse_level("loud").is_err());
}

#[test]
fn test_default_workers() {
    assert!(default_workers() >= 1);
}
