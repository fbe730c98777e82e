use tracing_subscriber::EnvFilter;

/// Log line format selected by `BARLOOP_LOG_FORMAT`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum LogFormat {
    Plain,
    Json,
}

/// Install the global stderr subscriber. `BARLOOP_LOG` wins over `RUST_LOG`,
/// and nothing below `warn` is shown by default.
///
/// A subscriber that is already installed is left in place.
pub fn init() {
    let builder = tracing_subscriber::fmt()
        .with_env_filter(env_filter(non_empty_var("BARLOOP_LOG"), non_empty_var("RUST_LOG")))
        .with_writer(std::io::stderr)
        .with_target(false);

    let installed = match log_format(non_empty_var("BARLOOP_LOG_FORMAT").as_deref()) {
        LogFormat::Json => builder.json().try_init(),
        LogFormat::Plain => builder.try_init(),
    };
    if installed.is_err() {
        tracing::debug!("tracing subscriber already installed");
    }
}

fn non_empty_var(name: &str) -> Option<String> {
    std::env::var(name)
        .ok()
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

fn env_filter(barloop_log: Option<String>, rust_log: Option<String>) -> EnvFilter {
    EnvFilter::new(barloop_log.or(rust_log).as_deref().unwrap_or("warn"))
}

fn log_format(value: Option<&str>) -> LogFormat {
    match value {
        Some(v) if v.eq_ignore_ascii_case("json") => LogFormat::Json,
        _ => LogFormat::Plain,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn barloop_log_overrides_rust_log() {
        let filter = env_filter(Some("debug".into()), Some("error".into()));
        assert_eq!(filter.to_string(), "debug");
        assert_eq!(env_filter(None, Some("info".into())).to_string(), "info");
        assert_eq!(env_filter(None, None).to_string(), "warn");
    }

    #[test]
    fn json_format_is_case_insensitive() {
        assert_eq!(log_format(Some("JSON")), LogFormat::Json);
        assert_eq!(log_format(Some("plain")), LogFormat::Plain);
        assert_eq!(log_format(None), LogFormat::Plain);
    }
}
