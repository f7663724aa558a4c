//! Diagnostics for the command-line client.
//!
//! Logs always go to stderr so they never interleave with listings or the
//! conversation printed on stdout. The CLI stays quiet unless `-v` is given
//! or `RUST_LOG` says otherwise.

use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Compact,
    Pretty,
    Json,
}

impl LogFormat {
    /// Reads a `LOG_FORMAT` value; anything unknown falls back to compact lines.
    pub fn parse(value: Option<&str>) -> Self {
        match value.map(|v| v.trim().to_ascii_lowercase()).as_deref() {
            Some("json") => LogFormat::Json,
            Some("pretty") => LogFormat::Pretty,
            _ => LogFormat::Compact,
        }
    }
}

/// Filter directives used when `RUST_LOG` is unset, by `-v` count.
pub fn default_directives(verbosity: u8) -> &'static str {
    match verbosity {
        0 => "warn",
        1 => "warn,sinistres=info,sinistres_client=info,sinistres_core=info",
        _ => "info,sinistres=debug,sinistres_client=debug,sinistres_core=debug",
    }
}

pub fn init_tracing(verbosity: u8) {
    let format = LogFormat::parse(std::env::var("LOG_FORMAT").ok().as_deref());
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_directives(verbosity)));
    let registry = tracing_subscriber::registry().with(env_filter);
    let layer = fmt::layer().with_writer(std::io::stderr);

    match format {
        LogFormat::Compact => registry.with(layer.compact().without_time()).init(),
        LogFormat::Pretty => registry.with(layer.pretty()).init(),
        LogFormat::Json => registry.with(layer.json().with_target(true)).init(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_log_format_parse() {
        assert_eq!(LogFormat::parse(Some("json")), LogFormat::Json);
        assert_eq!(LogFormat::parse(Some(" Pretty ")), LogFormat::Pretty);
        assert_eq!(LogFormat::parse(Some("yaml")), LogFormat::Compact);
        assert_eq!(LogFormat::parse(None), LogFormat::Compact);
    }

    #[test]
    fn test_default_directives_parse() {
        for verbosity in 0..3 {
            let directives = default_directives(verbosity);
            assert!(EnvFilter::try_new(directives).is_ok(), "{directives}");
        }
        assert_eq!(default_directives(0), "warn");
    }
}
