use std::backtrace::{Backtrace, BacktraceStatus};
use std::panic::PanicHookInfo;

use tracing::Level;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{Layer, filter::EnvFilter, fmt};

const ENV_DEBUG: &str = "PROCESSING_STATUS_DEBUG";

/// How log lines are rendered on stderr.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum LogFormat {
    /// Human readable, for local debugging.
    Text,
    /// One flattened JSON object per event.
    Json,
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct LogSettings {
    format: LogFormat,
    /// Directive used when RUST_LOG is not set.
    default_directive: &'static str,
}

impl LogSettings {
    fn from_debug_flag(flag: Option<&str>) -> Self {
        let debug = flag.is_some_and(|v| v.trim().eq_ignore_ascii_case("true"));
        if debug {
            LogSettings {
                format: LogFormat::Text,
                default_directive: "debug",
            }
        } else {
            LogSettings {
                format: LogFormat::Json,
                default_directive: "info",
            }
        }
    }
}

/// Logs a panic as a single `error!` event so it shows up in the structured log stream.
fn report_panic(panic_info: &PanicHookInfo<'_>) {
    // only captured when RUST_BACKTRACE or RUST_LIB_BACKTRACE is set
    let backtrace = Backtrace::capture();
    let payload = panic_info
        .payload()
        .downcast_ref::<&str>()
        .copied()
        .or_else(|| panic_info.payload().downcast_ref::<String>().map(String::as_str));

    match (panic_info.location(), payload) {
        (Some(location), Some(payload)) if backtrace.status() != BacktraceStatus::Captured => {
            tracing::error!(
                panic.file = location.file(),
                panic.line = location.line(),
                panic.column = location.column(),
                "{payload}"
            );
        }
        _ => tracing::error!("{panic_info}\n{backtrace}"),
    }
}

/// Installs the global subscriber. Events go to stderr, stdout carries the command output.
pub fn register() {
    let settings = LogSettings::from_debug_flag(std::env::var(ENV_DEBUG).ok().as_deref());

    let filter = EnvFilter::builder()
        .with_default_directive(
            settings
                .default_directive
                .parse()
                .unwrap_or(Level::INFO.into()),
        )
        .from_env_lossy();

    let layer = match settings.format {
        LogFormat::Text => fmt::layer().with_writer(std::io::stderr).boxed(),
        LogFormat::Json => fmt::layer()
            .with_writer(std::io::stderr)
            .with_ansi(false)
            .json()
            .flatten_event(true)
            .boxed(),
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(layer)
        .init();

    std::panic::set_hook(Box::new(report_panic));
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_debug_flag() {
        let debug = LogSettings::from_debug_flag(Some("TRUE"));
        assert_eq!(debug.format, LogFormat::Text);
        assert_eq!(debug.default_directive, "debug");

        for flag in [None, Some("false"), Some("1"), Some("")] {
            let settings = LogSettings::from_debug_flag(flag);
            assert_eq!(settings.format, LogFormat::Json, "{flag:?}");
            assert_eq!(settings.default_directive, "info");
        }
    }

    #[test]
    fn test_default_directives_parse() {
        for flag in [Some("true"), None] {
            let settings = LogSettings::from_debug_flag(flag);
            assert!(
                settings
                    .default_directive
                    .parse::<tracing_subscriber::filter::Directive>()
                    .is_ok()
            );
        }
    }
}
