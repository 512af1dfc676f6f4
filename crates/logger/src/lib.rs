//! # Process Logger
//!
//! One `tracing` subscriber per process, configured from the environment the first
//! time it is asked for:
//!
//! - `LOG_LEVEL`: `debug`, `info`, `warn` or `error` (any case, default `info`).
//! - `LOG_FORMAT`: `json` for JSON lines, anything else for colored `key=value` text.
//! - `NO_COLOR`: set to disable ANSI colors on text output.
//!
//! Code logs through the regular `tracing` macros. Tests that want to look at the
//! output build their own subscriber with [`subscriber`] and scope it with
//! `tracing::subscriber::with_default` instead of touching the global one.

pub mod error;
pub mod format;
pub mod settings;

pub use error::LoggerError;
pub use format::ColorFormat;
pub use settings::{LogFormat, LogSettings, parse_format, parse_level};

use std::sync::OnceLock;
use tracing::Subscriber;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::fmt::MakeWriter;

static SETTINGS: OnceLock<LogSettings> = OnceLock::new();

/// Builds a subscriber for `settings` that writes to `writer`.
pub fn subscriber<W>(settings: &LogSettings, writer: W) -> Box<dyn Subscriber + Send + Sync>
where
    W: for<'w> MakeWriter<'w> + Send + Sync + 'static,
{
    let filter = EnvFilter::new(settings.level.as_str().to_ascii_lowercase());

    match settings.format {
        LogFormat::Json => Box::new(
            tracing_subscriber::fmt()
                .json()
                .with_env_filter(filter)
                .with_current_span(false)
                .with_writer(writer)
                .finish(),
        ),
        LogFormat::Text => Box::new(
            tracing_subscriber::fmt()
                .with_env_filter(filter)
                .event_format(ColorFormat::new(settings.color))
                .with_writer(writer)
                .finish(),
        ),
    }
}

/// Installs the process logger, writing to stdout.
///
/// Loads `.env` first (existing variables win). Only the first successful call
/// installs anything; later calls hand back the settings already in effect.
pub fn try_init() -> Result<&'static LogSettings, LoggerError> {
    if let Some(settings) = SETTINGS.get() {
        return Ok(settings);
    }

    let _ = dotenvy::dotenv();
    let settings = LogSettings::from_env();
    tracing::subscriber::set_global_default(subscriber(&settings, std::io::stdout))?;

    Ok(SETTINGS.get_or_init(|| settings))
}

/// Like [`try_init`], but a subscriber installed by someone else is reported on
/// stderr rather than returned.
pub fn init() -> &'static LogSettings {
    match try_init() {
        Ok(settings) => settings,
        Err(e) => {
            eprintln!("logger: {e}");
            SETTINGS.get_or_init(LogSettings::from_env)
        }
    }
}

/// The settings of the process logger, initializing it on first use.
pub fn settings() -> &'static LogSettings {
    init()
}
