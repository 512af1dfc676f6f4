//! The `key=value` text format, optionally wrapped in one ANSI color per line.

use std::fmt::{self, Write as _};
use tracing::field::{Field, Visit};
use tracing::{Event, Level, Subscriber};
use tracing_subscriber::fmt::format::Writer;
use tracing_subscriber::fmt::{FmtContext, FormatEvent, FormatFields};
use tracing_subscriber::registry::LookupSpan;

pub const COLOR_RESET: &str = "\x1b[0m";
pub const COLOR_GRAY: &str = "\x1b[90m";
pub const COLOR_BLUE: &str = "\x1b[34m";
pub const COLOR_YELLOW: &str = "\x1b[33m";
pub const COLOR_RED: &str = "\x1b[31m";

/// The color a whole line is painted with for a given level.
pub fn level_color(level: &Level) -> &'static str {
    match *level {
        Level::TRACE | Level::DEBUG => COLOR_GRAY,
        Level::INFO => COLOR_BLUE,
        Level::WARN => COLOR_YELLOW,
        _ => COLOR_RED,
    }
}

/// Formats each event as `time=... level=... msg="..." key=value ...`.
///
/// With `color` set, the entire line (timestamp and fields included) is wrapped in
/// the level's color and the color is reset before the newline, so a line never
/// bleeds into the next one.
#[derive(Debug, Clone, Copy)]
pub struct ColorFormat {
    color: bool,
}

impl ColorFormat {
    pub fn new(color: bool) -> Self {
        Self { color }
    }
}

impl<S, N> FormatEvent<S, N> for ColorFormat
where
    S: Subscriber + for<'a> LookupSpan<'a>,
    N: for<'a> FormatFields<'a> + 'static,
{
    fn format_event(
        &self,
        _ctx: &FmtContext<'_, S, N>,
        mut writer: Writer<'_>,
        event: &Event<'_>,
    ) -> fmt::Result {
        let level = event.metadata().level();
        let line = render_line(level, event)?;

        if self.color {
            writeln!(writer, "{}{}{}", level_color(level), line, COLOR_RESET)
        } else {
            writeln!(writer, "{line}")
        }
    }
}

fn render_line(level: &Level, event: &Event<'_>) -> Result<String, fmt::Error> {
    let mut fields = FieldCollector::default();
    event.record(&mut fields);

    let mut line = String::new();
    let now = chrono::Local::now().format("%Y-%m-%dT%H:%M:%S%.3f%:z");
    write!(line, "time={now} level={level} msg={}", quote(&fields.message))?;
    for (key, value) in &fields.pairs {
        write!(line, " {key}={value}")?;
    }
    Ok(line)
}

#[derive(Default)]
struct FieldCollector {
    message: String,
    pairs: Vec<(&'static str, String)>,
}

impl Visit for FieldCollector {
    fn record_str(&mut self, field: &Field, value: &str) {
        if field.name() == "message" {
            self.message = value.to_string();
        } else {
            self.pairs.push((field.name(), quote(value)));
        }
    }

    fn record_debug(&mut self, field: &Field, value: &dyn fmt::Debug) {
        let rendered = format!("{value:?}");
        if field.name() == "message" {
            self.message = rendered;
        } else {
            self.pairs.push((field.name(), quote(&rendered)));
        }
    }
}

// Values are quoted only when they would otherwise be ambiguous to split on.
fn quote(value: &str) -> String {
    let needs_quotes = value.is_empty()
        || value
            .chars()
            .any(|c| c.is_whitespace() || c == '=' || c == '"' || c.is_control());
    if needs_quotes {
        format!("{value:?}")
    } else {
        value.to_string()
    }
}
