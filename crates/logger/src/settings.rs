use tracing::Level;

pub const LOG_LEVEL_VAR: &str = "LOG_LEVEL";
pub const LOG_FORMAT_VAR: &str = "LOG_FORMAT";
pub const NO_COLOR_VAR: &str = "NO_COLOR";

/// Output encoding of the process logger.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    /// One `key=value` line per event, colored by level unless disabled.
    Text,
    /// One JSON object per event.
    Json,
}

/// Everything the logger reads from the environment, resolved once at startup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogSettings {
    pub level: Level,
    pub format: LogFormat,
    /// Wrap text lines in ANSI colors. Has no effect on JSON output.
    pub color: bool,
}

impl LogSettings {
    /// Reads `LOG_LEVEL`, `LOG_FORMAT` and `NO_COLOR` from the process environment.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Resolves the settings through an arbitrary variable lookup.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let level = parse_level(lookup(LOG_LEVEL_VAR).as_deref().unwrap_or_default());
        let format = parse_format(lookup(LOG_FORMAT_VAR).as_deref().unwrap_or_default());
        let color = !no_color(lookup(NO_COLOR_VAR).as_deref().unwrap_or_default());
        Self { level, format, color }
    }
}

impl Default for LogSettings {
    fn default() -> Self {
        Self {
            level: Level::INFO,
            format: LogFormat::Text,
            color: true,
        }
    }
}

/// `debug`, `info`, `warn` or `error` in any letter case; anything else is `INFO`.
pub fn parse_level(value: &str) -> Level {
    match value.trim().to_ascii_uppercase().as_str() {
        "DEBUG" => Level::DEBUG,
        "INFO" => Level::INFO,
        "WARN" => Level::WARN,
        "ERROR" => Level::ERROR,
        _ => Level::INFO,
    }
}

/// `json` selects JSON output, anything else (including nothing) selects text.
pub fn parse_format(value: &str) -> LogFormat {
    if value.trim().eq_ignore_ascii_case("json") {
        LogFormat::Json
    } else {
        LogFormat::Text
    }
}

// Any non-empty value turns color off, except an explicit "0" or "false".
fn no_color(value: &str) -> bool {
    let value = value.trim();
    !(value.is_empty() || value == "0" || value.eq_ignore_ascii_case("false"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn settings_from(vars: &[(&str, &str)]) -> LogSettings {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        LogSettings::from_lookup(|key| vars.get(key).cloned())
    }

    #[test]
    fn level_parsing_is_case_insensitive() {
        let cases = [
            ("DEBUG", Level::DEBUG),
            ("INFO", Level::INFO),
            ("WARN", Level::WARN),
            ("ERROR", Level::ERROR),
            ("debug", Level::DEBUG),
            ("info", Level::INFO),
            ("Debug", Level::DEBUG),
            ("", Level::INFO),
            ("INVALID", Level::INFO),
            ("xyz", Level::INFO),
        ];

        for (input, expected) in cases {
            assert_eq!(parse_level(input), expected, "LOG_LEVEL={input:?}");
        }
    }

    #[test]
    fn format_defaults_to_text() {
        assert_eq!(parse_format("json"), LogFormat::Json);
        assert_eq!(parse_format("JSON"), LogFormat::Json);
        assert_eq!(parse_format("text"), LogFormat::Text);
        assert_eq!(parse_format(""), LogFormat::Text);
        assert_eq!(parse_format("yaml"), LogFormat::Text);
    }

    #[test]
    fn empty_environment_gives_defaults() {
        assert_eq!(settings_from(&[]), LogSettings::default());
    }

    #[test]
    fn environment_is_honored() {
        let settings = settings_from(&[
            (LOG_LEVEL_VAR, "warn"),
            (LOG_FORMAT_VAR, "json"),
            (NO_COLOR_VAR, "TRUE"),
        ]);

        assert_eq!(settings.level, Level::WARN);
        assert_eq!(settings.format, LogFormat::Json);
        assert!(!settings.color);
    }

    #[test]
    fn no_color_values() {
        assert!(!settings_from(&[(NO_COLOR_VAR, "1")]).color);
        assert!(!settings_from(&[(NO_COLOR_VAR, "true")]).color);
        assert!(settings_from(&[(NO_COLOR_VAR, "")]).color);
        assert!(settings_from(&[(NO_COLOR_VAR, "false")]).color);
        assert!(settings_from(&[(NO_COLOR_VAR, "0")]).color);
    }
}
