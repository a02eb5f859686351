use std::io::IsTerminal;

use crate::core::config::Settings;

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum OutputFormat {
    Text,
    Json,
}

impl OutputFormat {
    /// `--json` wins, then `--format`, then the configured default.
    pub fn resolve(json_flag: bool, format_flag: Option<&str>, settings: &Settings) -> Self {
        if json_flag {
            return OutputFormat::Json;
        }
        match format_flag.unwrap_or(settings.default_format.as_str()) {
            "json" => OutputFormat::Json,
            _ => OutputFormat::Text,
        }
    }
}

#[derive(Debug, Clone)]
pub struct OutputOptions {
    pub format: OutputFormat,
    pub pretty: bool,
    pub use_color: bool,
}

/// Color is on when allowed by the flag and the `color` setting, and for
/// `auto` only when stdout is a terminal and NO_COLOR is unset.
pub fn detect_color(color_flag: bool, setting: &str) -> bool {
    if !color_flag {
        return false;
    }
    match setting {
        "never" => false,
        "always" => true,
        _ => std::env::var("NO_COLOR").is_err() && std::io::stdout().is_terminal(),
    }
}
