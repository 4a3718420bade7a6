use std::env;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum OutputFormat {
    Text,
    Json,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct OutputConfig {
    pub format: OutputFormat,
    pub pretty: bool,
}

impl OutputConfig {
    /// `--json` always wins; otherwise FEEDPULSE_OUTPUT_FORMAT decides.
    pub fn from_env() -> Self {
        let format = if crate::telemetry::config::json_mode() {
            OutputFormat::Json
        } else {
            match env::var("FEEDPULSE_OUTPUT_FORMAT").ok().as_deref() {
                Some("json") => OutputFormat::Json,
                _ => OutputFormat::Text,
            }
        };
        let pretty = matches!(
            env::var("FEEDPULSE_OUTPUT_PRETTY").ok().as_deref(),
            Some(v) if v.eq_ignore_ascii_case("1") || v.eq_ignore_ascii_case("true") || v.eq_ignore_ascii_case("yes")
        );
        OutputConfig { format, pretty }
    }
}
