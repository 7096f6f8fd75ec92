//! Process settings shared through the core and the log output format,
//! read once at startup from `COMAN_*` environment variables.

use std::path::PathBuf;
use std::str::FromStr;

/// Output format of the process-wide log subscriber.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum LogFormat {
    /// Human-readable multi-line output (development).
    #[default]
    Pretty,
    /// One JSON object per event.
    Json,
}

impl FromStr for LogFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "pretty" | "text" => Ok(Self::Pretty),
            "json" => Ok(Self::Json),
            other => Err(format!("unknown log format: {other}")),
        }
    }
}

/// Process-level settings shared with every module through the core.
///
/// Read once at startup from `COMAN_*` environment variables.
#[derive(Debug, Clone)]
pub struct Settings {
    /// Deployment environment name (`COMAN_ENV`).
    pub env: String,
    /// Default log filter (`COMAN_LOG_LEVEL`), overridden by `RUST_LOG`.
    pub log_level: String,
    /// Log output format (`COMAN_LOG_FORMAT`).
    pub log_format: LogFormat,
    /// Directory for per-module persisted state (`COMAN_DATA_DIR`).
    pub data_dir: PathBuf,
    /// Base URL modules use to call back into the API (`COMAN_API_BASE`).
    pub api_base: String,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            env: "dev".to_string(),
            log_level: "info".to_string(),
            log_format: LogFormat::Pretty,
            data_dir: PathBuf::from("./coman/data"),
            api_base: "http://127.0.0.1:8000".to_string(),
        }
    }
}

impl Settings {
    /// Reads settings from the process environment.
    #[must_use]
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Reads settings through an arbitrary variable lookup. Unset or blank
    /// variables keep their defaults; an unknown log format falls back to
    /// `pretty`.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let var = |key: &str| lookup(key).filter(|value| !value.trim().is_empty());
        let defaults = Self::default();

        let log_format = match var("COMAN_LOG_FORMAT") {
            Some(raw) => raw.parse().unwrap_or_else(|err: String| {
                tracing::warn!(%err, "falling back to pretty log format");
                LogFormat::Pretty
            }),
            None => defaults.log_format,
        };

        Self {
            env: var("COMAN_ENV").unwrap_or(defaults.env),
            log_level: var("COMAN_LOG_LEVEL")
                .map(|level| level.to_ascii_lowercase())
                .unwrap_or(defaults.log_level),
            log_format,
            data_dir: var("COMAN_DATA_DIR").map_or(defaults.data_dir, PathBuf::from),
            api_base: var("COMAN_API_BASE")
                .map(|base| base.trim_end_matches('/').to_string())
                .unwrap_or(defaults.api_base),
        }
    }

    /// Path of a file inside the data directory.
    #[must_use]
    pub fn data_file(&self, name: &str) -> PathBuf {
        self.data_dir.join(name)
    }
}
