use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};
use typeshare::typeshare;

#[typeshare]
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogConfig {
  pub level: LogLevel,
  pub stdio: StdioLogMode,
  /// Use `tracing_subscriber::fmt::layer().pretty()` instead of the
  /// compact single-line formatter. Ignored when `stdio = json`.
  pub pretty: bool,
  pub location: bool,
  pub ansi: bool,
  /// Empty string disables OTLP export.
  #[serde(default)]
  pub otlp_endpoint: String,
  #[serde(default = "default_service_name")]
  pub opentelemetry_service_name: String,
  #[serde(default = "default_scope_name")]
  pub opentelemetry_scope_name: String,
}

fn default_service_name() -> String {
  "odcs".to_string()
}

fn default_scope_name() -> String {
  "odcs".to_string()
}

#[typeshare]
#[derive(
  Debug, Clone, Copy, Default, Display, EnumString, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum StdioLogMode {
  #[default]
  Standard,
  Json,
  None,
}

#[typeshare]
#[derive(
  Debug, Clone, Copy, Default, Display, EnumString, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum LogLevel {
  Error,
  Warn,
  #[default]
  Info,
  Debug,
  Trace,
}

impl From<LogLevel> for tracing::Level {
  fn from(level: LogLevel) -> Self {
    match level {
      LogLevel::Error => tracing::Level::ERROR,
      LogLevel::Warn => tracing::Level::WARN,
      LogLevel::Info => tracing::Level::INFO,
      LogLevel::Debug => tracing::Level::DEBUG,
      LogLevel::Trace => tracing::Level::TRACE,
    }
  }
}
