use std::{path::PathBuf, sync::OnceLock};

use odcs_client::entities::logger::{LogConfig, LogLevel, StdioLogMode};
use serde::Deserialize;

/// Mirrors the teacher's `core_config()` singleton: load once at startup,
/// read everywhere else through this accessor. Every secret/credential
/// field additionally supports a `<FIELD>_FILE` env var pointing at a file
/// holding the value, so deployments can mount secrets rather than putting
/// them directly in the environment.
pub fn odcs_config() -> &'static OdcsConfig {
  static CONFIG: OnceLock<OdcsConfig> = OnceLock::new();
  CONFIG.get_or_init(|| match OdcsConfig::load() {
    Ok(config) => config,
    Err(e) => {
      eprintln!("FATAL: failed to load config | {e:#} | Exiting...");
      std::process::exit(1)
    }
  })
}

#[derive(Debug, Clone, Deserialize)]
struct Env {
  #[serde(default = "default_port")]
  pub port: u16,

  pub odcs_mongo_uri: String,
  #[serde(default = "default_mongo_db_name")]
  pub odcs_mongo_db_name: String,

  pub odcs_target_dir: PathBuf,
  pub odcs_target_dir_url: String,

  #[serde(default = "default_max_seconds_to_live")]
  pub odcs_max_seconds_to_live: i64,
  #[serde(default = "default_seconds_to_live")]
  pub odcs_seconds_to_live: i64,

  #[serde(default = "default_tool_pool_size")]
  pub odcs_tool_pool_size: usize,
  #[serde(default = "default_pulp_pool_size")]
  pub odcs_pulp_pool_size: usize,

  #[serde(default = "default_scheduler_tick_ms")]
  pub odcs_scheduler_tick_ms: u64,
  #[serde(default = "default_expirer_tick_ms")]
  pub odcs_expirer_tick_ms: u64,
  #[serde(default = "default_wait_threshold_ms")]
  pub odcs_wait_threshold_ms: i64,

  pub odcs_tool_path: PathBuf,
  #[serde(default = "default_tool_timeout_secs")]
  pub odcs_tool_timeout_secs: u64,
  pub odcs_tool_config_validate: Option<PathBuf>,

  pub odcs_mbs_url: Option<String>,
  pub odcs_koji_url: Option<String>,
  pub odcs_pulp_url: Option<String>,
  pub odcs_pulp_username: Option<String>,
  pub odcs_pulp_password: Option<String>,

  #[serde(default)]
  pub odcs_raw_config_urls: String,
  pub odcs_raw_config_wrapper: Option<PathBuf>,

  #[serde(default)]
  pub odcs_logging_level: LogLevel,
  #[serde(default)]
  pub odcs_logging_stdio: StdioLogMode,
  #[serde(default = "default_true")]
  pub odcs_logging_pretty: bool,
  #[serde(default)]
  pub odcs_logging_otlp_endpoint: String,
}

fn default_port() -> u16 {
  8080
}
fn default_mongo_db_name() -> String {
  "odcs".to_string()
}
fn default_max_seconds_to_live() -> i64 {
  60 * 60 * 24 * 7 // one week
}
fn default_seconds_to_live() -> i64 {
  60 * 60 * 24 // one day
}
fn default_tool_pool_size() -> usize {
  4
}
fn default_pulp_pool_size() -> usize {
  2
}
fn default_scheduler_tick_ms() -> u64 {
  1_000
}
fn default_expirer_tick_ms() -> u64 {
  10_000
}
fn default_wait_threshold_ms() -> i64 {
  3 * 60 * 1_000
}
fn default_tool_timeout_secs() -> u64 {
  60 * 60 * 3 // 3 hours
}
fn default_true() -> bool {
  true
}

/// One configured `raw_config` source: a name usable in `source = "name#commit"`,
/// its git url, and the commit used when none is given after `#`.
#[derive(Debug, Clone)]
pub struct RawConfigSource {
  pub name: String,
  pub git_url: String,
  pub default_commit: String,
}

#[derive(Debug, Clone)]
pub struct OdcsConfig {
  pub port: u16,

  pub mongo_uri: String,
  pub mongo_db_name: String,

  pub target_dir: PathBuf,
  pub target_dir_url: String,

  pub max_seconds_to_live: i64,
  pub default_seconds_to_live: i64,

  pub tool_pool_size: usize,
  pub pulp_pool_size: usize,

  pub scheduler_tick_ms: u64,
  pub expirer_tick_ms: u64,
  pub wait_threshold_ms: i64,

  pub tool_path: PathBuf,
  pub tool_timeout_secs: u64,
  pub tool_config_validate: Option<PathBuf>,

  pub mbs_url: Option<String>,
  pub koji_url: Option<String>,
  pub pulp_url: Option<String>,
  pub pulp_username: Option<String>,
  pub pulp_password: Option<String>,

  pub raw_config_sources: Vec<RawConfigSource>,
  pub raw_config_wrapper: Option<PathBuf>,

  pub log: LogConfig,
}

impl OdcsConfig {
  fn load() -> anyhow::Result<Self> {
    let env: Env = envy::from_env()
      .map_err(|e| anyhow::anyhow!("failed to parse environment: {e}"))?;

    let pulp_password = maybe_read_from_file(
      "ODCS_PULP_PASSWORD_FILE",
      env.odcs_pulp_password.clone(),
    );

    let raw_config_sources = env
      .odcs_raw_config_urls
      .split(',')
      .filter(|s| !s.trim().is_empty())
      .filter_map(|entry| {
        // NAME=git_url@default_commit
        let (name, rest) = entry.split_once('=')?;
        let (git_url, default_commit) =
          rest.split_once('@').unwrap_or((rest, "master"));
        Some(RawConfigSource {
          name: name.trim().to_string(),
          git_url: git_url.trim().to_string(),
          default_commit: default_commit.trim().to_string(),
        })
      })
      .collect();

    Ok(Self {
      port: env.port,
      mongo_uri: env.odcs_mongo_uri,
      mongo_db_name: env.odcs_mongo_db_name,
      target_dir: env.odcs_target_dir,
      target_dir_url: env.odcs_target_dir_url,
      max_seconds_to_live: env.odcs_max_seconds_to_live,
      default_seconds_to_live: env.odcs_seconds_to_live,
      tool_pool_size: env.odcs_tool_pool_size,
      pulp_pool_size: env.odcs_pulp_pool_size,
      scheduler_tick_ms: env.odcs_scheduler_tick_ms,
      expirer_tick_ms: env.odcs_expirer_tick_ms,
      wait_threshold_ms: env.odcs_wait_threshold_ms,
      tool_path: env.odcs_tool_path,
      tool_timeout_secs: env.odcs_tool_timeout_secs,
      tool_config_validate: env.odcs_tool_config_validate,
      mbs_url: env.odcs_mbs_url,
      koji_url: env.odcs_koji_url,
      pulp_url: env.odcs_pulp_url,
      pulp_username: env.odcs_pulp_username,
      pulp_password,
      raw_config_sources,
      raw_config_wrapper: env.odcs_raw_config_wrapper,
      log: LogConfig {
        level: env.odcs_logging_level,
        stdio: env.odcs_logging_stdio,
        pretty: env.odcs_logging_pretty,
        location: false,
        ansi: true,
        otlp_endpoint: env.odcs_logging_otlp_endpoint,
        opentelemetry_service_name: "odcs".to_string(),
        opentelemetry_scope_name: "odcs".to_string(),
      },
    })
  }

  pub fn clamp_seconds_to_live(&self, requested: Option<i64>) -> i64 {
    requested
      .unwrap_or(self.default_seconds_to_live)
      .clamp(0, self.max_seconds_to_live)
  }

  pub fn find_raw_config_source(
    &self,
    name: &str,
  ) -> Option<&RawConfigSource> {
    self.raw_config_sources.iter().find(|s| s.name == name)
  }
}

/// `<FIELD>_FILE` convention: if the named env var is set, its content
/// (trimmed) overrides `value`. Matches how the teacher's private
/// `environment_file` crate resolves secret overrides, reimplemented here
/// since that crate's source was not available to copy.
fn maybe_read_from_file(
  file_env_var: &str,
  value: Option<String>,
) -> Option<String> {
  match std::env::var(file_env_var) {
    Ok(path) => match std::fs::read_to_string(&path) {
      Ok(contents) => Some(contents.trim().to_string()),
      Err(e) => {
        tracing::warn!(
          "failed to read {file_env_var} at {path} | {e:#} | falling back to inline value"
        );
        value
      }
    },
    Err(_) => value,
  }
}
