use std::fmt;

use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};
use typeshare::typeshare;

use crate::deserializers::{
  option_space_separated_list, space_separated_list,
};

use super::I64;

/// The central entity: an on-demand, time-limited package repository
/// produced from a declarative request.
///
/// Unlike the heavier `Resource<Config, Info>` wrapper used for long-lived,
/// user-tagged, permissioned resources elsewhere in this stack, a Compose is
/// a single mutable job record driven through a state machine by exactly one
/// owner at a time (Scheduler while `wait`, one Worker while `generating`,
/// the Expirer on its terminal transition) — closer to a build/update log
/// entry than a taggable resource, so it gets a direct struct.
#[typeshare]
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Compose {
  /// Monotonic identifier, assigned at creation by the Store.
  #[serde(
    default,
    rename = "_id",
    skip_serializing_if = "Option::is_none"
  )]
  pub id: Option<i64>,

  /// Opaque principal string identifying who requested the compose.
  pub owner: String,

  pub source_type: SourceType,

  /// Syntax depends on `source_type`: NSVCs for `module`, a tag name for
  /// `koji_tag`, a filesystem path for `repo`, content-set names for
  /// `pulp`, an NVR list for `build`, or `name#commit` for `raw_config`.
  #[serde(deserialize_with = "space_separated_list")]
  pub source: Vec<String>,

  #[serde(
    default,
    deserialize_with = "option_space_separated_list"
  )]
  pub packages: Option<Vec<String>>,

  #[serde(
    default,
    deserialize_with = "option_space_separated_list"
  )]
  pub builds: Option<Vec<String>>,

  /// Acceptable signing-key ids. Order is irrelevant for reuse equivalence
  /// but preserved here since the tool-config generator renders them in
  /// request order (Pungi tries keys in priority order).
  #[serde(
    default,
    deserialize_with = "space_separated_list"
  )]
  pub sigkeys: Vec<String>,

  #[serde(
    default,
    deserialize_with = "space_separated_list"
  )]
  pub arches: Vec<String>,

  #[serde(
    default,
    deserialize_with = "option_space_separated_list"
  )]
  pub multilib_arches: Option<Vec<String>>,

  #[serde(default)]
  pub multilib_method: Option<String>,

  #[serde(default)]
  pub flags: Vec<ComposeFlag>,

  /// Always includes `Repository`.
  #[serde(default = "default_results")]
  pub results: Vec<ComposeResult>,

  /// Koji event id pinning a tag snapshot, or the opaque `repomd.xml`
  /// revision for `repo` composes. Assigned by the Resolver.
  #[serde(default)]
  pub koji_event: Option<i64>,

  pub state: ComposeState,

  #[serde(default)]
  pub state_reason: String,

  pub time_submitted: I64,

  #[serde(default)]
  pub time_done: Option<I64>,

  #[serde(default)]
  pub time_removed: Option<I64>,

  pub time_to_expire: I64,

  #[serde(default)]
  pub removed_by: Option<String>,

  /// If set, this compose shares its output directory with that compose.
  #[serde(default)]
  pub reused_id: Option<i64>,

  #[serde(default)]
  pub koji_task_id: Option<i64>,

  /// Assigned once the tool's run directory is created.
  #[serde(default)]
  pub pungi_compose_id: Option<String>,
}

fn default_results() -> Vec<ComposeResult> {
  vec![ComposeResult::Repository]
}

impl Compose {
  /// `name = odcs-<reused_id or id>`. Panics if called before `id` is
  /// assigned; the Store always assigns `id` before returning a Compose.
  pub fn name(&self) -> String {
    format!(
      "odcs-{}",
      self.reused_id.or(self.id).expect("compose id assigned")
    )
  }

  pub fn latest_dir(&self) -> String {
    format!("latest-{}-1", self.name())
  }

  pub fn toplevel_dir(&self, target_dir: &std::path::Path) -> std::path::PathBuf {
    target_dir.join(self.latest_dir())
  }

  pub fn result_repo_dir(
    &self,
    target_dir: &std::path::Path,
  ) -> std::path::PathBuf {
    self.toplevel_dir(target_dir).join("compose").join("Temporary")
  }

  pub fn result_repofile_path(
    &self,
    target_dir: &std::path::Path,
  ) -> std::path::PathBuf {
    self.result_repo_dir(target_dir).join(format!("{}.repo", self.name()))
  }

  /// Public URL mirror of `toplevel_dir`.
  pub fn target_dir_url(&self, base_url: &str) -> String {
    format!("{}/{}", base_url.trim_end_matches('/'), self.latest_dir())
  }

  pub fn result_repo_url(&self, base_url: &str) -> String {
    format!("{}/compose/Temporary", self.target_dir_url(base_url))
  }

  pub fn result_repofile_url(&self, base_url: &str) -> String {
    format!("{}/{}.repo", self.result_repo_url(base_url), self.name())
  }

  pub fn has_flag(&self, flag: ComposeFlag) -> bool {
    self.flags.contains(&flag)
  }

  pub fn has_result(&self, result: ComposeResult) -> bool {
    self.results.contains(&result)
  }
}

#[typeshare]
#[derive(
  Debug, Clone, Copy, PartialEq, Eq, Display, EnumString, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum SourceType {
  Module,
  KojiTag,
  Repo,
  Pulp,
  Build,
  RawConfig,
}

#[typeshare]
#[derive(
  Debug,
  Clone,
  Copy,
  PartialEq,
  Eq,
  Default,
  Display,
  EnumString,
  Serialize,
  Deserialize,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum ComposeState {
  #[default]
  Wait,
  Generating,
  Done,
  Failed,
  Removed,
}

impl ComposeState {
  /// Whether `self -> to` is a legal transition per the state machine:
  /// `wait -> generating -> {done, failed}`, `{done, failed} -> removed`.
  pub fn can_transition_to(self, to: ComposeState) -> bool {
    use ComposeState::*;
    matches!(
      (self, to),
      (Wait, Generating)
        | (Generating, Done)
        | (Generating, Failed)
        | (Done, Removed)
        | (Failed, Removed)
    )
  }
}

#[typeshare]
#[derive(
  Debug,
  Clone,
  Copy,
  PartialEq,
  Eq,
  Hash,
  Display,
  EnumString,
  Serialize,
  Deserialize,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum ComposeFlag {
  NoDeps,
  NoInheritance,
  CheckDeps,
  IncludeUnpublishedPulpRepos,
}

#[typeshare]
#[derive(
  Debug,
  Clone,
  Copy,
  PartialEq,
  Eq,
  Hash,
  Display,
  EnumString,
  Serialize,
  Deserialize,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum ComposeResult {
  Repository,
  Iso,
  #[strum(serialize = "boot.iso")]
  #[serde(rename = "boot.iso")]
  BootIso,
  Ostree,
}

impl fmt::Display for Compose {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(
      f,
      "compose[id={:?} state={} source_type={}]",
      self.id, self.state, self.source_type
    )
  }
}

/// Identifies one tool run: written to `work/global/composeinfo-base.json`
/// before the external tool is invoked.
#[typeshare]
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ComposeInfo {
  pub header: ComposeInfoHeader,
  pub payload: ComposeInfoPayload,
}

#[typeshare]
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ComposeInfoHeader {
  #[serde(rename = "type")]
  pub kind: String,
  pub version: String,
}

#[typeshare]
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ComposeInfoPayload {
  pub compose: ComposeInfoCompose,
}

#[typeshare]
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ComposeInfoCompose {
  pub id: String,
  #[serde(rename = "type")]
  pub kind: String,
  pub date: String,
  pub respin: u32,
  pub label: String,
}

impl ComposeInfoHeader {
  pub fn new() -> Self {
    Self {
      kind: "productmd.composeinfo".to_string(),
      version: "1.2".to_string(),
    }
  }
}

impl Default for ComposeInfoHeader {
  fn default() -> Self {
    Self::new()
  }
}

