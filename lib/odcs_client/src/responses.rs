use serde::{Deserialize, Serialize};
use typeshare::typeshare;

use crate::entities::{
  I64,
  compose::{Compose, ComposeFlag, ComposeResult, ComposeState, SourceType},
};

/// Wire shape of a compose (spec §6 "Response carries the compose JSON").
/// Adds `result_repo`/`result_repofile_url`, both derived from `Compose`'s
/// path-derivation methods plus a configured public base URL, since those
/// are not stored fields.
#[typeshare]
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ComposeResponse {
  pub id: i64,
  pub owner: String,
  pub source_type: SourceType,
  pub source: Vec<String>,
  pub packages: Option<Vec<String>>,
  pub sigkeys: Vec<String>,
  pub arches: Vec<String>,
  pub flags: Vec<ComposeFlag>,
  pub results: Vec<ComposeResult>,
  pub koji_event: Option<i64>,
  pub koji_task_id: Option<i64>,
  pub state: ComposeState,
  pub state_name: String,
  pub state_reason: String,
  pub time_submitted: I64,
  pub time_done: Option<I64>,
  pub time_removed: Option<I64>,
  pub time_to_expire: I64,
  pub removed_by: Option<String>,
  pub reused_id: Option<i64>,
  pub pungi_compose_id: Option<String>,
  pub result_repo: String,
  pub result_repofile_url: String,
}

impl ComposeResponse {
  pub fn from_compose(compose: &Compose, target_dir_url: &str) -> Self {
    Self {
      id: compose.id.expect("compose id assigned"),
      owner: compose.owner.clone(),
      source_type: compose.source_type,
      source: compose.source.clone(),
      packages: compose.packages.clone(),
      sigkeys: compose.sigkeys.clone(),
      arches: compose.arches.clone(),
      flags: compose.flags.clone(),
      results: compose.results.clone(),
      koji_event: compose.koji_event,
      koji_task_id: compose.koji_task_id,
      state: compose.state,
      state_name: compose.state.to_string(),
      state_reason: compose.state_reason.clone(),
      time_submitted: compose.time_submitted,
      time_done: compose.time_done,
      time_removed: compose.time_removed,
      time_to_expire: compose.time_to_expire,
      removed_by: compose.removed_by.clone(),
      reused_id: compose.reused_id,
      pungi_compose_id: compose.pungi_compose_id.clone(),
      result_repo: compose.result_repo_url(target_dir_url),
      result_repofile_url: compose.result_repofile_url(target_dir_url),
    }
  }
}
