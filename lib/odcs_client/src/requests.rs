use serde::{Deserialize, Serialize};
use typeshare::typeshare;

use crate::deserializers::{
  option_space_separated_list, space_separated_list,
};
use crate::entities::compose::{ComposeFlag, ComposeResult, SourceType};

/// Body of `POST /composes`.
#[typeshare]
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewComposeRequest {
  pub source: NewComposeSource,
  #[serde(default)]
  pub flags: Vec<ComposeFlag>,
  #[serde(default)]
  pub results: Vec<ComposeResult>,
  #[serde(
    default,
    deserialize_with = "option_space_separated_list"
  )]
  pub arches: Option<Vec<String>>,
  pub seconds_to_live: Option<i64>,
}

#[typeshare]
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewComposeSource {
  #[serde(rename = "type")]
  pub source_type: SourceType,
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
  pub sigkeys: Option<Vec<String>>,
}

/// Body of `PATCH /composes/{id}`. Meaning depends on the compose's current
/// state: `removed`/`failed` ignore the body and create a resurrection copy;
/// `done` uses `seconds_to_live` to extend `time_to_expire` (spec §4.1, §6).
#[typeshare]
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PatchComposeRequest {
  pub seconds_to_live: Option<i64>,
}

/// Query params of `GET /composes`.
#[typeshare]
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ListComposesQuery {
  #[serde(default)]
  pub owner: Option<String>,
  #[serde(default)]
  pub source_type: Option<SourceType>,
  #[serde(default)]
  pub state: Option<String>,
  #[serde(default)]
  pub page: Option<u64>,
  #[serde(default)]
  pub per_page: Option<u64>,
  #[serde(default)]
  pub order_by: Option<String>,
}
