use serde::{Deserialize, Serialize};
use typeshare::typeshare;

/// Exists for audit; not central to orchestration. Populated by whatever
/// auth backend (Kerberos / OpenID Connect / anonymous) authenticated the
/// request — those backends are out of scope here and are treated as
/// already having produced this record.
#[typeshare]
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
  #[serde(
    default,
    rename = "_id",
    skip_serializing_if = "Option::is_none"
  )]
  pub id: Option<i64>,
  pub username: String,
  #[serde(default)]
  pub developer: bool,
  #[serde(default)]
  pub admin: bool,
}
