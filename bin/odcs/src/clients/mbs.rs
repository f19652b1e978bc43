use serde::Deserialize;

use crate::error::OdcsError;

use super::{http_client, map_status_err, map_transport_err};

/// One module build as reported by the Module Build Service. Only the
/// fields the Resolver needs (spec §4.2's module branch).
#[derive(Debug, Clone, Deserialize)]
pub struct ModuleBuild {
  pub name: String,
  pub stream: String,
  pub version: String,
  pub context: String,
  pub state_name: String,
  #[serde(default)]
  pub requires: Vec<ModuleRef>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ModuleRef {
  pub name: String,
  pub stream: String,
}

impl ModuleBuild {
  pub fn nsvc(&self) -> String {
    format!("{}:{}:{}:{}", self.name, self.stream, self.version, self.context)
  }
}

#[derive(Debug, Deserialize)]
struct ModuleBuildsResponse {
  items: Vec<ModuleBuild>,
}

pub struct MbsClient {
  base_url: String,
  client: reqwest::Client,
}

impl MbsClient {
  pub fn new(base_url: impl Into<String>) -> Self {
    Self { base_url: base_url.into(), client: http_client() }
  }

  /// All `ready` builds matching `name:stream[:version[:context]]`, newest
  /// version first. A module name with no matching ready build yields an
  /// empty list, not an error; the Resolver turns that into
  /// `ResolutionError`.
  pub async fn ready_module_builds(
    &self,
    name: &str,
    stream: &str,
    version: Option<&str>,
    context: Option<&str>,
  ) -> Result<Vec<ModuleBuild>, OdcsError> {
    let mut query = vec![
      ("name", name.to_string()),
      ("stream", stream.to_string()),
      ("state", "ready".to_string()),
      ("order_desc_by", "version".to_string()),
    ];
    if let Some(version) = version {
      query.push(("version", version.to_string()));
    }
    if let Some(context) = context {
      query.push(("context", context.to_string()));
    }

    let url = format!("{}/module-build-service/2/module-builds/", self.base_url);
    let response = self
      .client
      .get(&url)
      .query(&query)
      .send()
      .await
      .map_err(|e| map_transport_err("mbs: listing module builds", e))?;

    let status = response.status();
    if !status.is_success() {
      let body = response.text().await.unwrap_or_default();
      return Err(map_status_err("mbs: listing module builds", status, &body));
    }

    let parsed: ModuleBuildsResponse = response
      .json()
      .await
      .map_err(|e| OdcsError::ResolutionError(format!("mbs: malformed response: {e}")))?;
    // Defensive: don't trust the `state=ready` query param alone against a
    // misbehaving or mocked MBS — only actually-ready builds count.
    Ok(parsed.items.into_iter().filter(|b| b.state_name == "ready").collect())
  }
}
