use serde::Deserialize;

use crate::error::OdcsError;

use super::{http_client, map_status_err, map_transport_err};

#[derive(Debug, Clone, Deserialize)]
pub struct PulpRepository {
  pub content_set: String,
  pub arch: String,
  pub url: String,
  /// Acceptable signing keys for this repository. SPEC_FULL §D / spec.md
  /// §9 open question: repositories backing the same content set that
  /// disagree on sigkeys are a `ValidationFailure`, not a silent
  /// intersection.
  #[serde(default)]
  pub sigkeys: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct RepositoriesResponse {
  repositories: Vec<PulpRepository>,
}

pub struct PulpClient {
  base_url: String,
  username: Option<String>,
  password: Option<String>,
  client: reqwest::Client,
}

impl PulpClient {
  pub fn new(
    base_url: impl Into<String>,
    username: Option<String>,
    password: Option<String>,
  ) -> Self {
    Self {
      base_url: base_url.into(),
      username,
      password,
      client: http_client(),
    }
  }

  /// Repository URLs for the given content sets, merged by arch. Pulp
  /// composes never go through the Resolver (spec §4.2) and are never
  /// dedup-reused (spec §4.3); this is consulted directly by the Worker
  /// when writing the repo-file artifact (spec §4.8).
  pub async fn repositories_for(
    &self,
    content_sets: &[String],
    arches: &[String],
    include_unpublished: bool,
  ) -> Result<Vec<PulpRepository>, OdcsError> {
    let url = format!("{}/api/v2/repositories/search/", self.base_url);
    let mut request = self.client.post(&url).json(&serde_json::json!({
      "content_sets": content_sets,
      "arches": arches,
      "include_unpublished": include_unpublished,
    }));
    if let (Some(user), Some(pass)) = (&self.username, &self.password) {
      request = request.basic_auth(user, Some(pass));
    }
    let response = request
      .send()
      .await
      .map_err(|e| map_transport_err("pulp: searching repositories", e))?;
    let status = response.status();
    if !status.is_success() {
      let body = response.text().await.unwrap_or_default();
      return Err(map_status_err("pulp: searching repositories", status, &body));
    }
    Ok(
      response
        .json::<RepositoriesResponse>()
        .await
        .map_err(|e| {
          OdcsError::ResolutionError(format!(
            "pulp: malformed repositories response: {e}"
          ))
        })?
        .repositories,
    )
  }
}
