use serde::Deserialize;

use crate::error::OdcsError;

use super::{http_client, map_status_err, map_transport_err};

#[derive(Debug, Deserialize)]
struct EventResponse {
  event_id: i64,
}

#[derive(Debug, Deserialize)]
struct InheritanceResponse {
  tags: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct TagChangedResponse {
  changed: bool,
}

pub struct KojiClient {
  base_url: String,
  client: reqwest::Client,
}

impl KojiClient {
  pub fn new(base_url: impl Into<String>) -> Self {
    Self { base_url: base_url.into(), client: http_client() }
  }

  /// The current Koji event id, used to pin a `koji_tag` compose's snapshot
  /// (spec §4.2).
  pub async fn current_event_id(&self) -> Result<i64, OdcsError> {
    let url = format!("{}/api/events/latest", self.base_url);
    let response = self
      .client
      .get(&url)
      .send()
      .await
      .map_err(|e| map_transport_err("koji: fetching latest event", e))?;
    let status = response.status();
    if !status.is_success() {
      let body = response.text().await.unwrap_or_default();
      return Err(map_status_err("koji: fetching latest event", status, &body));
    }
    Ok(response.json::<EventResponse>().await.map_err(|e| {
      OdcsError::ResolutionError(format!("koji: malformed event response: {e}"))
    })?.event_id)
  }

  /// Transitive inheritance closure of `tag`, used by the ReuseIndex's
  /// `koji_tag` candidate check (spec §4.3).
  pub async fn tag_inheritance(
    &self,
    tag: &str,
  ) -> Result<Vec<String>, OdcsError> {
    let url = format!("{}/api/tags/{tag}/inheritance", self.base_url);
    let response = self
      .client
      .get(&url)
      .send()
      .await
      .map_err(|e| map_transport_err("koji: fetching tag inheritance", e))?;
    let status = response.status();
    if !status.is_success() {
      let body = response.text().await.unwrap_or_default();
      return Err(map_status_err(
        "koji: fetching tag inheritance",
        status,
        &body,
      ));
    }
    Ok(response.json::<InheritanceResponse>().await.map_err(|e| {
      OdcsError::ResolutionError(format!(
        "koji: malformed inheritance response: {e}"
      ))
    })?.tags)
  }

  /// Whether `tag` (or any tag in its inheritance, per the caller) has
  /// changed since `since_event`.
  pub async fn tag_changed_since(
    &self,
    tag: &str,
    since_event: i64,
  ) -> Result<bool, OdcsError> {
    let url = format!("{}/api/tags/{tag}/changed-since/{since_event}", self.base_url);
    let response = self
      .client
      .get(&url)
      .send()
      .await
      .map_err(|e| map_transport_err("koji: checking tag change", e))?;
    let status = response.status();
    if !status.is_success() {
      let body = response.text().await.unwrap_or_default();
      return Err(map_status_err("koji: checking tag change", status, &body));
    }
    Ok(response.json::<TagChangedResponse>().await.map_err(|e| {
      OdcsError::ResolutionError(format!(
        "koji: malformed tag-changed response: {e}"
      ))
    })?.changed)
  }
}
