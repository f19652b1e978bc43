//! Decides whether an existing `done` compose can be aliased instead of
//! running the compose tool again (spec §4.3).

use odcs_client::entities::compose::{Compose, SourceType};
use tracing::instrument;

use crate::{
  error::OdcsError,
  helpers::token_sets_equal,
  state::{koji_client, koji_tag_change_cache, store},
};

/// Finds the first `done`, unreused compose whose reuse key matches
/// `compose`. Returns `Ok(None)` rather than an error when nothing matches
/// — "no candidate" is an expected outcome, not a failure.
#[instrument(skip(compose), fields(id = ?compose.id, source_type = %compose.source_type))]
pub async fn find(compose: &Compose) -> Result<Option<Compose>, OdcsError> {
  // `raw_config` and `pulp` composes never participate in reuse (spec §4.3).
  if matches!(compose.source_type, SourceType::RawConfig | SourceType::Pulp) {
    return Ok(None);
  }

  let candidates =
    store().done_unreused_candidates(compose.source_type).await?;

  for candidate in candidates {
    if candidate.id == compose.id {
      continue;
    }
    if reuse_key_matches(compose, &candidate).await? {
      return Ok(Some(candidate));
    }
  }
  Ok(None)
}

async fn reuse_key_matches(
  compose: &Compose,
  candidate: &Compose,
) -> Result<bool, OdcsError> {
  if !token_sets_equal(&compose.source, &candidate.source) {
    return Ok(false);
  }
  if !option_token_sets_equal(&compose.packages, &candidate.packages) {
    return Ok(false);
  }
  if !token_sets_equal(&compose.sigkeys, &candidate.sigkeys) {
    return Ok(false);
  }
  if !token_sets_equal(&compose.arches, &candidate.arches) {
    return Ok(false);
  }
  if compose.flags != candidate.flags {
    return Ok(false);
  }
  if compose.results != candidate.results {
    return Ok(false);
  }

  match compose.source_type {
    SourceType::KojiTag => koji_tag_candidate_is_fresh(compose, candidate).await,
    _ => Ok(compose.koji_event == candidate.koji_event),
  }
}

fn option_token_sets_equal(a: &Option<Vec<String>>, b: &Option<Vec<String>>) -> bool {
  match (a, b) {
    (None, None) => true,
    (Some(a), Some(b)) => token_sets_equal(a, b),
    _ => false,
  }
}

/// For `koji_tag`: the scalar `koji_event` equality check is insufficient
/// because a tag's *inheritance* can change composition without bumping the
/// tag's own event id. Consult Koji for whether any tag in the transitive
/// inheritance of `source` changed since the candidate's `koji_event`.
async fn koji_tag_candidate_is_fresh(
  compose: &Compose,
  candidate: &Compose,
) -> Result<bool, OdcsError> {
  let Some(since_event) = candidate.koji_event else {
    return Ok(false);
  };
  let Some(client) = koji_client() else {
    return Ok(compose.koji_event == candidate.koji_event);
  };
  let tag = compose.source.first().ok_or_else(|| {
    OdcsError::ResolutionError("koji_tag compose has empty source".to_string())
  })?;

  let cache = koji_tag_change_cache();
  let key = (tag.clone(), since_event);
  if let Some(changed) = cache.get(&key).await {
    return Ok(!changed);
  }

  let inheritance = client.tag_inheritance(tag).await?;
  let mut changed = client.tag_changed_since(tag, since_event).await?;
  if !changed {
    for ancestor in &inheritance {
      if client.tag_changed_since(ancestor, since_event).await? {
        changed = true;
        break;
      }
    }
  }
  cache.insert(key, changed).await;
  Ok(!changed)
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn option_none_equals_none() {
    assert!(option_token_sets_equal(&None, &None));
  }

  #[test]
  fn option_some_compares_as_set() {
    let a = Some(vec!["b".to_string(), "a".to_string()]);
    let b = Some(vec!["a".to_string(), "b".to_string()]);
    assert!(option_token_sets_equal(&a, &b));
  }

  #[test]
  fn option_none_and_some_differ() {
    let b = Some(vec!["a".to_string()]);
    assert!(!option_token_sets_equal(&None, &b));
  }
}
