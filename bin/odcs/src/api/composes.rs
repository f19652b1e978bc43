use axum::{
  Json, Router,
  extract::{Path, Query},
  http::HeaderMap,
  routing::{delete, get, patch, post},
};
use odcs_client::{
  entities::compose::{Compose, ComposeState},
  requests::{
    ListComposesQuery, NewComposeRequest, NewComposeSource, PatchComposeRequest,
  },
  responses::ComposeResponse,
};
use tracing::instrument;
use validations::{StringValidator, StringValidatorMatches};

use crate::{
  config::odcs_config,
  error::{OdcsError, OdcsResult},
  helpers::unix_timestamp_ms,
  state::{generating_set, store},
  store::ComposeFilters,
};

/// Store-boundary validation (spec §7's `InvalidInput` kind): reject owners
/// that don't look like a principal name and source tokens containing
/// control characters before they ever reach the Store.
fn validate_new_compose(owner: &str, source: &NewComposeSource) -> OdcsResult<()> {
  StringValidator::default()
    .min_length(1)
    .max_length(256)
    .matches(StringValidatorMatches::Username)
    .validate(owner)
    .map_err(|e| OdcsError::InvalidInput(format!("owner: {e:#}")))?;

  if source.source.is_empty() {
    return Err(OdcsError::InvalidInput("source must not be empty".to_string()));
  }
  for token in &source.source {
    StringValidator::default()
      .min_length(1)
      .max_length(1024)
      .validate(token)
      .map_err(|e| OdcsError::InvalidInput(format!("source entry {token:?}: {e:#}")))?;
  }
  Ok(())
}

pub fn router() -> Router {
  Router::new()
    .route("/", post(create_compose))
    .route("/", get(list_composes))
    .route("/{id}", get(get_compose))
    .route("/{id}", patch(patch_compose))
    .route("/{id}", delete(delete_compose))
}

/// Auth/permission backends (Kerberos, OIDC, anonymous) are out of scope
/// (spec §1); this reads the opaque principal off a header so the owner
/// field is still populated from something, rather than a hardcoded value.
fn caller(headers: &HeaderMap) -> String {
  headers
    .get("x-odcs-user")
    .and_then(|v| v.to_str().ok())
    .unwrap_or("anonymous")
    .to_string()
}

#[instrument(skip_all)]
async fn create_compose(
  headers: HeaderMap,
  Json(request): Json<NewComposeRequest>,
) -> OdcsResult<Json<ComposeResponse>> {
  let owner = caller(&headers);
  validate_new_compose(&owner, &request.source)?;
  let config = odcs_config();
  let seconds_to_live = config.clamp_seconds_to_live(request.seconds_to_live);
  let now = unix_timestamp_ms();

  let compose = Compose {
    id: None,
    owner,
    source_type: request.source.source_type,
    source: request.source.source,
    packages: request.source.packages,
    builds: None,
    sigkeys: request.source.sigkeys.unwrap_or_default(),
    arches: request.arches.unwrap_or_default(),
    multilib_arches: None,
    multilib_method: None,
    flags: request.flags,
    results: if request.results.is_empty() {
      vec![odcs_client::entities::compose::ComposeResult::Repository]
    } else {
      request.results
    },
    koji_event: None,
    state: ComposeState::Wait,
    state_reason: String::new(),
    time_submitted: now,
    time_done: None,
    time_removed: None,
    time_to_expire: now + seconds_to_live * 1000,
    removed_by: None,
    reused_id: None,
    koji_task_id: None,
    pungi_compose_id: None,
  };

  let created = store().create_compose(compose).await?;
  Ok(Json(ComposeResponse::from_compose(
    &created,
    &config.target_dir_url,
  )))
}

#[instrument(skip_all)]
async fn list_composes(
  Query(query): Query<ListComposesQuery>,
) -> OdcsResult<Json<Vec<ComposeResponse>>> {
  let state = query
    .state
    .as_deref()
    .map(parse_state)
    .transpose()?;
  let order_desc = query.order_by.as_deref() == Some("-id");

  let composes = store()
    .find_composes(ComposeFilters {
      owner: query.owner,
      source_type: query.source_type,
      state,
      page: query.page,
      per_page: query.per_page,
      order_desc,
    })
    .await?;

  let target_dir_url = &odcs_config().target_dir_url;
  Ok(Json(
    composes
      .iter()
      .map(|c| ComposeResponse::from_compose(c, target_dir_url))
      .collect(),
  ))
}

fn parse_state(raw: &str) -> OdcsResult<ComposeState> {
  raw
    .parse()
    .map_err(|_| OdcsError::InvalidInput(format!("unknown state {raw:?}")))
}

#[instrument(skip_all)]
async fn get_compose(
  Path(id): Path<i64>,
) -> OdcsResult<Json<ComposeResponse>> {
  let compose = store().get_compose(id).await?;
  Ok(Json(ComposeResponse::from_compose(
    &compose,
    &odcs_config().target_dir_url,
  )))
}

/// spec §6: `removed`/`failed` create a resurrection copy preserving
/// reuse-relevant fields (§4.9 "Request-surface regeneration"); `done`
/// extends `time_to_expire` and propagates it (§4.4).
#[instrument(skip_all)]
async fn patch_compose(
  Path(id): Path<i64>,
  headers: HeaderMap,
  Json(request): Json<PatchComposeRequest>,
) -> OdcsResult<Json<ComposeResponse>> {
  let compose = store().get_compose(id).await?;
  let config = odcs_config();

  match compose.state {
    ComposeState::Removed | ComposeState::Failed => {
      let owner = caller(&headers);
      let now = unix_timestamp_ms();
      let seconds_to_live =
        config.clamp_seconds_to_live(request.seconds_to_live);
      let resurrection = Compose {
        id: None,
        owner,
        source_type: compose.source_type,
        source: compose.source.clone(),
        packages: compose.packages.clone(),
        builds: compose.builds.clone(),
        sigkeys: compose.sigkeys.clone(),
        arches: compose.arches.clone(),
        multilib_arches: compose.multilib_arches.clone(),
        multilib_method: compose.multilib_method.clone(),
        flags: compose.flags.clone(),
        results: compose.results.clone(),
        koji_event: compose.koji_event,
        state: ComposeState::Wait,
        state_reason: String::new(),
        time_submitted: now,
        time_done: None,
        time_removed: None,
        time_to_expire: now + seconds_to_live * 1000,
        removed_by: None,
        reused_id: None,
        koji_task_id: None,
        pungi_compose_id: None,
      };
      let created = store().create_compose(resurrection).await?;
      Ok(Json(ComposeResponse::from_compose(
        &created,
        &config.target_dir_url,
      )))
    }
    ComposeState::Done => {
      let seconds_to_live =
        config.clamp_seconds_to_live(request.seconds_to_live);
      let now = unix_timestamp_ms();
      let extended =
        store().extend_expiration(id, now, seconds_to_live).await?;
      if let Some(reused_id) = extended.reused_id {
        store()
          .extend_expiration(reused_id, extended.time_to_expire, 0)
          .await?;
      }
      for reuser in store().reusers_of(id).await? {
        if let Some(reuser_id) = reuser.id {
          store()
            .extend_expiration(reuser_id, extended.time_to_expire, 0)
            .await?;
        }
      }
      Ok(Json(ComposeResponse::from_compose(
        &extended,
        &config.target_dir_url,
      )))
    }
    other => Err(OdcsError::InvalidInput(format!(
      "cannot patch compose {id} in state {other}"
    ))),
  }
}

#[instrument(skip_all)]
async fn delete_compose(
  Path(id): Path<i64>,
  headers: HeaderMap,
) -> OdcsResult<Json<ComposeResponse>> {
  let owner = caller(&headers);
  let deleted = store().mark_for_early_deletion(id, &owner).await?;
  generating_set().remove(&id).await;
  Ok(Json(ComposeResponse::from_compose(
    &deleted,
    &odcs_config().target_dir_url,
  )))
}
