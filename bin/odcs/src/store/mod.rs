use bson::doc;
use mongodb::{
  Collection, Database, IndexModel, options::IndexOptions,
};
use odcs_client::entities::compose::{Compose, ComposeState, SourceType};
use tracing::instrument;

use crate::{error::OdcsError, helpers::unix_timestamp_ms};

mod counters;

pub use counters::next_id;

/// Filters for `Store::find_composes`, built from `ListComposesQuery`
/// (spec §6 `GET /composes[?filters, pagination, order_by]`).
#[derive(Debug, Clone, Default)]
pub struct ComposeFilters {
  pub owner: Option<String>,
  pub source_type: Option<SourceType>,
  pub state: Option<ComposeState>,
  pub page: Option<u64>,
  pub per_page: Option<u64>,
  pub order_desc: bool,
}

/// Durable record of every compose and its state. All orchestration
/// decisions read and write here; `Transition` is the only path that ever
/// writes `state`, and it is a compare-and-set so that concurrent
/// Schedulers in multiple backend processes cannot both claim the same
/// compose (spec §4.1, §4.5).
pub struct Store {
  db: Database,
  pub composes: Collection<Compose>,
  pub counters: Collection<bson::Document>,
}

impl Store {
  pub fn new(db: Database) -> Self {
    Self {
      composes: db.collection("composes"),
      counters: db.collection("counters"),
      db,
    }
  }

  pub async fn ensure_indexes(&self) -> anyhow::Result<()> {
    self
      .composes
      .create_indexes(vec![
        IndexModel::builder()
          .keys(doc! { "source_type": 1, "state": 1 })
          .build(),
        IndexModel::builder().keys(doc! { "state": 1 }).build(),
        IndexModel::builder()
          .keys(doc! { "time_to_expire": 1 })
          .build(),
        IndexModel::builder()
          .keys(doc! { "reused_id": 1 })
          .options(IndexOptions::builder().sparse(true).build())
          .build(),
      ])
      .await?;
    Ok(())
  }

  #[instrument(skip(self, compose))]
  pub async fn create_compose(
    &self,
    mut compose: Compose,
  ) -> Result<Compose, OdcsError> {
    let id = next_id(&self.counters, "composes")
      .await
      .map_err(|e| OdcsError::Fatal(e.to_string()))?;
    compose.id = Some(id);
    compose.state = ComposeState::Wait;
    compose.time_submitted = unix_timestamp_ms();
    self
      .composes
      .insert_one(&compose)
      .await
      .map_err(|e| OdcsError::Fatal(e.to_string()))?;
    Ok(compose)
  }

  pub async fn get_compose(
    &self,
    id: i64,
  ) -> Result<Compose, OdcsError> {
    self
      .composes
      .find_one(doc! { "_id": id })
      .await
      .map_err(|e| OdcsError::Fatal(e.to_string()))?
      .ok_or_else(|| OdcsError::NotFound(format!("compose {id}")))
  }

  /// Read side for `GET /composes` (spec §6): owner/source_type/state
  /// filters, `_id` pagination (`page`/`per_page`), ordering by `_id`
  /// ascending or descending.
  #[instrument(skip(self))]
  pub async fn find_composes(
    &self,
    filters: ComposeFilters,
  ) -> Result<Vec<Compose>, OdcsError> {
    use futures_util::TryStreamExt;

    let mut query = doc! {};
    if let Some(owner) = &filters.owner {
      query.insert("owner", owner);
    }
    if let Some(source_type) = filters.source_type {
      query.insert("source_type", source_type.to_string());
    }
    if let Some(state) = filters.state {
      query.insert("state", state.to_string());
    }

    let per_page = filters.per_page.unwrap_or(20).clamp(1, 100) as i64;
    let page = filters.page.unwrap_or(0) as i64;
    let sort_dir: i32 = if filters.order_desc { -1 } else { 1 };

    let options = mongodb::options::FindOptions::builder()
      .sort(doc! { "_id": sort_dir })
      .skip((page * per_page) as u64)
      .limit(per_page)
      .build();

    self
      .composes
      .find(query)
      .with_options(options)
      .await
      .map_err(|e| OdcsError::Fatal(e.to_string()))?
      .try_collect()
      .await
      .map_err(|e| OdcsError::Fatal(e.to_string()))
  }

  pub async fn composes_in_state(
    &self,
    state: ComposeState,
  ) -> Result<Vec<Compose>, OdcsError> {
    use futures_util::TryStreamExt;
    self
      .composes
      .find(doc! { "state": state.to_string() })
      .await
      .map_err(|e| OdcsError::Fatal(e.to_string()))?
      .try_collect()
      .await
      .map_err(|e| OdcsError::Fatal(e.to_string()))
  }

  /// Candidates for reuse: `done`, not themselves a reuser, same
  /// `source_type`. Set/scalar reuse-key comparison happens in-process in
  /// `reuse_index`.
  pub async fn done_unreused_candidates(
    &self,
    source_type: odcs_client::entities::compose::SourceType,
  ) -> Result<Vec<Compose>, OdcsError> {
    use futures_util::TryStreamExt;
    self
      .composes
      .find(doc! {
        "state": ComposeState::Done.to_string(),
        "source_type": source_type.to_string(),
        "reused_id": bson::Bson::Null,
      })
      .await
      .map_err(|e| OdcsError::Fatal(e.to_string()))?
      .try_collect()
      .await
      .map_err(|e| OdcsError::Fatal(e.to_string()))
  }

  pub async fn composes_to_expire(
    &self,
    now: i64,
  ) -> Result<Vec<Compose>, OdcsError> {
    use futures_util::TryStreamExt;
    self
      .composes
      .find(doc! {
        "state": { "$in": [ComposeState::Done.to_string(), ComposeState::Failed.to_string()] },
        "time_to_expire": { "$lt": now },
      })
      .await
      .map_err(|e| OdcsError::Fatal(e.to_string()))?
      .try_collect()
      .await
      .map_err(|e| OdcsError::Fatal(e.to_string()))
  }

  pub async fn reusers_of(
    &self,
    id: i64,
  ) -> Result<Vec<Compose>, OdcsError> {
    use futures_util::TryStreamExt;
    self
      .composes
      .find(doc! { "reused_id": id })
      .await
      .map_err(|e| OdcsError::Fatal(e.to_string()))?
      .try_collect()
      .await
      .map_err(|e| OdcsError::Fatal(e.to_string()))
  }

  /// Atomic conditional update: `current state` must equal `from`, else
  /// `InvalidTransition`. This is the compare-and-set that makes
  /// multi-backend Scheduler claims safe (spec §4.1, §4.5, §8 property 7).
  #[instrument(skip(self))]
  pub async fn transition(
    &self,
    id: i64,
    from: ComposeState,
    to: ComposeState,
    reason: impl Into<String>,
  ) -> Result<Compose, OdcsError> {
    if !from.can_transition_to(to) {
      return Err(OdcsError::InvalidTransition(format!(
        "{from} -> {to} is not a legal transition"
      )));
    }
    let now = unix_timestamp_ms();
    let mut set = doc! {
      "state": to.to_string(),
      "state_reason": reason.into(),
    };
    match to {
      ComposeState::Done | ComposeState::Failed => {
        set.insert("time_done", now);
      }
      ComposeState::Removed => {
        set.insert("time_removed", now);
      }
      _ => {}
    }
    let updated = self
      .composes
      .find_one_and_update(
        doc! { "_id": id, "state": from.to_string() },
        doc! { "$set": set },
      )
      .return_document(mongodb::options::ReturnDocument::After)
      .await
      .map_err(|e| OdcsError::Fatal(e.to_string()))?;
    updated.ok_or_else(|| {
      OdcsError::InvalidTransition(format!(
        "compose {id} was not in state {from} at transition time"
      ))
    })
  }

  /// No-op resume transition used as the Worker's first action after a
  /// claim (spec §4.5.1, §5 "Recovery after restart"): succeeds whether or
  /// not the compose is already `generating`, so a second concurrent
  /// attempt after a restart is harmless.
  pub async fn resume_generating(
    &self,
    id: i64,
  ) -> Result<Compose, OdcsError> {
    let updated = self
      .composes
      .find_one_and_update(
        doc! { "_id": id, "state": ComposeState::Generating.to_string() },
        doc! { "$set": { "state_reason": "resumed" } },
      )
      .return_document(mongodb::options::ReturnDocument::After)
      .await
      .map_err(|e| OdcsError::Fatal(e.to_string()))?;
    updated.ok_or_else(|| {
      OdcsError::InvalidTransition(format!(
        "compose {id} is no longer generating"
      ))
    })
  }

  /// Sets `reused_id` and resolved fields after the Resolver/ReuseIndex
  /// decided to alias `candidate_id` (spec §4.4 step 1).
  pub async fn set_reused(
    &self,
    id: i64,
    candidate_id: i64,
  ) -> Result<(), OdcsError> {
    self
      .composes
      .update_one(
        doc! { "_id": id },
        doc! { "$set": { "reused_id": candidate_id } },
      )
      .await
      .map_err(|e| OdcsError::Fatal(e.to_string()))?;
    Ok(())
  }

  /// Persists the Resolver's normalized `source`/`koji_event` onto the
  /// compose (spec §4.2).
  pub async fn set_resolved(
    &self,
    id: i64,
    source: &[String],
    koji_event: Option<i64>,
  ) -> Result<(), OdcsError> {
    self
      .composes
      .update_one(
        doc! { "_id": id },
        doc! { "$set": { "source": source.join(" "), "koji_event": koji_event } },
      )
      .await
      .map_err(|e| OdcsError::Fatal(e.to_string()))?;
    Ok(())
  }

  /// Writes back the union of arches/sigkeys observed across the Pulp
  /// repositories backing a `pulp` compose (spec §4.6.2), so later reads
  /// (and any future reuse of `pulp` composes) see what was actually used
  /// rather than just what was requested.
  pub async fn set_pulp_resolved_fields(
    &self,
    id: i64,
    arches: &[String],
    sigkeys: &[String],
  ) -> Result<(), OdcsError> {
    self
      .composes
      .update_one(
        doc! { "_id": id },
        doc! { "$set": { "arches": arches.join(" "), "sigkeys": sigkeys.join(" ") } },
      )
      .await
      .map_err(|e| OdcsError::Fatal(e.to_string()))?;
    Ok(())
  }

  pub async fn set_pungi_compose_id(
    &self,
    id: i64,
    pungi_compose_id: &str,
  ) -> Result<(), OdcsError> {
    self
      .composes
      .update_one(
        doc! { "_id": id },
        doc! { "$set": { "pungi_compose_id": pungi_compose_id } },
      )
      .await
      .map_err(|e| OdcsError::Fatal(e.to_string()))?;
    Ok(())
  }

  /// `time_to_expire := max(current, from_time + seconds_to_live)` (spec
  /// §4.1). Used directly by extend/renew and, transitively, by reuse
  /// expiration propagation (§4.4).
  #[instrument(skip(self))]
  pub async fn extend_expiration(
    &self,
    id: i64,
    from_time: i64,
    seconds_to_live: i64,
  ) -> Result<Compose, OdcsError> {
    let candidate = from_time + seconds_to_live * 1000;
    let compose = self.get_compose(id).await?;
    let new_expire = candidate.max(compose.time_to_expire);
    self
      .composes
      .update_one(
        doc! { "_id": id },
        doc! { "$set": { "time_to_expire": new_expire } },
      )
      .await
      .map_err(|e| OdcsError::Fatal(e.to_string()))?;
    self.get_compose(id).await
  }

  /// Early deletion: sets `time_to_expire := now`, records `removed_by`.
  /// Only legal on `done`/`failed` (spec §4.10).
  pub async fn mark_for_early_deletion(
    &self,
    id: i64,
    removed_by: &str,
  ) -> Result<Compose, OdcsError> {
    let compose = self.get_compose(id).await?;
    if !matches!(compose.state, ComposeState::Done | ComposeState::Failed)
    {
      return Err(OdcsError::InvalidInput(format!(
        "cannot delete compose {id} in state {}",
        compose.state
      )));
    }
    self
      .composes
      .update_one(
        doc! { "_id": id },
        doc! { "$set": {
          "time_to_expire": unix_timestamp_ms(),
          "removed_by": removed_by,
        } },
      )
      .await
      .map_err(|e| OdcsError::Fatal(e.to_string()))?;
    self.get_compose(id).await
  }

  pub fn db(&self) -> &Database {
    &self.db
  }
}
