//! Per-backend periodic loop that claims `wait` composes and dispatches them
//! to a bounded worker pool (spec §4.5). Any number of backend processes may
//! run this loop concurrently against the same Store; the Store's
//! compare-and-set `transition` is what makes that safe (spec §4.5 "Two
//! Schedulers racing on the same waiting compose result in exactly one
//! success").

use std::sync::Arc;

use odcs_client::entities::compose::{Compose, ComposeState, SourceType};
use tokio::sync::Semaphore;
use tracing::instrument;

use crate::{
  config::odcs_config,
  helpers::unix_timestamp_ms,
  state::{generating_set, store},
  worker,
};

/// Spawns the Scheduler as a detached background task. Never returns; a
/// single bad tick is caught and logged rather than killing the loop (spec
/// §7 "a single bad compose never stops the loop").
pub fn spawn() {
  tokio::spawn(async move {
    let tool_pool = Arc::new(Semaphore::new(odcs_config().tool_pool_size));
    let pulp_pool = Arc::new(Semaphore::new(odcs_config().pulp_pool_size));
    let mut interval = tokio::time::interval(tokio::time::Duration::from_millis(
      odcs_config().scheduler_tick_ms,
    ));
    loop {
      interval.tick().await;
      tick(&tool_pool, &pulp_pool).await;
    }
  });
}

#[instrument(skip_all)]
async fn tick(tool_pool: &Arc<Semaphore>, pulp_pool: &Arc<Semaphore>) {
  if let Err(e) = recover_lost(tool_pool, pulp_pool).await {
    tracing::error!("scheduler: recover_lost failed | {e:#}");
  }
  if let Err(e) = pick_waiting(tool_pool, pulp_pool).await {
    tracing::error!("scheduler: pick_waiting failed | {e:#}");
  }
  if let Err(e) = refresh_tracking().await {
    tracing::error!("scheduler: refresh_tracking failed | {e:#}");
  }
}

/// spec §4.5.1: resubmit every `generating` compose this process isn't
/// currently tracking — covers both a fresh restart and another backend's
/// claim surviving its own crash.
async fn recover_lost(
  tool_pool: &Arc<Semaphore>,
  pulp_pool: &Arc<Semaphore>,
) -> anyhow::Result<()> {
  let generating =
    store().composes_in_state(ComposeState::Generating).await?;
  let tracked = generating_set();
  for compose in generating {
    let Some(id) = compose.id else { continue };
    if tracked.get(&id).await.is_some() {
      continue;
    }
    tracked.insert(id, ()).await;
    dispatch(compose, tool_pool, pulp_pool);
  }
  Ok(())
}

/// spec §4.5.2: claim every `wait` compose older than `wait_threshold_ms`
/// (or just created) via the compare-and-set transition, then submit it.
async fn pick_waiting(
  tool_pool: &Arc<Semaphore>,
  pulp_pool: &Arc<Semaphore>,
) -> anyhow::Result<()> {
  let waiting = store().composes_in_state(ComposeState::Wait).await?;
  let threshold = odcs_config().wait_threshold_ms;
  let now = unix_timestamp_ms();
  for compose in waiting {
    let Some(id) = compose.id else { continue };
    if now - compose.time_submitted < threshold {
      continue;
    }
    let claimed = match store()
      .transition(id, ComposeState::Wait, ComposeState::Generating, "claimed")
      .await
    {
      Ok(claimed) => claimed,
      // Another Scheduler (this process or another backend) won the race.
      Err(_) => continue,
    };
    generating_set().insert(id, ()).await;
    dispatch(claimed, tool_pool, pulp_pool);
  }
  Ok(())
}

/// spec §4.5.3: drop ids this process is tracking as "currently generating"
/// once the Store no longer agrees — the Worker finished (or crashed and
/// was already reaped by another backend's Expirer/Scheduler pass).
async fn refresh_tracking() -> anyhow::Result<()> {
  let still_generating: std::collections::HashSet<i64> = store()
    .composes_in_state(ComposeState::Generating)
    .await?
    .into_iter()
    .filter_map(|c| c.id)
    .collect();
  let tracked = generating_set();
  for id in tracked.get_keys().await {
    if !still_generating.contains(&id) {
      tracked.remove(&id).await;
    }
  }
  Ok(())
}

/// Submits `compose` to whichever bounded pool fits its source type, then
/// drops it from the tracking set once the Worker finishes so the next
/// `refresh_tracking` pass doesn't need to — the transition to a terminal
/// state already makes the Store authoritative for this id.
fn dispatch(
  compose: Compose,
  tool_pool: &Arc<Semaphore>,
  pulp_pool: &Arc<Semaphore>,
) {
  let Some(id) = compose.id else { return };
  let pool = if compose.source_type == SourceType::Pulp {
    pulp_pool.clone()
  } else {
    tool_pool.clone()
  };
  tokio::spawn(async move {
    let _permit = pool.acquire_owned().await;
    worker::run(id).await;
    generating_set().remove(&id).await;
  });
}
