//! Periodic sweeper that retires expired composes and reaps orphaned
//! artifact directories (spec §4.9).

use std::path::{Path, PathBuf};

use odcs_client::entities::compose::{Compose, ComposeState};
use tracing::instrument;

use crate::{config::odcs_config, helpers::unix_timestamp_ms, state::store};

pub fn spawn() {
  tokio::spawn(async move {
    let mut interval = tokio::time::interval(tokio::time::Duration::from_millis(
      odcs_config().expirer_tick_ms,
    ));
    loop {
      interval.tick().await;
      if let Err(e) = tick().await {
        tracing::error!("expirer: tick failed | {e:#}");
      }
    }
  });
}

#[instrument(skip_all)]
async fn tick() -> anyhow::Result<()> {
  let now = unix_timestamp_ms();
  let expiring = store().composes_to_expire(now).await?;
  for compose in expiring {
    expire_one(compose).await;
  }
  reap_orphans().await;
  Ok(())
}

/// spec §4.9.1-2: transition to `removed`, then (unless this compose is a
/// reuser, in which case it never owned `toplevel_dir`) remove the artifact
/// directory.
async fn expire_one(compose: Compose) {
  let Some(id) = compose.id else { return };
  let reason = if compose.removed_by.is_some() {
    "removed by operator request".to_string()
  } else {
    "expired".to_string()
  };
  let removed = match store()
    .transition(id, compose.state, ComposeState::Removed, reason)
    .await
  {
    Ok(removed) => removed,
    Err(e) => {
      tracing::error!("expirer: failed to expire compose {id} | {e:#}");
      return;
    }
  };

  if removed.reused_id.is_some() {
    return;
  }
  let target_dir = &odcs_config().target_dir;
  if let Err(e) = remove_toplevel_dir(&removed, target_dir).await {
    tracing::warn!(
      "expirer: failed to remove artifacts for compose {id} | {e:#}"
    );
  }
}

/// spec §4.9.2: symlink -> remove link and target; plain directory ->
/// remove recursively; absent -> warn and continue (not fatal — the
/// Transition to `removed` already committed).
async fn remove_toplevel_dir(
  compose: &Compose,
  target_dir: &Path,
) -> std::io::Result<()> {
  let link_path = target_dir.join(compose.latest_dir());
  match tokio::fs::symlink_metadata(&link_path).await {
    Ok(metadata) if metadata.file_type().is_symlink() => {
      let target = tokio::fs::read_link(&link_path).await.ok();
      tokio::fs::remove_file(&link_path).await?;
      if let Some(target) = target {
        let target = if target.is_relative() {
          target_dir.join(target)
        } else {
          target
        };
        let _ = tokio::fs::remove_dir_all(&target).await;
      }
    }
    Ok(_) => {
      tokio::fs::remove_dir_all(&link_path).await?;
    }
    Err(_) => {
      tracing::warn!(
        "expirer: toplevel_dir {} already absent for compose {:?}",
        link_path.display(),
        compose.id
      );
    }
  }
  Ok(())
}

/// spec §4.9.3: scan `target_dir` for directories matching the ODCS naming
/// pattern (`odcs-<id>-1-...` / `latest-odcs-<id>-1`) whose compose either
/// doesn't exist or is already `removed`, and remove them. Covers artifacts
/// left behind by a crash between tool completion and the `done` transition.
async fn reap_orphans() {
  let target_dir = &odcs_config().target_dir;
  let mut entries = match tokio::fs::read_dir(target_dir).await {
    Ok(entries) => entries,
    Err(e) => {
      tracing::warn!(
        "expirer: failed to scan {} for orphans | {e:#}",
        target_dir.display()
      );
      return;
    }
  };

  let mut candidates: Vec<PathBuf> = Vec::new();
  while let Ok(Some(entry)) = entries.next_entry().await {
    let name = entry.file_name();
    let name = name.to_string_lossy();
    if let Some(id) = orphan_candidate_id(&name)
      && !compose_is_live(id).await
    {
      candidates.push(entry.path());
    }
  }

  for path in candidates {
    if let Err(e) = tokio::fs::remove_dir_all(&path).await {
      if let Err(e2) = tokio::fs::remove_file(&path).await {
        tracing::warn!(
          "expirer: failed to reap orphan {} | dir: {e:#} | file: {e2:#}",
          path.display()
        );
      }
    }
  }
}

/// Extracts `<id>` from `odcs-<id>-1-<date>.n.<respin>` or
/// `latest-odcs-<id>-1`, else `None` (not an ODCS-owned path).
fn orphan_candidate_id(name: &str) -> Option<i64> {
  let rest = name.strip_prefix("latest-odcs-").or_else(|| name.strip_prefix("odcs-"))?;
  let id_str = rest.split(['-', '.']).next()?;
  id_str.parse::<i64>().ok()
}

async fn compose_is_live(id: i64) -> bool {
  match store().get_compose(id).await {
    Ok(compose) => compose.state != ComposeState::Removed,
    // spec §4.9.3: reap when the owning compose "either does not exist or
    // is already removed" — a `NotFound` id is reapable. Any other Store
    // error (transport, transient) is not evidence of anything, so leave
    // the directory alone rather than risk deleting a live compose's
    // artifacts on a flaky read.
    Err(crate::error::OdcsError::NotFound(_)) => false,
    Err(_) => true,
  }
}
