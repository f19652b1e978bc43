//! Runs one claimed compose to completion (spec §4.6). The Scheduler
//! guarantees at-most-one Worker per compose, so everything here assumes
//! exclusive mutation rights on `compose_id` until the terminal transition.

use std::time::Duration;

use command::run_tool_command;
use odcs_client::entities::compose::{Compose, ComposeFlag, ComposeState, SourceType};
use tracing::instrument;

use crate::{
  composeinfo, config::odcs_config, error::OdcsError, manifest::ToolManifest,
  repo_file, resolver, reuse_index, state::store, tool_config,
};

/// Entry point submitted to a worker-pool task. Never propagates: every
/// error is caught here and turned into a `failed` transition, per spec
/// §4.6's "on any uncaught error" clause.
pub async fn run(compose_id: i64) {
  if let Err(e) = run_inner(compose_id).await {
    fail(compose_id, &e.to_string()).await;
  }
}

#[instrument(skip_all, fields(id = compose_id))]
async fn run_inner(compose_id: i64) -> Result<(), OdcsError> {
  // First action after claim: a no-op transition, harmless whether or not
  // a prior attempt (pre-restart, or a resurrection race) already did it
  // (spec §4.5 "Recovery after restart", §5).
  store().resume_generating(compose_id).await?;
  let compose = store().get_compose(compose_id).await?;

  if compose.source_type == SourceType::Pulp {
    return run_pulp(compose).await;
  }

  let resolved = resolver::resolve(&compose).await?;
  store()
    .set_resolved(compose_id, &resolved.source, resolved.koji_event)
    .await?;
  let mut compose = store().get_compose(compose_id).await?;

  if let Some(candidate) = reuse_index::find(&compose).await? {
    return apply_reuse(&mut compose, candidate).await;
  }

  run_tool(compose).await
}

/// spec §4.6.2: Pulp composes never touch the Resolver, ReuseIndex, or
/// external tool — just a Pulp lookup, a repo-file write, and writing back
/// the union of arches/sigkeys actually used.
async fn run_pulp(compose: Compose) -> Result<(), OdcsError> {
  let id = compose.id.expect("compose id assigned");
  let client = crate::state::pulp_client().ok_or_else(|| {
    OdcsError::Fatal("pulp compose but no pulp client configured".to_string())
  })?;

  let repos = client
    .repositories_for(
      &compose.source,
      &compose.arches,
      compose.has_flag(ComposeFlag::IncludeUnpublishedPulpRepos),
    )
    .await?;

  let found: std::collections::HashSet<&str> =
    repos.iter().map(|r| r.content_set.as_str()).collect();
  let missing: Vec<&str> = compose
    .source
    .iter()
    .map(String::as_str)
    .filter(|cs| !found.contains(cs))
    .collect();
  if !missing.is_empty() {
    return Err(OdcsError::ValidationFailure(format!(
      "pulp content sets not found: {}",
      missing.join(", ")
    )));
  }

  let mut union_arches: Vec<String> =
    repos.iter().map(|r| r.arch.clone()).collect();
  union_arches.sort();
  union_arches.dedup();
  let mut union_sigkeys: Vec<String> =
    repos.iter().flat_map(|r| r.sigkeys.clone()).collect();
  union_sigkeys.sort();
  union_sigkeys.dedup();
  store()
    .set_pulp_resolved_fields(id, &union_arches, &union_sigkeys)
    .await?;

  let target_dir = &odcs_config().target_dir;
  repo_file::write_pulp_repo_file(&compose, &repos, target_dir).await?;

  store()
    .transition(
      id,
      ComposeState::Generating,
      ComposeState::Done,
      "Compose is generated successfully",
    )
    .await?;
  Ok(())
}

/// spec §4.4: alias `compose` to `candidate`'s output directory instead of
/// invoking the tool, propagating expiration both ways so neither the
/// aliasing compose nor its target expires first.
async fn apply_reuse(
  compose: &mut Compose,
  candidate: Compose,
) -> Result<(), OdcsError> {
  let id = compose.id.expect("compose id assigned");
  let candidate_id = candidate.id.expect("candidate id assigned");

  store().set_reused(id, candidate_id).await?;
  compose.reused_id = Some(candidate_id);

  let candidate = store()
    .extend_expiration(candidate_id, compose.time_to_expire, 0)
    .await?;
  store()
    .extend_expiration(id, candidate.time_to_expire, 0)
    .await?;

  let target_dir = &odcs_config().target_dir;
  let target_dir_url = &odcs_config().target_dir_url;
  repo_file::write_tool_repo_file(compose, target_dir, target_dir_url).await?;

  store()
    .transition(
      id,
      ComposeState::Generating,
      ComposeState::Done,
      "Compose is generated successfully (reused)",
    )
    .await?;
  Ok(())
}

/// spec §4.6.3: materialize tool config, invoke the tool, validate, write
/// the repo-file, dedup hardlink pass, transition to `done`.
async fn run_tool(compose: Compose) -> Result<(), OdcsError> {
  let id = compose.id.expect("compose id assigned");
  let config = odcs_config();
  let target_dir = &config.target_dir;

  if compose.source_type == SourceType::RawConfig {
    materialize_raw_config(&compose, target_dir).await?;
  } else {
    materialize_tool_config(&compose, target_dir).await?;
  }

  let toplevel_dir = compose.toplevel_dir(target_dir);
  let run_log = run_tool_command(
    &tool_command_line(&compose, target_dir),
    Some(toplevel_dir.as_path()),
    Duration::from_secs(config.tool_timeout_secs),
  )
  .await;

  tokio::fs::write(toplevel_dir.join("pungi-stdout.log"), &run_log.stdout)
    .await
    .ok();
  tokio::fs::write(toplevel_dir.join("pungi-stderr.log"), &run_log.stderr)
    .await
    .ok();

  if !run_log.success {
    let reason = if run_log.timed_out {
      format!("compose tool timed out after {}s", config.tool_timeout_secs)
    } else {
      format!(
        "compose tool failed: {}",
        parsed_tool_errors(&run_log.stderr)
      )
    };
    return Err(OdcsError::ToolFailure(reason));
  }

  if let Some(packages) = &compose.packages {
    let manifest_path = compose
      .result_repo_dir(target_dir)
      .join("metadata")
      .join("rpms.json");
    let manifest = ToolManifest::read(&manifest_path).await?;
    manifest.check_packages_present(packages)?;
  }

  repo_file::write_tool_repo_file(
    &compose,
    target_dir,
    &config.target_dir_url,
  )
  .await?;

  if let Err(e) = hardlink_dedup_pass(&toplevel_dir).await {
    tracing::warn!("hardlink dedup pass failed for compose {id} | {e:#}");
  }

  store()
    .transition(
      id,
      ComposeState::Generating,
      ComposeState::Done,
      "Compose is generated successfully",
    )
    .await?;
  Ok(())
}

/// Writes `main.conf`/`variants.xml`/`comps.xml` (spec §4.7) plus the
/// `ComposeInfo` record, into the compose's real (dated) working
/// directory, then symlinks `latest_dir` to it.
async fn materialize_tool_config(
  compose: &Compose,
  target_dir: &std::path::Path,
) -> Result<(), OdcsError> {
  let release_name = compose.name();
  let rendered = tool_config::render(compose, &release_name, "1", &[])?;

  let date = composeinfo::today();
  let respin = composeinfo::next_respin(target_dir, &release_name, &date);
  let working_dir_name =
    composeinfo::working_dir_name(&release_name, &date, respin);
  let working_dir = target_dir.join(&working_dir_name);

  tokio::fs::create_dir_all(&working_dir).await.map_err(|e| {
    OdcsError::Fatal(format!(
      "failed to create working dir {}: {e}",
      working_dir.display()
    ))
  })?;
  tokio::fs::create_dir_all(working_dir.join("work").join("global"))
    .await
    .ok();

  tokio::fs::write(working_dir.join("main.conf"), &rendered.main_config)
    .await
    .map_err(|e| OdcsError::Fatal(format!("failed to write main.conf: {e}")))?;
  tokio::fs::write(working_dir.join("variants.xml"), &rendered.variants_xml)
    .await
    .map_err(|e| OdcsError::Fatal(format!("failed to write variants.xml: {e}")))?;
  if let Some(comps) = &rendered.comps_xml {
    tokio::fs::write(working_dir.join("comps.xml"), comps)
      .await
      .map_err(|e| OdcsError::Fatal(format!("failed to write comps.xml: {e}")))?;
  }

  let pungi_compose_id =
    composeinfo::pungi_compose_id(&release_name, &date, respin);
  let info = composeinfo::build(&pungi_compose_id, &date, respin);
  let info_json = serde_json::to_string_pretty(&info).map_err(|e| {
    OdcsError::Fatal(format!("failed to serialize ComposeInfo: {e}"))
  })?;
  tokio::fs::write(
    working_dir.join("work").join("global").join("composeinfo-base.json"),
    info_json,
  )
  .await
  .map_err(|e| OdcsError::Fatal(format!("failed to write composeinfo: {e}")))?;

  store()
    .set_pungi_compose_id(
      compose.id.expect("compose id assigned"),
      &pungi_compose_id,
    )
    .await?;

  symlink_latest(target_dir, &compose.latest_dir(), &working_dir_name).await
}

/// spec §4.7 `raw_config`: clone the configured git repo at the pinned
/// commit, copy its contents into the working directory, optionally
/// overlay a server-wide wrapper configuration.
async fn materialize_raw_config(
  compose: &Compose,
  target_dir: &std::path::Path,
) -> Result<(), OdcsError> {
  let config = odcs_config();
  let entry = compose.source.first().ok_or_else(|| {
    OdcsError::ResolutionError("raw_config compose has empty source".to_string())
  })?;
  let (name, commit) = entry.split_once('#').unwrap_or((entry.as_str(), ""));
  let source = config.find_raw_config_source(name).ok_or_else(|| {
    OdcsError::ResolutionError(format!("unknown raw_config source {name:?}"))
  })?;
  let commit = if commit.is_empty() { source.default_commit.as_str() } else { commit };

  let release_name = compose.name();
  let date = composeinfo::today();
  let respin = composeinfo::next_respin(target_dir, &release_name, &date);
  let working_dir_name =
    composeinfo::working_dir_name(&release_name, &date, respin);
  let working_dir = target_dir.join(&working_dir_name);

  git::clone_at_commit(&source.git_url, &working_dir, Some(commit))
    .await
    .map_err(|e| OdcsError::ToolFailure(format!("raw_config clone failed: {e:#}")))?;

  if let Some(wrapper) = &config.raw_config_wrapper {
    tokio::fs::copy(wrapper, working_dir.join("main.conf"))
      .await
      .map_err(|e| {
        OdcsError::Fatal(format!(
          "failed to install raw_config wrapper config: {e}"
        ))
      })?;
  }

  let pungi_compose_id =
    composeinfo::pungi_compose_id(&release_name, &date, respin);
  store()
    .set_pungi_compose_id(
      compose.id.expect("compose id assigned"),
      &pungi_compose_id,
    )
    .await?;

  symlink_latest(target_dir, &compose.latest_dir(), &working_dir_name).await
}

#[cfg(unix)]
async fn symlink_latest(
  target_dir: &std::path::Path,
  latest_dir: &str,
  working_dir_name: &str,
) -> Result<(), OdcsError> {
  let link_path = target_dir.join(latest_dir);
  let _ = tokio::fs::remove_file(&link_path).await;
  tokio::fs::symlink(working_dir_name, &link_path)
    .await
    .map_err(|e| {
      OdcsError::Fatal(format!(
        "failed to symlink {} -> {working_dir_name}: {e}",
        link_path.display()
      ))
    })
}

fn tool_command_line(compose: &Compose, target_dir: &std::path::Path) -> String {
  let config = odcs_config();
  let mut cmd = format!(
    "{} --config {}/main.conf --target-dir {} --nightly",
    config.tool_path.display(),
    compose.toplevel_dir(target_dir).display(),
    target_dir.display(),
  );
  if let Some(event) = compose.koji_event
    && compose.source_type == SourceType::KojiTag
  {
    cmd.push_str(&format!(" --koji-event {event}"));
  }
  cmd
}

/// Extracts the tool's own reported error lines from its stderr, so
/// `state_reason` carries something actionable rather than a raw dump
/// (spec §4.6.3 "read the tool's own error log").
fn parsed_tool_errors(stderr: &str) -> String {
  let lines: Vec<&str> = stderr
    .lines()
    .filter(|l| {
      let l = l.trim();
      l.contains("ERROR") || l.contains("Exception") || l.contains("Traceback")
    })
    .collect();
  if lines.is_empty() {
    stderr.lines().rev().take(5).collect::<Vec<_>>().join(" | ")
  } else {
    lines.join(" | ")
  }
}

/// Best-effort file-deduplicating hardlink pass over the target directory
/// (spec §4.6.3.f): replaces byte-identical regular files with hardlinks
/// to shrink the per-compose footprint. Failure here is logged, never
/// fatal.
async fn hardlink_dedup_pass(dir: &std::path::Path) -> anyhow::Result<()> {
  use std::collections::HashMap;

  let mut by_size: HashMap<u64, Vec<std::path::PathBuf>> = HashMap::new();
  let mut stack = vec![dir.to_path_buf()];
  while let Some(current) = stack.pop() {
    let mut entries = tokio::fs::read_dir(&current).await?;
    while let Some(entry) = entries.next_entry().await? {
      let metadata = entry.metadata().await?;
      if metadata.is_dir() {
        stack.push(entry.path());
      } else if metadata.is_file() {
        by_size.entry(metadata.len()).or_default().push(entry.path());
      }
    }
  }

  for paths in by_size.into_values() {
    if paths.len() < 2 {
      continue;
    }
    let mut groups: Vec<(Vec<u8>, std::path::PathBuf)> = Vec::new();
    for path in paths {
      let contents = tokio::fs::read(&path).await?;
      if let Some((_, canonical)) = groups.iter().find(|(c, _)| c == &contents)
      {
        let canonical = canonical.clone();
        tokio::fs::remove_file(&path).await?;
        tokio::fs::hard_link(&canonical, &path).await?;
      } else {
        groups.push((contents, path));
      }
    }
  }
  Ok(())
}

async fn fail(compose_id: i64, reason: &str) {
  tracing::error!("compose {compose_id} failed | {reason}");
  if let Err(e) = store()
    .transition(compose_id, ComposeState::Generating, ComposeState::Failed, reason)
    .await
  {
    tracing::error!(
      "failed to transition compose {compose_id} to failed | {e:#}"
    );
  }
}
