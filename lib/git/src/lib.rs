use std::path::Path;

use anyhow::anyhow;
use command::run_standard_command;

/// Hash + subject of the current `HEAD`.
#[derive(Debug, Clone)]
pub struct LatestCommit {
  pub hash: String,
  pub message: String,
}

/// Clone `url` into `dir` (which must not yet exist), then check out
/// `commit` if given, else leave the clone on the remote's default branch.
/// This is the only materialization path `raw_config` composes need:
/// no commit/push/pull-or-clone machinery, since the Worker only ever
/// reads a pinned revision of the configured repository.
pub async fn clone_at_commit(
  url: &str,
  dir: &Path,
  commit: Option<&str>,
) -> anyhow::Result<()> {
  let parent = dir.parent().unwrap_or(Path::new("."));
  let clone_cmd = format!(
    "git clone {url} {}",
    dir.file_name()
      .and_then(|n| n.to_str())
      .ok_or_else(|| anyhow!("invalid clone target path"))?
  );
  let output = run_standard_command(&clone_cmd, parent).await;
  if !output.success() {
    return Err(anyhow!(
      "git clone of {url} failed | stdout: {} | stderr: {}",
      output.stdout,
      output.stderr
    ));
  }
  if let Some(commit) = commit {
    checkout(dir, commit).await?;
  }
  Ok(())
}

pub async fn checkout(
  dir: &Path,
  commit: &str,
) -> anyhow::Result<()> {
  let output = run_standard_command(
    &format!("git checkout {commit}"),
    dir,
  )
  .await;
  if !output.success() {
    return Err(anyhow!(
      "git checkout {commit} in {dir:?} failed | stdout: {} | stderr: {}",
      output.stdout,
      output.stderr
    ));
  }
  Ok(())
}

pub async fn get_commit_hash_info(
  repo_dir: &Path,
) -> anyhow::Result<LatestCommit> {
  let hash =
    run_standard_command("git rev-parse --short HEAD", repo_dir)
      .await;
  let hash = if hash.success() {
    hash.stdout.trim().to_string()
  } else {
    return Err(anyhow!("failed to get short hash | {}", hash.stderr));
  };
  let message =
    run_standard_command("git log -1 --pretty=%B", repo_dir).await;
  let message = if message.success() {
    message.stdout.trim().to_string()
  } else {
    return Err(anyhow!(
      "failed to get commit message | {}",
      message.stderr
    ));
  };
  Ok(LatestCommit { hash, message })
}

/// Gets the remote url, with `.git` stripped from the end.
pub async fn get_remote_url(path: &Path) -> anyhow::Result<String> {
  let output =
    run_standard_command("git remote show origin", path).await;
  if output.success() {
    Ok(
      output
        .stdout
        .trim()
        .strip_suffix(".git")
        .map(str::to_string)
        .unwrap_or(output.stdout),
    )
  } else {
    Err(anyhow!(
      "failed to get remote url | stdout: {} | stderr: {}",
      output.stdout,
      output.stderr
    ))
  }
}

pub fn exists(dir: &Path) -> bool {
  dir.join(".git").exists()
}
