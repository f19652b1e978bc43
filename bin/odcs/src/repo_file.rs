//! Writes the per-compose `.repo` artifact (spec §4.8): one section for
//! tool-based composes pointing at `result_repo_url/$basearch/os`, or one
//! section per content-set (possibly arch-merged) for Pulp composes.
//! Written atomically: render to a `.tmp` sibling, then rename over the
//! final path.

use std::path::Path;

use indexmap::IndexMap;
use odcs_client::entities::compose::Compose;
use tracing::instrument;

use crate::{clients::pulp::PulpRepository, error::OdcsError, helpers::token_sets_equal};

#[instrument(skip(compose))]
pub async fn write_tool_repo_file(
  compose: &Compose,
  target_dir: &Path,
  target_dir_url: &str,
) -> Result<(), OdcsError> {
  let repo_dir = compose.result_repo_dir(target_dir);
  tokio::fs::create_dir_all(&repo_dir).await.map_err(|e| {
    OdcsError::Fatal(format!(
      "failed to create {}: {e}",
      repo_dir.display()
    ))
  })?;

  let baseurl = format!("{}/$basearch/os", compose.result_repo_url(target_dir_url));
  let contents = render_section(&compose.name(), &baseurl);
  atomic_write(&compose.result_repofile_path(target_dir), &contents).await
}

/// One repository section, named after a Pulp content set (plus an arch
/// suffix when that content set's repositories could not be arch-merged).
struct Section {
  name: String,
  baseurl: String,
}

#[instrument(skip(compose, repos))]
pub async fn write_pulp_repo_file(
  compose: &Compose,
  repos: &[PulpRepository],
  target_dir: &Path,
) -> Result<(), OdcsError> {
  let sections = build_pulp_sections(repos)?;
  let repo_dir = compose.result_repo_dir(target_dir);
  tokio::fs::create_dir_all(&repo_dir).await.map_err(|e| {
    OdcsError::Fatal(format!(
      "failed to create {}: {e}",
      repo_dir.display()
    ))
  })?;
  let contents: String = sections
    .iter()
    .map(|s| render_section(&s.name, &s.baseurl))
    .collect();
  atomic_write(&compose.result_repofile_path(target_dir), &contents).await
}

/// Groups Pulp repositories by content set, merging per-arch entries under
/// a single `$basearch`-parameterized URL when every arch's URL differs
/// only by arch. Rejects a content set whose repositories disagree on
/// sigkeys with `ValidationFailure` (spec.md §9's open question: the
/// original silently intersects them, this reimplementation refuses
/// instead of guessing).
fn build_pulp_sections(
  repos: &[PulpRepository],
) -> Result<Vec<Section>, OdcsError> {
  let mut by_content_set: IndexMap<&str, Vec<&PulpRepository>> =
    IndexMap::new();
  for repo in repos {
    by_content_set.entry(&repo.content_set).or_default().push(repo);
  }

  let mut sections = Vec::new();
  for (content_set, group) in by_content_set {
    let first_sigkeys = &group[0].sigkeys;
    for repo in &group[1..] {
      if !token_sets_equal(&repo.sigkeys, first_sigkeys) {
        return Err(OdcsError::ValidationFailure(format!(
          "pulp: repositories backing content set {content_set:?} disagree on sigkeys"
        )));
      }
    }

    if let Some(pattern) = merge_by_basearch(&group) {
      sections.push(Section { name: content_set.to_string(), baseurl: pattern });
      continue;
    }
    for repo in &group {
      sections.push(Section {
        name: format!("{content_set}-{}", repo.arch),
        baseurl: repo.url.clone(),
      });
    }
  }
  Ok(sections)
}

/// `Some(pattern)` when every repository's URL differs from the others
/// only by its own `arch` substring, substitutable with a single
/// `$basearch`-parameterized URL.
fn merge_by_basearch(group: &[&PulpRepository]) -> Option<String> {
  if group.len() < 2 {
    return None;
  }
  let pattern = group[0].url.replacen(&group[0].arch, "$basearch", 1);
  for repo in group {
    if repo.url.replacen(&repo.arch, "$basearch", 1) != pattern {
      return None;
    }
  }
  Some(pattern)
}

fn render_section(name: &str, baseurl: &str) -> String {
  format!(
    "[{name}]\nname={name}\nbaseurl={baseurl}\nenabled=1\ngpgcheck=0\n\n"
  )
}

async fn atomic_write(path: &Path, contents: &str) -> Result<(), OdcsError> {
  let tmp = path.with_extension("repo.tmp");
  tokio::fs::write(&tmp, contents).await.map_err(|e| {
    OdcsError::Fatal(format!("failed to write {}: {e}", tmp.display()))
  })?;
  tokio::fs::rename(&tmp, path).await.map_err(|e| {
    OdcsError::Fatal(format!(
      "failed to rename {} to {}: {e}",
      tmp.display(),
      path.display()
    ))
  })
}

#[cfg(test)]
mod tests {
  use super::*;

  fn repo(content_set: &str, arch: &str, url: &str, sigkeys: &[&str]) -> PulpRepository {
    PulpRepository {
      content_set: content_set.to_string(),
      arch: arch.to_string(),
      url: url.to_string(),
      sigkeys: sigkeys.iter().map(|s| s.to_string()).collect(),
    }
  }

  #[test]
  fn merges_per_arch_urls_into_basearch_pattern() {
    let repos = vec![
      repo("rhel-7-server-rpms", "x86_64", "https://pulp/rhel7/x86_64/os", &["abc"]),
      repo("rhel-7-server-rpms", "ppc64", "https://pulp/rhel7/ppc64/os", &["abc"]),
    ];
    let sections = build_pulp_sections(&repos).unwrap();
    assert_eq!(sections.len(), 1);
    assert_eq!(sections[0].baseurl, "https://pulp/rhel7/$basearch/os");
  }

  #[test]
  fn keeps_separate_sections_when_urls_dont_merge() {
    let repos = vec![
      repo("rhel-7-server-rpms", "x86_64", "https://pulp/a/os", &["abc"]),
      repo("rhel-7-server-rpms", "ppc64", "https://pulp/b/os", &["abc"]),
    ];
    let sections = build_pulp_sections(&repos).unwrap();
    assert_eq!(sections.len(), 2);
  }

  #[test]
  fn rejects_mismatched_sigkeys_for_same_content_set() {
    let repos = vec![
      repo("rhel-7-server-rpms", "x86_64", "https://pulp/rhel7/x86_64/os", &["abc"]),
      repo("rhel-7-server-rpms", "ppc64", "https://pulp/rhel7/ppc64/os", &["def"]),
    ];
    let err = build_pulp_sections(&repos).unwrap_err();
    assert!(matches!(err, OdcsError::ValidationFailure(_)));
  }
}
