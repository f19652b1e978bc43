//! Mutates a newly-claimed compose so its inputs become reuse-stable before
//! any generation work runs (spec §4.2).

use std::collections::BTreeSet;

use odcs_client::entities::compose::{Compose, ComposeFlag, SourceType};
use quick_xml::{events::Event, reader::Reader};
use tracing::instrument;

use crate::{
  clients::mbs::ModuleBuild,
  config::odcs_config,
  error::OdcsError,
  helpers::retry::{RetryConfig, retry_transient},
  state::{koji_client, mbs_client},
};

/// Result of resolution: the normalized `source` tokens and, where
/// applicable, the pinned `koji_event`. The caller (Worker) persists these
/// onto the compose via `Store::set_resolved`.
#[derive(Debug, Clone, Default)]
pub struct Resolved {
  pub source: Vec<String>,
  pub koji_event: Option<i64>,
}

#[instrument(skip(compose), fields(id = ?compose.id, source_type = %compose.source_type))]
pub async fn resolve(compose: &Compose) -> Result<Resolved, OdcsError> {
  match compose.source_type {
    SourceType::Repo => resolve_repo(compose).await,
    SourceType::KojiTag => resolve_koji_tag(compose).await,
    SourceType::Module => resolve_module(compose).await,
    SourceType::Pulp => Ok(Resolved { source: compose.source.clone(), koji_event: None }),
    SourceType::Build => Ok(Resolved { source: compose.source.clone(), koji_event: None }),
    SourceType::RawConfig => resolve_raw_config(compose),
  }
}

async fn resolve_repo(compose: &Compose) -> Result<Resolved, OdcsError> {
  let path = compose.source.first().ok_or_else(|| {
    OdcsError::ResolutionError("repo compose has empty source".to_string())
  })?;
  let repomd_path = std::path::Path::new(path).join("repodata").join("repomd.xml");
  let xml = tokio::fs::read_to_string(&repomd_path).await.map_err(|e| {
    OdcsError::ResolutionError(format!(
      "repo: failed to read {}: {e}",
      repomd_path.display()
    ))
  })?;
  let revision = extract_repomd_revision(&xml)?;
  Ok(Resolved { source: compose.source.clone(), koji_event: Some(revision) })
}

/// Parses the `<revision>` element out of `repomd.xml` (SPEC_FULL §C.5).
/// `repomd.xml`'s `revision` is an opaque monotone integer the repository
/// tooling bumps on every metadata regeneration; ODCS treats it exactly
/// like a Koji event id for reuse/staleness comparison.
fn extract_repomd_revision(xml: &str) -> Result<i64, OdcsError> {
  let mut reader = Reader::from_str(xml);
  reader.config_mut().trim_text(true);
  let mut buf = Vec::new();
  let mut in_revision = false;
  loop {
    match reader.read_event_into(&mut buf) {
      Ok(Event::Start(tag)) if tag.local_name().as_ref() == b"revision" => {
        in_revision = true;
      }
      Ok(Event::Text(text)) if in_revision => {
        let value = text
          .unescape()
          .map_err(|e| OdcsError::ResolutionError(format!("repomd.xml: {e}")))?;
        return value.trim().parse::<i64>().map_err(|e| {
          OdcsError::ResolutionError(format!(
            "repomd.xml: non-numeric revision {value:?}: {e}"
          ))
        });
      }
      Ok(Event::Eof) => {
        return Err(OdcsError::ResolutionError(
          "repomd.xml: missing <revision> element".to_string(),
        ));
      }
      Err(e) => {
        return Err(OdcsError::ResolutionError(format!(
          "repomd.xml: parse error: {e}"
        )));
      }
      _ => {}
    }
    buf.clear();
  }
}

async fn resolve_koji_tag(compose: &Compose) -> Result<Resolved, OdcsError> {
  if let Some(event) = compose.koji_event {
    return Ok(Resolved { source: compose.source.clone(), koji_event: Some(event) });
  }
  let client = koji_client().ok_or_else(|| {
    OdcsError::ResolutionError("koji_tag compose but no koji client configured".to_string())
  })?;
  let retry = RetryConfig::default();
  let event = retry_transient(&retry, || client.current_event_id()).await?;
  Ok(Resolved { source: compose.source.clone(), koji_event: Some(event) })
}

fn resolve_raw_config(compose: &Compose) -> Result<Resolved, OdcsError> {
  let entry = compose.source.first().ok_or_else(|| {
    OdcsError::ResolutionError("raw_config compose has empty source".to_string())
  })?;
  // SPEC_FULL §C.10: "name#commit", commit optional.
  let (name, _commit) = entry.split_once('#').unwrap_or((entry.as_str(), ""));
  odcs_config()
    .find_raw_config_source(name)
    .ok_or_else(|| OdcsError::ResolutionError(format!("unknown raw_config source {name:?}")))?;
  Ok(Resolved { source: compose.source.clone(), koji_event: None })
}

async fn resolve_module(compose: &Compose) -> Result<Resolved, OdcsError> {
  let client = mbs_client().ok_or_else(|| {
    OdcsError::ResolutionError("module compose but no MBS client configured".to_string())
  })?;
  let no_deps = compose.has_flag(ComposeFlag::NoDeps);
  let retry = RetryConfig::default();

  let mut seen: BTreeSet<String> = BTreeSet::new();
  let mut resolved: Vec<ModuleBuild> = Vec::new();
  let mut queue: Vec<String> = compose.source.clone();

  while let Some(reference) = queue.pop() {
    let (name, stream, version, context) = parse_module_reference(&reference)?;

    // SPEC_FULL §C.2 / original `mbs.py:69-78`: a `-devel` module is built
    // as a CG build in Koji and is never itself returned by MBS, so the
    // non-devel base name is what's actually queried; `-devel` is
    // re-appended to each resolved build's name below.
    let is_devel = name.ends_with("-devel");
    let query_name = if is_devel {
      name.trim_end_matches("-devel").to_string()
    } else {
      name.clone()
    };

    let builds = retry_transient(&retry, || {
      client.ready_module_builds(&query_name, &stream, version.as_deref(), context.as_deref())
    })
    .await?;

    if builds.is_empty() {
      return Err(OdcsError::ResolutionError(format!(
        "no ready module build found for {reference}"
      )));
    }

    // SPEC_FULL §C.3: multiple contexts for the same name:stream all apply.
    let newest_version = builds.iter().map(|b| b.version.clone()).max().unwrap();
    let matching: Vec<ModuleBuild> =
      builds.into_iter().filter(|b| b.version == newest_version).collect();

    for mut build in matching {
      if is_devel {
        build.name = format!("{}-devel", build.name);
      }

      // Conflicts are keyed on name:stream (original `mbs.py:183-189`), not
      // name alone, so two different streams of one module coexist; a
      // differing context within the same name:stream is a distinct NSVC
      // to add, not a duplicate — only an identical name:stream:context is
      // skipped.
      let same_key: Vec<&ModuleBuild> = resolved
        .iter()
        .filter(|r| r.name == build.name && r.stream == build.stream)
        .collect();
      if let Some(conflict) = same_key.iter().find(|r| r.version != build.version) {
        return Err(OdcsError::ResolutionError(format!(
          "conflicting resolutions for module {}:{}: {} vs {}",
          build.name, build.stream, conflict.version, build.version
        )));
      }
      if same_key.iter().any(|r| r.context == build.context) {
        continue;
      }

      if !no_deps {
        for dep in &build.requires {
          let dep_ref = format!("{}:{}", dep.name, dep.stream);
          if seen.insert(dep_ref.clone()) {
            queue.push(dep_ref);
          }
        }
        // Original `mbs.py`: "Devel module always depends on the
        // non-devel version" — enqueue the base module explicitly so it's
        // resolved and included alongside its `-devel` counterpart.
        if is_devel {
          let base_ref = format!("{query_name}:{stream}");
          if seen.insert(base_ref.clone()) {
            queue.push(base_ref);
          }
        }
      }
      resolved.push(build);
    }
  }

  let mut nsvcs: Vec<String> = resolved.iter().map(ModuleBuild::nsvc).collect();
  nsvcs.sort();
  nsvcs.dedup();
  Ok(Resolved { source: nsvcs, koji_event: None })
}

/// Splits `name:stream[:version[:context]]` / bare `name-devel` module
/// references. Malformed references (missing `:stream`) are a hard
/// `ResolutionError`. Also accepts the legacy dash-separated
/// `name-stream-version` grammar (spec §9 Open Question), normalizing it to
/// colon form first — the authoritative NSVC form, per spec §9, is
/// colon-separated.
fn parse_module_reference(
  reference: &str,
) -> Result<(String, String, Option<String>, Option<String>), OdcsError> {
  let reference = &normalize_legacy_dash_form(reference);
  let mut parts = reference.splitn(4, ':');
  let name = parts
    .next()
    .filter(|s| !s.is_empty())
    .ok_or_else(|| OdcsError::ResolutionError(format!("malformed module reference {reference:?}")))?
    .to_string();
  let stream = parts
    .next()
    .filter(|s| !s.is_empty())
    .ok_or_else(|| {
      OdcsError::ResolutionError(format!(
        "module reference {reference:?} missing :stream"
      ))
    })?
    .to_string();
  let version = parts.next().map(str::to_string);
  let context = parts.next().map(str::to_string);
  Ok((name, stream, version, context))
}

/// Rewrites a legacy `name-stream-version` reference to `name:stream:version`
/// so `parse_module_reference` only has one grammar to parse. Colon-form
/// input passes through untouched. The dash form is ambiguous when `name`
/// itself contains dashes, so this only fires when the last dash-separated
/// component looks like a version (purely numeric, as every real MBS
/// version is): `httpd-2.4-20181010171536` -> `httpd:2.4:20181010171536`,
/// while `python-pip` (no numeric trailing component) is left alone and
/// falls through to the "missing :stream" error, same as before.
fn normalize_legacy_dash_form(reference: &str) -> String {
  if reference.contains(':') {
    return reference.to_string();
  }
  let Some((rest, version)) = reference.rsplit_once('-') else {
    return reference.to_string();
  };
  if version.is_empty() || !version.bytes().all(|b| b.is_ascii_digit()) {
    return reference.to_string();
  }
  let Some((name, stream)) = rest.rsplit_once('-') else {
    return reference.to_string();
  };
  format!("{name}:{stream}:{version}")
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn parses_full_nsvc() {
    let (name, stream, version, context) =
      parse_module_reference("nodejs:18:123456:deadbeef").unwrap();
    assert_eq!(name, "nodejs");
    assert_eq!(stream, "18");
    assert_eq!(version.as_deref(), Some("123456"));
    assert_eq!(context.as_deref(), Some("deadbeef"));
  }

  #[test]
  fn parses_name_stream_only() {
    let (name, stream, version, context) =
      parse_module_reference("nodejs:18").unwrap();
    assert_eq!(name, "nodejs");
    assert_eq!(stream, "18");
    assert!(version.is_none());
    assert!(context.is_none());
  }

  #[test]
  fn rejects_missing_stream() {
    assert!(parse_module_reference("nodejs").is_err());
  }

  #[test]
  fn accepts_legacy_dash_form() {
    let (name, stream, version, context) =
      parse_module_reference("httpd-2.4-20181010171536").unwrap();
    assert_eq!(name, "httpd");
    assert_eq!(stream, "2.4");
    assert_eq!(version.as_deref(), Some("20181010171536"));
    assert!(context.is_none());
  }

  #[test]
  fn dash_form_without_numeric_version_is_rejected() {
    // no trailing numeric component: not a valid nsvc under either grammar
    assert!(parse_module_reference("python-pip").is_err());
  }

  #[test]
  fn extracts_repomd_revision() {
    let xml = r#"<?xml version="1.0"?>
      <repomd xmlns="http://linux.duke.edu/metadata/repo">
        <revision>1690000000</revision>
      </repomd>"#;
    assert_eq!(extract_repomd_revision(xml).unwrap(), 1_690_000_000);
  }

  #[test]
  fn rejects_repomd_without_revision() {
    let xml = r#"<repomd></repomd>"#;
    assert!(extract_repomd_revision(xml).is_err());
  }
}
