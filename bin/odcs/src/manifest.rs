//! Post-run package validation (spec §4.6.d): reads the tool's RPM
//! manifest and verifies every requested package name appears at least
//! once in non-source output.
//!
//! Pungi's real manifest (`compose/metadata/rpms.json`) is a deeply nested
//! `payload.rpms[variant][arch][srpm_nevra][nevra]` structure. Since the
//! compose tool here is an opaque subprocess this reimplementation never
//! actually invokes, the manifest format is simplified to a flat list of
//! `{name, arch, source}` entries — noted in DESIGN.md — sufficient to
//! implement the one property the spec actually tests (§8 scenario D).

use std::path::Path;

use serde::Deserialize;

use crate::error::OdcsError;

#[derive(Debug, Clone, Deserialize)]
pub struct ManifestEntry {
  pub name: String,
  #[serde(default)]
  pub arch: String,
  /// True for `.src.rpm` entries, which don't count toward "package was
  /// produced" (spec §4.6.d: "appears at least once in non-source
  /// outputs").
  #[serde(default)]
  pub source: bool,
}

#[derive(Debug, Clone, Deserialize, Default)]
pub struct ToolManifest {
  #[serde(default)]
  pub rpms: Vec<ManifestEntry>,
}

impl ToolManifest {
  pub async fn read(path: &Path) -> Result<Self, OdcsError> {
    let raw = tokio::fs::read_to_string(path).await.map_err(|e| {
      OdcsError::ValidationFailure(format!(
        "failed to read tool manifest {}: {e}",
        path.display()
      ))
    })?;
    serde_json::from_str(&raw).map_err(|e| {
      OdcsError::ValidationFailure(format!(
        "malformed tool manifest {}: {e}",
        path.display()
      ))
    })
  }

  /// `Err(ValidationFailure)` listing every name in `packages` that does
  /// not appear among this manifest's non-source entries.
  pub fn check_packages_present(
    &self,
    packages: &[String],
  ) -> Result<(), OdcsError> {
    let produced: std::collections::HashSet<&str> = self
      .rpms
      .iter()
      .filter(|e| !e.source)
      .map(|e| e.name.as_str())
      .collect();
    let missing: Vec<&str> = packages
      .iter()
      .map(String::as_str)
      .filter(|p| !produced.contains(p))
      .collect();
    if missing.is_empty() {
      Ok(())
    } else {
      Err(OdcsError::ValidationFailure(format!(
        "requested packages missing from compose output: {}",
        missing.join(", ")
      )))
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  fn manifest(names: &[(&str, bool)]) -> ToolManifest {
    ToolManifest {
      rpms: names
        .iter()
        .map(|(name, source)| ManifestEntry {
          name: name.to_string(),
          arch: "x86_64".to_string(),
          source: *source,
        })
        .collect(),
    }
  }

  #[test]
  fn passes_when_all_packages_present() {
    let m = manifest(&[("pkg1", false), ("pkg2", false)]);
    let packages = vec!["pkg1".to_string(), "pkg2".to_string()];
    assert!(m.check_packages_present(&packages).is_ok());
  }

  #[test]
  fn fails_listing_missing_package_names() {
    let m = manifest(&[("pkg1", false), ("pkg2", false)]);
    let packages =
      vec!["pkg1".to_string(), "pkg2".to_string(), "pkg3".to_string()];
    let err = m.check_packages_present(&packages).unwrap_err();
    let OdcsError::ValidationFailure(msg) = err else {
      panic!("expected ValidationFailure");
    };
    assert!(msg.contains("pkg3"));
  }

  #[test]
  fn source_only_package_does_not_count_as_present() {
    let m = manifest(&[("pkg1", true)]);
    let packages = vec!["pkg1".to_string()];
    let err = m.check_packages_present(&packages).unwrap_err();
    assert!(matches!(err, OdcsError::ValidationFailure(_)));
  }
}
