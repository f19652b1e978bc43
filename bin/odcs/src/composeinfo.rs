//! Identifies one tool run (spec §4.7, fields recovered from
//! `pungi.py`/`backend.py` per SPEC_FULL §C.6-7).
//!
//! The working directory the external tool writes into is named
//! `<name>-1-<date>.n.<respin>`; `Compose::toplevel_dir` is always the
//! stable `latest-<name>-1` symlink pointing at it, never the dated
//! directory itself.

use std::path::Path;

use chrono::Utc;
use odcs_client::entities::compose::{
  ComposeInfo, ComposeInfoCompose, ComposeInfoHeader, ComposeInfoPayload,
};

/// Today's date as `YYYYMMDD`.
pub fn today() -> String {
  Utc::now().format("%Y%m%d").to_string()
}

/// Scans `target_dir` for existing working directories matching
/// `<name>-1-<date>.n.<respin>` and returns `max(respin) + 1`, starting at
/// 0 (spec §4.7 "monotonically-incrementing respin").
pub fn next_respin(target_dir: &Path, name: &str, date: &str) -> u32 {
  let prefix = format!("{name}-1-{date}.n.");
  let mut max_respin: Option<u32> = None;
  let Ok(entries) = std::fs::read_dir(target_dir) else {
    return 0;
  };
  for entry in entries.flatten() {
    let file_name = entry.file_name();
    let file_name = file_name.to_string_lossy();
    if let Some(suffix) = file_name.strip_prefix(&prefix)
      && let Ok(respin) = suffix.parse::<u32>()
    {
      max_respin = Some(max_respin.map_or(respin, |m| m.max(respin)));
    }
  }
  max_respin.map_or(0, |m| m + 1)
}

pub fn working_dir_name(name: &str, date: &str, respin: u32) -> String {
  format!("{name}-1-{date}.n.{respin}")
}

/// `pungi_compose_id` (spec's "identifier assigned by the compose tool once
/// its run directory is created"): same string as the working directory
/// name, which is how Pungi itself derives compose ids from its nightly
/// naming scheme.
pub fn pungi_compose_id(name: &str, date: &str, respin: u32) -> String {
  working_dir_name(name, date, respin)
}

pub fn build(pungi_compose_id: &str, date: &str, respin: u32) -> ComposeInfo {
  ComposeInfo {
    header: ComposeInfoHeader::new(),
    payload: ComposeInfoPayload {
      compose: ComposeInfoCompose {
        id: pungi_compose_id.to_string(),
        kind: "production".to_string(),
        date: date.to_string(),
        respin,
        label: String::new(),
      },
    },
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn respin_starts_at_zero_with_no_prior_runs() {
    let dir = tempdir();
    assert_eq!(next_respin(dir.path(), "odcs-1", "20260101"), 0);
  }

  #[test]
  fn respin_increments_past_existing_runs() {
    let dir = tempdir();
    std::fs::create_dir(dir.path().join("odcs-1-1-20260101.n.0")).unwrap();
    std::fs::create_dir(dir.path().join("odcs-1-1-20260101.n.2")).unwrap();
    assert_eq!(next_respin(dir.path(), "odcs-1-1", "20260101"), 3);
  }

  #[test]
  fn respin_ignores_other_names_and_dates() {
    let dir = tempdir();
    std::fs::create_dir(dir.path().join("odcs-2-1-20260101.n.5")).unwrap();
    std::fs::create_dir(dir.path().join("odcs-1-1-20251231.n.9")).unwrap();
    assert_eq!(next_respin(dir.path(), "odcs-1-1", "20260101"), 0);
  }

  fn tempdir() -> tempdir_shim::TempDir {
    tempdir_shim::TempDir::new()
  }

  /// Minimal scratch-dir helper so this test module doesn't need a
  /// `tempfile` dev-dependency for three directory-listing assertions.
  mod tempdir_shim {
    use std::path::{Path, PathBuf};

    pub struct TempDir(PathBuf);

    impl TempDir {
      pub fn new() -> Self {
        let dir = std::env::temp_dir().join(format!(
          "odcs-composeinfo-test-{}-{}",
          std::process::id(),
          std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .unwrap()
            .as_nanos()
        ));
        std::fs::create_dir_all(&dir).unwrap();
        Self(dir)
      }

      pub fn path(&self) -> &Path {
        &self.0
      }
    }

    impl Drop for TempDir {
      fn drop(&mut self) {
        let _ = std::fs::remove_dir_all(&self.0);
      }
    }
  }
}
