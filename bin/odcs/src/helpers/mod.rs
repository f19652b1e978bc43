pub mod retry;

/// Current unix time in milliseconds, matching the `komodo_timestamp()`
/// helper's role in the teacher: the single place every component reads
/// "now" from, so it is easy to find if a clock abstraction is ever needed.
pub fn unix_timestamp_ms() -> i64 {
  std::time::SystemTime::now()
    .duration_since(std::time::UNIX_EPOCH)
    .map(|d| d.as_millis() as i64)
    .unwrap_or_default()
}

/// Set-equality over whitespace-tokenized fields, used throughout
/// `reuse_index` for `source`, `packages`, `sigkeys`, `arches` comparisons
/// (spec §4.3: "as set of tokens").
pub fn token_sets_equal(a: &[String], b: &[String]) -> bool {
  use std::collections::HashSet;
  let a: HashSet<&str> = a.iter().map(String::as_str).collect();
  let b: HashSet<&str> = b.iter().map(String::as_str).collect();
  a == b
}
