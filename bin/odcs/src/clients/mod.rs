pub mod koji;
pub mod mbs;
pub mod pulp;

use std::time::Duration;

use crate::error::OdcsError;

pub(crate) fn http_client() -> reqwest::Client {
  reqwest::Client::builder()
    .connect_timeout(Duration::from_secs(10))
    .timeout(Duration::from_secs(30))
    .build()
    .expect("static reqwest client config is valid")
}

/// Maps a transport-level failure to `Transient` (worth retrying) and a
/// non-2xx response to `ResolutionError` (the server told us something
/// concrete, retrying won't help).
pub(crate) fn map_transport_err(
  context: &str,
  err: reqwest::Error,
) -> OdcsError {
  if err.is_timeout() || err.is_connect() {
    OdcsError::Transient(format!("{context}: {err}"))
  } else {
    OdcsError::ResolutionError(format!("{context}: {err}"))
  }
}

pub(crate) fn map_status_err(
  context: &str,
  status: reqwest::StatusCode,
  body: &str,
) -> OdcsError {
  if status.is_server_error() || status == reqwest::StatusCode::TOO_MANY_REQUESTS
  {
    OdcsError::Transient(format!("{context}: {status} | {body}"))
  } else {
    OdcsError::ResolutionError(format!("{context}: {status} | {body}"))
  }
}
