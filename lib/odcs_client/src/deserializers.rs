use serde::{Deserialize, Deserializer};

/// Several ODCS fields (`source`, `packages`, `sigkeys`, `arches`, `builds`)
/// are whitespace-separated strings on the wire but are easier to work with
/// as token vectors internally. Accept either a string or an array of
/// strings on input, always re-serialize as a single space-joined string.
pub fn space_separated_list<'de, D>(
  deserializer: D,
) -> Result<Vec<String>, D::Error>
where
  D: Deserializer<'de>,
{
  #[derive(Deserialize)]
  #[serde(untagged)]
  enum StringOrVec {
    String(String),
    Vec(Vec<String>),
  }
  Ok(match StringOrVec::deserialize(deserializer)? {
    StringOrVec::String(s) => s
      .split_whitespace()
      .map(str::to_string)
      .collect(),
    StringOrVec::Vec(v) => v,
  })
}

pub fn option_space_separated_list<'de, D>(
  deserializer: D,
) -> Result<Option<Vec<String>>, D::Error>
where
  D: Deserializer<'de>,
{
  #[derive(Deserialize)]
  #[serde(untagged)]
  enum Opt {
    None,
    String(String),
    Vec(Vec<String>),
  }
  Ok(match Opt::deserialize(deserializer)? {
    Opt::None => None,
    Opt::String(s) => {
      Some(s.split_whitespace().map(str::to_string).collect())
    }
    Opt::Vec(v) => Some(v),
  })
}
