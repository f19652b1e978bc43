use bson::doc;
use mongodb::Collection;
use mongodb::options::ReturnDocument;

/// Mongo has no native auto-increment; composes need a small monotonic
/// integer id (not an ObjectId) so URLs and `odcs-<id>` directory names stay
/// short and human-typeable. The usual idiom: a single-document-per-counter
/// collection bumped with `findOneAndUpdate $inc`, which Mongo guarantees is
/// atomic even under concurrent callers.
pub async fn next_id(
  counters: &Collection<bson::Document>,
  name: &str,
) -> anyhow::Result<i64> {
  let doc = counters
    .find_one_and_update(
      doc! { "_id": name },
      doc! { "$inc": { "seq": 1i64 } },
    )
    .upsert(true)
    .return_document(ReturnDocument::After)
    .await?
    .ok_or_else(|| anyhow::anyhow!("counter upsert returned no document"))?;
  doc
    .get_i64("seq")
    .map_err(|e| anyhow::anyhow!("counter document missing seq: {e}"))
}

#[cfg(test)]
mod tests {
  // Exercised against a real mongod in integration tests; this crate keeps
  // unit tests to pure logic (see helpers::retry, reuse_index).
}
