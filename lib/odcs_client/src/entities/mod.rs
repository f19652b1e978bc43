pub mod compose;
pub mod logger;
pub mod user;

/// Unix ms timestamp. Kept as a type alias so it typeshares as a plain
/// number rather than a wrapped struct, matching how the rest of the wire
/// types represent time.
pub type I64 = i64;

/// Hex-string Mongo ObjectId, empty string before the document is persisted.
pub type MongoId = String;
