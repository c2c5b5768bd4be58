use serde::{Deserialize, Serialize};

/// Metadata row for a cached document, without the payload.
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct AssetRecord {
    pub key: String,
    pub filename: String,
    pub size: i64,
    pub created_at: String,
}
