//! Data types for documents, chunks, and search results.

use std::borrow::Cow;
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::error::{RagError, Result};

/// Where a [`Document`] came from.
///
/// The string form is the tag persisted in chunk metadata and is stable.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum DocumentSource {
    /// One spending record.
    Expenses,
    /// One income record (paycheck, deposit).
    Transactions,
    /// One savings goal.
    Goals,
    /// The user's profile singleton.
    Profile,
    /// Metadata describing an uploaded file.
    UploadsMetadata,
    /// Text extracted from an uploaded file.
    UploadsContent,
    /// A caller-defined source, e.g. `"statement"`.
    Other(String),
}

impl DocumentSource {
    /// The persisted tag for this source.
    pub fn as_str(&self) -> &str {
        match self {
            DocumentSource::Expenses => "expenses",
            DocumentSource::Transactions => "transactions",
            DocumentSource::Goals => "goals",
            DocumentSource::Profile => "profile",
            DocumentSource::UploadsMetadata => "uploads_metadata",
            DocumentSource::UploadsContent => "uploads_content",
            DocumentSource::Other(tag) => tag,
        }
    }
}

impl fmt::Display for DocumentSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl From<&str> for DocumentSource {
    fn from(s: &str) -> Self {
        match s {
            "expenses" => DocumentSource::Expenses,
            "transactions" => DocumentSource::Transactions,
            "goals" => DocumentSource::Goals,
            "profile" => DocumentSource::Profile,
            "uploads_metadata" => DocumentSource::UploadsMetadata,
            "uploads_content" => DocumentSource::UploadsContent,
            other => DocumentSource::Other(other.to_string()),
        }
    }
}

impl FromStr for DocumentSource {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        Ok(DocumentSource::from(s))
    }
}

impl Serialize for DocumentSource {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for DocumentSource {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let tag = String::deserialize(deserializer)?;
        Ok(DocumentSource::from(tag.as_str()))
    }
}

/// One logical external record before chunking.
///
/// Documents are never persisted; only the chunks derived from them are.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Document {
    /// Unique identifier for the document.
    pub id: String,
    /// The owning tenant.
    pub user_id: String,
    /// The text content of the document.
    pub text: String,
    /// Origin of the record.
    pub source: DocumentSource,
    /// When the document was assembled.
    pub created_at: DateTime<Utc>,
}

impl Document {
    /// Create a document with a fresh random id.
    pub fn new(
        user_id: impl Into<String>,
        text: impl Into<String>,
        source: impl Into<DocumentSource>,
    ) -> Self {
        Self::with_id(uuid::Uuid::new_v4().to_string(), user_id, text, source)
    }

    /// Create a document keyed by an external record id.
    pub fn with_id(
        id: impl Into<String>,
        user_id: impl Into<String>,
        text: impl Into<String>,
        source: impl Into<DocumentSource>,
    ) -> Self {
        Self {
            id: id.into(),
            user_id: user_id.into(),
            text: text.into(),
            source: source.into(),
            created_at: Utc::now(),
        }
    }
}

/// Typed chunk metadata.
///
/// Persisted as a string-keyed JSON object `{"source": "...", "idx": "<n>"}`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChunkMetadata {
    /// Origin of the owning document.
    pub source: DocumentSource,
    /// Position of the chunk within its document.
    pub idx: usize,
}

impl ChunkMetadata {
    /// Create metadata for the chunk at `idx`.
    pub fn new(source: DocumentSource, idx: usize) -> Self {
        Self { source, idx }
    }

    /// Flatten into the persisted string map.
    pub fn to_map(&self) -> HashMap<String, String> {
        HashMap::from([
            ("source".to_string(), self.source.as_str().to_string()),
            ("idx".to_string(), self.idx.to_string()),
        ])
    }

    /// Rebuild from the persisted string map.
    ///
    /// # Errors
    ///
    /// Returns [`RagError::Decode`] if either key is missing or `idx` is not
    /// an unsigned integer.
    pub fn from_map(map: &HashMap<String, String>) -> Result<Self> {
        let source = map
            .get("source")
            .ok_or_else(|| RagError::Decode("chunk metadata is missing 'source'".to_string()))?;
        let idx = map
            .get("idx")
            .ok_or_else(|| RagError::Decode("chunk metadata is missing 'idx'".to_string()))?;
        let idx = idx
            .parse::<usize>()
            .map_err(|e| RagError::Decode(format!("chunk metadata 'idx' is not an index: {e}")))?;
        Ok(Self { source: DocumentSource::from(source.as_str()), idx })
    }

    /// Serialize to the persisted JSON text.
    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string(&self.to_map())
            .map_err(|e| RagError::Decode(format!("failed to encode chunk metadata: {e}")))
    }

    /// Parse the persisted JSON text.
    pub fn from_json(text: &str) -> Result<Self> {
        let map: HashMap<String, String> = serde_json::from_str(text)
            .map_err(|e| RagError::Decode(format!("chunk metadata is not a string map: {e}")))?;
        Self::from_map(&map)
    }
}

impl Serialize for ChunkMetadata {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        self.to_map().serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for ChunkMetadata {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let map = HashMap::<String, String>::deserialize(deserializer)?;
        ChunkMetadata::from_map(&map).map_err(serde::de::Error::custom)
    }
}

/// Build the globally unique id of the chunk at `idx` of a document.
///
/// Re-ingesting the same document yields the same ids, which makes
/// re-indexing idempotent. `%` and `:` inside either id are percent-encoded
/// so distinct `(user_id, doc_id)` pairs never share an id.
pub fn chunk_id(user_id: &str, doc_id: &str, idx: usize) -> String {
    format!("{}:{}:{idx}", escape_id_part(user_id), escape_id_part(doc_id))
}

fn escape_id_part(part: &str) -> Cow<'_, str> {
    if part.contains(['%', ':']) {
        Cow::Owned(part.replace('%', "%25").replace(':', "%3A"))
    } else {
        Cow::Borrowed(part)
    }
}

/// A segment of a [`Document`] with its vector embedding.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Chunk {
    /// Unique identifier for the chunk.
    pub id: String,
    /// The owning tenant. Never changes after creation.
    pub user_id: String,
    /// The ID of the parent [`Document`]. Lookup only.
    pub doc_id: String,
    /// The text content of the chunk.
    pub text: String,
    /// Source tag and position.
    pub metadata: ChunkMetadata,
    /// The vector embedding for this chunk's text.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub embedding: Option<Vec<f32>>,
}

/// A retrieved [`Chunk`] paired with a relevance score.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Hit {
    /// The retrieved chunk.
    pub chunk: Chunk,
    /// Cosine similarity in `[-1, 1]` (higher is more relevant).
    pub score: f32,
}

/// In-memory index entry used by the per-session cache store.
#[derive(Debug, Clone, PartialEq)]
pub struct IndexedChunk {
    pub id: String,
    pub user_id: String,
    pub doc_id: String,
    pub metadata: ChunkMetadata,
    pub text: String,
    pub vector: Vec<f64>,
}

impl IndexedChunk {
    /// Origin of the owning document.
    pub fn source(&self) -> &DocumentSource {
        &self.metadata.source
    }

    /// Convert back into a [`Chunk`], narrowing the vector to `f32`.
    pub fn to_chunk(&self) -> Chunk {
        Chunk {
            id: self.id.clone(),
            user_id: self.user_id.clone(),
            doc_id: self.doc_id.clone(),
            text: self.text.clone(),
            metadata: self.metadata.clone(),
            embedding: Some(self.vector.iter().map(|v| *v as f32).collect()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn source_tags_round_trip_through_strings() {
        for tag in ["expenses", "transactions", "goals", "profile", "uploads_metadata", "uploads_content"]
        {
            assert_eq!(DocumentSource::from(tag).as_str(), tag);
        }
        assert_eq!(DocumentSource::from("statement"), DocumentSource::Other("statement".into()));
    }

    #[test]
    fn metadata_persists_as_string_map() {
        let meta = ChunkMetadata::new(DocumentSource::Goals, 3);
        let json = meta.to_json().unwrap();
        let raw: HashMap<String, String> = serde_json::from_str(&json).unwrap();
        assert_eq!(raw.get("source").map(String::as_str), Some("goals"));
        assert_eq!(raw.get("idx").map(String::as_str), Some("3"));
        assert_eq!(ChunkMetadata::from_json(&json).unwrap(), meta);
    }

    #[test]
    fn metadata_without_idx_is_a_decode_error() {
        let err = ChunkMetadata::from_json(r#"{"source":"goals"}"#).unwrap_err();
        assert!(matches!(err, RagError::Decode(_)));

        let err = ChunkMetadata::from_json(r#"{"source":"goals","idx":"two"}"#).unwrap_err();
        assert!(matches!(err, RagError::Decode(_)));
    }

    #[test]
    fn chunk_ids_are_scoped_by_tenant() {
        assert_ne!(chunk_id("u1", "doc", 0), chunk_id("u2", "doc", 0));
        assert_eq!(chunk_id("u1", "doc", 2), "u1:doc:2");
    }

    #[test]
    fn chunk_ids_do_not_collide_on_separators() {
        assert_ne!(chunk_id("a:b", "c", 0), chunk_id("a", "b:c", 0));
        assert_ne!(chunk_id("a%3Ab", "c", 0), chunk_id("a:b", "c", 0));
        assert_eq!(chunk_id("a:b", "50%", 1), "a%3Ab:50%25:1");
    }
}
