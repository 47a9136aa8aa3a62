//! Word-vector averaging embedding provider.
//!
//! [`WordVectorEmbeddingProvider`] builds a sentence embedding by looking up
//! each word in a fixed word-embedding table, averaging the vectors that
//! were found and L2-normalizing the result. Tables are read from the
//! common GloVe / word2vec text format:
//!
//! ```text
//! 400000 50          <- optional "<count> <dim>" header
//! the 0.418 0.24968 -0.41242 ...
//! fund 0.1209 -0.5573 0.0521 ...
//! ```

use std::collections::HashMap;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, info};

use crate::embedding::{EmbeddingProvider, l2_normalize};
use crate::error::{RagError, Result};

const PROVIDER: &str = "WordVector";

/// An [`EmbeddingProvider`] that averages word vectors from a lookup table.
///
/// Text with no known words embeds to the zero vector of the table's
/// dimension rather than failing.
#[derive(Debug, Clone)]
pub struct WordVectorEmbeddingProvider {
    table: Arc<WordTable>,
}

#[derive(Debug)]
struct WordTable {
    vectors: HashMap<String, Vec<f32>>,
    dimensions: usize,
}

impl WordVectorEmbeddingProvider {
    /// Load a word-vector table from a text file.
    ///
    /// # Errors
    ///
    /// Returns [`RagError::ModelLoad`] if the file cannot be read, holds no
    /// vectors, or has rows of differing dimension.
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let file = File::open(path).map_err(|e| {
            RagError::model_load(PROVIDER, format!("cannot open {}: {e}", path.display()))
        })?;
        let provider = Self::from_reader(BufReader::new(file))?;
        info!(
            provider = PROVIDER,
            path = %path.display(),
            words = provider.table.vectors.len(),
            dimensions = provider.dimensions(),
            "loaded word vectors"
        );
        Ok(provider)
    }

    /// Parse a word-vector table from any buffered reader.
    pub fn from_reader(reader: impl BufRead) -> Result<Self> {
        let mut vectors = HashMap::new();
        let mut dimensions = None;

        for (line_no, line) in reader.lines().enumerate() {
            let line = line.map_err(|e| RagError::model_load(PROVIDER, e.to_string()))?;
            let mut fields = line.split_whitespace();
            let Some(word) = fields.next() else {
                continue;
            };
            let values: Vec<&str> = fields.collect();

            if line_no == 0 && is_header(word, &values) {
                continue;
            }

            let vector = values
                .iter()
                .map(|v| v.parse::<f32>())
                .collect::<std::result::Result<Vec<f32>, _>>()
                .map_err(|e| {
                    RagError::model_load(PROVIDER, format!("line {}: {e}", line_no + 1))
                })?;

            match dimensions {
                None if vector.is_empty() => {
                    return Err(RagError::model_load(
                        PROVIDER,
                        format!("line {}: word '{word}' has no components", line_no + 1),
                    ));
                }
                None => dimensions = Some(vector.len()),
                Some(expected) if expected != vector.len() => {
                    return Err(RagError::model_load(
                        PROVIDER,
                        format!(
                            "line {}: expected {expected} components, found {}",
                            line_no + 1,
                            vector.len()
                        ),
                    ));
                }
                Some(_) => {}
            }

            vectors.insert(word.to_lowercase(), vector);
        }

        let dimensions = dimensions
            .ok_or_else(|| RagError::model_load(PROVIDER, "word-vector table is empty"))?;
        Ok(Self { table: Arc::new(WordTable { vectors, dimensions }) })
    }

    /// Build a provider from an in-memory table.
    ///
    /// # Errors
    ///
    /// Returns [`RagError::ModelLoad`] if the table or its first vector is
    /// empty, and [`RagError::DimensionMismatch`] if the vectors differ in
    /// length.
    pub fn from_table(table: HashMap<String, Vec<f32>>) -> Result<Self> {
        let mut dimensions = None;
        let mut vectors = HashMap::with_capacity(table.len());
        for (word, vector) in table {
            match dimensions {
                None if vector.is_empty() => {
                    return Err(RagError::model_load(PROVIDER, format!("'{word}' is empty")));
                }
                None => dimensions = Some(vector.len()),
                Some(expected) if expected != vector.len() => {
                    return Err(RagError::DimensionMismatch { expected, actual: vector.len() });
                }
                Some(_) => {}
            }
            vectors.insert(word.to_lowercase(), vector);
        }
        let dimensions = dimensions
            .ok_or_else(|| RagError::model_load(PROVIDER, "word-vector table is empty"))?;
        Ok(Self { table: Arc::new(WordTable { vectors, dimensions }) })
    }

    /// Number of words in the table.
    pub fn vocabulary_size(&self) -> usize {
        self.table.vectors.len()
    }
}

impl WordTable {
    fn sentence_embedding(&self, text: &str) -> Vec<f32> {
        let mut sum = vec![0.0f64; self.dimensions];
        let mut found = 0usize;

        for word in tokenize(text) {
            if let Some(vector) = self.vectors.get(&word) {
                for (acc, v) in sum.iter_mut().zip(vector) {
                    *acc += f64::from(*v);
                }
                found += 1;
            }
        }

        if found == 0 {
            return vec![0.0; self.dimensions];
        }

        let mut mean: Vec<f32> = sum.into_iter().map(|v| (v / found as f64) as f32).collect();
        l2_normalize(&mut mean);
        mean
    }
}

fn is_header(first: &str, rest: &[&str]) -> bool {
    rest.len() == 1 && first.parse::<usize>().is_ok() && rest[0].parse::<usize>().is_ok()
}

/// Lower-cased words; apostrophes inside a word are kept ("joe's").
fn tokenize(text: &str) -> impl Iterator<Item = String> + '_ {
    text.split(|c: char| !(c.is_alphanumeric() || c == '\''))
        .map(|w| w.trim_matches('\''))
        .filter(|w| !w.is_empty())
        .map(str::to_lowercase)
}

#[async_trait]
impl EmbeddingProvider for WordVectorEmbeddingProvider {
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        Ok(self.table.sentence_embedding(text))
    }

    async fn embed_batch(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }
        debug!(provider = PROVIDER, batch_size = texts.len(), "embedding batch");

        let table = Arc::clone(&self.table);
        let owned: Vec<String> = texts.iter().map(|t| t.to_string()).collect();
        tokio::task::spawn_blocking(move || {
            owned.iter().map(|t| table.sentence_embedding(t)).collect()
        })
        .await
        .map_err(|e| RagError::embedding(PROVIDER, format!("embedding task failed: {e}")))
    }

    fn dimensions(&self) -> usize {
        self.table.dimensions
    }

    fn name(&self) -> &str {
        PROVIDER
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embedding::is_normalized;

    const TABLE: &str = "3 3\nemergency 1.0 0.0 0.0\nfund 0.8 0.2 0.0\nfood 0.0 1.0 0.0\n";

    fn provider() -> WordVectorEmbeddingProvider {
        WordVectorEmbeddingProvider::from_reader(TABLE.as_bytes()).unwrap()
    }

    #[tokio::test]
    async fn averages_and_normalizes_known_words() {
        let p = provider();
        assert_eq!(p.dimensions(), 3);
        assert_eq!(p.vocabulary_size(), 3);

        let v = p.embed("Emergency FUND!").await.unwrap();
        assert!(is_normalized(&v, 1e-5));
        assert!(v[0] > v[1]);
        assert_eq!(v[2], 0.0);
    }

    #[tokio::test]
    async fn unknown_words_embed_to_zero_vector() {
        let v = provider().embed("zzz qqq").await.unwrap();
        assert_eq!(v, vec![0.0; 3]);
    }

    #[tokio::test]
    async fn batch_matches_single_embeddings() {
        let p = provider();
        let texts = ["emergency fund", "food", "nothing known"];
        let batch = p.embed_batch(&texts).await.unwrap();
        for (text, from_batch) in texts.iter().zip(&batch) {
            assert_eq!(&p.embed(text).await.unwrap(), from_batch);
        }
    }

    #[test]
    fn ragged_table_fails_to_load() {
        let err = WordVectorEmbeddingProvider::from_reader("a 1 2\nb 1\n".as_bytes()).unwrap_err();
        assert!(matches!(err, RagError::ModelLoad { .. }));
    }

    #[test]
    fn in_memory_table_checks_its_shape() {
        let ragged =
            HashMap::from([("a".to_string(), vec![1.0, 2.0]), ("b".to_string(), vec![1.0])]);
        let err = WordVectorEmbeddingProvider::from_table(ragged).unwrap_err();
        assert!(matches!(err, RagError::DimensionMismatch { .. }));

        let err = WordVectorEmbeddingProvider::from_table(HashMap::new()).unwrap_err();
        assert!(matches!(err, RagError::ModelLoad { .. }));

        let table = HashMap::from([("Fund".to_string(), vec![0.0, 1.0])]);
        let p = WordVectorEmbeddingProvider::from_table(table).unwrap();
        assert_eq!(p.dimensions(), 2);
    }

    #[test]
    fn empty_table_fails_to_load() {
        let err = WordVectorEmbeddingProvider::from_reader("".as_bytes()).unwrap_err();
        assert!(matches!(err, RagError::ModelLoad { .. }));
    }

    #[test]
    fn missing_file_fails_at_construction() {
        let err = WordVectorEmbeddingProvider::from_path("/nonexistent/vectors.txt").unwrap_err();
        assert!(matches!(err, RagError::ModelLoad { .. }));
    }

    #[test]
    fn tokenizer_keeps_inner_apostrophes() {
        let words: Vec<String> = tokenize("Trader Joe's — 'quoted'").collect();
        assert_eq!(words, vec!["trader", "joe's", "quoted"]);
    }
}
