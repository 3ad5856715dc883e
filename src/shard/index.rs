//! In-memory inverted index for one shard
//!
//! Documents are JSON objects with a numeric `id`. Every other field is
//! tokenized and indexed; a query scores a document by summing the weight of
//! each field a query token appears in.

use crate::common::{Error, Result, ScoredHit, ShardQuery};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::path::Path;

/// Per-field score contribution of one matching token
const FIELD_WEIGHTS: &[(&str, f64)] = &[
    ("title", 5.0),
    ("cast", 4.0),
    ("director", 3.0),
    ("genres", 3.0),
    ("description", 1.0),
    ("year", 0.5),
    ("rating", 0.1),
];

/// Weight of fields missing from `FIELD_WEIGHTS`
const DEFAULT_FIELD_WEIGHT: f64 = 1.0;

const STOP_WORDS: &[&str] = &[
    "a", "an", "and", "are", "as", "at", "be", "but", "by", "for", "from", "has", "he", "in",
    "is", "it", "its", "of", "on", "or", "she", "that", "the", "their", "they", "this", "to",
    "was", "were", "will", "with",
];

fn field_weight(field: &str) -> f64 {
    FIELD_WEIGHTS
        .iter()
        .find(|(name, _)| *name == field)
        .map(|(_, w)| *w)
        .unwrap_or(DEFAULT_FIELD_WEIGHT)
}

/// Lowercase, split on anything that is not alphanumeric, drop one-letter
/// tokens and stop words.
pub fn tokenize(text: &str) -> Vec<String> {
    text.to_lowercase()
        .split(|c: char| !c.is_alphanumeric())
        .filter(|t| t.chars().count() >= 2 && !STOP_WORDS.contains(t))
        .map(str::to_string)
        .collect()
}

/// A searchable document
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Document {
    pub id: u64,
    #[serde(flatten)]
    pub fields: BTreeMap<String, serde_json::Value>,
}

impl Document {
    /// Text of a field; arrays are joined with spaces.
    fn field_text(value: &serde_json::Value) -> String {
        match value {
            serde_json::Value::String(s) => s.clone(),
            serde_json::Value::Array(items) => items
                .iter()
                .map(Self::field_text)
                .collect::<Vec<_>>()
                .join(" "),
            serde_json::Value::Null => String::new(),
            other => other.to_string(),
        }
    }

    /// Case-insensitive equality; array fields match when any element does.
    fn matches_filter(&self, field: &str, expected: &str) -> bool {
        let Some(value) = self.fields.get(field) else {
            return false;
        };
        let eq = |v: &serde_json::Value| Self::field_text(v).eq_ignore_ascii_case(expected);
        match value {
            serde_json::Value::Array(items) => items.iter().any(eq),
            other => eq(other),
        }
    }
}

/// Local search engine of a shard replica
#[async_trait]
pub trait SearchBackend: Send + Sync + 'static {
    /// Every matching document of this shard, ranked.
    async fn search(&self, query: &ShardQuery) -> Result<Vec<ScoredHit>>;

    fn document_count(&self) -> usize;
}

#[derive(Debug, Default)]
pub struct InMemoryIndex {
    /// token -> doc_id -> fields containing the token
    postings: HashMap<String, HashMap<u64, BTreeSet<String>>>,
    documents: HashMap<u64, Document>,
}

impl InMemoryIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Index the documents owned by shard `shard_index` of `num_shards`.
    pub fn from_documents(
        documents: impl IntoIterator<Item = Document>,
        shard_index: u64,
        num_shards: u64,
    ) -> Self {
        let mut index = Self::new();
        for doc in documents {
            if num_shards == 0 || doc.id % num_shards == shard_index {
                index.insert(doc);
            }
        }
        index
    }

    /// Load a JSON array of documents.
    pub async fn load(path: &Path, shard_index: u64, num_shards: u64) -> Result<Self> {
        let raw = tokio::fs::read(path).await?;
        let documents: Vec<Document> = serde_json::from_slice(&raw)?;
        let total = documents.len();
        let index = Self::from_documents(documents, shard_index, num_shards);

        tracing::info!(
            path = %path.display(),
            total,
            owned = index.document_count(),
            shard_index,
            num_shards,
            "Index loaded"
        );
        Ok(index)
    }

    pub fn insert(&mut self, doc: Document) {
        for (field, value) in &doc.fields {
            for token in tokenize(&Document::field_text(value)) {
                self.postings
                    .entry(token)
                    .or_default()
                    .entry(doc.id)
                    .or_default()
                    .insert(field.clone());
            }
        }
        self.documents.insert(doc.id, doc);
    }

    pub fn search_sync(&self, query: &ShardQuery) -> Vec<ScoredHit> {
        struct Acc {
            score: f64,
            fields: BTreeSet<String>,
            terms: Vec<String>,
        }

        let mut scores: HashMap<u64, Acc> = HashMap::new();
        for token in tokenize(&query.query_text) {
            let Some(docs) = self.postings.get(&token) else {
                continue;
            };
            for (doc_id, fields) in docs {
                let acc = scores.entry(*doc_id).or_insert_with(|| Acc {
                    score: 0.0,
                    fields: BTreeSet::new(),
                    terms: Vec::new(),
                });
                for field in fields {
                    let weight = field_weight(field);
                    acc.score += weight;
                    acc.fields.insert(field.clone());
                    acc.terms.push(format!("{}:{}({})", field, token, weight));
                }
            }
        }

        let mut hits: Vec<ScoredHit> = scores
            .into_iter()
            .filter(|(doc_id, _)| {
                let Some(doc) = self.documents.get(doc_id) else {
                    return false;
                };
                query
                    .filters
                    .iter()
                    .all(|(field, value)| doc.matches_filter(field, value))
            })
            .map(|(doc_id, acc)| ScoredHit {
                doc_id,
                score: acc.score,
                matched_fields: acc.fields.into_iter().collect(),
                explanation: Some(acc.terms.join(" + ")),
            })
            .collect();
        crate::coordinator::merge::sort_hits(&mut hits);
        hits
    }
}

#[async_trait]
impl SearchBackend for InMemoryIndex {
    async fn search(&self, query: &ShardQuery) -> Result<Vec<ScoredHit>> {
        if query.query_text.trim().is_empty() {
            return Err(Error::Validation("empty query".into()));
        }
        Ok(self.search_sync(query))
    }

    fn document_count(&self) -> usize {
        self.documents.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn docs() -> Vec<Document> {
        serde_json::from_value(json!([
            {"id": 1, "title": "The Matrix", "genres": ["Action", "Sci-Fi"], "year": 1999},
            {"id": 2, "title": "Heat", "description": "A matrix of crime", "genres": ["Crime"]},
            {"id": 3, "title": "The Matrix Reloaded", "genres": ["Action"], "director": "Wachowski"},
            {"id": 4, "title": "Alien", "genres": ["Horror", "Sci-Fi"]}
        ]))
        .unwrap()
    }

    fn query(text: &str) -> ShardQuery {
        ShardQuery {
            query_text: text.to_string(),
            filters: BTreeMap::new(),
        }
    }

    #[test]
    fn test_tokenize() {
        assert_eq!(
            tokenize("The Matrix: Reloaded, a Sci-Fi film!"),
            vec!["matrix", "reloaded", "sci", "fi", "film"]
        );
    }

    #[test]
    fn test_field_weights_rank_title_first() {
        let index = InMemoryIndex::from_documents(docs(), 0, 1);
        let hits = index.search_sync(&query("matrix"));

        let ids: Vec<u64> = hits.iter().map(|h| h.doc_id).collect();
        assert_eq!(ids, vec![1, 3, 2]);
        assert_eq!(hits[0].score, 5.0);
        assert_eq!(hits[2].score, 1.0);
        assert_eq!(hits[2].matched_fields, vec!["description"]);
        assert!(hits[0]
            .explanation
            .as_deref()
            .unwrap()
            .contains("title:matrix"));
    }

    #[test]
    fn test_scores_add_up_across_tokens() {
        let index = InMemoryIndex::from_documents(docs(), 0, 1);
        let hits = index.search_sync(&query("matrix wachowski"));
        assert_eq!(hits[0].doc_id, 3);
        assert_eq!(hits[0].score, 8.0);
    }

    #[test]
    fn test_filters() {
        let index = InMemoryIndex::from_documents(docs(), 0, 1);
        let mut q = query("matrix");
        q.filters.insert("genres".into(), "crime".into());
        let ids: Vec<u64> = index.search_sync(&q).iter().map(|h| h.doc_id).collect();
        assert_eq!(ids, vec![2]);

        q.filters.insert("missing".into(), "x".into());
        assert!(index.search_sync(&q).is_empty());
    }

    #[test]
    fn test_shard_ownership_by_doc_id() {
        let even = InMemoryIndex::from_documents(docs(), 0, 2);
        let odd = InMemoryIndex::from_documents(docs(), 1, 2);
        assert_eq!(even.document_count(), 2);
        assert_eq!(odd.document_count(), 2);

        let ids: Vec<u64> = odd
            .search_sync(&query("matrix"))
            .iter()
            .map(|h| h.doc_id)
            .collect();
        assert_eq!(ids, vec![1, 3]);
    }

    #[tokio::test]
    async fn test_load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("docs.json");
        std::fs::write(&path, serde_json::to_vec(&docs()).unwrap()).unwrap();

        let index = InMemoryIndex::load(&path, 0, 1).await.unwrap();
        assert_eq!(index.document_count(), 4);
        assert_eq!(index.search(&query("alien")).await.unwrap().len(), 1);
        assert!(index.search(&query("  ")).await.is_err());
    }
}
