//! Property tests for in-memory vector store search ordering and tenancy.

use std::collections::HashMap;

use buddy_rag::document::{Chunk, ChunkMetadata, DocumentSource, chunk_id};
use buddy_rag::inmemory::InMemoryVectorStore;
use buddy_rag::vectorstore::{VectorStore, cosine_similarity};
use proptest::prelude::*;

/// Generate a non-zero L2-normalized embedding of the given dimension.
fn arb_normalized_embedding(dim: usize) -> impl Strategy<Value = Vec<f32>> {
    proptest::collection::vec(-1.0f32..1.0f32, dim).prop_filter_map(
        "non-zero embedding",
        |mut v| {
            let norm: f32 = v.iter().map(|x| x * x).sum::<f32>().sqrt();
            if norm < 1e-3 {
                return None;
            }
            for val in &mut v {
                *val /= norm;
            }
            Some(v)
        },
    )
}

/// Generate a chunk owned by one of two tenants.
fn arb_chunk(dim: usize) -> impl Strategy<Value = Chunk> {
    (prop::bool::ANY, "[a-z]{3,8}", "[a-z ]{5,30}", arb_normalized_embedding(dim)).prop_map(
        |(first_tenant, doc_id, text, embedding)| {
            let user_id = if first_tenant { "alice" } else { "bob" };
            Chunk {
                id: chunk_id(user_id, &doc_id, 0),
                user_id: user_id.to_string(),
                doc_id,
                text,
                metadata: ChunkMetadata::new(DocumentSource::Other("test".into()), 0),
                embedding: Some(embedding),
            }
        },
    )
}

fn dedup(chunks: &[Chunk]) -> Vec<Chunk> {
    let mut deduped: HashMap<String, Chunk> = HashMap::new();
    for chunk in chunks {
        deduped.entry(chunk.id.clone()).or_insert_with(|| chunk.clone());
    }
    deduped.into_values().collect()
}

/// Searching returns at most `top_k` hits of the requested tenant, ordered
/// by descending cosine similarity.
mod prop_inmemory_search_ordering {
    use super::*;

    const DIM: usize = 16;

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(100))]

        #[test]
        fn results_ordered_descending_and_bounded_by_top_k(
            chunks in proptest::collection::vec(arb_chunk(DIM), 1..20),
            query in arb_normalized_embedding(DIM),
            top_k in 1usize..25,
        ) {
            let unique_chunks = dedup(&chunks);
            let alice_count = unique_chunks.iter().filter(|c| c.user_id == "alice").count();

            let rt = tokio::runtime::Runtime::new().unwrap();
            let results = rt.block_on(async {
                let store = InMemoryVectorStore::new();
                store.upsert_many(&unique_chunks).await.unwrap();
                store.search("alice", &query, top_k).await.unwrap()
            });

            prop_assert_eq!(results.len(), top_k.min(alice_count));
            prop_assert!(results.iter().all(|h| h.chunk.user_id == "alice"));

            for window in results.windows(2) {
                prop_assert!(
                    window[0].score >= window[1].score,
                    "results not in descending order: {} < {}",
                    window[0].score,
                    window[1].score,
                );
            }
        }

        #[test]
        fn chunk_searched_with_its_own_embedding_ranks_first(
            chunks in proptest::collection::vec(arb_chunk(DIM), 1..12),
            pick in any::<prop::sample::Index>(),
        ) {
            let unique_chunks = dedup(&chunks);
            let target = pick.get(&unique_chunks).clone();
            let query = target.embedding.clone().unwrap();

            let rt = tokio::runtime::Runtime::new().unwrap();
            let hits = rt.block_on(async {
                let store = InMemoryVectorStore::new();
                store.upsert_many(&unique_chunks).await.unwrap();
                store.search(&target.user_id, &query, 1).await.unwrap()
            });

            prop_assert_eq!(hits.len(), 1);
            prop_assert!((hits[0].score - 1.0).abs() < 1e-4);
        }

        #[test]
        fn cosine_is_symmetric_and_self_similar(
            a in arb_normalized_embedding(DIM),
            b in arb_normalized_embedding(DIM),
        ) {
            let neg: Vec<f32> = a.iter().map(|x| -x).collect();
            prop_assert!((cosine_similarity(&a, &a) - 1.0).abs() < 1e-4);
            prop_assert!((cosine_similarity(&a, &neg) + 1.0).abs() < 1e-4);
            prop_assert!((cosine_similarity(&a, &b) - cosine_similarity(&b, &a)).abs() < 1e-6);
        }
    }
}

#[tokio::test]
async fn search_for_a_tenant_without_chunks_is_empty() {
    let store = InMemoryVectorStore::new();
    let chunk = Chunk {
        id: chunk_id("u1", "doc", 0),
        user_id: "u1".into(),
        doc_id: "doc".into(),
        text: "Goal: Emergency Fund.".into(),
        metadata: ChunkMetadata::new(DocumentSource::Goals, 0),
        embedding: Some(vec![1.0, 0.0, 0.0]),
    };
    store.upsert(&chunk).await.unwrap();

    assert!(store.search("u2", &[1.0, 0.0, 0.0], 5).await.unwrap().is_empty());
}

#[tokio::test]
async fn top_two_of_five_distinct_chunks() {
    let store = InMemoryVectorStore::new();
    let chunks: Vec<Chunk> = (0..5)
        .map(|i| Chunk {
            id: chunk_id("u1", "doc", i),
            user_id: "u1".into(),
            doc_id: "doc".into(),
            text: format!("chunk {i}"),
            metadata: ChunkMetadata::new(DocumentSource::Expenses, i),
            embedding: Some(vec![1.0, i as f32, (5 - i) as f32]),
        })
        .collect();
    store.upsert_many(&chunks).await.unwrap();

    let hits = store.search("u1", &[1.0, 1.0, 0.0], 2).await.unwrap();
    assert_eq!(hits.len(), 2);
    assert!(hits[0].score >= hits[1].score);
}
