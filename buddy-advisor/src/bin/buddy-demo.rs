//! Seeds a sample user, indexes their records and prints the prompt for a
//! question.
//!
//! ```text
//! BUDDY_WORD_VECTORS=glove.6B.50d.txt cargo run --bin buddy-demo -- "Can I afford a trip?"
//! ```
//!
//! `BUDDY_DB_PATH` selects the SQLite file (default `buddy-demo.db`). Without
//! `BUDDY_WORD_VECTORS` a tiny built-in table is used.

use std::sync::Arc;

use anyhow::Context;
use buddy_advisor::{
    BankTransaction, EchoGenerator, Expense, FileUpload, Goal, InMemoryBlobStorage,
    InMemoryRecordSource, RagService, StaticIdentity, TelemetryConfig, TransactionType,
    UserProfile, UserRecords, init_tracing,
};
use buddy_rag::{
    EmbeddingProvider, RagConfig, RagEngine, SqliteVectorStore, WordVectorEmbeddingProvider,
};
use chrono::{DateTime, NaiveDate, TimeZone, Utc};

const DEMO_USER: &str = "demo-user";

const BUILTIN_VECTORS: &str = "\
goal 0.6 0.0 0.2 0.0 0.1
trip 0.7 0.1 0.0 0.0 0.3
japan 0.6 0.0 0.0 0.1 0.4
afford 0.5 0.3 0.0 0.0 0.2
save 0.6 0.2 0.1 0.0 0.0
savings 0.6 0.2 0.1 0.0 0.0
emergency 1.0 0.0 0.0 0.0 0.0
fund 0.9 0.1 0.0 0.0 0.0
expense 0.0 0.7 0.2 0.0 0.0
food 0.0 1.0 0.0 0.0 0.0
groceries 0.0 0.9 0.1 0.0 0.0
rent 0.1 0.8 0.0 0.2 0.0
income 0.2 0.0 0.9 0.0 0.0
paycheck 0.2 0.0 1.0 0.0 0.0
budget 0.4 0.5 0.3 0.0 0.0
profile 0.0 0.0 0.2 1.0 0.0
";

fn at(year: i32, month: u32, day: u32) -> anyhow::Result<DateTime<Utc>> {
    Utc.with_ymd_and_hms(year, month, day, 9, 30, 0).single().context("invalid demo timestamp")
}

fn demo_records() -> anyhow::Result<UserRecords> {
    Ok(UserRecords {
        expenses: vec![
            Expense {
                id: "exp-groceries".into(),
                amount: 84.2,
                category: "Groceries".into(),
                merchant: "Trader Joe's".into(),
                date: at(2026, 9, 28)?,
                description: "Weekly food shop".into(),
                is_recurring: true,
            },
            Expense {
                id: "exp-rent".into(),
                amount: 1450.0,
                category: "Rent".into(),
                merchant: "Maple Apartments".into(),
                date: at(2026, 10, 1)?,
                description: String::new(),
                is_recurring: true,
            },
        ],
        transactions: vec![BankTransaction {
            id: "txn-oct".into(),
            amount: 3200.0,
            source: "Acme Corp".into(),
            note: "October paycheck".into(),
            date: at(2026, 10, 1)?,
            kind: TransactionType::Paycheck,
        }],
        goals: vec![
            Goal {
                id: "goal-japan".into(),
                name: "Trip to Japan".into(),
                target_amount: 4000.0,
                current_amount: 1250.0,
                deadline: NaiveDate::from_ymd_opt(2027, 4, 1),
            },
            Goal {
                id: "goal-emergency".into(),
                name: "Emergency Fund".into(),
                target_amount: 10000.0,
                current_amount: 6100.0,
                deadline: None,
            },
        ],
        profile: Some(UserProfile {
            name: "Sam".into(),
            email: "sam@example.com".into(),
            total_points: 420,
            currency: "USD".into(),
        }),
        uploads: vec![FileUpload {
            id: "upload-budget".into(),
            file_name: "budget.csv".into(),
            file_type: "text/csv".into(),
            file_size: 96,
            uploaded_at: at(2026, 10, 2)?,
            storage_path: "users/demo-user/budget.csv".into(),
        }],
    })
}

#[cfg(feature = "remote")]
async fn remote_provider() -> anyhow::Result<Option<Arc<dyn EmbeddingProvider>>> {
    if std::env::var("BUDDY_EMBEDDINGS_URL").is_err() {
        return Ok(None);
    }
    let provider = buddy_rag::RemoteEmbeddingProvider::from_env()
        .await
        .context("failed to connect to the embeddings endpoint")?;
    Ok(Some(Arc::new(provider)))
}

#[cfg(not(feature = "remote"))]
async fn remote_provider() -> anyhow::Result<Option<Arc<dyn EmbeddingProvider>>> {
    Ok(None)
}

async fn embedding_provider() -> anyhow::Result<Arc<dyn EmbeddingProvider>> {
    if let Some(provider) = remote_provider().await? {
        return Ok(provider);
    }

    let provider = match std::env::var("BUDDY_WORD_VECTORS") {
        Ok(path) => WordVectorEmbeddingProvider::from_path(&path)
            .with_context(|| format!("failed to load word vectors from {path}"))?,
        Err(_) => WordVectorEmbeddingProvider::from_reader(BUILTIN_VECTORS.as_bytes())?,
    };
    Ok(Arc::new(provider))
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing(&TelemetryConfig::default());

    let question = std::env::args().skip(1).collect::<Vec<_>>().join(" ");
    let question = if question.trim().is_empty() {
        "Can I afford my trip to Japan?".to_string()
    } else {
        question
    };
    let db_path = std::env::var("BUDDY_DB_PATH").unwrap_or_else(|_| "buddy-demo.db".to_string());

    let store = SqliteVectorStore::open(&db_path)
        .await
        .with_context(|| format!("failed to open {db_path}"))?;
    let engine = RagEngine::builder()
        .config(RagConfig::default())
        .embedding_provider(embedding_provider().await?)
        .vector_store(Arc::new(store))
        .build()?;

    let records = InMemoryRecordSource::new();
    records.set_user(DEMO_USER, demo_records()?);
    let blobs = InMemoryBlobStorage::new();
    blobs.put(
        "users/demo-user/budget.csv",
        "category,monthly\nrent,1450\ngroceries,340\nsavings,600\n",
    );

    let service = RagService::builder()
        .engine(Arc::new(engine))
        .records(Arc::new(records))
        .blobs(Arc::new(blobs))
        .identity(Arc::new(StaticIdentity::signed_in(DEMO_USER)))
        .build()?;

    let report = service.refresh_index_for_current_user().await?;
    for line in report.summary() {
        println!("{line}");
    }
    println!();

    let prompt = service.ask_for_current_user(&question, &EchoGenerator).await?;
    println!("{prompt}");
    Ok(())
}
