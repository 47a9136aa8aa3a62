//! Personal-finance records and their one-line text summaries.
//!
//! Each record kind renders to the short human-readable text that is
//! chunked and embedded during a rebuild. Field names follow the remote
//! store's camelCase documents.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use buddy_rag::DocumentSource;

/// A record that cannot be rendered to usable text.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("cannot summarise {origin} record '{record_id}': {reason}")]
pub struct SummaryError {
    pub origin: DocumentSource,
    pub record_id: String,
    pub reason: String,
}

/// A record kind that becomes one indexed document.
pub trait Summarize {
    /// Source tag of the resulting document.
    const SOURCE: DocumentSource;

    /// The record id, reused as the document id.
    fn record_id(&self) -> &str;

    /// Render the record's summary text.
    fn summary(&self) -> Result<String, SummaryError>;

    fn summary_error(&self, reason: impl Into<String>) -> SummaryError {
        SummaryError {
            origin: Self::SOURCE,
            record_id: self.record_id().to_string(),
            reason: reason.into(),
        }
    }
}

/// One spending record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Expense {
    pub id: String,
    pub amount: f64,
    pub category: String,
    pub merchant: String,
    pub date: DateTime<Utc>,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub is_recurring: bool,
}

/// Kind of an income record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransactionType {
    Paycheck,
    Deposit,
    Other,
}

impl TransactionType {
    /// Display label.
    pub fn label(&self) -> &'static str {
        match self {
            TransactionType::Paycheck => "Paycheck",
            TransactionType::Deposit => "Deposit",
            TransactionType::Other => "Other",
        }
    }
}

/// One income record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BankTransaction {
    pub id: String,
    pub amount: f64,
    pub source: String,
    #[serde(default)]
    pub note: String,
    pub date: DateTime<Utc>,
    #[serde(rename = "type")]
    pub kind: TransactionType,
}

/// One savings goal.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Goal {
    pub id: String,
    pub name: String,
    pub target_amount: f64,
    pub current_amount: f64,
    #[serde(default)]
    pub deadline: Option<NaiveDate>,
}

/// The user's profile singleton.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserProfile {
    pub name: String,
    pub email: String,
    #[serde(default)]
    pub total_points: i64,
    pub currency: String,
}

/// Metadata of one uploaded file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileUpload {
    pub id: String,
    pub file_name: String,
    /// MIME type, e.g. `"text/csv"`.
    pub file_type: String,
    /// Size in bytes.
    pub file_size: u64,
    pub uploaded_at: DateTime<Utc>,
    /// Path of the content in blob storage.
    pub storage_path: String,
}

fn check_amount<R: Summarize>(record: &R, field: &str, value: f64) -> Result<(), SummaryError> {
    if value.is_finite() {
        Ok(())
    } else {
        Err(record.summary_error(format!("{field} is not a finite number")))
    }
}

impl Summarize for Expense {
    const SOURCE: DocumentSource = DocumentSource::Expenses;

    fn record_id(&self) -> &str {
        &self.id
    }

    fn summary(&self) -> Result<String, SummaryError> {
        let category = self.category.trim();
        if category.is_empty() {
            return Err(self.summary_error("category is empty"));
        }
        check_amount(self, "amount", self.amount)?;

        let mut text = format!("Expense: {category} — ${:.2}", self.amount);
        let merchant = self.merchant.trim();
        if !merchant.is_empty() {
            text.push_str(&format!(" at {merchant}"));
        }
        text.push('.');
        let description = self.description.trim();
        if !description.is_empty() {
            text.push(' ');
            text.push_str(description);
        }
        Ok(text)
    }
}

impl Summarize for BankTransaction {
    const SOURCE: DocumentSource = DocumentSource::Transactions;

    fn record_id(&self) -> &str {
        &self.id
    }

    fn summary(&self) -> Result<String, SummaryError> {
        check_amount(self, "amount", self.amount)?;

        let mut text = format!("Income: {} — ${:.2}", self.kind.label(), self.amount);
        let source = self.source.trim();
        if !source.is_empty() {
            text.push_str(&format!(" from {source}"));
        }
        text.push_str(&format!(" on {}.", self.date.format("%Y-%m-%d")));
        let note = self.note.trim();
        if !note.is_empty() {
            text.push(' ');
            text.push_str(note);
        }
        Ok(text)
    }
}

impl Summarize for Goal {
    const SOURCE: DocumentSource = DocumentSource::Goals;

    fn record_id(&self) -> &str {
        &self.id
    }

    fn summary(&self) -> Result<String, SummaryError> {
        let name = self.name.trim();
        if name.is_empty() {
            return Err(self.summary_error("name is empty"));
        }
        check_amount(self, "targetAmount", self.target_amount)?;
        check_amount(self, "currentAmount", self.current_amount)?;

        let mut text = format!(
            "Goal: {name}. Target: {:.2}. Current: {:.2}.",
            self.target_amount, self.current_amount
        );
        if let Some(deadline) = self.deadline {
            text.push_str(&format!(" Deadline: {}.", deadline.format("%Y-%m-%d")));
        }
        Ok(text)
    }
}

impl UserProfile {
    /// Document id of a user's profile.
    pub fn document_id(user_id: &str) -> String {
        format!("profile_{user_id}")
    }

    /// Render the profile summary.
    pub fn summary(&self, user_id: &str) -> Result<String, SummaryError> {
        let name = self.name.trim();
        let email = self.email.trim();
        if name.is_empty() && email.is_empty() {
            return Err(SummaryError {
                origin: DocumentSource::Profile,
                record_id: Self::document_id(user_id),
                reason: "name and email are both empty".to_string(),
            });
        }
        Ok(format!(
            "User profile: {name}. Email: {email}. Total points: {}. Currency: {}.",
            self.total_points,
            self.currency.trim()
        ))
    }
}

impl FileUpload {
    /// Document id of this upload's extracted text.
    pub fn content_document_id(&self) -> String {
        format!("{}_content", self.id)
    }

    /// Prefix written before every content chunk.
    pub fn content_prefix(&self) -> String {
        format!("From {}: ", self.file_name)
    }
}

impl Summarize for FileUpload {
    const SOURCE: DocumentSource = DocumentSource::UploadsMetadata;

    fn record_id(&self) -> &str {
        &self.id
    }

    fn summary(&self) -> Result<String, SummaryError> {
        let file_name = self.file_name.trim();
        if file_name.is_empty() {
            return Err(self.summary_error("file name is empty"));
        }
        Ok(format!(
            "Uploaded file: {file_name}. Type: {}. Size: {}. Uploaded: {}",
            self.file_type,
            human_size(self.file_size),
            self.uploaded_at.format("%Y-%m-%d %H:%M")
        ))
    }
}

/// Decimal file size, e.g. `"512 bytes"`, `"34 KB"`, `"2.5 MB"`.
///
/// Sizes that would round to `"1000 KB"` are shown in MB instead.
pub fn human_size(bytes: u64) -> String {
    let kb = bytes.saturating_add(500) / 1_000;
    match bytes {
        1 => "1 byte".to_string(),
        0..1_000 => format!("{bytes} bytes"),
        _ if kb < 1_000 => format!("{kb} KB"),
        _ => format!("{:.1} MB", bytes as f64 / 1_000_000.0),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn at(y: i32, m: u32, d: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, m, d, 14, 5, 0).unwrap()
    }

    #[test]
    fn expense_summary() {
        let expense = Expense {
            id: "e1".into(),
            amount: 45.0,
            category: "Food".into(),
            merchant: "Trader Joe's".into(),
            date: at(2025, 3, 1),
            description: "Weekly groceries".into(),
            is_recurring: false,
        };
        assert_eq!(
            expense.summary().unwrap(),
            "Expense: Food — $45.00 at Trader Joe's. Weekly groceries"
        );

        let bare = Expense { description: String::new(), ..expense };
        assert_eq!(bare.summary().unwrap(), "Expense: Food — $45.00 at Trader Joe's.");
    }

    #[test]
    fn expense_without_category_is_unusable() {
        let expense = Expense {
            id: "e2".into(),
            amount: 3.0,
            category: "  ".into(),
            merchant: "Cafe".into(),
            date: at(2025, 3, 1),
            description: String::new(),
            is_recurring: false,
        };
        let err = expense.summary().unwrap_err();
        assert_eq!(err.record_id, "e2");
        assert_eq!(err.origin, DocumentSource::Expenses);
    }

    #[test]
    fn transaction_summary() {
        let tx = BankTransaction {
            id: "t1".into(),
            amount: 2100.5,
            source: "Acme Corp".into(),
            note: "March salary".into(),
            date: at(2025, 3, 28),
            kind: TransactionType::Paycheck,
        };
        assert_eq!(
            tx.summary().unwrap(),
            "Income: Paycheck — $2100.50 from Acme Corp on 2025-03-28. March salary"
        );
    }

    #[test]
    fn goal_summary_with_and_without_deadline() {
        let goal = Goal {
            id: "g1".into(),
            name: "Emergency Fund".into(),
            target_amount: 1000.0,
            current_amount: 200.0,
            deadline: None,
        };
        assert_eq!(goal.summary().unwrap(), "Goal: Emergency Fund. Target: 1000.00. Current: 200.00.");

        let dated = Goal { deadline: NaiveDate::from_ymd_opt(2025, 12, 31), ..goal };
        assert!(dated.summary().unwrap().ends_with(" Deadline: 2025-12-31."));
    }

    #[test]
    fn goal_with_nan_amount_is_unusable() {
        let goal = Goal {
            id: "g2".into(),
            name: "Trip".into(),
            target_amount: f64::NAN,
            current_amount: 0.0,
            deadline: None,
        };
        assert!(goal.summary().is_err());
    }

    #[test]
    fn profile_and_upload_summaries() {
        let profile = UserProfile {
            name: "Alex".into(),
            email: "a@x.com".into(),
            total_points: 120,
            currency: "USD".into(),
        };
        assert_eq!(
            profile.summary("u1").unwrap(),
            "User profile: Alex. Email: a@x.com. Total points: 120. Currency: USD."
        );
        assert_eq!(UserProfile::document_id("u1"), "profile_u1");

        let upload = FileUpload {
            id: "f1".into(),
            file_name: "march.csv".into(),
            file_type: "text/csv".into(),
            file_size: 2_500_000,
            uploaded_at: at(2025, 4, 2),
            storage_path: "users/u1/uploads/f1".into(),
        };
        assert_eq!(
            upload.summary().unwrap(),
            "Uploaded file: march.csv. Type: text/csv. Size: 2.5 MB. Uploaded: 2025-04-02 14:05"
        );
        assert_eq!(upload.content_document_id(), "f1_content");
        assert_eq!(upload.content_prefix(), "From march.csv: ");
    }

    #[test]
    fn sizes_are_decimal() {
        assert_eq!(human_size(1), "1 byte");
        assert_eq!(human_size(512), "512 bytes");
        assert_eq!(human_size(34_200), "34 KB");
        assert_eq!(human_size(2_500_000), "2.5 MB");
        assert_eq!(human_size(999_499), "999 KB");
        assert_eq!(human_size(999_500), "1.0 MB");
        assert_eq!(human_size(999_999), "1.0 MB");
    }

    #[test]
    fn records_deserialize_from_camel_case_documents() {
        let goal: Goal = serde_json::from_str(
            r#"{"id":"g1","name":"Car","targetAmount":5000,"currentAmount":750,"deadline":"2026-06-01"}"#,
        )
        .unwrap();
        assert_eq!(goal.deadline, NaiveDate::from_ymd_opt(2026, 6, 1));

        let tx: BankTransaction = serde_json::from_str(
            r#"{"id":"t1","amount":10,"source":"Mom","date":"2025-01-02T00:00:00Z","type":"deposit"}"#,
        )
        .unwrap();
        assert_eq!(tx.kind, TransactionType::Deposit);
        assert!(tx.note.is_empty());
    }
}
