use serde::{Deserialize, Serialize};

/// A single ledger entry. Immutable once written; balances are derived
/// from the sum of these rows and never edited outside that path.
#[derive(Clone, Debug, Deserialize, Serialize, sqlx::FromRow)]
pub struct Transaction {
    pub id: String,
    pub sender_id: String,
    pub receiver_id: String,
    pub amount_in_cents: i64,
    pub description: String,
    pub related_listing_id: Option<String>,
    pub created_at: chrono::NaiveDateTime,
}

#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct NewTransfer {
    pub sender_id: String,
    pub receiver_id: String,
    pub amount_in_cents: i64,
    pub description: String,
    pub related_listing_id: Option<String>,
}

/// Cached balance next to the recomputed one, so callers can audit
/// the projection against the log.
#[derive(Clone, Debug, Serialize)]
pub struct BalanceSummary {
    pub user_id: String,
    pub cached_in_cents: i64,
    pub derived_in_cents: i64,
}
