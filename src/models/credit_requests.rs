use std::fmt;

use serde::{Deserialize, Serialize};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CreditRequestStatus {
    Pending,
    Accepted,
    Declined,
}

impl CreditRequestStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            CreditRequestStatus::Pending => "PENDING",
            CreditRequestStatus::Accepted => "ACCEPTED",
            CreditRequestStatus::Declined => "DECLINED",
        }
    }
}

impl fmt::Display for CreditRequestStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A message asking `payer_id` to settle `amount_in_cents` with the
/// requester. Accepting one produces exactly one ledger transaction.
#[derive(Clone, Debug, Deserialize, Serialize, sqlx::FromRow)]
pub struct CreditRequest {
    pub id: String,
    pub requester_id: String,
    pub payer_id: String,
    pub amount_in_cents: i64,
    pub description: String,
    pub related_listing_id: Option<String>,
    pub status: String,
    pub created_at: chrono::NaiveDateTime,
    pub resolved_at: Option<chrono::NaiveDateTime>,
}

#[derive(Clone, Debug, Deserialize)]
pub struct NewCreditRequest {
    pub requester_id: String,
    pub payer_id: String,
    pub amount_in_cents: i64,
    pub description: String,
    pub related_listing_id: Option<String>,
}
