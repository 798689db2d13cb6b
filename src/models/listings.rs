use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ListingKind {
    Offer,
    Request,
}

impl ListingKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ListingKind::Offer => "OFFER",
            ListingKind::Request => "REQUEST",
        }
    }

    /// The kind a listing of this kind matches against.
    pub fn counterpart(&self) -> ListingKind {
        match self {
            ListingKind::Offer => ListingKind::Request,
            ListingKind::Request => ListingKind::Offer,
        }
    }
}

impl fmt::Display for ListingKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ListingKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "OFFER" => Ok(ListingKind::Offer),
            "REQUEST" => Ok(ListingKind::Request),
            other => Err(format!("unknown listing kind: {}", other)),
        }
    }
}

/// Listing together with its attached skill names, as returned to
/// callers and consumed by the matcher.
#[derive(Clone, Debug, Serialize, sqlx::FromRow)]
pub struct ListingDetail {
    pub id: String,
    pub user_id: String,
    pub username: String,
    pub title: String,
    pub description: String,
    pub kind: String,
    pub is_active: bool,
    pub created_at: chrono::NaiveDateTime,
    pub skills: Vec<String>,
}

#[derive(Clone, Debug, Deserialize)]
pub struct NewListing {
    pub user_id: String,
    pub title: String,
    pub description: String,
    pub kind: ListingKind,
    #[serde(default)]
    pub skills: Vec<String>,
}

#[derive(Clone, Debug, Deserialize)]
pub struct ListingUpdate {
    pub user_id: String,
    pub title: Option<String>,
    pub description: Option<String>,
    pub skills: Option<Vec<String>>,
}
