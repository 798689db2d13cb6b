use std::collections::HashSet;

use serde::Serialize;

#[derive(Clone, Debug, Serialize)]
pub struct ListingSummary {
    pub id: String,
    pub user_id: String,
    pub username: String,
    pub title: String,
    pub kind: String,
}

/// An active listing with everything the matcher needs: its skill set
/// and the owner's registered coordinates, if any.
#[derive(Clone, Debug)]
pub struct CandidateListing {
    pub summary: ListingSummary,
    pub skills: HashSet<String>,
    pub coordinates: Option<(f64, f64)>,
}

#[derive(Clone, Debug, Serialize)]
pub struct MatchResult {
    pub own_listing: ListingSummary,
    pub counterpart: ListingSummary,
    pub match_score: usize,
    /// Great-circle distance between the two owners. Infinite when
    /// either party has no coordinates; serialized as null.
    pub distance_km: f64,
}

/// `offer_matches` pairs the user's REQUESTs with other people's
/// OFFERs; `request_matches` pairs the user's OFFERs with other
/// people's REQUESTs.
#[derive(Debug, Default, Serialize)]
pub struct MatchReport {
    pub offer_matches: Vec<MatchResult>,
    pub request_matches: Vec<MatchResult>,
}
