use super::RequestHandler;
use super::Service;
use super::ServiceError;

use crate::models::listings::ListingKind;
use crate::models::matches::{CandidateListing, MatchReport, MatchResult};
use crate::repositories::listings::ListingRepository;
use crate::utils;

use async_trait::async_trait;
use sqlx::PgPool;
use tokio::sync::oneshot;

/// Each direction of the report is cut to this many results.
const MAX_RESULTS_PER_DIRECTION: usize = 10;

pub enum MatchingRequest {
    FindMatches {
        user_id: String,
        response: oneshot::Sender<Result<MatchReport, ServiceError>>,
    },
}

#[derive(Clone)]
pub struct MatchingRequestHandler {
    repository: ListingRepository,
}

impl MatchingRequestHandler {
    pub fn new(sql_conn: PgPool) -> Self {
        let repository = ListingRepository::new(sql_conn);

        MatchingRequestHandler { repository }
    }

    /// Pair the user's open requests with other people's offers and
    /// vice versa. Read-only; an empty report is a normal outcome.
    async fn find_matches(&self, user_id: &str) -> Result<MatchReport, ServiceError> {
        Ok(MatchReport {
            offer_matches: self.direction(user_id, ListingKind::Request).await?,
            request_matches: self.direction(user_id, ListingKind::Offer).await?,
        })
    }

    /// One direction of the report: the user's own listings of
    /// `own_kind` against everyone else's listings of the counterpart
    /// kind.
    async fn direction(
        &self,
        user_id: &str,
        own_kind: ListingKind,
    ) -> Result<Vec<MatchResult>, ServiceError> {
        let own = self.repository.active_for_user(user_id, own_kind).await?;
        if own.is_empty() {
            return Ok(Vec::new());
        }

        let counterparts = self
            .repository
            .active_counterparts(user_id, own_kind.counterpart())
            .await?;

        Ok(rank_matches(pair_candidates(&own, &counterparts)))
    }
}

/// Cross every own listing with every counterpart that shares at least
/// one skill. Listings by the same user never pair with each other.
fn pair_candidates(own: &[CandidateListing], others: &[CandidateListing]) -> Vec<MatchResult> {
    let mut results = Vec::new();

    for own_listing in own {
        for other in others {
            if other.summary.user_id == own_listing.summary.user_id {
                continue;
            }

            let match_score = own_listing.skills.intersection(&other.skills).count();
            if match_score == 0 {
                continue;
            }

            results.push(MatchResult {
                own_listing: own_listing.summary.clone(),
                counterpart: other.summary.clone(),
                match_score,
                distance_km: utils::distance_km(own_listing.coordinates, other.coordinates),
            });
        }
    }

    results
}

/// Nearest first; equally distant pairs are broken by higher skill
/// overlap. The sort is stable, so otherwise-equal results keep their
/// discovery order. Truncates to the per-direction cap.
fn rank_matches(mut matches: Vec<MatchResult>) -> Vec<MatchResult> {
    matches.sort_by(|a, b| {
        a.distance_km
            .total_cmp(&b.distance_km)
            .then_with(|| b.match_score.cmp(&a.match_score))
    });
    matches.truncate(MAX_RESULTS_PER_DIRECTION);
    matches
}

#[async_trait]
impl RequestHandler<MatchingRequest> for MatchingRequestHandler {
    async fn handle_request(&self, request: MatchingRequest) {
        match request {
            MatchingRequest::FindMatches { user_id, response } => {
                let result = self.find_matches(&user_id).await;
                let _ = response.send(result);
            }
        }
    }
}

pub struct MatchingService;

impl MatchingService {
    pub fn new() -> Self {
        MatchingService {}
    }
}

#[async_trait]
impl Service<MatchingRequest, MatchingRequestHandler> for MatchingService {}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::matches::ListingSummary;

    fn candidate(
        id: &str,
        user_id: &str,
        skills: &[&str],
        coordinates: Option<(f64, f64)>,
    ) -> CandidateListing {
        CandidateListing {
            summary: ListingSummary {
                id: id.to_string(),
                user_id: user_id.to_string(),
                username: user_id.to_string(),
                title: format!("listing {}", id),
                kind: "OFFER".to_string(),
            },
            skills: skills.iter().map(|s| s.to_string()).collect(),
            coordinates,
        }
    }

    #[test]
    fn pairs_listings_sharing_at_least_one_skill() {
        let own = vec![candidate("r1", "alice", &["Tutoring"], Some((0.0, 0.0)))];
        let others = vec![
            candidate("o1", "bob", &["Tutoring", "Cooking"], Some((0.0, 1.0))),
            candidate("o2", "carol", &["Plumbing"], Some((0.0, 0.5))),
        ];

        let results = pair_candidates(&own, &others);
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].counterpart.id, "o1");
        assert_eq!(results[0].match_score, 1);
        assert!((results[0].distance_km - 111.195).abs() < 0.01);
    }

    #[test]
    fn own_listings_never_match_each_other() {
        let own = vec![candidate("r1", "alice", &["Gardening"], None)];
        let others = vec![candidate("o1", "alice", &["Gardening"], None)];

        assert!(pair_candidates(&own, &others).is_empty());
    }

    #[test]
    fn score_counts_the_skill_intersection() {
        let own = vec![candidate(
            "r1",
            "alice",
            &["Tutoring", "Cooking", "Baking"],
            None,
        )];
        let others = vec![candidate(
            "o1",
            "bob",
            &["Cooking", "Baking", "Sewing"],
            None,
        )];

        let results = pair_candidates(&own, &others);
        assert_eq!(results[0].match_score, 2);
    }

    #[test]
    fn ranks_by_distance_then_score() {
        fn result(id: &str, match_score: usize, distance_km: f64) -> MatchResult {
            MatchResult {
                own_listing: candidate("r1", "alice", &[], None).summary,
                counterpart: candidate(id, "bob", &[], None).summary,
                match_score,
                distance_km,
            }
        }

        let ranked = rank_matches(vec![
            result("far-strong", 5, 80.0),
            result("near-weak", 1, 2.0),
            result("near-strong", 3, 2.0),
            result("unlocatable", 9, f64::INFINITY),
        ]);

        let order: Vec<&str> = ranked.iter().map(|r| r.counterpart.id.as_str()).collect();
        assert_eq!(
            order,
            vec!["near-strong", "near-weak", "far-strong", "unlocatable"]
        );
    }

    #[test]
    fn truncates_to_ten_per_direction() {
        let results: Vec<MatchResult> = (0..25)
            .map(|i| MatchResult {
                own_listing: candidate("r1", "alice", &[], None).summary,
                counterpart: candidate(&format!("o{}", i), "bob", &[], None).summary,
                match_score: 1,
                distance_km: i as f64,
            })
            .collect();

        let ranked = rank_matches(results);
        assert_eq!(ranked.len(), 10);
        assert_eq!(ranked[0].distance_km, 0.0);
        assert_eq!(ranked[9].distance_km, 9.0);
    }

    #[test]
    fn missing_coordinates_rank_last_but_still_match() {
        let own = vec![candidate("r1", "alice", &["Tutoring"], Some((0.0, 0.0)))];
        let others = vec![
            candidate("o1", "bob", &["Tutoring"], None),
            candidate("o2", "carol", &["Tutoring"], Some((10.0, 10.0))),
        ];

        let ranked = rank_matches(pair_candidates(&own, &others));
        assert_eq!(ranked.len(), 2);
        assert_eq!(ranked[0].counterpart.id, "o2");
        assert_eq!(ranked[1].counterpart.id, "o1");
        assert!(ranked[1].distance_km.is_infinite());
    }
}
