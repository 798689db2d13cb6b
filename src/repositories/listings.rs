use std::collections::HashSet;

use crate::models::listings::{ListingDetail, ListingKind, ListingUpdate, NewListing};
use crate::models::matches::{CandidateListing, ListingSummary};

use sqlx::{PgPool, Postgres};
use uuid::Uuid;

#[derive(Debug, thiserror::Error)]
pub enum ListingError {
    #[error("listing not found: {0}")]
    NotFound(String),
    #[error("user is not the owner of the listing")]
    PermissionDenied,
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
}

/// Shared SELECT for listing rows with their aggregated skill names.
const DETAIL_SELECT: &str = r#"SELECT
    l.id, l.user_id, u.username, l.title, l.description, l.kind, l.is_active, l.created_at,
    COALESCE(array_agg(s.name ORDER BY s.name) FILTER (WHERE s.name IS NOT NULL),
             ARRAY[]::TEXT[]) AS skills
FROM listings l
JOIN users u ON u.id = l.user_id
LEFT JOIN listing_skills ls ON ls.listing_id = l.id
LEFT JOIN skills s ON s.id = ls.skill_id"#;

const DETAIL_GROUP_BY: &str = "GROUP BY l.id, u.username";

#[derive(sqlx::FromRow)]
struct CandidateRow {
    id: String,
    user_id: String,
    username: String,
    title: String,
    kind: String,
    latitude: Option<f64>,
    longitude: Option<f64>,
    skills: Vec<String>,
}

impl From<CandidateRow> for CandidateListing {
    fn from(row: CandidateRow) -> Self {
        let coordinates = match (row.latitude, row.longitude) {
            (Some(lat), Some(lon)) => Some((lat, lon)),
            _ => None,
        };

        CandidateListing {
            summary: ListingSummary {
                id: row.id,
                user_id: row.user_id,
                username: row.username,
                title: row.title,
                kind: row.kind,
            },
            skills: row.skills.into_iter().collect(),
            coordinates,
        }
    }
}

#[derive(Clone)]
pub struct ListingRepository {
    conn: PgPool,
}

impl ListingRepository {
    pub fn new(conn: PgPool) -> Self {
        ListingRepository { conn }
    }

    pub async fn create(&self, new_listing: &NewListing) -> Result<ListingDetail, ListingError> {
        let listing_id = Uuid::new_v4().hyphenated().to_string();
        let mut tx = self.conn.begin().await?;

        sqlx::query(
            r#"INSERT INTO listings (id, user_id, title, description, kind)
            VALUES ($1, $2, $3, $4, $5)"#,
        )
        .bind(&listing_id)
        .bind(&new_listing.user_id)
        .bind(&new_listing.title)
        .bind(&new_listing.description)
        .bind(new_listing.kind.as_str())
        .execute(&mut *tx)
        .await?;

        Self::attach_skills(&mut tx, &listing_id, &new_listing.skills).await?;
        tx.commit().await?;

        match self.get(&listing_id).await? {
            Some(detail) => Ok(detail),
            None => Err(ListingError::NotFound(listing_id)),
        }
    }

    pub async fn update(
        &self,
        actor: &str,
        listing_id: &str,
        update: &ListingUpdate,
    ) -> Result<ListingDetail, ListingError> {
        let mut tx = self.conn.begin().await?;
        Self::check_owner(&mut tx, listing_id, actor).await?;

        sqlx::query(
            r#"UPDATE listings SET
                title = COALESCE($1, title),
                description = COALESCE($2, description),
                updated_at = CURRENT_TIMESTAMP
            WHERE id = $3"#,
        )
        .bind(&update.title)
        .bind(&update.description)
        .bind(listing_id)
        .execute(&mut *tx)
        .await?;

        if let Some(skills) = &update.skills {
            sqlx::query("DELETE FROM listing_skills WHERE listing_id = $1")
                .bind(listing_id)
                .execute(&mut *tx)
                .await?;
            Self::attach_skills(&mut tx, listing_id, skills).await?;
        }

        tx.commit().await?;

        match self.get(listing_id).await? {
            Some(detail) => Ok(detail),
            None => Err(ListingError::NotFound(listing_id.to_string())),
        }
    }

    /// Soft delete. The row stays so match history and ledger rows can
    /// keep pointing at it.
    pub async fn deactivate(&self, actor: &str, listing_id: &str) -> Result<(), ListingError> {
        let mut tx = self.conn.begin().await?;
        Self::check_owner(&mut tx, listing_id, actor).await?;

        sqlx::query(
            "UPDATE listings SET is_active = FALSE, updated_at = CURRENT_TIMESTAMP WHERE id = $1",
        )
        .bind(listing_id)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;

        Ok(())
    }

    pub async fn get(&self, listing_id: &str) -> Result<Option<ListingDetail>, ListingError> {
        let sql = format!("{} WHERE l.id = $1 {}", DETAIL_SELECT, DETAIL_GROUP_BY);
        let detail = sqlx::query_as::<_, ListingDetail>(&sql)
            .bind(listing_id)
            .fetch_optional(&self.conn)
            .await?;

        Ok(detail)
    }

    /// Active listings, optionally filtered by kind and by a free-text
    /// search over title, description and skill names.
    pub async fn browse(
        &self,
        kind: Option<ListingKind>,
        query: Option<&str>,
    ) -> Result<Vec<ListingDetail>, ListingError> {
        let sql = format!(
            r#"{} WHERE l.is_active
            AND ($1::TEXT IS NULL OR l.kind = $1)
            AND ($2::TEXT IS NULL
                 OR l.title ILIKE $2
                 OR l.description ILIKE $2
                 OR EXISTS (
                     SELECT 1 FROM listing_skills ls2
                     JOIN skills s2 ON s2.id = ls2.skill_id
                     WHERE ls2.listing_id = l.id AND s2.name ILIKE $2))
            {} ORDER BY l.created_at DESC"#,
            DETAIL_SELECT, DETAIL_GROUP_BY
        );

        let pattern = query.map(|q| format!("%{}%", q));
        let listings = sqlx::query_as::<_, ListingDetail>(&sql)
            .bind(kind.map(|k| k.as_str()))
            .bind(pattern)
            .fetch_all(&self.conn)
            .await?;

        Ok(listings)
    }

    /// The user's own active listings of one kind, ready for matching.
    pub async fn active_for_user(
        &self,
        user_id: &str,
        kind: ListingKind,
    ) -> Result<Vec<CandidateListing>, ListingError> {
        self.candidates("l.user_id = $2", user_id, kind).await
    }

    /// Everyone else's active listings of one kind. Excluding the user
    /// here keeps self-matches out of the result set at the source.
    pub async fn active_counterparts(
        &self,
        user_id: &str,
        kind: ListingKind,
    ) -> Result<Vec<CandidateListing>, ListingError> {
        self.candidates("l.user_id <> $2", user_id, kind).await
    }

    async fn candidates(
        &self,
        user_clause: &str,
        user_id: &str,
        kind: ListingKind,
    ) -> Result<Vec<CandidateListing>, ListingError> {
        let sql = format!(
            r#"SELECT l.id, l.user_id, u.username, l.title, l.kind, p.latitude, p.longitude,
                COALESCE(array_agg(s.name) FILTER (WHERE s.name IS NOT NULL),
                         ARRAY[]::TEXT[]) AS skills
            FROM listings l
            JOIN users u ON u.id = l.user_id
            LEFT JOIN profiles p ON p.user_id = l.user_id
            LEFT JOIN listing_skills ls ON ls.listing_id = l.id
            LEFT JOIN skills s ON s.id = ls.skill_id
            WHERE l.is_active AND l.kind = $1 AND {}
            GROUP BY l.id, u.username, p.latitude, p.longitude"#,
            user_clause
        );

        let rows = sqlx::query_as::<_, CandidateRow>(&sql)
            .bind(kind.as_str())
            .bind(user_id)
            .fetch_all(&self.conn)
            .await?;

        Ok(rows.into_iter().map(CandidateListing::from).collect())
    }

    async fn check_owner(
        tx: &mut sqlx::Transaction<'_, Postgres>,
        listing_id: &str,
        actor: &str,
    ) -> Result<(), ListingError> {
        let owner: Option<String> = sqlx::query_scalar("SELECT user_id FROM listings WHERE id = $1")
            .bind(listing_id)
            .fetch_optional(&mut **tx)
            .await?;

        match owner {
            None => Err(ListingError::NotFound(listing_id.to_string())),
            Some(owner) if owner != actor => Err(ListingError::PermissionDenied),
            Some(_) => Ok(()),
        }
    }

    /// Attach skill names to a listing, creating missing vocabulary
    /// entries. Names are matched case-sensitively and deduplicated.
    async fn attach_skills(
        tx: &mut sqlx::Transaction<'_, Postgres>,
        listing_id: &str,
        skills: &[String],
    ) -> Result<(), ListingError> {
        let mut seen = HashSet::new();

        for name in skills {
            let name = name.trim();
            if name.is_empty() || !seen.insert(name) {
                continue;
            }

            sqlx::query("INSERT INTO skills (id, name) VALUES ($1, $2) ON CONFLICT (name) DO NOTHING")
                .bind(Uuid::new_v4().hyphenated().to_string())
                .bind(name)
                .execute(&mut **tx)
                .await?;

            let skill_id: String = sqlx::query_scalar("SELECT id FROM skills WHERE name = $1")
                .bind(name)
                .fetch_one(&mut **tx)
                .await?;

            sqlx::query(
                r#"INSERT INTO listing_skills (listing_id, skill_id)
                VALUES ($1, $2)
                ON CONFLICT DO NOTHING"#,
            )
            .bind(listing_id)
            .bind(&skill_id)
            .execute(&mut **tx)
            .await?;
        }

        Ok(())
    }
}
