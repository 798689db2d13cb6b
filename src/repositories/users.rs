use crate::models::users::{NewUser, Profile, ProfileUpdate, User};

use anyhow::bail;
use sqlx::PgPool;
use uuid::Uuid;

#[derive(Clone)]
pub struct UserRepository {
    conn: PgPool,
}

impl UserRepository {
    pub fn new(conn: PgPool) -> Self {
        Self { conn }
    }

    pub async fn insert_user(&self, new_user: &NewUser) -> Result<User, anyhow::Error> {
        let user_id = Uuid::new_v4().hyphenated().to_string();
        let mut tx = self.conn.begin().await?;

        let user = sqlx::query_as::<_, User>(
            r#"INSERT INTO users (id, username, email)
            VALUES ($1, $2, $3)
            RETURNING *"#,
        )
        .bind(&user_id)
        .bind(&new_user.username)
        .bind(&new_user.email)
        .fetch_one(&mut *tx)
        .await?;

        sqlx::query("INSERT INTO profiles (user_id) VALUES ($1)")
            .bind(&user_id)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;

        Ok(user)
    }

    pub async fn get_user_by_id(&self, user_id: &str) -> Result<Option<User>, anyhow::Error> {
        let user = sqlx::query_as::<_, User>("SELECT * FROM users WHERE id = $1")
            .bind(user_id)
            .fetch_optional(&self.conn)
            .await?;

        Ok(user)
    }

    /// Fetch the profile, creating it on first access for users that
    /// predate profile rows.
    pub async fn get_or_create_profile(&self, user_id: &str) -> Result<Profile, anyhow::Error> {
        let profile =
            sqlx::query_as::<_, Profile>("SELECT * FROM profiles WHERE user_id = $1")
                .bind(user_id)
                .fetch_optional(&self.conn)
                .await?;

        if let Some(profile) = profile {
            return Ok(profile);
        }

        if self.get_user_by_id(user_id).await?.is_none() {
            bail!("User not found: {}", user_id)
        }

        let profile = sqlx::query_as::<_, Profile>(
            r#"INSERT INTO profiles (user_id)
            VALUES ($1)
            ON CONFLICT (user_id) DO UPDATE SET user_id = EXCLUDED.user_id
            RETURNING *"#,
        )
        .bind(user_id)
        .fetch_one(&self.conn)
        .await?;

        Ok(profile)
    }

    pub async fn update_profile(
        &self,
        user_id: &str,
        update: &ProfileUpdate,
    ) -> Result<Profile, anyhow::Error> {
        self.get_or_create_profile(user_id).await?;

        let profile = sqlx::query_as::<_, Profile>(
            r#"UPDATE profiles SET
                bio = COALESCE($1, bio),
                location = COALESCE($2, location),
                is_available = COALESCE($3, is_available),
                latitude = COALESCE($4, latitude),
                longitude = COALESCE($5, longitude),
                updated_at = CURRENT_TIMESTAMP
            WHERE user_id = $6
            RETURNING *"#,
        )
        .bind(&update.bio)
        .bind(&update.location)
        .bind(update.is_available)
        .bind(update.latitude)
        .bind(update.longitude)
        .bind(user_id)
        .fetch_one(&self.conn)
        .await?;

        Ok(profile)
    }
}
