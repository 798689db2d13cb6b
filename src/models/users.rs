use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, Deserialize, Serialize, sqlx::FromRow)]
pub struct User {
    pub id: String,
    pub username: String,
    pub email: Option<String>,
    pub created_at: chrono::NaiveDateTime,
    pub updated_at: chrono::NaiveDateTime,
}

#[derive(Clone, Debug, Deserialize)]
pub struct NewUser {
    pub username: String,
    pub email: Option<String>,
}

/// Per-user account state. `time_credits` is the cached balance in
/// hundredths of a credit; it is only ever mutated together with a
/// ledger append, inside the same database transaction.
#[derive(Clone, Debug, Deserialize, Serialize, sqlx::FromRow)]
pub struct Profile {
    pub user_id: String,
    pub time_credits: i64,
    pub bio: String,
    pub location: String,
    pub is_available: bool,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    pub created_at: chrono::NaiveDateTime,
    pub updated_at: chrono::NaiveDateTime,
}

#[derive(Clone, Debug, Deserialize)]
pub struct ProfileUpdate {
    pub bio: Option<String>,
    pub location: Option<String>,
    pub is_available: Option<bool>,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
}

#[derive(Clone, Debug, Serialize)]
pub struct UserDetails {
    pub user: User,
    pub profile: Profile,
}
