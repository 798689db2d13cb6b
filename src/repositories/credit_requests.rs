use crate::models::credit_requests::{CreditRequest, CreditRequestStatus, NewCreditRequest};
use crate::models::transactions::{NewTransfer, Transaction};
use crate::repositories::transactions::{TransactionRepository, TransferError};

use sqlx::PgPool;
use uuid::Uuid;

#[derive(Debug, thiserror::Error)]
pub enum CreditRequestError {
    #[error("requested amount must be positive")]
    InvalidAmount,
    #[error("cannot request credits from yourself")]
    SelfRequest,
    #[error("credit request not found: {0}")]
    NotFound(String),
    #[error("only the requested payer may resolve this request")]
    PermissionDenied,
    #[error("credit request already resolved as {0}")]
    AlreadyResolved(String),
    #[error("related listing is no longer active: {0}")]
    ListingInactive(String),
    #[error(transparent)]
    Transfer(#[from] TransferError),
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
}

/// Resolution preconditions shared by accept and decline. Resolving an
/// already-resolved request is an error, never a second transfer.
fn ensure_resolvable(request: &CreditRequest, actor: &str) -> Result<(), CreditRequestError> {
    if actor != request.payer_id {
        return Err(CreditRequestError::PermissionDenied);
    }
    if request.status != CreditRequestStatus::Pending.as_str() {
        return Err(CreditRequestError::AlreadyResolved(request.status.clone()));
    }
    Ok(())
}

#[derive(Clone)]
pub struct CreditRequestRepository {
    conn: PgPool,
}

impl CreditRequestRepository {
    pub fn new(conn: PgPool) -> Self {
        CreditRequestRepository { conn }
    }

    pub async fn create(
        &self,
        request: &NewCreditRequest,
    ) -> Result<CreditRequest, CreditRequestError> {
        if request.amount_in_cents <= 0 {
            return Err(CreditRequestError::InvalidAmount);
        }
        if request.requester_id == request.payer_id {
            return Err(CreditRequestError::SelfRequest);
        }

        // A match may have gone stale between query and action; the
        // listing must still be active when the request is created.
        if let Some(listing_id) = &request.related_listing_id {
            let active: Option<bool> =
                sqlx::query_scalar("SELECT is_active FROM listings WHERE id = $1")
                    .bind(listing_id)
                    .fetch_optional(&self.conn)
                    .await?;

            if active != Some(true) {
                return Err(CreditRequestError::ListingInactive(listing_id.clone()));
            }
        }

        let request_id = Uuid::new_v4().hyphenated().to_string();
        let created = sqlx::query_as::<_, CreditRequest>(
            r#"INSERT INTO credit_requests
            (id, requester_id, payer_id, amount_in_cents, description, related_listing_id)
            VALUES ($1, $2, $3, $4, $5, $6)
            RETURNING *"#,
        )
        .bind(&request_id)
        .bind(&request.requester_id)
        .bind(&request.payer_id)
        .bind(request.amount_in_cents)
        .bind(&request.description)
        .bind(&request.related_listing_id)
        .fetch_one(&self.conn)
        .await?;

        Ok(created)
    }

    /// Accept a pending request: the transfer and the status flip are
    /// one atomic unit. The payer's balance is re-checked here, at
    /// acceptance time, since it may have changed since creation.
    pub async fn accept(
        &self,
        actor: &str,
        request_id: &str,
    ) -> Result<(CreditRequest, Transaction), CreditRequestError> {
        let mut tx = self.conn.begin().await?;

        let request = sqlx::query_as::<_, CreditRequest>(
            "SELECT * FROM credit_requests WHERE id = $1 FOR UPDATE",
        )
        .bind(request_id)
        .fetch_optional(&mut *tx)
        .await?
        .ok_or_else(|| CreditRequestError::NotFound(request_id.to_string()))?;

        ensure_resolvable(&request, actor)?;

        let transfer = NewTransfer {
            sender_id: request.payer_id.clone(),
            receiver_id: request.requester_id.clone(),
            amount_in_cents: request.amount_in_cents,
            description: request.description.clone(),
            related_listing_id: request.related_listing_id.clone(),
        };
        let transaction = TransactionRepository::transfer_in_tx(&mut tx, &transfer).await?;

        let request = sqlx::query_as::<_, CreditRequest>(
            r#"UPDATE credit_requests
            SET status = $1, resolved_at = CURRENT_TIMESTAMP
            WHERE id = $2
            RETURNING *"#,
        )
        .bind(CreditRequestStatus::Accepted.as_str())
        .bind(request_id)
        .fetch_one(&mut *tx)
        .await?;

        tx.commit().await?;

        Ok((request, transaction))
    }

    pub async fn decline(
        &self,
        actor: &str,
        request_id: &str,
    ) -> Result<CreditRequest, CreditRequestError> {
        let mut tx = self.conn.begin().await?;

        let request = sqlx::query_as::<_, CreditRequest>(
            "SELECT * FROM credit_requests WHERE id = $1 FOR UPDATE",
        )
        .bind(request_id)
        .fetch_optional(&mut *tx)
        .await?
        .ok_or_else(|| CreditRequestError::NotFound(request_id.to_string()))?;

        ensure_resolvable(&request, actor)?;

        let request = sqlx::query_as::<_, CreditRequest>(
            r#"UPDATE credit_requests
            SET status = $1, resolved_at = CURRENT_TIMESTAMP
            WHERE id = $2
            RETURNING *"#,
        )
        .bind(CreditRequestStatus::Declined.as_str())
        .bind(request_id)
        .fetch_one(&mut *tx)
        .await?;

        tx.commit().await?;

        Ok(request)
    }

    pub async fn list_for_user(
        &self,
        user_id: &str,
    ) -> Result<Vec<CreditRequest>, CreditRequestError> {
        let requests = sqlx::query_as::<_, CreditRequest>(
            r#"SELECT * FROM credit_requests
            WHERE requester_id = $1 OR payer_id = $1
            ORDER BY created_at DESC"#,
        )
        .bind(user_id)
        .fetch_all(&self.conn)
        .await?;

        Ok(requests)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pending_request(requester: &str, payer: &str) -> CreditRequest {
        let created_at = chrono::NaiveDate::from_ymd_opt(2024, 6, 1)
            .unwrap()
            .and_hms_opt(12, 0, 0)
            .unwrap();

        CreditRequest {
            id: "req-1".to_string(),
            requester_id: requester.to_string(),
            payer_id: payer.to_string(),
            amount_in_cents: 150,
            description: "two hours of tutoring".to_string(),
            related_listing_id: None,
            status: CreditRequestStatus::Pending.as_str().to_string(),
            created_at,
            resolved_at: None,
        }
    }

    #[test]
    fn payer_may_resolve_pending_request() {
        let request = pending_request("alice", "bob");
        assert!(ensure_resolvable(&request, "bob").is_ok());
    }

    #[test]
    fn non_payer_is_rejected() {
        let request = pending_request("alice", "bob");
        assert!(matches!(
            ensure_resolvable(&request, "alice"),
            Err(CreditRequestError::PermissionDenied)
        ));
        assert!(matches!(
            ensure_resolvable(&request, "mallory"),
            Err(CreditRequestError::PermissionDenied)
        ));
    }

    #[test]
    fn resolved_requests_stay_resolved() {
        for status in [CreditRequestStatus::Accepted, CreditRequestStatus::Declined] {
            let mut request = pending_request("alice", "bob");
            request.status = status.as_str().to_string();

            assert!(matches!(
                ensure_resolvable(&request, "bob"),
                Err(CreditRequestError::AlreadyResolved(_))
            ));
        }
    }

    mod postgres {
        //! Acceptance-path properties that need the database: run with
        //! `cargo test -- --ignored` and DATABASE_URL set.

        use crate::models::credit_requests::{CreditRequestStatus, NewCreditRequest};
        use crate::repositories::credit_requests::{CreditRequestError, CreditRequestRepository};
        use crate::repositories::transactions::{TransactionRepository, TransferError};
        use sqlx::postgres::PgPoolOptions;
        use sqlx::PgPool;
        use uuid::Uuid;

        async fn test_pool() -> PgPool {
            let url = std::env::var("DATABASE_URL").expect("DATABASE_URL not set");
            let pool = PgPoolOptions::new()
                .max_connections(5)
                .connect(&url)
                .await
                .expect("could not connect to test database");
            sqlx::migrate!("./migrations")
                .run(&pool)
                .await
                .expect("could not run migrations");
            pool
        }

        async fn seed_user(pool: &PgPool, credits: i64) -> String {
            let id = Uuid::new_v4().hyphenated().to_string();
            sqlx::query("INSERT INTO users (id, username) VALUES ($1, $1)")
                .bind(&id)
                .execute(pool)
                .await
                .expect("insert user");
            sqlx::query("INSERT INTO profiles (user_id, time_credits) VALUES ($1, $2)")
                .bind(&id)
                .bind(credits)
                .execute(pool)
                .await
                .expect("insert profile");
            id
        }

        fn request_between(requester: &str, payer: &str, amount: i64) -> NewCreditRequest {
            NewCreditRequest {
                requester_id: requester.to_string(),
                payer_id: payer.to_string(),
                amount_in_cents: amount,
                description: "garden work".to_string(),
                related_listing_id: None,
            }
        }

        #[tokio::test]
        #[ignore = "requires a running Postgres (DATABASE_URL)"]
        async fn accepting_twice_transfers_once() {
            let pool = test_pool().await;
            let repository = CreditRequestRepository::new(pool.clone());
            let ledger = TransactionRepository::new(pool.clone());

            let requester = seed_user(&pool, 0).await;
            let payer = seed_user(&pool, 1000).await;

            let request = repository
                .create(&request_between(&requester, &payer, 300))
                .await
                .expect("create");

            let (accepted, _) = repository.accept(&payer, &request.id).await.expect("accept");
            assert_eq!(accepted.status, CreditRequestStatus::Accepted.as_str());

            let second = repository.accept(&payer, &request.id).await;
            assert!(matches!(
                second,
                Err(CreditRequestError::AlreadyResolved(_))
            ));

            let summary = ledger.balance_summary(&payer).await.expect("summary");
            assert_eq!(summary.cached_in_cents, 700);
        }

        #[tokio::test]
        #[ignore = "requires a running Postgres (DATABASE_URL)"]
        async fn acceptance_recheck_catches_spent_balance() {
            let pool = test_pool().await;
            let repository = CreditRequestRepository::new(pool.clone());
            let ledger = TransactionRepository::new(pool.clone());

            let requester = seed_user(&pool, 0).await;
            let payer = seed_user(&pool, 500).await;
            let third_party = seed_user(&pool, 0).await;

            // Balance was sufficient when the request was created...
            let request = repository
                .create(&request_between(&requester, &payer, 400))
                .await
                .expect("create");

            // ...but the payer spends it before accepting.
            ledger
                .record_transfer(&crate::models::transactions::NewTransfer {
                    sender_id: payer.clone(),
                    receiver_id: third_party.clone(),
                    amount_in_cents: 300,
                    description: "spent elsewhere".to_string(),
                    related_listing_id: None,
                })
                .await
                .expect("transfer");

            let result = repository.accept(&payer, &request.id).await;
            assert!(matches!(
                result,
                Err(CreditRequestError::Transfer(
                    TransferError::InsufficientBalance { .. }
                ))
            ));

            // The request stays pending and no partial transfer leaked.
            let requests = repository.list_for_user(&payer).await.expect("list");
            let found = requests.iter().find(|r| r.id == request.id).expect("found");
            assert_eq!(found.status, CreditRequestStatus::Pending.as_str());
            assert_eq!(
                ledger
                    .balance_summary(&requester)
                    .await
                    .expect("summary")
                    .cached_in_cents,
                0
            );
        }
    }
}
