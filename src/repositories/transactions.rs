use crate::models::transactions::{BalanceSummary, NewTransfer, Transaction};

use sqlx::{PgPool, Postgres};
use uuid::Uuid;

#[derive(Debug, thiserror::Error)]
pub enum TransferError {
    #[error("transfer amount must be positive")]
    InvalidAmount,
    #[error("cannot transfer credits to yourself")]
    SelfTransfer,
    #[error("insufficient balance: have {available}, need {requested}")]
    InsufficientBalance { available: i64, requested: i64 },
    #[error("account not found: {0}")]
    AccountNotFound(String),
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
}

/// Checks that hold regardless of account state. The balance check
/// happens later, under the row locks.
fn validate_parties(transfer: &NewTransfer) -> Result<(), TransferError> {
    if transfer.amount_in_cents <= 0 {
        return Err(TransferError::InvalidAmount);
    }
    if transfer.sender_id == transfer.receiver_id {
        return Err(TransferError::SelfTransfer);
    }
    Ok(())
}

#[derive(Clone)]
pub struct TransactionRepository {
    conn: PgPool,
}

impl TransactionRepository {
    pub fn new(conn: PgPool) -> Self {
        TransactionRepository { conn }
    }

    /// Record a transfer as one atomic unit: balance check, ledger
    /// append and both balance updates commit together or not at all.
    pub async fn record_transfer(
        &self,
        transfer: &NewTransfer,
    ) -> Result<Transaction, TransferError> {
        let mut tx = self.conn.begin().await?;
        let transaction = Self::transfer_in_tx(&mut tx, transfer).await?;
        tx.commit().await?;

        Ok(transaction)
    }

    /// Run the full transfer inside an already-open transaction, so
    /// callers (credit-request acceptance) can tie it to their own
    /// state changes. The balance check always runs here, at commit
    /// time, not when the transfer was first proposed.
    pub async fn transfer_in_tx(
        tx: &mut sqlx::Transaction<'_, Postgres>,
        transfer: &NewTransfer,
    ) -> Result<Transaction, TransferError> {
        validate_parties(transfer)?;

        // Lock both profile rows in ascending user-id order. The fixed
        // order prevents deadlock between two opposing transfers.
        let mut ids = [transfer.sender_id.as_str(), transfer.receiver_id.as_str()];
        ids.sort_unstable();

        let mut available = 0i64;
        for user_id in ids {
            let credits = Self::lock_or_init_profile(tx, user_id).await?;
            if user_id == transfer.sender_id {
                available = credits;
            }
        }

        if available < transfer.amount_in_cents {
            return Err(TransferError::InsufficientBalance {
                available,
                requested: transfer.amount_in_cents,
            });
        }

        let transaction_id = Uuid::new_v4().hyphenated().to_string();
        let transaction = sqlx::query_as::<_, Transaction>(
            r#"INSERT INTO transactions
            (id, sender_id, receiver_id, amount_in_cents, description, related_listing_id)
            VALUES ($1, $2, $3, $4, $5, $6)
            RETURNING *"#,
        )
        .bind(&transaction_id)
        .bind(&transfer.sender_id)
        .bind(&transfer.receiver_id)
        .bind(transfer.amount_in_cents)
        .bind(&transfer.description)
        .bind(&transfer.related_listing_id)
        .fetch_one(&mut **tx)
        .await?;

        sqlx::query(
            "UPDATE profiles SET time_credits = time_credits - $1, updated_at = CURRENT_TIMESTAMP
             WHERE user_id = $2",
        )
        .bind(transfer.amount_in_cents)
        .bind(&transfer.sender_id)
        .execute(&mut **tx)
        .await?;

        sqlx::query(
            "UPDATE profiles SET time_credits = time_credits + $1, updated_at = CURRENT_TIMESTAMP
             WHERE user_id = $2",
        )
        .bind(transfer.amount_in_cents)
        .bind(&transfer.receiver_id)
        .execute(&mut **tx)
        .await?;

        Ok(transaction)
    }

    /// Take the row lock on a profile, creating the account on first
    /// access when the user exists but has no profile row yet.
    async fn lock_or_init_profile(
        tx: &mut sqlx::Transaction<'_, Postgres>,
        user_id: &str,
    ) -> Result<i64, TransferError> {
        let credits: Option<i64> =
            sqlx::query_scalar("SELECT time_credits FROM profiles WHERE user_id = $1 FOR UPDATE")
                .bind(user_id)
                .fetch_optional(&mut **tx)
                .await?;

        if let Some(credits) = credits {
            return Ok(credits);
        }

        let user: Option<String> = sqlx::query_scalar("SELECT id FROM users WHERE id = $1")
            .bind(user_id)
            .fetch_optional(&mut **tx)
            .await?;

        if user.is_none() {
            return Err(TransferError::AccountNotFound(user_id.to_string()));
        }

        sqlx::query("INSERT INTO profiles (user_id) VALUES ($1) ON CONFLICT (user_id) DO NOTHING")
            .bind(user_id)
            .execute(&mut **tx)
            .await?;

        let credits: Option<i64> =
            sqlx::query_scalar("SELECT time_credits FROM profiles WHERE user_id = $1 FOR UPDATE")
                .bind(user_id)
                .fetch_optional(&mut **tx)
                .await?;

        Ok(credits.unwrap_or(0))
    }

    /// Cached balance next to the projection recomputed from the log.
    /// The two must agree for any committed state.
    pub async fn balance_summary(&self, user_id: &str) -> Result<BalanceSummary, TransferError> {
        let user: Option<String> = sqlx::query_scalar("SELECT id FROM users WHERE id = $1")
            .bind(user_id)
            .fetch_optional(&self.conn)
            .await?;

        if user.is_none() {
            return Err(TransferError::AccountNotFound(user_id.to_string()));
        }

        let cached: Option<i64> =
            sqlx::query_scalar("SELECT time_credits FROM profiles WHERE user_id = $1")
                .bind(user_id)
                .fetch_optional(&self.conn)
                .await?;

        let derived: i64 = sqlx::query_scalar(
            r#"SELECT COALESCE(SUM(
                CASE WHEN receiver_id = $1 THEN amount_in_cents ELSE -amount_in_cents END
            ), 0)
            FROM transactions
            WHERE sender_id = $1 OR receiver_id = $1"#,
        )
        .bind(user_id)
        .fetch_one(&self.conn)
        .await?;

        Ok(BalanceSummary {
            user_id: user_id.to_string(),
            cached_in_cents: cached.unwrap_or(0),
            derived_in_cents: derived,
        })
    }

    pub async fn recent_for_user(
        &self,
        user_id: &str,
        limit: i64,
    ) -> Result<Vec<Transaction>, TransferError> {
        let transactions = sqlx::query_as::<_, Transaction>(
            r#"SELECT * FROM transactions
            WHERE sender_id = $1 OR receiver_id = $1
            ORDER BY created_at DESC
            LIMIT $2"#,
        )
        .bind(user_id)
        .bind(limit)
        .fetch_all(&self.conn)
        .await?;

        Ok(transactions)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn transfer(sender: &str, receiver: &str, amount: i64) -> NewTransfer {
        NewTransfer {
            sender_id: sender.to_string(),
            receiver_id: receiver.to_string(),
            amount_in_cents: amount,
            description: "lawn mowing".to_string(),
            related_listing_id: None,
        }
    }

    #[test]
    fn rejects_zero_and_negative_amounts() {
        assert!(matches!(
            validate_parties(&transfer("a", "b", 0)),
            Err(TransferError::InvalidAmount)
        ));
        assert!(matches!(
            validate_parties(&transfer("a", "b", -100)),
            Err(TransferError::InvalidAmount)
        ));
    }

    #[test]
    fn rejects_self_transfer() {
        assert!(matches!(
            validate_parties(&transfer("a", "a", 100)),
            Err(TransferError::SelfTransfer)
        ));
    }

    #[test]
    fn accepts_positive_amount_between_distinct_parties() {
        assert!(validate_parties(&transfer("a", "b", 150)).is_ok());
    }

    mod postgres {
        //! Ledger properties that only hold through the database:
        //! run with `cargo test -- --ignored` against a disposable
        //! Postgres pointed to by DATABASE_URL.

        use super::transfer;
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

        async fn cached_balance(pool: &PgPool, user_id: &str) -> i64 {
            sqlx::query_scalar("SELECT time_credits FROM profiles WHERE user_id = $1")
                .bind(user_id)
                .fetch_one(pool)
                .await
                .expect("balance")
        }

        #[tokio::test]
        #[ignore = "requires a running Postgres (DATABASE_URL)"]
        async fn transfer_moves_credits_and_conserves_total() {
            let pool = test_pool().await;
            let repository = TransactionRepository::new(pool.clone());

            let sender = seed_user(&pool, 1000).await;
            let receiver = seed_user(&pool, 250).await;

            let recorded = repository
                .record_transfer(&transfer(&sender, &receiver, 400))
                .await
                .expect("transfer should succeed");
            assert_eq!(recorded.amount_in_cents, 400);

            assert_eq!(cached_balance(&pool, &sender).await, 600);
            assert_eq!(cached_balance(&pool, &receiver).await, 650);

            // Cached balances still agree with the log.
            let summary = repository.balance_summary(&sender).await.expect("summary");
            assert_eq!(summary.derived_in_cents, -400);
        }

        #[tokio::test]
        #[ignore = "requires a running Postgres (DATABASE_URL)"]
        async fn insufficient_balance_leaves_everything_unchanged() {
            let pool = test_pool().await;
            let repository = TransactionRepository::new(pool.clone());

            let sender = seed_user(&pool, 300).await;
            let receiver = seed_user(&pool, 0).await;

            let result = repository
                .record_transfer(&transfer(&sender, &receiver, 500))
                .await;
            assert!(matches!(
                result,
                Err(TransferError::InsufficientBalance {
                    available: 300,
                    requested: 500
                })
            ));

            assert_eq!(cached_balance(&pool, &sender).await, 300);
            assert_eq!(cached_balance(&pool, &receiver).await, 0);

            let history = repository
                .recent_for_user(&sender, 10)
                .await
                .expect("history");
            assert!(history.is_empty());
        }

        #[tokio::test]
        #[ignore = "requires a running Postgres (DATABASE_URL)"]
        async fn profile_is_created_lazily_on_first_access() {
            let pool = test_pool().await;
            let repository = TransactionRepository::new(pool.clone());

            let sender = seed_user(&pool, 500).await;

            // Receiver registered but never touched their account.
            let receiver = Uuid::new_v4().hyphenated().to_string();
            sqlx::query("INSERT INTO users (id, username) VALUES ($1, $1)")
                .bind(&receiver)
                .execute(&pool)
                .await
                .expect("insert user");

            repository
                .record_transfer(&transfer(&sender, &receiver, 200))
                .await
                .expect("transfer should create the receiver account");

            assert_eq!(cached_balance(&pool, &receiver).await, 200);
        }

        #[tokio::test]
        #[ignore = "requires a running Postgres (DATABASE_URL)"]
        async fn unknown_account_is_rejected() {
            let pool = test_pool().await;
            let repository = TransactionRepository::new(pool.clone());

            let sender = seed_user(&pool, 500).await;
            let result = repository
                .record_transfer(&transfer(&sender, "no-such-user", 100))
                .await;

            assert!(matches!(result, Err(TransferError::AccountNotFound(_))));
        }
    }
}
