//! Postgres-backed implementation of [`PaymentStore`], [`OutboxStore`], and
//! [`TransactionManager`], all on one pool so a single transaction can span
//! both tables (spec §9).

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::PgPoolOptions;
use sqlx::{PgPool, Postgres, Row};
use uuid::Uuid;

use crate::domain::outbox::truncate_error;
use crate::domain::{EventType, NewPayment, OutboxRecord, Payment, PaymentStatus};

use super::{OutboxStore, PaymentStore, StoreError, TransactionManager};

/// Postgres error code for a unique-constraint violation.
const UNIQUE_VIOLATION: &str = "23505";

const CONSTRAINT_IDEMPOTENCY_KEY: &str = "payments_idempotency_key_key";
const CONSTRAINT_ORDER_CODE: &str = "payments_order_code_key";

fn classify_insert_error(error: sqlx::Error) -> StoreError {
    if let sqlx::Error::Database(db_error) = &error {
        if db_error.code().as_deref() == Some(UNIQUE_VIOLATION) {
            match db_error.constraint() {
                Some(CONSTRAINT_IDEMPOTENCY_KEY) => return StoreError::DuplicateIdempotencyKey,
                Some(CONSTRAINT_ORDER_CODE) => return StoreError::DuplicateOrderCode,
                _ => {}
            }
        }
    }
    StoreError::Database(error)
}

#[derive(Debug, Clone)]
pub struct PostgresStore {
    pool: PgPool,
}

impl PostgresStore {
    pub async fn connect(database_url: &str) -> Result<Self, StoreError> {
        let pool = PgPoolOptions::new()
            .max_connections(10)
            .connect(database_url)
            .await
            .map_err(StoreError::Database)?;
        Ok(Self { pool })
    }

    pub async fn migrate(&self) -> Result<(), StoreError> {
        sqlx::migrate!("./migrations")
            .run(&self.pool)
            .await
            .map_err(|e| StoreError::Database(sqlx::Error::Migrate(Box::new(e))))
    }
}

#[async_trait]
impl TransactionManager for PostgresStore {
    type Tx = sqlx::Transaction<'static, Postgres>;

    #[tracing::instrument(skip(self))]
    async fn begin(&self) -> Result<Self::Tx, StoreError> {
        self.pool.begin().await.map_err(StoreError::Database)
    }

    #[tracing::instrument(skip(self, tx))]
    async fn commit(&self, tx: Self::Tx) -> Result<(), StoreError> {
        tx.commit().await.map_err(StoreError::Database)
    }
}

#[async_trait]
impl PaymentStore for PostgresStore {
    type Tx = sqlx::Transaction<'static, Postgres>;

    #[tracing::instrument(skip(self, new), fields(order_code = %new.order_code))]
    async fn insert_pending(&self, new: NewPayment) -> Result<Payment, StoreError> {
        sqlx::query_as::<_, Payment>(
            r#"
            INSERT INTO payments (
                id, order_code, idempotency_key, amount_cents, currency, provider,
                provider_transaction_id, redirect_url, payment_url, status,
                created_at, updated_at, metadata
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, 'PENDING', now(), now(), $10)
            RETURNING *
            "#,
        )
        .bind(new.id)
        .bind(&new.order_code)
        .bind(&new.idempotency_key)
        .bind(new.amount_cents)
        .bind(new.currency)
        .bind(new.provider)
        .bind(&new.provider_transaction_id)
        .bind(&new.redirect_url)
        .bind(&new.payment_url)
        .bind(&new.metadata)
        .fetch_one(&self.pool)
        .await
        .map_err(classify_insert_error)
    }

    #[tracing::instrument(skip(self))]
    async fn find_by_idempotency_key(&self, key: &str) -> Result<Option<Payment>, StoreError> {
        sqlx::query_as::<_, Payment>("SELECT * FROM payments WHERE idempotency_key = $1")
            .bind(key)
            .fetch_optional(&self.pool)
            .await
            .map_err(StoreError::Database)
    }

    #[tracing::instrument(skip(self))]
    async fn find_by_order_code(&self, code: &str) -> Result<Option<Payment>, StoreError> {
        sqlx::query_as::<_, Payment>("SELECT * FROM payments WHERE order_code = $1")
            .bind(code)
            .fetch_optional(&self.pool)
            .await
            .map_err(StoreError::Database)
    }

    #[tracing::instrument(skip(self))]
    async fn find_by_provider_transaction_id(
        &self,
        provider_transaction_id: &str,
    ) -> Result<Option<Payment>, StoreError> {
        sqlx::query_as::<_, Payment>(
            "SELECT * FROM payments WHERE provider_transaction_id = $1",
        )
        .bind(provider_transaction_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(StoreError::Database)
    }

    #[tracing::instrument(skip(self, tx))]
    async fn lock_for_update(
        &self,
        tx: &mut Self::Tx,
        id: Uuid,
    ) -> Result<Option<Payment>, StoreError> {
        sqlx::query_as::<_, Payment>("SELECT * FROM payments WHERE id = $1 FOR UPDATE")
            .bind(id)
            .fetch_optional(&mut **tx)
            .await
            .map_err(StoreError::Database)
    }

    #[tracing::instrument(skip(self, tx))]
    async fn update_status(
        &self,
        tx: &mut Self::Tx,
        id: Uuid,
        to_status: PaymentStatus,
        at: DateTime<Utc>,
    ) -> Result<bool, StoreError> {
        let timestamp_column = match to_status {
            PaymentStatus::Completed => "completed_at",
            PaymentStatus::Failed => "failed_at",
            PaymentStatus::Cancelled => "cancelled_at",
            PaymentStatus::Pending => {
                // Invariant I3: no edge ever targets Pending.
                return Ok(false);
            }
        };
        let query = format!(
            "UPDATE payments SET status = $1, updated_at = $2, {timestamp_column} = $2 \
             WHERE id = $3 AND status = 'PENDING'"
        );
        let result = sqlx::query(&query)
            .bind(to_status)
            .bind(at)
            .bind(id)
            .execute(&mut **tx)
            .await
            .map_err(StoreError::Database)?;
        Ok(result.rows_affected() == 1)
    }
}

#[async_trait]
impl OutboxStore for PostgresStore {
    type Tx = sqlx::Transaction<'static, Postgres>;

    #[tracing::instrument(skip(self, tx, payload))]
    async fn append(
        &self,
        tx: &mut Self::Tx,
        aggregate_id: Uuid,
        aggregate_type: &str,
        event_type: EventType,
        payload: serde_json::Value,
    ) -> Result<OutboxRecord, StoreError> {
        sqlx::query_as::<_, OutboxRecord>(
            r#"
            INSERT INTO outbox (
                id, aggregate_id, aggregate_type, event_type, payload,
                published, retry_count, created_at
            )
            VALUES ($1, $2, $3, $4, $5, false, 0, now())
            RETURNING *
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(aggregate_id)
        .bind(aggregate_type)
        .bind(event_type)
        .bind(payload)
        .fetch_one(&mut **tx)
        .await
        .map_err(StoreError::Database)
    }

    #[tracing::instrument(skip(self))]
    async fn fetch_unpublished(
        &self,
        limit: u32,
        max_retries: u32,
    ) -> Result<Vec<OutboxRecord>, StoreError> {
        sqlx::query_as::<_, OutboxRecord>(
            r#"
            SELECT * FROM outbox
            WHERE published = false AND retry_count < $1
            ORDER BY created_at ASC, id ASC
            LIMIT $2
            "#,
        )
        .bind(max_retries as i32)
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await
        .map_err(StoreError::Database)
    }

    #[tracing::instrument(skip(self))]
    async fn mark_published(&self, id: Uuid) -> Result<(), StoreError> {
        sqlx::query("UPDATE outbox SET published = true, published_at = now() WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(StoreError::Database)?;
        Ok(())
    }

    #[tracing::instrument(skip(self, error_message))]
    async fn increment_retry(&self, id: Uuid, error_message: &str) -> Result<(), StoreError> {
        sqlx::query(
            "UPDATE outbox SET retry_count = retry_count + 1, last_error = $1 WHERE id = $2",
        )
        .bind(truncate_error(error_message))
        .bind(id)
        .execute(&self.pool)
        .await
        .map_err(StoreError::Database)?;
        Ok(())
    }

    #[tracing::instrument(skip(self))]
    async fn delete_published_older_than(&self, days: i64) -> Result<u64, StoreError> {
        let result = sqlx::query(
            "DELETE FROM outbox WHERE published = true AND published_at < now() - ($1 || ' days')::interval",
        )
        .bind(days.to_string())
        .execute(&self.pool)
        .await
        .map_err(StoreError::Database)?;
        Ok(result.rows_affected())
    }

    #[tracing::instrument(skip(self))]
    async fn fetch_exhausted(&self, max_retries: u32) -> Result<Vec<OutboxRecord>, StoreError> {
        sqlx::query_as::<_, OutboxRecord>(
            "SELECT * FROM outbox WHERE published = false AND retry_count >= $1",
        )
        .bind(max_retries as i32)
        .fetch_all(&self.pool)
        .await
        .map_err(StoreError::Database)
    }
}

/// Extracts a single scalar row, used by health checks elsewhere in the
/// service (kept alongside the store since it shares the pool).
#[tracing::instrument(skip(pool))]
pub async fn ping(pool: &PgPool) -> Result<(), sqlx::Error> {
    let row = sqlx::query("SELECT 1 AS one").fetch_one(pool).await?;
    let _: i32 = row.try_get("one")?;
    Ok(())
}
