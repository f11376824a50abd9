use crate::database::error::{DatabaseError, DbResult};
use crate::database::transaction::DatabaseTransaction;
use crate::error::AppResult;
use crate::payments::store::{FailureStatus, PaymentStore};
use crate::payments::types::{NewPaymentAttempt, PaymentAttempt, PaymentStatus};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sqlx::{FromRow, PgPool};
use tracing::{debug, info};

const PAYMENT_COLUMNS: &str = "id, user_id, order_id, checkout_request_id, merchant_request_id, \
     amount, phone_number, status, mpesa_receipt_number, failure_reason, created_at, completed_at";

/// Row shape of the `payments` table
#[derive(Debug, Clone, FromRow)]
pub struct PaymentRow {
    pub id: i64,
    pub user_id: i64,
    pub order_id: Option<i64>,
    pub checkout_request_id: String,
    pub merchant_request_id: String,
    pub amount: Decimal,
    pub phone_number: String,
    pub status: String,
    pub mpesa_receipt_number: Option<String>,
    pub failure_reason: Option<String>,
    pub created_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl TryFrom<PaymentRow> for PaymentAttempt {
    type Error = DatabaseError;

    fn try_from(row: PaymentRow) -> Result<Self, Self::Error> {
        let status: PaymentStatus = row.status.parse().map_err(DatabaseError::invalid_data)?;
        Ok(PaymentAttempt {
            id: row.id,
            user_id: row.user_id,
            order_id: row.order_id,
            checkout_request_id: row.checkout_request_id,
            merchant_request_id: row.merchant_request_id,
            amount: row.amount,
            phone_number: row.phone_number,
            status,
            mpesa_receipt_number: row.mpesa_receipt_number,
            failure_reason: row.failure_reason,
            created_at: row.created_at,
            completed_at: row.completed_at,
        })
    }
}

fn into_attempt(row: Option<PaymentRow>) -> DbResult<Option<PaymentAttempt>> {
    row.map(PaymentAttempt::try_from).transpose()
}

/// Postgres-backed payment record store
#[derive(Clone)]
pub struct PaymentRepository {
    pool: PgPool,
}

impl PaymentRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl PaymentStore for PaymentRepository {
    async fn insert_pending(&self, attempt: NewPaymentAttempt) -> AppResult<PaymentAttempt> {
        let row = sqlx::query_as::<_, PaymentRow>(&format!(
            "INSERT INTO payments
             (user_id, order_id, checkout_request_id, merchant_request_id, amount, phone_number, status, created_at)
             VALUES ($1, $2, $3, $4, $5, $6, $7, NOW())
             RETURNING {}",
            PAYMENT_COLUMNS
        ))
        .bind(attempt.user_id)
        .bind(attempt.order_id)
        .bind(&attempt.checkout_request_id)
        .bind(&attempt.merchant_request_id)
        .bind(attempt.amount)
        .bind(&attempt.phone_number)
        .bind(PaymentStatus::Pending.as_str())
        .fetch_one(&self.pool)
        .await
        .map_err(|e| DatabaseError::from_sqlx(e).with_context("insert_pending"))?;

        Ok(PaymentAttempt::try_from(row)?)
    }

    async fn find_by_checkout_request_id(
        &self,
        checkout_request_id: &str,
    ) -> AppResult<Option<PaymentAttempt>> {
        let row = sqlx::query_as::<_, PaymentRow>(&format!(
            "SELECT {} FROM payments WHERE checkout_request_id = $1",
            PAYMENT_COLUMNS
        ))
        .bind(checkout_request_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(DatabaseError::from_sqlx)?;

        Ok(into_attempt(row)?)
    }

    async fn find_by_id(&self, id: i64) -> AppResult<Option<PaymentAttempt>> {
        let row = sqlx::query_as::<_, PaymentRow>(&format!(
            "SELECT {} FROM payments WHERE id = $1",
            PAYMENT_COLUMNS
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(DatabaseError::from_sqlx)?;

        Ok(into_attempt(row)?)
    }

    async fn list_by_user(
        &self,
        user_id: i64,
        limit: i64,
        offset: i64,
    ) -> AppResult<Vec<PaymentAttempt>> {
        let rows = sqlx::query_as::<_, PaymentRow>(&format!(
            "SELECT {} FROM payments WHERE user_id = $1
             ORDER BY created_at DESC, id DESC LIMIT $2 OFFSET $3",
            PAYMENT_COLUMNS
        ))
        .bind(user_id)
        .bind(limit)
        .bind(offset)
        .fetch_all(&self.pool)
        .await
        .map_err(DatabaseError::from_sqlx)?;

        let payments = rows
            .into_iter()
            .map(PaymentAttempt::try_from)
            .collect::<DbResult<Vec<_>>>()?;
        Ok(payments)
    }

    async fn count_by_user(&self, user_id: i64) -> AppResult<i64> {
        let count = sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM payments WHERE user_id = $1")
            .bind(user_id)
            .fetch_one(&self.pool)
            .await
            .map_err(DatabaseError::from_sqlx)?;

        Ok(count)
    }

    async fn mark_completed(
        &self,
        checkout_request_id: &str,
        receipt_number: Option<&str>,
        completed_at: DateTime<Utc>,
    ) -> AppResult<Option<PaymentAttempt>> {
        let mut tx = DatabaseTransaction::begin(&self.pool).await?;

        let row = sqlx::query_as::<_, PaymentRow>(&format!(
            "UPDATE payments
             SET status = $2, mpesa_receipt_number = $3, completed_at = $4
             WHERE checkout_request_id = $1 AND status = $5
             RETURNING {}",
            PAYMENT_COLUMNS
        ))
        .bind(checkout_request_id)
        .bind(PaymentStatus::Completed.as_str())
        .bind(receipt_number)
        .bind(completed_at)
        .bind(PaymentStatus::Pending.as_str())
        .fetch_optional(tx.conn()?)
        .await
        .map_err(DatabaseError::from_sqlx)?;

        let Some(row) = row else {
            debug!(
                "Payment {} not pending, completion skipped",
                checkout_request_id
            );
            tx.rollback().await?;
            return Ok(None);
        };

        if let Some(order_id) = row.order_id {
            let advanced = sqlx::query(
                "UPDATE orders SET status = 'PROCESSING', updated_at = NOW()
                 WHERE id = $1 AND status = 'PENDING'",
            )
            .bind(order_id)
            .execute(tx.conn()?)
            .await
            .map_err(DatabaseError::from_sqlx)?;

            if advanced.rows_affected() > 0 {
                info!("Order {} moved to PROCESSING after payment", order_id);
            }
        }

        tx.commit().await?;
        Ok(Some(PaymentAttempt::try_from(row)?))
    }

    async fn mark_unsuccessful(
        &self,
        checkout_request_id: &str,
        status: FailureStatus,
        reason: &str,
    ) -> AppResult<Option<PaymentAttempt>> {
        let row = sqlx::query_as::<_, PaymentRow>(&format!(
            "UPDATE payments
             SET status = $2, failure_reason = $3
             WHERE checkout_request_id = $1 AND status = $4
             RETURNING {}",
            PAYMENT_COLUMNS
        ))
        .bind(checkout_request_id)
        .bind(status.status().as_str())
        .bind(reason)
        .bind(PaymentStatus::Pending.as_str())
        .fetch_optional(&self.pool)
        .await
        .map_err(DatabaseError::from_sqlx)?;

        Ok(into_attempt(row)?)
    }

    async fn ping(&self) -> AppResult<()> {
        crate::database::health_check(&self.pool).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn row(status: &str) -> PaymentRow {
        PaymentRow {
            id: 1,
            user_id: 7,
            order_id: None,
            checkout_request_id: "ws_CO_1".to_string(),
            merchant_request_id: "m-1".to_string(),
            amount: dec!(100),
            phone_number: "254712345678".to_string(),
            status: status.to_string(),
            mpesa_receipt_number: None,
            failure_reason: None,
            created_at: Utc::now(),
            completed_at: None,
        }
    }

    #[test]
    fn test_row_conversion() {
        let attempt = PaymentAttempt::try_from(row("PENDING")).unwrap();
        assert_eq!(attempt.status, PaymentStatus::Pending);
        assert_eq!(attempt.amount, dec!(100));
    }

    #[test]
    fn test_unknown_status_is_invalid_data() {
        assert!(PaymentAttempt::try_from(row("PAID")).is_err());
    }

    #[tokio::test]
    #[ignore] // Requires database running
    async fn test_conditional_completion() {
        let url = std::env::var("DATABASE_URL").expect("DATABASE_URL must be set");
        let pool = crate::database::init_pool(&url, None).await.unwrap();
        let repo = PaymentRepository::new(pool);

        let checkout = format!("ws_CO_test_{}", uuid::Uuid::new_v4());
        repo.insert_pending(NewPaymentAttempt {
            user_id: 1,
            order_id: None,
            checkout_request_id: checkout.clone(),
            merchant_request_id: "m-test".to_string(),
            amount: dec!(100),
            phone_number: "254712345678".to_string(),
        })
        .await
        .unwrap();

        let first = repo.mark_completed(&checkout, Some("ABC123XYZ"), Utc::now()).await.unwrap();
        assert!(first.is_some());
        let second = repo.mark_completed(&checkout, Some("OTHER"), Utc::now()).await.unwrap();
        assert!(second.is_none());

        let stored = repo.find_by_checkout_request_id(&checkout).await.unwrap().unwrap();
        assert_eq!(stored.mpesa_receipt_number.as_deref(), Some("ABC123XYZ"));
    }

    #[tokio::test]
    #[ignore] // Requires database running
    async fn test_ping_reaches_database() {
        let url = std::env::var("DATABASE_URL").expect("DATABASE_URL must be set");
        let pool = crate::database::init_pool(&url, None).await.unwrap();
        let repo = PaymentRepository::new(pool.clone());

        repo.ping().await.unwrap();

        pool.close().await;
        let err = repo.ping().await.unwrap_err();
        assert!(matches!(
            err.kind,
            crate::error::AppErrorKind::Database {
                is_retryable: true,
                ..
            }
        ));
    }
}
