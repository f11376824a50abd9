use crate::database::error::DatabaseError;
use crate::error::AppResult;
use crate::payments::store::OrderStore;
use crate::payments::types::{Order, OrderStatus};
use async_trait::async_trait;
use rust_decimal::Decimal;
use sqlx::{FromRow, PgPool};

#[derive(Debug, Clone, FromRow)]
pub struct OrderRow {
    pub id: i64,
    pub user_id: i64,
    pub total_amount: Decimal,
    pub status: String,
}

impl TryFrom<OrderRow> for Order {
    type Error = DatabaseError;

    fn try_from(row: OrderRow) -> Result<Self, Self::Error> {
        let status: OrderStatus = row.status.parse().map_err(DatabaseError::invalid_data)?;
        Ok(Order {
            id: row.id,
            user_id: row.user_id,
            total_amount: row.total_amount,
            status,
        })
    }
}

/// Read access to orders owned by the ordering surface
#[derive(Clone)]
pub struct OrderRepository {
    pool: PgPool,
}

impl OrderRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl OrderStore for OrderRepository {
    async fn find_by_id(&self, order_id: i64) -> AppResult<Option<Order>> {
        let row = sqlx::query_as::<_, OrderRow>(
            "SELECT id, user_id, total_amount, status FROM orders WHERE id = $1",
        )
        .bind(order_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(DatabaseError::from_sqlx)?;

        Ok(row.map(Order::try_from).transpose()?)
    }

    async fn find_owned(&self, order_id: i64, user_id: i64) -> AppResult<Option<Order>> {
        let row = sqlx::query_as::<_, OrderRow>(
            "SELECT id, user_id, total_amount, status FROM orders WHERE id = $1 AND user_id = $2",
        )
        .bind(order_id)
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(DatabaseError::from_sqlx)?;

        Ok(row.map(Order::try_from).transpose()?)
    }
}
