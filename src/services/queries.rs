//! Read model: a single payment with its order, and a user's payment history

use crate::error::{AppError, AppResult};
use crate::payments::store::{OrderStore, PaymentStore};
use crate::payments::types::{OrderStatus, PaymentAttempt};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

pub const DEFAULT_PAGE_SIZE: i64 = 20;
pub const MAX_PAGE_SIZE: i64 = 100;

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderSummary {
    pub id: i64,
    #[serde(with = "rust_decimal::serde::float")]
    pub total_amount: Decimal,
    pub status: OrderStatus,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentView {
    #[serde(flatten)]
    pub payment: PaymentAttempt,
    pub order: Option<OrderSummary>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct HistoryQuery {
    pub page: Option<i64>,
    pub limit: Option<i64>,
}

impl HistoryQuery {
    /// (page, limit) with page >= 1 and limit clamped to 1..=MAX_PAGE_SIZE
    pub fn normalized(&self) -> (i64, i64) {
        let page = self.page.unwrap_or(1).max(1);
        let limit = self
            .limit
            .unwrap_or(DEFAULT_PAGE_SIZE)
            .clamp(1, MAX_PAGE_SIZE);
        (page, limit)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentHistory {
    pub payments: Vec<PaymentAttempt>,
    pub total: i64,
    pub page: i64,
    pub total_pages: i64,
}

pub struct PaymentQueries {
    payments: Arc<dyn PaymentStore>,
    orders: Arc<dyn OrderStore>,
}

impl PaymentQueries {
    pub fn new(payments: Arc<dyn PaymentStore>, orders: Arc<dyn OrderStore>) -> Self {
        Self { payments, orders }
    }

    pub async fn payment(&self, user_id: i64, payment_id: i64) -> AppResult<PaymentView> {
        let payment = self
            .payments
            .find_by_id(payment_id)
            .await?
            .ok_or_else(|| AppError::not_found("Payment", payment_id))?;

        if payment.user_id != user_id {
            return Err(AppError::forbidden("Payment does not belong to you"));
        }

        let order = match payment.order_id {
            Some(order_id) => self
                .orders
                .find_by_id(order_id)
                .await?
                .map(|order| OrderSummary {
                    id: order.id,
                    total_amount: order.total_amount,
                    status: order.status,
                }),
            None => None,
        };

        Ok(PaymentView { payment, order })
    }

    pub async fn history(&self, user_id: i64, query: &HistoryQuery) -> AppResult<PaymentHistory> {
        let (page, limit) = query.normalized();
        let offset = (page - 1).saturating_mul(limit);

        let payments = self.payments.list_by_user(user_id, limit, offset).await?;
        let total = self.payments.count_by_user(user_id).await?;
        let total_pages = (total + limit - 1) / limit;

        Ok(PaymentHistory {
            payments,
            total,
            page,
            total_pages,
        })
    }
}
