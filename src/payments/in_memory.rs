use crate::error::{AppError, AppErrorKind, AppResult};
use crate::payments::store::{FailureStatus, OrderStore, PaymentStore};
use crate::payments::types::{
    NewPaymentAttempt, Order, OrderStatus, PaymentAttempt, PaymentStatus,
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

#[derive(Default)]
struct State {
    next_id: i64,
    payments: HashMap<i64, PaymentAttempt>,
    by_checkout: HashMap<String, i64>,
    orders: HashMap<i64, Order>,
}

/// A thread-safe in-memory store for payment attempts and orders.
///
/// Both live behind one lock so completing a payment and advancing its order
/// happen atomically, mirroring the single database transaction of the
/// Postgres store. Used by tests and for running without a database.
#[derive(Default, Clone)]
pub struct InMemoryPaymentStore {
    state: Arc<RwLock<State>>,
}

impl InMemoryPaymentStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed an order (orders are created by the ordering surface, not by payments)
    pub async fn insert_order(&self, order: Order) {
        let mut state = self.state.write().await;
        state.orders.insert(order.id, order);
    }

    pub async fn payment_count(&self) -> usize {
        self.state.read().await.payments.len()
    }
}

#[async_trait]
impl PaymentStore for InMemoryPaymentStore {
    async fn insert_pending(&self, attempt: NewPaymentAttempt) -> AppResult<PaymentAttempt> {
        let mut state = self.state.write().await;
        if state.by_checkout.contains_key(&attempt.checkout_request_id) {
            return Err(AppError::new(AppErrorKind::Database {
                message: format!(
                    "A payment with checkout_request_id '{}' already exists",
                    attempt.checkout_request_id
                ),
                is_retryable: false,
            }));
        }

        state.next_id += 1;
        let payment = PaymentAttempt {
            id: state.next_id,
            user_id: attempt.user_id,
            order_id: attempt.order_id,
            checkout_request_id: attempt.checkout_request_id,
            merchant_request_id: attempt.merchant_request_id,
            amount: attempt.amount,
            phone_number: attempt.phone_number,
            status: PaymentStatus::Pending,
            mpesa_receipt_number: None,
            failure_reason: None,
            created_at: Utc::now(),
            completed_at: None,
        };
        state
            .by_checkout
            .insert(payment.checkout_request_id.clone(), payment.id);
        state.payments.insert(payment.id, payment.clone());
        Ok(payment)
    }

    async fn find_by_checkout_request_id(
        &self,
        checkout_request_id: &str,
    ) -> AppResult<Option<PaymentAttempt>> {
        let state = self.state.read().await;
        Ok(state
            .by_checkout
            .get(checkout_request_id)
            .and_then(|id| state.payments.get(id))
            .cloned())
    }

    async fn find_by_id(&self, id: i64) -> AppResult<Option<PaymentAttempt>> {
        Ok(self.state.read().await.payments.get(&id).cloned())
    }

    async fn list_by_user(
        &self,
        user_id: i64,
        limit: i64,
        offset: i64,
    ) -> AppResult<Vec<PaymentAttempt>> {
        let state = self.state.read().await;
        let mut payments: Vec<PaymentAttempt> = state
            .payments
            .values()
            .filter(|p| p.user_id == user_id)
            .cloned()
            .collect();
        payments.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));
        Ok(payments
            .into_iter()
            .skip(offset.max(0) as usize)
            .take(limit.max(0) as usize)
            .collect())
    }

    async fn count_by_user(&self, user_id: i64) -> AppResult<i64> {
        let state = self.state.read().await;
        Ok(state.payments.values().filter(|p| p.user_id == user_id).count() as i64)
    }

    async fn mark_completed(
        &self,
        checkout_request_id: &str,
        receipt_number: Option<&str>,
        completed_at: DateTime<Utc>,
    ) -> AppResult<Option<PaymentAttempt>> {
        let mut state = self.state.write().await;
        let Some(id) = state.by_checkout.get(checkout_request_id).copied() else {
            return Ok(None);
        };

        let updated = match state.payments.get_mut(&id) {
            Some(payment) if payment.status == PaymentStatus::Pending => {
                payment.status = PaymentStatus::Completed;
                payment.mpesa_receipt_number = receipt_number.map(str::to_string);
                payment.completed_at = Some(completed_at);
                payment.clone()
            }
            _ => return Ok(None),
        };

        if let Some(order) = updated
            .order_id
            .and_then(|order_id| state.orders.get_mut(&order_id))
        {
            if order.status == OrderStatus::Pending {
                order.status = OrderStatus::Processing;
            }
        }

        Ok(Some(updated))
    }

    async fn mark_unsuccessful(
        &self,
        checkout_request_id: &str,
        status: FailureStatus,
        reason: &str,
    ) -> AppResult<Option<PaymentAttempt>> {
        let mut state = self.state.write().await;
        let Some(id) = state.by_checkout.get(checkout_request_id).copied() else {
            return Ok(None);
        };

        match state.payments.get_mut(&id) {
            Some(payment) if payment.status == PaymentStatus::Pending => {
                payment.status = status.status();
                payment.failure_reason = Some(reason.to_string());
                Ok(Some(payment.clone()))
            }
            _ => Ok(None),
        }
    }
}

#[async_trait]
impl OrderStore for InMemoryPaymentStore {
    async fn find_by_id(&self, order_id: i64) -> AppResult<Option<Order>> {
        Ok(self.state.read().await.orders.get(&order_id).cloned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn new_attempt(checkout: &str, order_id: Option<i64>) -> NewPaymentAttempt {
        NewPaymentAttempt {
            user_id: 7,
            order_id,
            checkout_request_id: checkout.to_string(),
            merchant_request_id: format!("m-{}", checkout),
            amount: dec!(100),
            phone_number: "254712345678".to_string(),
        }
    }

    #[tokio::test]
    async fn test_insert_and_lookup() {
        let store = InMemoryPaymentStore::new();
        let payment = store.insert_pending(new_attempt("ws_CO_1", None)).await.unwrap();

        assert_eq!(payment.status, PaymentStatus::Pending);
        let found = store.find_by_checkout_request_id("ws_CO_1").await.unwrap();
        assert_eq!(found, Some(payment.clone()));
        assert_eq!(PaymentStore::find_by_id(&store, payment.id).await.unwrap(), Some(payment));
    }

    #[tokio::test]
    async fn test_duplicate_checkout_id_rejected() {
        let store = InMemoryPaymentStore::new();
        store.insert_pending(new_attempt("ws_CO_1", None)).await.unwrap();
        assert!(store.insert_pending(new_attempt("ws_CO_1", None)).await.is_err());
        assert_eq!(store.payment_count().await, 1);
    }

    #[tokio::test]
    async fn test_completion_advances_order_once() {
        let store = InMemoryPaymentStore::new();
        store
            .insert_order(Order {
                id: 3,
                user_id: 7,
                total_amount: dec!(100),
                status: OrderStatus::Pending,
            })
            .await;
        store.insert_pending(new_attempt("ws_CO_1", Some(3))).await.unwrap();

        let completed = store
            .mark_completed("ws_CO_1", Some("ABC123XYZ"), Utc::now())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(completed.status, PaymentStatus::Completed);
        assert!(completed.completed_at.is_some());

        let order = OrderStore::find_by_id(&store, 3).await.unwrap().unwrap();
        assert_eq!(order.status, OrderStatus::Processing);
    }

    #[tokio::test]
    async fn test_terminal_attempt_is_not_overwritten() {
        let store = InMemoryPaymentStore::new();
        store.insert_pending(new_attempt("ws_CO_1", None)).await.unwrap();
        store
            .mark_unsuccessful("ws_CO_1", FailureStatus::Cancelled, "Request cancelled by user")
            .await
            .unwrap()
            .unwrap();

        assert!(store
            .mark_completed("ws_CO_1", Some("LATE"), Utc::now())
            .await
            .unwrap()
            .is_none());
        assert!(store
            .mark_unsuccessful("ws_CO_1", FailureStatus::Failed, "late")
            .await
            .unwrap()
            .is_none());

        let stored = store.find_by_checkout_request_id("ws_CO_1").await.unwrap().unwrap();
        assert_eq!(stored.status, PaymentStatus::Cancelled);
        assert_eq!(stored.failure_reason.as_deref(), Some("Request cancelled by user"));
        assert_eq!(stored.mpesa_receipt_number, None);
    }

    #[tokio::test]
    async fn test_find_owned_order() {
        let store = InMemoryPaymentStore::new();
        store
            .insert_order(Order {
                id: 3,
                user_id: 7,
                total_amount: dec!(250),
                status: OrderStatus::Pending,
            })
            .await;

        assert!(store.find_owned(3, 7).await.unwrap().is_some());
        assert!(store.find_owned(3, 8).await.unwrap().is_none());
        assert!(store.find_owned(4, 7).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_list_by_user_paginates() {
        let store = InMemoryPaymentStore::new();
        for i in 0..5 {
            store
                .insert_pending(new_attempt(&format!("ws_CO_{}", i), None))
                .await
                .unwrap();
        }
        let mut other = new_attempt("ws_CO_other", None);
        other.user_id = 8;
        store.insert_pending(other).await.unwrap();

        assert_eq!(store.count_by_user(7).await.unwrap(), 5);
        let page = store.list_by_user(7, 2, 0).await.unwrap();
        assert_eq!(page.len(), 2);
        assert_eq!(page[0].checkout_request_id, "ws_CO_4");
        let last = store.list_by_user(7, 2, 4).await.unwrap();
        assert_eq!(last.len(), 1);
    }
}
