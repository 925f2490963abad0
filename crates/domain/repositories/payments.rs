use anyhow::Result;
use async_trait::async_trait;
use mockall::automock;
use uuid::Uuid;

use crate::domain::entities::{
    payments::{InsertPaymentEntity, PaymentEntity},
    subscriptions::SubscriptionEntity,
};

#[automock]
#[async_trait]
pub trait PaymentRepository {
    async fn create_pending_payment(&self, payment: InsertPaymentEntity) -> Result<PaymentEntity>;

    /// Stores the gateway-assigned id and payload snapshot on a payment that is still pending.
    async fn attach_gateway_payment(
        &self,
        payment_id: Uuid,
        external_id: String,
        payload: serde_json::Value,
    ) -> Result<()>;

    async fn find_by_id(&self, payment_id: Uuid) -> Result<Option<PaymentEntity>>;

    async fn find_subscription_for_payment(
        &self,
        payment_id: Uuid,
    ) -> Result<Option<SubscriptionEntity>>;

    /// Oldest pending payments that already have an external id, skipping rows currently
    /// locked by another reconciliation.
    async fn list_pending_for_sweep(&self, limit: i64) -> Result<Vec<PaymentEntity>>;
}
