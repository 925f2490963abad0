use async_trait::async_trait;
use mockall::automock;

use crate::domain::value_objects::{
    enums::payment_providers::PaymentProvider,
    payment_gateway::{
        CreateGatewayPayment, CreatedGatewayPayment, GatewayCredentials, GatewayError,
        RemotePayment,
    },
};

#[automock]
#[async_trait]
pub trait PaymentGateway {
    fn provider(&self) -> PaymentProvider;

    async fn create_payment(
        &self,
        credentials: &GatewayCredentials,
        request: CreateGatewayPayment,
    ) -> Result<CreatedGatewayPayment, GatewayError>;

    async fn get_payment(
        &self,
        credentials: &GatewayCredentials,
        external_id: &str,
    ) -> Result<RemotePayment, GatewayError>;
}
