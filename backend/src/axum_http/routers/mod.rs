pub mod bot_payments;
pub mod yookassa_webhook;
