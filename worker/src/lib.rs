pub mod axum_http;
pub mod config;
pub mod payment_polling;
pub mod subscription_lifecycle;
pub mod usecases;
