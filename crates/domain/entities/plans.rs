use diesel::prelude::*;
use rust_decimal::Decimal;
use uuid::Uuid;

use crate::infra::db::postgres::schema::subscription_plans;

#[derive(Debug, Clone, PartialEq, Identifiable, Selectable, Queryable)]
#[diesel(table_name = subscription_plans)]
pub struct PlanEntity {
    pub id: Uuid,
    pub bot_id: Uuid,
    pub name: String,
    pub price_amount: Decimal,
    pub price_currency: String,
    pub duration_days: i32,
    pub is_active: bool,
}
