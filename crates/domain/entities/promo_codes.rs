use chrono::{DateTime, Utc};
use diesel::prelude::*;
use rust_decimal::Decimal;
use uuid::Uuid;

use crate::{
    domain::value_objects::enums::discount_types::DiscountType,
    infra::db::postgres::schema::promo_codes,
};

#[derive(Debug, Clone, PartialEq, Identifiable, Selectable, Queryable)]
#[diesel(table_name = promo_codes)]
pub struct PromoCodeEntity {
    pub id: Uuid,
    pub bot_id: Uuid,
    pub code: String,
    pub discount_type: String,
    pub discount_value: Decimal,
    pub max_uses: Option<i32>,
    pub used_count: i32,
    pub is_active: bool,
    pub valid_from: Option<DateTime<Utc>>,
    pub valid_until: Option<DateTime<Utc>>,
    pub description: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl PromoCodeEntity {
    pub fn kind(&self) -> Option<DiscountType> {
        DiscountType::from_str(&self.discount_type)
    }

    pub fn is_exhausted(&self) -> bool {
        self.max_uses
            .is_some_and(|max_uses| self.used_count >= max_uses)
    }
}
