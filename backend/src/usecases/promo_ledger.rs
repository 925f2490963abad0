use std::sync::Arc;

use anyhow::anyhow;
use chrono::{DateTime, Utc};
use rust_decimal::{Decimal, RoundingStrategy};
use subpay_core::domain::{
    entities::promo_codes::PromoCodeEntity,
    repositories::{promo_codes::PromoCodeRepository, reconciliation::ReconciliationUnitOfWork},
    value_objects::{enums::discount_types::DiscountType, payment_payload::PromoApplication},
};
use tracing::{error, info, warn};
use uuid::Uuid;

use super::errors::{PromoError, ReconcileError, ReconcileResult};

/// Codes are stored upper-case; user input is trimmed and upper-cased before lookup.
pub fn normalize_code(raw: &str) -> String {
    raw.trim().to_uppercase()
}

fn money(value: Decimal) -> Decimal {
    value.round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero)
}

/// Returns `(discount_amount, final_price)` for `price`, both rounded to 2 dp, final price
/// never below zero.
pub fn quote(kind: DiscountType, value: Decimal, price: Decimal) -> (Decimal, Decimal) {
    let discounted = match kind {
        DiscountType::Percentage => price * (Decimal::ONE - value / Decimal::ONE_HUNDRED),
        DiscountType::Fixed => price - value,
    };
    let final_price = money(discounted.max(Decimal::ZERO));
    let original = money(price);
    (original - final_price, final_price)
}

/// Checks a promo row against `now` in the order the errors are reported.
pub fn check_redeemable(promo: &PromoCodeEntity, now: DateTime<Utc>) -> Result<(), PromoError> {
    if !promo.is_active {
        return Err(PromoError::Inactive);
    }
    if promo.valid_from.is_some_and(|from| from > now) {
        return Err(PromoError::NotYetValid);
    }
    if promo.valid_until.is_some_and(|until| until < now) {
        return Err(PromoError::Expired);
    }
    if promo.is_exhausted() {
        return Err(PromoError::Exhausted);
    }
    Ok(())
}

/// A stored discount kind outside `DiscountType` is bad data, not a reason to show the buyer.
fn discount_kind(promo: &PromoCodeEntity) -> ReconcileResult<DiscountType> {
    promo.kind().ok_or_else(|| {
        error!(
            promo_code_id = %promo.id,
            discount_type = %promo.discount_type,
            "promo_ledger: promo code has an unrecognised discount type"
        );
        ReconcileError::Internal(anyhow!(
            "promo code {} has unrecognised discount type {:?}",
            promo.id,
            promo.discount_type
        ))
    })
}

pub struct PromoLedger {
    promo_code_repository: Arc<dyn PromoCodeRepository + Send + Sync>,
}

impl PromoLedger {
    pub fn new(promo_code_repository: Arc<dyn PromoCodeRepository + Send + Sync>) -> Self {
        Self {
            promo_code_repository,
        }
    }

    /// Read-only validation used at checkout. Nothing is reserved: usage is only counted when
    /// the payment is finalized.
    pub async fn validate(
        &self,
        bot_id: Uuid,
        code: &str,
        reference_price: Decimal,
        now: DateTime<Utc>,
    ) -> ReconcileResult<PromoApplication> {
        let code = normalize_code(code);
        if code.is_empty() {
            return Err(PromoError::NotFound.into());
        }

        let promo = self
            .promo_code_repository
            .find_by_code(bot_id, &code)
            .await
            .map_err(|err| {
                error!(%bot_id, db_error = ?err, "promo_ledger: failed to load promo code");
                ReconcileError::Internal(err)
            })?
            .ok_or(PromoError::NotFound)?;

        check_redeemable(&promo, now).inspect_err(|reason| {
            info!(%bot_id, promo_code = %promo.code, %reason, "promo_ledger: promo code rejected");
        })?;
        let kind = discount_kind(&promo)?;

        let original_price = money(reference_price);
        let (discount_amount, final_price) = quote(kind, promo.discount_value, original_price);

        Ok(PromoApplication {
            promo_code: promo.code,
            promo_code_id: promo.id,
            discount_type: kind,
            discount_value: promo.discount_value,
            original_price,
            discount_amount,
            final_price,
            applied: None,
        })
    }
}

/// Counts one use of the promo recorded on a payment that is being finalized.
///
/// Runs inside the finalizing transaction under the promo row lock. When the cap was reached
/// between checkout and finalization the payment still completes but the counter is left
/// alone and `applied` is recorded as `false`.
pub fn apply(
    uow: &mut dyn ReconciliationUnitOfWork,
    application: &mut PromoApplication,
) -> ReconcileResult<bool> {
    if application.applied == Some(true) {
        return Ok(true);
    }

    let promo_code_id = application.promo_code_id;
    let Some(promo) = uow.lock_promo_code(promo_code_id)? else {
        warn!(%promo_code_id, "promo_ledger: promo code vanished before finalization");
        application.applied = Some(false);
        return Ok(false);
    };

    if promo.is_exhausted() {
        warn!(
            %promo_code_id,
            used_count = promo.used_count,
            max_uses = ?promo.max_uses,
            "promo_ledger: usage cap reached at finalization; usage not counted"
        );
        application.applied = Some(false);
        return Ok(false);
    }

    let used_count = uow.increment_promo_usage(promo_code_id)?;
    info!(%promo_code_id, used_count, "promo_ledger: promo usage counted");
    application.applied = Some(true);
    Ok(true)
}
