pub mod checkout;
pub mod errors;
pub mod payment_state_machine;
pub mod promo_ledger;
pub mod reconciler;
pub mod subscription_activator;

#[cfg(test)]
pub mod test_support;
