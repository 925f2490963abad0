/// How a payment row lock is acquired.
///
/// `Wait` blocks until a competing transaction releases the row (webhook and manual confirm).
/// `SkipLocked` gives up immediately so a sweep never stalls on a contested payment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RowLockMode {
    Wait,
    SkipLocked,
}
