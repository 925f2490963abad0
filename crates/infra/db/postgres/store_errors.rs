use diesel::result::{DatabaseErrorKind, Error as DieselError};

use crate::domain::value_objects::reconciliation::StoreError;

impl From<DieselError> for StoreError {
    fn from(err: DieselError) -> Self {
        match &err {
            DieselError::DatabaseError(DatabaseErrorKind::SerializationFailure, info)
            | DieselError::DatabaseError(DatabaseErrorKind::UniqueViolation, info) => {
                StoreError::Conflict(info.message().to_string())
            }
            DieselError::DatabaseError(_, info) if is_lock_conflict(info.message()) => {
                StoreError::Conflict(info.message().to_string())
            }
            _ => StoreError::Other(anyhow::Error::new(err)),
        }
    }
}

impl From<diesel::r2d2::PoolError> for StoreError {
    fn from(err: diesel::r2d2::PoolError) -> Self {
        StoreError::Other(anyhow::Error::new(err))
    }
}

// Postgres reports deadlocks (40P01) and lock_timeout (55P03) without a dedicated diesel kind.
fn is_lock_conflict(message: &str) -> bool {
    let message = message.to_ascii_lowercase();
    message.contains("deadlock detected") || message.contains("lock timeout")
}

#[cfg(test)]
mod tests {
    use super::*;
    use diesel::result::DatabaseErrorInformation;

    struct Info(&'static str);

    impl DatabaseErrorInformation for Info {
        fn message(&self) -> &str {
            self.0
        }
        fn details(&self) -> Option<&str> {
            None
        }
        fn hint(&self) -> Option<&str> {
            None
        }
        fn table_name(&self) -> Option<&str> {
            None
        }
        fn column_name(&self) -> Option<&str> {
            None
        }
        fn constraint_name(&self) -> Option<&str> {
            None
        }
        fn statement_position(&self) -> Option<i32> {
            None
        }
    }

    fn db_error(kind: DatabaseErrorKind, message: &'static str) -> DieselError {
        DieselError::DatabaseError(kind, Box::new(Info(message)))
    }

    #[test]
    fn lock_timeout_and_deadlock_are_conflicts() {
        let timeout = db_error(
            DatabaseErrorKind::Unknown,
            "canceling statement due to lock timeout",
        );
        let deadlock = db_error(DatabaseErrorKind::Unknown, "deadlock detected");

        assert!(matches!(StoreError::from(timeout), StoreError::Conflict(_)));
        assert!(matches!(StoreError::from(deadlock), StoreError::Conflict(_)));
    }

    #[test]
    fn serialization_and_unique_races_are_conflicts() {
        let serialization = db_error(
            DatabaseErrorKind::SerializationFailure,
            "could not serialize access",
        );
        let unique = db_error(
            DatabaseErrorKind::UniqueViolation,
            "duplicate key value violates unique constraint \"uq_subscriptions_payment_id\"",
        );

        assert!(matches!(StoreError::from(serialization), StoreError::Conflict(_)));
        assert!(matches!(StoreError::from(unique), StoreError::Conflict(_)));
    }

    #[test]
    fn other_errors_are_not_retryable() {
        assert!(matches!(
            StoreError::from(DieselError::NotFound),
            StoreError::Other(_)
        ));
        let check = db_error(DatabaseErrorKind::CheckViolation, "violates check constraint");
        assert!(matches!(StoreError::from(check), StoreError::Other(_)));
    }
}
