//! Transaction collaborator and the scoped run-in-transaction helper.

use crate::error::ApiError;

/// A store that can group mutations into one atomic unit. Nested `begin` calls nest.
pub trait Transactional: Send + Sync {
    fn begin(&self) -> Result<(), ApiError>;
    fn commit(&self) -> Result<(), ApiError>;
    fn rollback(&self) -> Result<(), ApiError>;
}

/// For endpoints without persistence: every call succeeds and nothing is undone.
#[derive(Clone, Copy, Debug, Default)]
pub struct NoTransaction;

impl Transactional for NoTransaction {
    fn begin(&self) -> Result<(), ApiError> {
        Ok(())
    }

    fn commit(&self) -> Result<(), ApiError> {
        Ok(())
    }

    fn rollback(&self) -> Result<(), ApiError> {
        Ok(())
    }
}

/// Rolls back on drop unless committed, so early returns and panics undo the unit.
struct TransactionGuard<'a> {
    tx: &'a dyn Transactional,
    open: bool,
}

impl TransactionGuard<'_> {
    fn commit(mut self) -> Result<(), ApiError> {
        self.open = false;
        self.tx.commit()
    }
}

impl Drop for TransactionGuard<'_> {
    fn drop(&mut self) {
        if self.open {
            if let Err(e) = self.tx.rollback() {
                tracing::error!(error = %e, "rollback failed");
            }
        }
    }
}

/// Run `f` in a transaction: commit iff it returns `Ok`, otherwise roll back and return the error.
pub fn run_in_transaction<T>(
    tx: &dyn Transactional,
    f: impl FnOnce() -> Result<T, ApiError>,
) -> Result<T, ApiError> {
    tx.begin()?;
    let guard = TransactionGuard { tx, open: true };
    let value = f()?;
    guard.commit()?;
    Ok(value)
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::StatusCode;
    use std::sync::Mutex;

    #[derive(Default)]
    struct Journal(Mutex<Vec<&'static str>>);

    impl Journal {
        fn entries(&self) -> Vec<&'static str> {
            self.0.lock().unwrap().clone()
        }
    }

    impl Transactional for Journal {
        fn begin(&self) -> Result<(), ApiError> {
            self.0.lock().unwrap().push("begin");
            Ok(())
        }
        fn commit(&self) -> Result<(), ApiError> {
            self.0.lock().unwrap().push("commit");
            Ok(())
        }
        fn rollback(&self) -> Result<(), ApiError> {
            self.0.lock().unwrap().push("rollback");
            Ok(())
        }
    }

    #[test]
    fn commits_on_ok() {
        let journal = Journal::default();
        let value = run_in_transaction(&journal, || Ok(7)).unwrap();
        assert_eq!(value, 7);
        assert_eq!(journal.entries(), vec!["begin", "commit"]);
    }

    #[test]
    fn rolls_back_on_err() {
        let journal = Journal::default();
        let err = run_in_transaction::<()>(&journal, || {
            Err(ApiError::http(StatusCode::BAD_REQUEST, "nope"))
        })
        .unwrap_err();
        assert_eq!(err.status_code(), StatusCode::BAD_REQUEST);
        assert_eq!(journal.entries(), vec!["begin", "rollback"]);
    }
}
