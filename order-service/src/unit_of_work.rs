use std::sync::Arc;
use std::time::Duration;

use clap::ValueEnum;
use futures::future::BoxFuture;
use tokio::time::{timeout_at, Instant};
use tracing::{debug, error};
use uuid::Uuid;

use crate::error::{EngineError, EngineResult};
use crate::repository::{Repositories, Storage};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, ValueEnum)]
pub enum IsolationLevel {
    /// Enough for the conditional stock updates; Postgres row locks order
    /// conflicting writers.
    #[default]
    ReadCommitted,
    RepeatableRead,
    Serializable,
}

impl IsolationLevel {
    pub fn as_sql(&self) -> &'static str {
        match self {
            IsolationLevel::ReadCommitted => "READ COMMITTED",
            IsolationLevel::RepeatableRead => "REPEATABLE READ",
            IsolationLevel::Serializable => "SERIALIZABLE",
        }
    }
}

/// Runs a sequence of repository calls as one transaction: committed when the
/// whole sequence succeeds, rolled back otherwise.
#[derive(Clone)]
pub struct UnitOfWork {
    storage: Arc<dyn Storage>,
    isolation: IsolationLevel,
    deadline: Option<Duration>,
}

impl UnitOfWork {
    pub fn new(storage: Arc<dyn Storage>) -> Self {
        Self {
            storage,
            isolation: IsolationLevel::default(),
            deadline: None,
        }
    }

    pub fn with_isolation(mut self, isolation: IsolationLevel) -> Self {
        self.isolation = isolation;
        self
    }

    pub fn with_deadline(mut self, deadline: Duration) -> Self {
        self.deadline = Some(deadline);
        self
    }

    pub fn isolation(&self) -> IsolationLevel {
        self.isolation
    }

    pub fn deadline(&self) -> Option<Duration> {
        self.deadline
    }

    /// Executes `work` inside a fresh transaction.
    ///
    /// If `work` fails, or the deadline expires first, the transaction is
    /// rolled back and the original error is returned. A failing rollback is
    /// reported as [`EngineError::TransactionAborted`] carrying both errors.
    /// The deadline runs from the call, so waiting to begin counts against it.
    /// A commit that has been issued is not interrupted. Units of work do not
    /// nest.
    pub async fn run<T, F>(&self, work: F) -> EngineResult<T>
    where
        T: Send,
        F: for<'t> FnOnce(&'t mut dyn Repositories) -> BoxFuture<'t, EngineResult<T>> + Send,
    {
        let unit = Uuid::new_v4();
        let expiry = self.deadline.map(|limit| (Instant::now() + limit, limit));

        let begin = self.storage.begin(self.isolation);
        let mut tx = match expiry {
            Some((at, limit)) => timeout_at(at, begin)
                .await
                .map_err(|_| EngineError::DeadlineExceeded(limit))?,
            None => begin.await,
        }
        .map_err(EngineError::WriteFailed)?;
        debug!(%unit, isolation = ?self.isolation, "unit of work started");

        let outcome = match expiry {
            Some((at, limit)) => timeout_at(at, work(tx.repositories()))
                .await
                .unwrap_or_else(|_| Err(EngineError::DeadlineExceeded(limit))),
            None => work(tx.repositories()).await,
        };
        let outcome = match (outcome, expiry) {
            (Ok(_), Some((at, limit))) if Instant::now() >= at => {
                Err(EngineError::DeadlineExceeded(limit))
            }
            (outcome, _) => outcome,
        };

        match outcome {
            Ok(value) => {
                tx.commit().await.map_err(EngineError::WriteFailed)?;
                debug!(%unit, "unit of work committed");
                Ok(value)
            }
            Err(cause) => match tx.rollback().await {
                Ok(()) => {
                    debug!(%unit, error = %cause, "unit of work rolled back");
                    Err(cause)
                }
                Err(rollback) => {
                    error!(%unit, error = %cause, rollback_error = %rollback, "rollback failed");
                    Err(EngineError::TransactionAborted {
                        cause: Box::new(cause),
                        rollback,
                    })
                }
            },
        }
    }
}
