use std::fmt;
use std::time::Duration;

use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Entity {
    User,
    Item,
    Order,
}

impl fmt::Display for Entity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Entity::User => f.write_str("user"),
            Entity::Item => f.write_str("item"),
            Entity::Order => f.write_str("order"),
        }
    }
}

/// Failure reported by a repository or by the storage behind it.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("{entity} {id} not found")]
    NotFound { entity: Entity, id: i64 },

    #[error("item {item_id} has {available} in stock, {requested} requested")]
    InsufficientStock {
        item_id: i64,
        requested: i64,
        available: i64,
    },

    #[error("order {order_id} is already cancelled")]
    AlreadyCancelled { order_id: i64 },

    #[error("constraint violated: {0}")]
    Constraint(String),

    #[error("database error: {0}")]
    Database(#[from] diesel::result::Error),

    #[error("connection pool error: {0}")]
    Pool(String),

    #[error("injected fault: {0}")]
    Fault(&'static str),
}

/// Outcome of a failed engine call, scoped to a single unit of work.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("{entity} {id} not found")]
    NotFound { entity: Entity, id: i64 },

    #[error("insufficient stock for item {item_id}: requested {requested}, available {available}")]
    InsufficientStock {
        item_id: i64,
        requested: i64,
        available: i64,
    },

    #[error("write failed: {0}")]
    WriteFailed(#[source] StoreError),

    #[error("order {0} is already cancelled")]
    AlreadyCancelled(i64),

    #[error("quantity must be positive, got {0}")]
    InvalidQuantity(i64),

    #[error("total price overflows for quantity {quantity} at unit price {unit_price}")]
    PriceOverflow { quantity: i32, unit_price: i64 },

    #[error("unit of work exceeded its deadline of {0:?}")]
    DeadlineExceeded(Duration),

    /// Rollback failed after an upstream failure; both causes are kept.
    #[error("transaction aborted: {cause}; rollback failed: {rollback}")]
    TransactionAborted {
        cause: Box<EngineError>,
        #[source]
        rollback: StoreError,
    },
}

impl From<StoreError> for EngineError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::NotFound { entity, id } => EngineError::NotFound { entity, id },
            StoreError::InsufficientStock {
                item_id,
                requested,
                available,
            } => EngineError::InsufficientStock {
                item_id,
                requested,
                available,
            },
            StoreError::AlreadyCancelled { order_id } => EngineError::AlreadyCancelled(order_id),
            other => EngineError::WriteFailed(other),
        }
    }
}

pub type EngineResult<T, E = EngineError> = std::result::Result<T, E>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn store_errors_map_onto_engine_taxonomy() {
        let err: EngineError = StoreError::NotFound {
            entity: Entity::Order,
            id: 3,
        }
        .into();
        assert!(matches!(
            err,
            EngineError::NotFound {
                entity: Entity::Order,
                id: 3
            }
        ));

        let err: EngineError = StoreError::Constraint("fk".into()).into();
        assert!(matches!(err, EngineError::WriteFailed(StoreError::Constraint(_))));

        let err: EngineError = StoreError::AlreadyCancelled { order_id: 9 }.into();
        assert!(matches!(err, EngineError::AlreadyCancelled(9)));
    }

    #[test]
    fn aborted_transaction_reports_both_causes() {
        let err = EngineError::TransactionAborted {
            cause: Box::new(EngineError::InvalidQuantity(0)),
            rollback: StoreError::Fault("rollback"),
        };
        let message = err.to_string();
        assert!(message.contains("quantity must be positive"));
        assert!(message.contains("injected fault: rollback"));
    }
}
