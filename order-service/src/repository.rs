use async_trait::async_trait;
use shared::{Item, ItemUpdate, NewItem, NewOrder, NewUser, Order, User};

use crate::error::StoreError;
use crate::unit_of_work::IsolationLevel;

#[async_trait]
pub trait UserRepository: Send {
    async fn create_user(&mut self, user: &NewUser) -> Result<User, StoreError>;

    async fn get_user(&mut self, id: i64) -> Result<User, StoreError>;
}

#[async_trait]
pub trait ItemRepository: Send {
    async fn get_item(&mut self, id: i64) -> Result<Item, StoreError>;

    async fn create_item(&mut self, item: &NewItem) -> Result<Item, StoreError>;

    /// Updates descriptive fields only; stock is never written here.
    async fn update_item(&mut self, id: i64, update: &ItemUpdate) -> Result<Item, StoreError>;

    /// Single conditional update: fails with `InsufficientStock` instead of
    /// letting stock drop below zero. `amount` must be positive.
    async fn decrement_stock(&mut self, id: i64, amount: i64) -> Result<Item, StoreError>;

    /// `amount` must be positive.
    async fn increment_stock(&mut self, id: i64, amount: i64) -> Result<Item, StoreError>;
}

#[async_trait]
pub trait OrderRepository: Send {
    async fn insert_order(&mut self, order: &NewOrder) -> Result<Order, StoreError>;

    async fn get_order(&mut self, id: i64) -> Result<Order, StoreError>;

    /// Fails with `AlreadyCancelled` if the marker is already set.
    async fn mark_cancelled(&mut self, id: i64) -> Result<Order, StoreError>;
}

/// Stock deltas are strictly positive; the direction comes from the operation.
pub(crate) fn check_stock_delta(amount: i64) -> Result<(), StoreError> {
    if amount <= 0 {
        return Err(StoreError::Constraint(format!(
            "stock delta must be positive, got {amount}"
        )));
    }
    Ok(())
}

/// Transaction-scoped handle handed to unit-of-work closures.
pub trait Repositories: UserRepository + ItemRepository + OrderRepository {}

impl<T: UserRepository + ItemRepository + OrderRepository> Repositories for T {}

/// An open transaction on one storage connection.
#[async_trait]
pub trait Transaction: Send {
    fn repositories(&mut self) -> &mut dyn Repositories;

    async fn commit(self: Box<Self>) -> Result<(), StoreError>;

    async fn rollback(self: Box<Self>) -> Result<(), StoreError>;
}

#[async_trait]
pub trait Storage: Send + Sync {
    async fn begin(&self, isolation: IsolationLevel) -> Result<Box<dyn Transaction>, StoreError>;
}
