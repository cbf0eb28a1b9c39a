use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use shared::{Item, ItemUpdate, NewItem, NewOrder, NewUser, Order, User};
use tokio::sync::{Mutex, OwnedMutexGuard};

use crate::error::{Entity, StoreError};
use crate::repository::{
    check_stock_delta, ItemRepository, OrderRepository, Repositories, Storage, Transaction,
    UserRepository,
};
use crate::unit_of_work::IsolationLevel;

#[derive(Debug, Clone, Default)]
struct Tables {
    users: BTreeMap<i64, User>,
    items: BTreeMap<i64, Item>,
    orders: BTreeMap<i64, Order>,
    last_user_id: i64,
    last_item_id: i64,
    last_order_id: i64,
}

impl Tables {
    fn add_user(&mut self, user: &NewUser) -> Result<User, StoreError> {
        if self.users.values().any(|u| u.user_name == user.user_name) {
            return Err(StoreError::Constraint(format!(
                "users.user_name {} already exists",
                user.user_name
            )));
        }
        self.last_user_id += 1;
        let user = User {
            id: self.last_user_id,
            user_name: user.user_name.clone(),
            user_role: user.user_role.clone(),
            created_at: Utc::now(),
        };
        self.users.insert(user.id, user.clone());
        Ok(user)
    }

    fn add_item(&mut self, item: &NewItem) -> Item {
        self.last_item_id += 1;
        let item = Item {
            id: self.last_item_id,
            name: item.name.clone(),
            status: item.status.clone(),
            unit_price: item.unit_price,
            stock: item.stock,
            created_at: Utc::now(),
        };
        self.items.insert(item.id, item.clone());
        item
    }

    fn item_mut(&mut self, id: i64) -> Result<&mut Item, StoreError> {
        self.items.get_mut(&id).ok_or(StoreError::NotFound {
            entity: Entity::Item,
            id,
        })
    }

    fn order_mut(&mut self, id: i64) -> Result<&mut Order, StoreError> {
        self.orders.get_mut(&id).ok_or(StoreError::NotFound {
            entity: Entity::Order,
            id,
        })
    }
}

#[derive(Debug, Default)]
struct Faults {
    rollback: AtomicBool,
    order_insert: AtomicBool,
}

/// In-memory storage.
///
/// Units of work are serialised behind a single lock and write to a working
/// copy of the tables that replaces the committed state on commit. Intended
/// for tests and local runs.
#[derive(Debug, Clone, Default)]
pub struct InMemoryStorage {
    tables: Arc<Mutex<Tables>>,
    faults: Arc<Faults>,
}

impl InMemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seeds a user directly into committed state.
    pub async fn insert_user(&self, user: NewUser) -> Result<User, StoreError> {
        self.tables.lock().await.add_user(&user)
    }

    /// Seeds an item directly into committed state.
    pub async fn insert_item(&self, item: NewItem) -> Item {
        self.tables.lock().await.add_item(&item)
    }

    pub async fn item(&self, id: i64) -> Option<Item> {
        self.tables.lock().await.items.get(&id).cloned()
    }

    pub async fn order(&self, id: i64) -> Option<Order> {
        self.tables.lock().await.orders.get(&id).cloned()
    }

    pub async fn order_count(&self) -> usize {
        self.tables.lock().await.orders.len()
    }

    /// The next rollback reports a failure (the working copy is still discarded).
    pub fn fail_next_rollback(&self) {
        self.faults.rollback.store(true, Ordering::SeqCst);
    }

    /// The next order insert is rejected as a write failure.
    pub fn fail_next_order_insert(&self) {
        self.faults.order_insert.store(true, Ordering::SeqCst);
    }
}

#[async_trait]
impl Storage for InMemoryStorage {
    async fn begin(&self, _isolation: IsolationLevel) -> Result<Box<dyn Transaction>, StoreError> {
        let committed = self.tables.clone().lock_owned().await;
        let working = (*committed).clone();
        Ok(Box::new(MemoryTransaction {
            committed,
            working,
            faults: self.faults.clone(),
        }))
    }
}

pub struct MemoryTransaction {
    committed: OwnedMutexGuard<Tables>,
    working: Tables,
    faults: Arc<Faults>,
}

#[async_trait]
impl UserRepository for MemoryTransaction {
    async fn create_user(&mut self, user: &NewUser) -> Result<User, StoreError> {
        self.working.add_user(user)
    }

    async fn get_user(&mut self, id: i64) -> Result<User, StoreError> {
        self.working.users.get(&id).cloned().ok_or(StoreError::NotFound {
            entity: Entity::User,
            id,
        })
    }
}

#[async_trait]
impl ItemRepository for MemoryTransaction {
    async fn get_item(&mut self, id: i64) -> Result<Item, StoreError> {
        self.working.item_mut(id).map(|item| item.clone())
    }

    async fn create_item(&mut self, item: &NewItem) -> Result<Item, StoreError> {
        if item.unit_price < 0 {
            return Err(StoreError::Constraint("items.unit_price must be >= 0".into()));
        }
        if item.stock < 0 {
            return Err(StoreError::Constraint("items.stock must be >= 0".into()));
        }
        Ok(self.working.add_item(item))
    }

    async fn update_item(&mut self, id: i64, update: &ItemUpdate) -> Result<Item, StoreError> {
        if matches!(update.unit_price, Some(price) if price < 0) {
            return Err(StoreError::Constraint("items.unit_price must be >= 0".into()));
        }
        let item = self.working.item_mut(id)?;
        if let Some(status) = &update.status {
            item.status = status.clone();
        }
        if let Some(unit_price) = update.unit_price {
            item.unit_price = unit_price;
        }
        Ok(item.clone())
    }

    async fn decrement_stock(&mut self, id: i64, amount: i64) -> Result<Item, StoreError> {
        check_stock_delta(amount)?;
        let item = self.working.item_mut(id)?;
        if item.stock < amount {
            return Err(StoreError::InsufficientStock {
                item_id: id,
                requested: amount,
                available: item.stock,
            });
        }
        item.stock -= amount;
        Ok(item.clone())
    }

    async fn increment_stock(&mut self, id: i64, amount: i64) -> Result<Item, StoreError> {
        check_stock_delta(amount)?;
        let item = self.working.item_mut(id)?;
        item.stock = item
            .stock
            .checked_add(amount)
            .ok_or_else(|| StoreError::Constraint("items.stock overflow".into()))?;
        Ok(item.clone())
    }
}

#[async_trait]
impl OrderRepository for MemoryTransaction {
    async fn insert_order(&mut self, order: &NewOrder) -> Result<Order, StoreError> {
        if self.faults.order_insert.swap(false, Ordering::SeqCst) {
            return Err(StoreError::Fault("order insert"));
        }
        if !self.working.users.contains_key(&order.user_id) {
            return Err(StoreError::Constraint(format!(
                "orders.user_id {} references a missing user",
                order.user_id
            )));
        }
        if !self.working.items.contains_key(&order.item_id) {
            return Err(StoreError::Constraint(format!(
                "orders.item_id {} references a missing item",
                order.item_id
            )));
        }
        if order.quantity <= 0 {
            return Err(StoreError::Constraint("orders.quantity must be > 0".into()));
        }
        if order.total_price < 0 {
            return Err(StoreError::Constraint("orders.total_price must be >= 0".into()));
        }

        self.working.last_order_id += 1;
        let order = Order {
            id: self.working.last_order_id,
            user_id: order.user_id,
            item_id: order.item_id,
            quantity: order.quantity,
            total_price: order.total_price,
            order_kind: order.order_kind.clone(),
            created_at: Utc::now(),
            cancelled_at: None,
        };
        self.working.orders.insert(order.id, order.clone());
        Ok(order)
    }

    async fn get_order(&mut self, id: i64) -> Result<Order, StoreError> {
        self.working.order_mut(id).map(|order| order.clone())
    }

    async fn mark_cancelled(&mut self, id: i64) -> Result<Order, StoreError> {
        let order = self.working.order_mut(id)?;
        if order.is_cancelled() {
            return Err(StoreError::AlreadyCancelled { order_id: id });
        }
        order.cancelled_at = Some(Utc::now());
        Ok(order.clone())
    }
}

#[async_trait]
impl Transaction for MemoryTransaction {
    fn repositories(&mut self) -> &mut dyn Repositories {
        self
    }

    async fn commit(self: Box<Self>) -> Result<(), StoreError> {
        let MemoryTransaction {
            mut committed,
            working,
            ..
        } = *self;
        *committed = working;
        Ok(())
    }

    async fn rollback(self: Box<Self>) -> Result<(), StoreError> {
        if self.faults.rollback.swap(false, Ordering::SeqCst) {
            return Err(StoreError::Fault("rollback"));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn new_item(stock: i64) -> NewItem {
        NewItem {
            name: "lamp".into(),
            status: "available".into(),
            unit_price: 250,
            stock,
        }
    }

    fn new_user(user_name: &str) -> NewUser {
        NewUser {
            user_name: user_name.into(),
            user_role: "GRUNT".into(),
        }
    }

    fn new_order(user_id: i64, item_id: i64, quantity: i32) -> NewOrder {
        NewOrder {
            user_id,
            item_id,
            quantity,
            total_price: 250 * i64::from(quantity),
            order_kind: "selling".into(),
        }
    }

    #[tokio::test]
    async fn decrement_refuses_to_go_below_zero() {
        let storage = InMemoryStorage::new();
        let item = storage.insert_item(new_item(3)).await;
        let mut tx = storage.begin(IsolationLevel::default()).await.unwrap();

        let err = tx.repositories().decrement_stock(item.id, 4).await.unwrap_err();
        assert!(matches!(
            err,
            StoreError::InsufficientStock {
                requested: 4,
                available: 3,
                ..
            }
        ));

        let item = tx.repositories().decrement_stock(item.id, 3).await.unwrap();
        assert_eq!(item.stock, 0);
    }

    #[tokio::test]
    async fn writes_are_invisible_until_commit() {
        let storage = InMemoryStorage::new();
        let item = storage.insert_item(new_item(5)).await;

        let mut tx = storage.begin(IsolationLevel::default()).await.unwrap();
        tx.repositories().increment_stock(item.id, 2).await.unwrap();
        tx.rollback().await.unwrap();
        assert_eq!(storage.item(item.id).await.unwrap().stock, 5);

        let mut tx = storage.begin(IsolationLevel::default()).await.unwrap();
        tx.repositories().increment_stock(item.id, 2).await.unwrap();
        tx.commit().await.unwrap();
        assert_eq!(storage.item(item.id).await.unwrap().stock, 7);
    }

    #[tokio::test]
    async fn stock_deltas_must_be_positive() {
        let storage = InMemoryStorage::new();
        let item = storage.insert_item(new_item(5)).await;
        let mut tx = storage.begin(IsolationLevel::default()).await.unwrap();

        for amount in [0, -2] {
            let err = tx.repositories().decrement_stock(item.id, amount).await.unwrap_err();
            assert!(matches!(err, StoreError::Constraint(_)));
            let err = tx.repositories().increment_stock(item.id, amount).await.unwrap_err();
            assert!(matches!(err, StoreError::Constraint(_)));
        }
        assert_eq!(tx.repositories().get_item(item.id).await.unwrap().stock, 5);
    }

    #[tokio::test]
    async fn order_insert_requires_existing_user_and_item() {
        let storage = InMemoryStorage::new();
        let user = storage.insert_user(new_user("brock")).await.unwrap();
        let item = storage.insert_item(new_item(5)).await;
        let mut tx = storage.begin(IsolationLevel::default()).await.unwrap();

        let err = tx.repositories().insert_order(&new_order(user.id, 99, 1)).await.unwrap_err();
        assert!(matches!(err, StoreError::Constraint(_)));

        let err = tx.repositories().insert_order(&new_order(42, item.id, 1)).await.unwrap_err();
        assert!(matches!(err, StoreError::Constraint(_)));
    }

    #[tokio::test]
    async fn user_names_are_unique() {
        let storage = InMemoryStorage::new();
        let mut tx = storage.begin(IsolationLevel::default()).await.unwrap();
        let repos = tx.repositories();

        let misty = repos.create_user(&new_user("misty")).await.unwrap();
        assert_eq!(repos.get_user(misty.id).await.unwrap(), misty);

        let err = repos.create_user(&new_user("misty")).await.unwrap_err();
        assert!(matches!(err, StoreError::Constraint(_)));
        let err = repos.get_user(misty.id + 1).await.unwrap_err();
        assert!(matches!(err, StoreError::NotFound { entity: Entity::User, .. }));
    }

    #[tokio::test]
    async fn mark_cancelled_only_once() {
        let storage = InMemoryStorage::new();
        let user = storage.insert_user(new_user("ash")).await.unwrap();
        let item = storage.insert_item(new_item(5)).await;
        let mut tx = storage.begin(IsolationLevel::default()).await.unwrap();
        let repos = tx.repositories();

        let order = repos.insert_order(&new_order(user.id, item.id, 2)).await.unwrap();
        let cancelled = repos.mark_cancelled(order.id).await.unwrap();
        assert!(cancelled.is_cancelled());

        let err = repos.mark_cancelled(order.id).await.unwrap_err();
        assert!(matches!(err, StoreError::AlreadyCancelled { order_id } if order_id == order.id));
    }

    #[tokio::test]
    async fn update_leaves_stock_alone() {
        let storage = InMemoryStorage::new();
        let item = storage.insert_item(new_item(5)).await;
        let mut tx = storage.begin(IsolationLevel::default()).await.unwrap();

        let update = ItemUpdate {
            status: Some("sold out soon".into()),
            unit_price: Some(300),
        };
        let updated = tx.repositories().update_item(item.id, &update).await.unwrap();
        assert_eq!(updated.unit_price, 300);
        assert_eq!(updated.status, "sold out soon");
        assert_eq!(updated.stock, 5);
    }
}
