use std::time::Duration;

use shared::{
    total_price, CancelReceipt, Item, ItemUpdate, NewItem, NewOrder, NewUser, Order, PlaceOrder,
    User, ORDER_KIND_SELLING,
};
use tracing::{info, warn};

use crate::error::{EngineError, EngineResult, StoreError};
use crate::repository::Repositories;
use crate::unit_of_work::UnitOfWork;

/// Order placement and cancellation against shared inventory.
///
/// Holds no mutable state of its own; every call opens exactly one unit of
/// work and all coordination is left to the storage behind it.
#[derive(Clone)]
pub struct OrderEngine {
    uow: UnitOfWork,
}

impl OrderEngine {
    pub fn new(uow: UnitOfWork) -> Self {
        Self { uow }
    }

    /// A copy of this engine whose units of work are rolled back when they
    /// outlive `deadline`.
    pub fn with_deadline(&self, deadline: Duration) -> Self {
        Self {
            uow: self.uow.clone().with_deadline(deadline),
        }
    }

    pub async fn place_order(&self, request: PlaceOrder) -> EngineResult<Order> {
        if request.quantity <= 0 {
            return Err(EngineError::InvalidQuantity(request.quantity.into()));
        }

        match self.uow.run(move |repos| Box::pin(place(repos, request))).await {
            Ok(order) => {
                info!(
                    "Order {} placed: user {} bought {} of item {} for {}",
                    order.id, order.user_id, order.quantity, order.item_id, order.total_price
                );
                Ok(order)
            }
            Err(err) => {
                warn!("Order for item {} rejected: {}", request.item_id, err);
                Err(err)
            }
        }
    }

    pub async fn cancel_order(&self, order_id: i64) -> EngineResult<CancelReceipt> {
        match self.uow.run(move |repos| Box::pin(cancel(repos, order_id))).await {
            Ok(receipt) => {
                info!(
                    "Order {} cancelled, {} returned to item {}",
                    receipt.order_id, receipt.restored, receipt.item_id
                );
                Ok(receipt)
            }
            Err(err) => {
                warn!("Cancellation of order {} rejected: {}", order_id, err);
                Err(err)
            }
        }
    }

    pub async fn create_user(&self, user: NewUser) -> EngineResult<User> {
        let user = self
            .uow
            .run(move |repos| {
                Box::pin(async move { repos.create_user(&user).await.map_err(EngineError::from) })
            })
            .await?;
        info!("User {} created as {}", user.id, user.user_role);
        Ok(user)
    }

    pub async fn get_user(&self, id: i64) -> EngineResult<User> {
        self.uow
            .run(move |repos| {
                Box::pin(async move { repos.get_user(id).await.map_err(EngineError::from) })
            })
            .await
    }

    pub async fn create_item(&self, item: NewItem) -> EngineResult<Item> {
        let item = self
            .uow
            .run(move |repos| {
                Box::pin(async move { repos.create_item(&item).await.map_err(EngineError::from) })
            })
            .await?;
        info!("Item {} created with {} in stock", item.id, item.stock);
        Ok(item)
    }

    pub async fn update_item(&self, id: i64, update: ItemUpdate) -> EngineResult<Item> {
        self.uow
            .run(move |repos| {
                Box::pin(async move {
                    repos
                        .update_item(id, &update)
                        .await
                        .map_err(EngineError::from)
                })
            })
            .await
    }

    pub async fn restock(&self, id: i64, amount: i64) -> EngineResult<Item> {
        if amount <= 0 {
            return Err(EngineError::InvalidQuantity(amount));
        }

        let item = self
            .uow
            .run(move |repos| {
                Box::pin(async move {
                    repos
                        .increment_stock(id, amount)
                        .await
                        .map_err(EngineError::from)
                })
            })
            .await?;
        info!("Item {} restocked by {}, now {}", item.id, amount, item.stock);
        Ok(item)
    }

    pub async fn get_item(&self, id: i64) -> EngineResult<Item> {
        self.uow
            .run(move |repos| {
                Box::pin(async move { repos.get_item(id).await.map_err(EngineError::from) })
            })
            .await
    }

    pub async fn get_order(&self, id: i64) -> EngineResult<Order> {
        self.uow
            .run(move |repos| {
                Box::pin(async move { repos.get_order(id).await.map_err(EngineError::from) })
            })
            .await
    }
}

async fn place(repos: &mut dyn Repositories, request: PlaceOrder) -> EngineResult<Order> {
    let item = repos.get_item(request.item_id).await?;

    // Stock sufficiency is left to the conditional decrement below, and the
    // user reference to the orders foreign key.
    let total = total_price(request.quantity, item.unit_price).ok_or(EngineError::PriceOverflow {
        quantity: request.quantity,
        unit_price: item.unit_price,
    })?;

    let order = repos
        .insert_order(&NewOrder {
            user_id: request.user_id,
            item_id: item.id,
            quantity: request.quantity,
            total_price: total,
            order_kind: ORDER_KIND_SELLING.to_string(),
        })
        .await
        .map_err(EngineError::WriteFailed)?;

    repos.decrement_stock(item.id, i64::from(request.quantity)).await?;

    Ok(order)
}

async fn cancel(repos: &mut dyn Repositories, order_id: i64) -> EngineResult<CancelReceipt> {
    let order = repos.get_order(order_id).await?;
    if order.is_cancelled() {
        return Err(EngineError::AlreadyCancelled(order.id));
    }

    repos
        .increment_stock(order.item_id, i64::from(order.quantity))
        .await
        .map_err(|err| match err {
            StoreError::NotFound { .. } => EngineError::WriteFailed(err),
            other => other.into(),
        })?;

    // Conditional on the marker still being unset, so a concurrent cancel
    // of the same order rolls back this unit's increment.
    repos.mark_cancelled(order.id).await?;

    Ok(CancelReceipt::new(&order))
}
