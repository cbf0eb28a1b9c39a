use anyhow::Result;
use async_trait::async_trait;
use chrono::Utc;
use diesel::prelude::*;
use diesel::PgConnection;
use diesel_async::pooled_connection::bb8::Pool;
use diesel_async::pooled_connection::AsyncDieselConnectionManager;
use diesel_async::{AnsiTransactionManager, AsyncPgConnection, RunQueryDsl, TransactionManager};
use diesel_migrations::{embed_migrations, EmbeddedMigrations, MigrationHarness};
use shared::{Item, ItemUpdate, NewItem, NewOrder, NewUser, Order, User};
use tracing::info;

use crate::error::{Entity, StoreError};
use crate::models::*;
use crate::repository::{
    check_stock_delta, ItemRepository, OrderRepository, Repositories, Storage, Transaction,
    UserRepository,
};
use crate::schema::*;
use crate::unit_of_work::IsolationLevel;

pub const MIGRATIONS: EmbeddedMigrations = embed_migrations!("migrations");

pub type DbPool = Pool<AsyncPgConnection>;

type DbConnection = bb8::PooledConnection<'static, AsyncDieselConnectionManager<AsyncPgConnection>>;

type Manager = AnsiTransactionManager;

pub fn run_migrations(database_url: &str) -> Result<()> {
    let mut conn = PgConnection::establish(database_url)?;
    conn.run_pending_migrations(MIGRATIONS)
        .map_err(|e| anyhow::anyhow!("Migration error: {}", e))?;
    Ok(())
}

#[derive(Clone)]
pub struct PgStorage {
    pool: DbPool,
}

impl PgStorage {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    pub async fn connect(database_url: &str, max_size: u32) -> Result<Self, StoreError> {
        let config = AsyncDieselConnectionManager::<AsyncPgConnection>::new(database_url);
        let pool = Pool::builder()
            .max_size(max_size)
            .build(config)
            .await
            .map_err(|e| StoreError::Pool(e.to_string()))?;
        info!("Connection pool ready with up to {} connections", max_size);
        Ok(Self::new(pool))
    }
}

#[async_trait]
impl Storage for PgStorage {
    async fn begin(&self, isolation: IsolationLevel) -> Result<Box<dyn Transaction>, StoreError> {
        let mut conn = self
            .pool
            .get_owned()
            .await
            .map_err(|e| StoreError::Pool(e.to_string()))?;

        <Manager as TransactionManager<AsyncPgConnection>>::begin_transaction(&mut *conn).await?;
        // Must be the first statement of the transaction.
        diesel::sql_query(format!("SET TRANSACTION ISOLATION LEVEL {}", isolation.as_sql()))
            .execute(&mut *conn)
            .await?;

        Ok(Box::new(PgTransaction { conn }))
    }
}

pub struct PgTransaction {
    conn: DbConnection,
}

impl PgTransaction {
    fn conn(&mut self) -> &mut AsyncPgConnection {
        &mut self.conn
    }
}

#[async_trait]
impl UserRepository for PgTransaction {
    async fn create_user(&mut self, user: &NewUser) -> Result<User, StoreError> {
        let new_user = NewUserRow::from(user);
        let row = diesel::insert_into(users::table)
            .values(&new_user)
            .get_result::<UserRow>(self.conn())
            .await?;
        Ok(row.into())
    }

    async fn get_user(&mut self, id: i64) -> Result<User, StoreError> {
        let row = users::table
            .find(id)
            .first::<UserRow>(self.conn())
            .await
            .optional()?;

        row.map(User::from).ok_or(StoreError::NotFound {
            entity: Entity::User,
            id,
        })
    }
}

#[async_trait]
impl ItemRepository for PgTransaction {
    async fn get_item(&mut self, id: i64) -> Result<Item, StoreError> {
        let row = items::table
            .find(id)
            .first::<ItemRow>(self.conn())
            .await
            .optional()?;

        row.map(Item::from).ok_or(StoreError::NotFound {
            entity: Entity::Item,
            id,
        })
    }

    async fn create_item(&mut self, item: &NewItem) -> Result<Item, StoreError> {
        let new_item = NewItemRow::from(item);
        let row = diesel::insert_into(items::table)
            .values(&new_item)
            .get_result::<ItemRow>(self.conn())
            .await?;
        Ok(row.into())
    }

    async fn update_item(&mut self, id: i64, update: &ItemUpdate) -> Result<Item, StoreError> {
        if update.is_empty() {
            return self.get_item(id).await;
        }

        let changes = ItemChanges::from(update);
        let row = diesel::update(items::table.filter(items::id.eq(id)))
            .set(&changes)
            .get_result::<ItemRow>(self.conn())
            .await
            .optional()?;

        row.map(Item::from).ok_or(StoreError::NotFound {
            entity: Entity::Item,
            id,
        })
    }

    async fn decrement_stock(&mut self, id: i64, amount: i64) -> Result<Item, StoreError> {
        check_stock_delta(amount)?;
        let row = diesel::update(
            items::table
                .filter(items::id.eq(id))
                .filter(items::stock.ge(amount)),
        )
        .set(items::stock.eq(items::stock - amount))
        .get_result::<ItemRow>(self.conn())
        .await
        .optional()?;

        match row {
            Some(row) => Ok(row.into()),
            None => {
                let item = self.get_item(id).await?;
                Err(StoreError::InsufficientStock {
                    item_id: id,
                    requested: amount,
                    available: item.stock,
                })
            }
        }
    }

    async fn increment_stock(&mut self, id: i64, amount: i64) -> Result<Item, StoreError> {
        check_stock_delta(amount)?;
        let row = diesel::update(items::table.filter(items::id.eq(id)))
            .set(items::stock.eq(items::stock + amount))
            .get_result::<ItemRow>(self.conn())
            .await
            .optional()?;

        row.map(Item::from).ok_or(StoreError::NotFound {
            entity: Entity::Item,
            id,
        })
    }
}

#[async_trait]
impl OrderRepository for PgTransaction {
    async fn insert_order(&mut self, order: &NewOrder) -> Result<Order, StoreError> {
        let new_order = NewOrderRow::from(order);
        let row = diesel::insert_into(orders::table)
            .values(&new_order)
            .get_result::<OrderRow>(self.conn())
            .await?;
        Ok(row.into())
    }

    async fn get_order(&mut self, id: i64) -> Result<Order, StoreError> {
        let row = orders::table
            .find(id)
            .first::<OrderRow>(self.conn())
            .await
            .optional()?;

        row.map(Order::from).ok_or(StoreError::NotFound {
            entity: Entity::Order,
            id,
        })
    }

    async fn mark_cancelled(&mut self, id: i64) -> Result<Order, StoreError> {
        let row = diesel::update(
            orders::table
                .filter(orders::id.eq(id))
                .filter(orders::cancelled_at.is_null()),
        )
        .set(orders::cancelled_at.eq(Some(Utc::now())))
        .get_result::<OrderRow>(self.conn())
        .await
        .optional()?;

        match row {
            Some(row) => Ok(row.into()),
            None => {
                self.get_order(id).await?;
                Err(StoreError::AlreadyCancelled { order_id: id })
            }
        }
    }
}

#[async_trait]
impl Transaction for PgTransaction {
    fn repositories(&mut self) -> &mut dyn Repositories {
        self
    }

    async fn commit(self: Box<Self>) -> Result<(), StoreError> {
        let mut tx = *self;
        <Manager as TransactionManager<AsyncPgConnection>>::commit_transaction(tx.conn()).await?;
        Ok(())
    }

    async fn rollback(self: Box<Self>) -> Result<(), StoreError> {
        let mut tx = *self;
        <Manager as TransactionManager<AsyncPgConnection>>::rollback_transaction(tx.conn()).await?;
        Ok(())
    }
}
