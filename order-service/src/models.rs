use chrono::{DateTime, Utc};
use diesel::prelude::*;
use shared::{Item, ItemUpdate, NewItem, NewOrder, NewUser, Order, User};

#[derive(Debug, Clone, Queryable, Identifiable)]
#[diesel(table_name = crate::schema::users)]
pub struct UserRow {
    pub id: i64,
    pub user_name: String,
    pub user_role: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Insertable)]
#[diesel(table_name = crate::schema::users)]
pub struct NewUserRow<'a> {
    pub user_name: &'a str,
    pub user_role: &'a str,
}

#[derive(Debug, Clone, Queryable, Identifiable)]
#[diesel(table_name = crate::schema::items)]
pub struct ItemRow {
    pub id: i64,
    pub name: String,
    pub status: String,
    pub unit_price: i64,
    pub stock: i64,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Insertable)]
#[diesel(table_name = crate::schema::items)]
pub struct NewItemRow<'a> {
    pub name: &'a str,
    pub status: &'a str,
    pub unit_price: i64,
    pub stock: i64,
}

/// `None` fields are left untouched by the update.
#[derive(Debug, Clone, AsChangeset)]
#[diesel(table_name = crate::schema::items)]
pub struct ItemChanges {
    pub status: Option<String>,
    pub unit_price: Option<i64>,
}

#[derive(Debug, Clone, Queryable, Identifiable)]
#[diesel(table_name = crate::schema::orders)]
pub struct OrderRow {
    pub id: i64,
    pub user_id: i64,
    pub item_id: i64,
    pub quantity: i32,
    pub total_price: i64,
    pub order_kind: String,
    pub created_at: DateTime<Utc>,
    pub cancelled_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Insertable)]
#[diesel(table_name = crate::schema::orders)]
pub struct NewOrderRow<'a> {
    pub user_id: i64,
    pub item_id: i64,
    pub quantity: i32,
    pub total_price: i64,
    pub order_kind: &'a str,
}

impl From<UserRow> for User {
    fn from(row: UserRow) -> Self {
        Self {
            id: row.id,
            user_name: row.user_name,
            user_role: row.user_role,
            created_at: row.created_at,
        }
    }
}

impl<'a> From<&'a NewUser> for NewUserRow<'a> {
    fn from(user: &'a NewUser) -> Self {
        Self {
            user_name: &user.user_name,
            user_role: &user.user_role,
        }
    }
}

impl From<ItemRow> for Item {
    fn from(row: ItemRow) -> Self {
        Self {
            id: row.id,
            name: row.name,
            status: row.status,
            unit_price: row.unit_price,
            stock: row.stock,
            created_at: row.created_at,
        }
    }
}

impl<'a> From<&'a NewItem> for NewItemRow<'a> {
    fn from(item: &'a NewItem) -> Self {
        Self {
            name: &item.name,
            status: &item.status,
            unit_price: item.unit_price,
            stock: item.stock,
        }
    }
}

impl From<&ItemUpdate> for ItemChanges {
    fn from(update: &ItemUpdate) -> Self {
        Self {
            status: update.status.clone(),
            unit_price: update.unit_price,
        }
    }
}

impl From<OrderRow> for Order {
    fn from(row: OrderRow) -> Self {
        Self {
            id: row.id,
            user_id: row.user_id,
            item_id: row.item_id,
            quantity: row.quantity,
            total_price: row.total_price,
            order_kind: row.order_kind,
            created_at: row.created_at,
            cancelled_at: row.cancelled_at,
        }
    }
}

impl<'a> From<&'a NewOrder> for NewOrderRow<'a> {
    fn from(order: &'a NewOrder) -> Self {
        Self {
            user_id: order.user_id,
            item_id: order.item_id,
            quantity: order.quantity,
            total_price: order.total_price,
            order_kind: &order.order_kind,
        }
    }
}
