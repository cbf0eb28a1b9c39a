use std::sync::Arc;

use anyhow::Result;
use clap::Parser;
use order_service::config::{Args, Command};
use order_service::postgres::{self, PgStorage};
use order_service::{OrderEngine, UnitOfWork};
use serde::Serialize;
use shared::{ItemUpdate, NewItem, NewUser, PlaceOrder};
use tracing::info;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();
    let args = Args::parse();

    if !args.skip_migrations || matches!(args.command, Command::Migrate) {
        info!("Running database migrations...");
        postgres::run_migrations(&args.database_url)?;
        info!("Migrations completed successfully");
    }
    if matches!(args.command, Command::Migrate) {
        return Ok(());
    }

    let storage = PgStorage::connect(&args.database_url, args.pool_size).await?;
    let mut uow = UnitOfWork::new(Arc::new(storage)).with_isolation(args.isolation);
    if let Some(deadline) = args.deadline() {
        uow = uow.with_deadline(deadline);
    }
    let engine = OrderEngine::new(uow);

    match args.command {
        Command::Migrate => {}
        Command::CreateUser { name, role } => {
            let user = NewUser {
                user_name: name,
                user_role: role,
            };
            print(&engine.create_user(user).await?)?;
        }
        Command::GetUser { id } => print(&engine.get_user(id).await?)?,
        Command::CreateItem {
            name,
            status,
            unit_price,
            stock,
        } => {
            let item = NewItem {
                name,
                status,
                unit_price,
                stock,
            };
            print(&engine.create_item(item).await?)?;
        }
        Command::UpdateItem {
            id,
            status,
            unit_price,
        } => {
            let update = ItemUpdate { status, unit_price };
            print(&engine.update_item(id, update).await?)?;
        }
        Command::Restock { id, amount } => print(&engine.restock(id, amount).await?)?,
        Command::GetItem { id } => print(&engine.get_item(id).await?)?,
        Command::PlaceOrder {
            user_id,
            item_id,
            quantity,
        } => {
            let request = PlaceOrder {
                user_id,
                item_id,
                quantity,
            };
            print(&engine.place_order(request).await?)?;
        }
        Command::CancelOrder { id } => print(&engine.cancel_order(id).await?)?,
        Command::GetOrder { id } => print(&engine.get_order(id).await?)?,
    }

    Ok(())
}

fn print<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
