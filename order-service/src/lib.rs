pub mod config;
pub mod engine;
pub mod error;
pub mod memory;
pub mod models;
pub mod postgres;
pub mod repository;
pub mod schema;
pub mod unit_of_work;

pub use engine::OrderEngine;
pub use error::{EngineError, EngineResult, Entity, StoreError};
pub use memory::InMemoryStorage;
pub use postgres::PgStorage;
pub use unit_of_work::{IsolationLevel, UnitOfWork};
