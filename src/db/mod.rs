use anyhow::Result;
use async_trait::async_trait;
use sqlx::postgres::PgPoolOptions;
use sqlx::{Pool, Postgres};

use crate::config::DbConfig;
use crate::error::StoreResult;
use crate::store::{Transaction, UnitOfWork};

mod postgres;
pub mod queries;

pub use postgres::PgTransaction;

pub type DbPool = Pool<Postgres>;

pub async fn init_pool(config: &DbConfig) -> Result<DbPool> {
    let pool = PgPoolOptions::new()
        .max_connections(config.max_connections)
        .connect(&config.url())
        .await?;
    Ok(pool)
}

/// PostgreSQL-backed unit of work.
#[derive(Clone)]
pub struct PgStore {
    pool: DbPool,
}

impl PgStore {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    pub async fn health_check(&self) -> StoreResult<()> {
        sqlx::query(queries::HEALTH_CHECK).execute(&self.pool).await?;
        Ok(())
    }
}

#[async_trait]
impl UnitOfWork for PgStore {
    async fn begin(&self) -> StoreResult<Box<dyn Transaction>> {
        let tx = self.pool.begin().await?;
        Ok(Box::new(PgTransaction::new(tx)))
    }
}
