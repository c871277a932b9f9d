pub mod dto;
pub mod error;
pub mod models;
pub mod repository;
pub mod services;
pub mod settings;

use std::sync::Arc;

use sqlx::PgPool;
use sqlx::postgres::PgPoolOptions;

use crate::error::Result;
use crate::repository::{LifecycleStore, PgLifecycleStore};

pub use settings::{LifecycleSettings, OverduePolicy};

/// Connection pool plus migrations for the lifecycle schema.
#[derive(Clone)]
pub struct Database {
    pool: PgPool,
}

impl Database {
    pub async fn new(database_url: &str) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(10)
            .connect(database_url)
            .await?;

        Ok(Self { pool })
    }

    pub async fn run_migrations(&self) -> Result<()> {
        sqlx::migrate!("./migrations").run(&self.pool).await?;
        Ok(())
    }

    pub fn lifecycle_store(&self) -> Arc<dyn LifecycleStore> {
        Arc::new(PgLifecycleStore::new(self.pool.clone()))
    }
}
