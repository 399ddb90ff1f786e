use diesel::r2d2::{ConnectionManager, Pool};
use diesel::PgConnection;
use std::sync::Arc;

use crate::core::config::AppConfig;
use crate::store::Stores;
use crate::tickets::engine::TicketLifecycle;

pub type DbPool = Pool<ConnectionManager<PgConnection>>;

pub fn create_pool(config: &AppConfig) -> anyhow::Result<DbPool> {
    let manager = ConnectionManager::<PgConnection>::new(&config.database.url);
    let pool = Pool::builder()
        .max_size(config.database.max_connections)
        .build(manager)?;
    Ok(pool)
}

/// Shared application state handed to every handler.
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub stores: Arc<Stores>,
    pub engine: TicketLifecycle,
}
