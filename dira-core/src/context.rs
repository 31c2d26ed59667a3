use std::sync::Arc;

use crate::cache::{create_pool as create_redis_pool, RedisPool};
use crate::config::Config;
use crate::db::{create_pool as create_db_pool, DbPool};

#[derive(Clone)]
pub struct AppContext {
    pub config: Arc<Config>,
    pub db_pool: Arc<DbPool>,
    pub redis_pool: RedisPool,
}

impl AppContext {
    pub async fn new(config: Config) -> anyhow::Result<Self> {
        let db_pool = create_db_pool(&config.database).await?;
        let redis_pool = create_redis_pool(&config.redis).await?;

        Ok(AppContext {
            config: Arc::new(config),
            db_pool,
            redis_pool,
        })
    }
}
