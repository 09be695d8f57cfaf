use std::sync::Arc;

use crate::config::{Config, StorageBackend};
use crate::middlewares::rate_limit::{InMemoryRateLimiter, RateLimiter, RedisRateLimiter};
use crate::repo::Repositories;
use redis::aio::ConnectionManager;

pub struct AppState {
    pub config: Config,
    pub repos: Repositories,
    pub rate_limiter: Arc<dyn RateLimiter>,
}

impl AppState {
    pub async fn new(config: Config) -> anyhow::Result<Self> {
        let repos = match config.storage {
            StorageBackend::Mongo => {
                let client = mongodb::Client::with_uri_str(&config.mongo_uri).await?;
                tracing::info!("MongoDB client created for database {}", config.mongo_database);
                Repositories::mongo(client.database(&config.mongo_database)).await?
            }
            StorageBackend::Memory => {
                tracing::warn!("Using in-memory storage; data is lost on restart");
                Repositories::in_memory()
            }
        };

        let rate_limiter: Arc<dyn RateLimiter> = match &config.redis_uri {
            Some(uri) => {
                let redis_client = redis::Client::open(uri.as_str())?;

                tracing::info!("Attempting to connect to Redis...");
                let redis = tokio::time::timeout(
                    std::time::Duration::from_secs(30),
                    ConnectionManager::new(redis_client),
                )
                .await
                .map_err(|_| anyhow::anyhow!("Redis connection timeout after 30s"))??;

                let mut conn = redis.clone();
                tokio::time::timeout(
                    std::time::Duration::from_secs(5),
                    redis::cmd("PING").query_async::<String>(&mut conn),
                )
                .await
                .map_err(|_| anyhow::anyhow!("Redis PING timeout after 5s"))??;

                tracing::info!("Redis connection established successfully");
                Arc::new(RedisRateLimiter::new(redis))
            }
            None => {
                tracing::info!("No Redis configured, rate limiting in-process");
                Arc::new(InMemoryRateLimiter::default())
            }
        };

        Ok(Self {
            config,
            repos,
            rate_limiter,
        })
    }

    /// State over already-built repositories with an in-process rate limiter.
    pub fn with_repositories(config: Config, repos: Repositories) -> Self {
        Self {
            config,
            repos,
            rate_limiter: Arc::new(InMemoryRateLimiter::default()),
        }
    }
}

pub mod achievement_service;
pub mod attempt_service;
pub mod catalog_seed;
pub mod level_service;
pub mod profile_service;
pub mod reward_service;
pub mod scoring;

#[cfg(test)]
pub(crate) mod test_support;
