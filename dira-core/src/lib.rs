pub mod cache;
pub mod config;
pub mod context;
pub mod db;
pub mod error;
pub mod filters;
pub mod models;
pub mod schema;
pub mod types;

pub use cache::RedisPool;
pub use config::Config;
pub use context::AppContext;
pub use db::DbPool;
pub use error::DomainError;
pub use filters::SubscriptionFilters;
