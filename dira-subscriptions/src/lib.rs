pub mod expiry;
pub mod matcher;
pub mod notify;
pub mod service;

pub use expiry::run_expiry_sweep;
pub use matcher::listing_matches_filters;
pub use notify::notify_subscribers;
pub use service::SubscribeOutcome;
