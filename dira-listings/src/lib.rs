pub mod service;
pub mod stats;
pub mod streets;

pub use service::{Caller, NewListingInput, TakenReport};
pub use stats::{community_stats, record_deleted, record_taken, CommunityStats};
