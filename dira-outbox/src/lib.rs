pub mod jobs;
pub mod poller;

pub use jobs::{queue_email, queue_translation, EmailJob, TranslateListingInfoJob};
