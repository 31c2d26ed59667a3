pub mod processor;

pub use processor::{auto_taken_due, deletion_due, run, warning_due, LifecycleReport};
