pub mod publisher;

pub use publisher::{OutboxPublisher, PublishError, PublishSummary};
