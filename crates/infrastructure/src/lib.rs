pub mod http_transport;
pub mod memory_store;
pub mod notifier;
pub mod observability;
pub mod seed;

pub use http_transport::HttpAgentTransport;
pub use memory_store::{InMemoryAgentDirectory, InMemoryJobStore};
pub use notifier::LogNotifier;
pub use observability::{MetricsCollector, StructuredLogger};
pub use seed::SeedData;
