pub mod config;
pub mod coordinator;
pub mod error;
pub mod metrics;
pub mod retry;
pub mod server;
pub mod summary;

pub use config::{AppConfig, CollectorConfig};
pub use coordinator::{ProcessedRun, RunCoordinator, SourceBatch};
pub use error::PipelineError;
pub use metrics::{Metrics, MetricsSnapshot, TimedOperation};
pub use retry::{RetryPolicy, Retryable};
pub use server::{AppState, router};
pub use summary::{RunSummary, SourceReport};
