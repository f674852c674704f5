//! Storage routing: backend contract, sliding-window performance tracking,
//! and the classification-driven router that dispatches readings to them.

mod perf;
mod repository;
mod router;

pub use perf::{CurrentMetrics, DetailedMetrics, LatencyStats, OpSample, OpType, PerformanceTracker};
pub use repository::{BatchWriteResult, FailureMode, InMemoryRepository, Repository, RepositoryHealth};
pub use router::{BackendBatchResult, BatchRouteResult, Recommendation, RouteResult, StorageRouter};
