//! Batch audit orchestration.
//!
//! - [`batch`]: job submission, bounded dispatch, status and results
//! - [`pipeline`]: render, score and route one target
//! - [`store`]: job storage behind a small trait

pub mod batch;
pub mod error;
pub mod pipeline;
pub mod store;

pub use batch::{BatchAuditOrchestrator, OrchestratorConfig};
pub use error::{StoreError, StoreResult};
pub use pipeline::TargetPipeline;
pub use store::{JobStore, MemoryJobStore};
