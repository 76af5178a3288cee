//! Copy jobs: the sequential id-range engine, the batch-runner adapter and the
//! single-shot "reply + quantity" flow.

pub mod engine;
pub mod runner;
pub mod single;

pub use engine::{ProgressSink, RangeCopier, StatusProgress};
pub use runner::{
    invoke_batch_runner, BatchRunner, CallShape, InvokeError, PlatformClients,
    RangeBatchRunner, RunnerCall,
};
pub use single::{parse_quantity, run_single, PendingTransfer, PendingTransfers, RunningTransfers};
