//! Runtime components: reconciliation, start scheduling, restart control and the pipeline

pub mod pipeline;
pub mod reconcile;
pub mod restart;
pub mod scheduler;
pub mod shutdown;
pub mod storage;

pub use pipeline::*;
pub use reconcile::{ReconcileError, ReconcileReport, Reconciler};
pub use restart::*;
pub use scheduler::*;
pub use shutdown::*;
