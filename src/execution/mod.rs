//! Pipeline execution engine

pub mod cancel;
pub mod engine;
pub mod executor;
pub mod runner;
pub mod scheduler;

pub use cancel::{AbortHandle, CancelSignal};
pub use engine::{EventBus, EventHandler, ExecutionEngine, ExecutionEvent};
pub use executor::{JobExecutor, JobOutcome};
pub use runner::{CommandInvocation, CommandRunner, ShellRunner};
pub use scheduler::{ExecutionScheduler, SchedulingError, DEFAULT_SCHEDULING_TIMEOUT};
