// src/core/mod.rs — Task execution: stream relay and task supervisor

pub mod relay;
pub mod supervisor;

pub use relay::{ContentFragment, ContentSink, RelayOutcome, StreamRelay, Termination};
pub use supervisor::{EndCause, OneShotOutcome, TaskPhase, TaskReport, TaskShape, TaskSupervisor};
