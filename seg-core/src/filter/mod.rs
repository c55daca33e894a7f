//! Background filters: long computations off the dispatch thread, bounded by
//! a shared [`FilterGate`].

pub mod gate;
pub mod task;

pub use gate::{FilterGate, FilterPermit};
pub use task::{BackgroundTask, FnTask, TaskControl, TaskError, TaskHandle, TaskState};
