//! Graph execution: a FIFO traversal from the trigger nodes.
//!
//! The `Scheduler` takes an immutable graph snapshot, runs one node at a
//! time through the executor registry, and picks successors from outgoing
//! edges (only the matching `true`/`false` handle for condition nodes). A
//! step ceiling bounds every run, so cyclic graphs always terminate.

pub mod input;
pub mod result;
pub mod scheduler;

pub use input::resolve_input;
pub use result::RunResult;
pub use scheduler::Scheduler;
