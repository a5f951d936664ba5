pub mod evaluator;
pub mod executors;
pub mod graph;
pub mod human;
pub mod journal;
pub mod tracker;
pub mod transport;

pub use evaluator::RhaiEvaluator;
pub use executors::{Collaborators, ExecutorRegistry, NodeCall, NodeExecutor};
pub use graph::{resolve_input, RunResult, Scheduler};
pub use human::InputBroker;
pub use journal::RunJournal;
pub use tracker::RunTracker;
pub use transport::ReqwestTransport;
