//! simbatch-orchestrator
//!
//! 仿真任务的编排层：优先级队列、调度循环、批量执行与重试策略。

pub mod batch_executor;
pub mod orchestrator;
pub mod queue;

pub use batch_executor::{BatchExecutor, ExecutorStats};
pub use orchestrator::{OrchestratorStats, SimulationOrchestrator};
pub use queue::TaskQueue;
