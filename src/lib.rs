//! simbatch
//!
//! 仿真批量执行编排与结果缓存系统的装配层。核心逻辑位于
//! 工作区成员 crates：
//!
//! - `simbatch-core`：数据模型、错误、配置与接口抽象
//! - `simbatch-cache`：内容指纹、结果存储与缓存索引
//! - `simbatch-orchestrator`：优先级调度、批量执行与重试

pub mod app;

pub use app::SimbatchApp;
pub use simbatch_cache::{CacheStats, SimulationCache};
pub use simbatch_core::{
    logging::init_logging, AppConfig, BatchSimulator, CacheBackendKind, CacheConfig, CodecKind,
    ModelInspector, ModelRef, OrchestratorConfig, RawOutput, SimResult, SimulationError,
    SimulationOutcome, SimulationRequest, SimulationTask, TaskPriority, TaskState, TimeSeries,
};
pub use simbatch_orchestrator::{
    BatchExecutor, ExecutorStats, OrchestratorStats, SimulationOrchestrator,
};
