//! simbatch-core
//!
//! 仿真编排系统的共享基础：任务/结果数据模型、错误类型、
//! 配置模型以及引擎与缓存后端的接口抽象。

pub mod config;
pub mod errors;
pub mod logging;
pub mod models;
pub mod traits;

pub use config::{AppConfig, CacheBackendKind, CacheConfig, CodecKind, OrchestratorConfig};
pub use errors::{SimResult, SimulationError};
pub use models::{
    ModelRef, RawOutput, Signal, SimulationOutcome, SimulationRequest, SimulationTask,
    TaskPriority, TaskState, TimeSeries,
};
pub use traits::{BatchSimulator, CacheBackend, ModelInspector};
