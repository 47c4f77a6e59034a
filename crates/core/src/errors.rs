use thiserror::Error;

/// 仿真编排系统错误类型定义
#[derive(Debug, Error)]
pub enum SimulationError {
    #[error("IO错误: {0}")]
    Io(#[from] std::io::Error),

    #[error("仿真引擎错误: {0}")]
    Engine(String),

    #[error("仿真引擎接口违约: {0}")]
    EngineContract(String),

    #[error("序列化错误: {0}")]
    Serialization(String),

    #[error("配置错误: {0}")]
    Configuration(String),

    #[error("无效的仿真参数: {0}")]
    InvalidParams(String),
}

impl SimulationError {
    /// 判断该错误是否允许通过重试路径消化
    ///
    /// 引擎接口违约（返回结果数量与提交数量不一致）属于集成缺陷，
    /// 重试不可能修复，任务直接进入终态。
    pub fn is_retryable(&self) -> bool {
        !matches!(self, SimulationError::EngineContract(_))
    }
}

impl From<serde_json::Error> for SimulationError {
    fn from(err: serde_json::Error) -> Self {
        SimulationError::Serialization(err.to_string())
    }
}

/// 统一的Result类型
pub type SimResult<T> = std::result::Result<T, SimulationError>;
