use std::collections::{BTreeMap, HashSet};

use async_trait::async_trait;

use crate::errors::SimResult;
use crate::models::{ModelRef, RawOutput};

/// 仿真引擎批量执行接口
///
/// 对外部引擎远程客户端的抽象，编排层只依赖这一个能力。
/// 契约：返回列表与 `parameter_sets` 等长且保序，每个参数集
/// 恰好对应一个原始输出；违反该契约视为集成缺陷而非可重试错误。
#[async_trait]
pub trait BatchSimulator: Send + Sync {
    /// 以一次调用提交整批参数集
    async fn simulate_batch(
        &self,
        model_name: &str,
        parameter_sets: Vec<BTreeMap<String, serde_json::Value>>,
    ) -> SimResult<Vec<RawOutput>>;
}

/// 模型解析接口
///
/// 返回模型声明的变量名集合，仅用于提交时的可选参数校验，
/// 核心调度与缓存逻辑不依赖它。
#[async_trait]
pub trait ModelInspector: Send + Sync {
    async fn declared_variables(&self, model: &ModelRef) -> SimResult<HashSet<String>>;
}
