use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Instant;

use tokio::sync::Mutex;
use tracing::{debug, info};

use simbatch_core::{
    BatchSimulator, SimResult, SimulationError, SimulationOutcome, SimulationTask,
};

/// 批量执行聚合计数，用于报告实际达成的并行度
#[derive(Debug, Clone, Copy, Default)]
pub struct ExecutorStats {
    /// 已执行的批次数
    pub batches_executed: u64,
    /// 已执行的任务总数
    pub tasks_executed: u64,
    /// 批量调用累计墙钟耗时（秒）
    pub total_wall_seconds: f64,
}

impl ExecutorStats {
    /// 平均每批任务数，即实际达成的并行度
    pub fn average_parallelism(&self) -> f64 {
        if self.batches_executed == 0 {
            0.0
        } else {
            self.tasks_executed as f64 / self.batches_executed as f64
        }
    }
}

/// 批量执行器
///
/// 把一组待执行任务的参数集合并成对外部引擎批量接口的恰好一次
/// 调用，并按位置索引把返回的原始输出映射回任务。引擎接口自身
/// 保证返回保序且等长；不满足时视为集成缺陷（不可重试）。
pub struct BatchExecutor {
    engine: Arc<dyn BatchSimulator>,
    stats: Mutex<ExecutorStats>,
}

impl BatchExecutor {
    pub fn new(engine: Arc<dyn BatchSimulator>) -> Self {
        Self {
            engine,
            stats: Mutex::new(ExecutorStats::default()),
        }
    }

    /// 执行一个批次，返回与输入等长且同序的结果列表
    ///
    /// 单个输出形状不合法只让对应任务失败，不中断同批次其他任务；
    /// 传输层错误以 `Err` 返回，由编排器转化为整批任务的失败。
    pub async fn execute_batch(
        &self,
        tasks: &[SimulationTask],
    ) -> SimResult<Vec<SimulationOutcome>> {
        if tasks.is_empty() {
            return Ok(Vec::new());
        }

        // 批次由编排器按模型分组，整批共享同一个模型名
        let model_name = tasks[0].request.model.name.clone();
        let parameter_sets: Vec<BTreeMap<String, serde_json::Value>> = tasks
            .iter()
            .map(|task| task.request.effective_parameters())
            .collect();

        debug!(model = %model_name, batch_size = tasks.len(), "提交批量仿真");
        let start = Instant::now();
        let raw_outputs = self
            .engine
            .simulate_batch(&model_name, parameter_sets)
            .await?;
        let elapsed = start.elapsed().as_secs_f64();

        if raw_outputs.len() != tasks.len() {
            return Err(SimulationError::EngineContract(format!(
                "引擎返回 {} 个结果，批次包含 {} 个任务",
                raw_outputs.len(),
                tasks.len()
            )));
        }

        let per_task_seconds = elapsed / tasks.len() as f64;
        let outcomes: Vec<SimulationOutcome> = raw_outputs
            .into_iter()
            .map(|raw| raw.normalize(per_task_seconds))
            .collect();

        let mut stats = self.stats.lock().await;
        stats.batches_executed += 1;
        stats.tasks_executed += tasks.len() as u64;
        stats.total_wall_seconds += elapsed;
        info!(
            model = %model_name,
            batch_size = tasks.len(),
            elapsed_seconds = elapsed,
            "批量仿真完成"
        );

        Ok(outcomes)
    }

    pub async fn stats(&self) -> ExecutorStats {
        *self.stats.lock().await
    }
}
