use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration as StdDuration;

use chrono::Utc;
use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

use simbatch_cache::SimulationCache;
use simbatch_core::{
    ModelInspector, OrchestratorConfig, SimResult, SimulationError, SimulationOutcome,
    SimulationRequest, SimulationTask, TaskPriority, TaskState,
};

use crate::batch_executor::BatchExecutor;
use crate::queue::TaskQueue;

/// 编排器运行统计
#[derive(Debug, Clone, Copy, Default)]
pub struct OrchestratorStats {
    pub submitted: u64,
    pub completed: u64,
    pub failed: u64,
    pub cancelled: u64,
    pub cache_hits: u64,
    pub batches: u64,
    pub queue_depth: usize,
    pub active: usize,
}

/// 聚合计数器，与任务表共用一把锁
#[derive(Debug, Default)]
struct Counters {
    submitted: u64,
    completed: u64,
    failed: u64,
    cancelled: u64,
    cache_hits: u64,
    batches: u64,
}

/// 单把粗粒度锁保护的全部可变调度状态
///
/// 不变式：任何任务在任意时刻恰好位于 active / completed 两张表
/// 之一；队列只存 id，任务本体始终在 active 表中。
struct SchedulerState {
    queue: TaskQueue,
    active: HashMap<String, SimulationTask>,
    completed: HashMap<String, SimulationTask>,
    counters: Counters,
    /// 同一时刻最多一个批次在执行，限制外部引擎负载
    is_processing_batch: bool,
    loop_running: bool,
}

impl SchedulerState {
    fn new() -> Self {
        Self {
            queue: TaskQueue::new(),
            active: HashMap::new(),
            completed: HashMap::new(),
            counters: Counters::default(),
            is_processing_batch: false,
            loop_running: false,
        }
    }

    /// 任务进入终态：从活跃表移入已完成表并更新计数
    fn finish(&mut self, task: SimulationTask) {
        match task.state {
            TaskState::Completed => self.counters.completed += 1,
            TaskState::Failed => self.counters.failed += 1,
            TaskState::Cancelled => self.counters.cancelled += 1,
            _ => {}
        }
        self.completed.insert(task.id.clone(), task);
    }
}

struct Inner {
    state: Mutex<SchedulerState>,
    cache: Arc<SimulationCache>,
    executor: Arc<BatchExecutor>,
    inspector: Option<Arc<dyn ModelInspector>>,
    config: OrchestratorConfig,
    shutdown: AtomicBool,
}

/// 仿真编排器
///
/// 持有优先级队列、活跃/已完成任务表、重试策略和调度循环。
/// 缓存与执行器通过构造注入，不依赖任何进程级单例。
#[derive(Clone)]
pub struct SimulationOrchestrator {
    inner: Arc<Inner>,
}

impl SimulationOrchestrator {
    pub fn new(
        cache: Arc<SimulationCache>,
        executor: Arc<BatchExecutor>,
        config: OrchestratorConfig,
    ) -> SimResult<Self> {
        Self::with_inspector(cache, executor, None, config)
    }

    /// 完整构造：可选挂载模型解析器，启用提交时的参数名校验
    pub fn with_inspector(
        cache: Arc<SimulationCache>,
        executor: Arc<BatchExecutor>,
        inspector: Option<Arc<dyn ModelInspector>>,
        config: OrchestratorConfig,
    ) -> SimResult<Self> {
        if config.batch_size == 0 {
            return Err(SimulationError::Configuration(
                "batch_size 必须大于 0".to_string(),
            ));
        }
        if config.poll_interval_ms == 0 {
            return Err(SimulationError::Configuration(
                "poll_interval_ms 必须大于 0".to_string(),
            ));
        }
        Ok(Self {
            inner: Arc::new(Inner {
                state: Mutex::new(SchedulerState::new()),
                cache,
                executor,
                inspector,
                config,
                shutdown: AtomicBool::new(false),
            }),
        })
    }

    /// 提交仿真请求
    ///
    /// `use_cache` 且命中时同步完成任务并立即返回；否则入队，
    /// 并在调度循环未运行时将其拉起。校验错误同步抛出，
    /// 不会推迟到异步管线中。
    pub async fn submit(
        &self,
        request: SimulationRequest,
        priority: TaskPriority,
        use_cache: bool,
    ) -> SimResult<String> {
        if request.model.name.is_empty() {
            return Err(SimulationError::InvalidParams(
                "模型名不能为空".to_string(),
            ));
        }
        if self.inner.config.validate_parameters {
            if let Some(inspector) = &self.inner.inspector {
                let declared = inspector.declared_variables(&request.model).await?;
                for key in request.parameters.keys() {
                    if !declared.contains(key) {
                        return Err(SimulationError::InvalidParams(format!(
                            "模型 {} 未声明变量 {key}",
                            request.model.name
                        )));
                    }
                }
            }
        }

        let mut task =
            SimulationTask::new(request, priority, self.inner.config.max_retries);
        task.use_cache = use_cache;
        let task_id = task.id.clone();

        if use_cache {
            if let Some(outcome) = self.inner.cache.get_cached_result(&task.request).await? {
                info!(task_id = %task_id, "提交即命中缓存，任务同步完成");
                task.mark_completed(outcome);
                let mut state = self.inner.state.lock().await;
                state.counters.submitted += 1;
                state.counters.cache_hits += 1;
                state.finish(task);
                return Ok(task_id);
            }
        }

        {
            let mut state = self.inner.state.lock().await;
            state.counters.submitted += 1;
            state
                .queue
                .push(&task_id, task.priority, task.created_at, None);
            state.active.insert(task_id.clone(), task);
            debug!(task_id = %task_id, queue_depth = state.queue.len(), "任务已入队");
        }
        self.ensure_loop_running().await;
        Ok(task_id)
    }

    /// 查询任务当前快照
    pub async fn get_status(&self, task_id: &str) -> Option<SimulationTask> {
        let state = self.inner.state.lock().await;
        state
            .active
            .get(task_id)
            .or_else(|| state.completed.get(task_id))
            .cloned()
    }

    /// 取消任务
    ///
    /// 排队中的任务直接移出；运行中的任务只打取消标记，允许
    /// 跑完当前批次（协作式，不抢占），其结果被丢弃。
    pub async fn cancel(&self, task_id: &str) -> bool {
        let mut state = self.inner.state.lock().await;
        match state.active.get(task_id).map(|t| t.state) {
            Some(TaskState::Queued) => {
                state.queue.remove(task_id);
                if let Some(mut task) = state.active.remove(task_id) {
                    task.mark_cancelled();
                    state.finish(task);
                }
                info!(task_id = %task_id, "排队任务已取消");
                true
            }
            Some(TaskState::Running) => {
                if let Some(task) = state.active.get_mut(task_id) {
                    task.cancel_requested = true;
                }
                info!(task_id = %task_id, "运行中任务标记取消，等待当前批次结束");
                true
            }
            _ => false,
        }
    }

    /// 等待单个任务进入终态，超时返回 None
    pub async fn wait_for_completion(
        &self,
        task_id: &str,
        timeout: StdDuration,
    ) -> Option<SimulationTask> {
        let deadline = Instant::now() + timeout;
        loop {
            {
                let state = self.inner.state.lock().await;
                if let Some(task) = state.completed.get(task_id) {
                    return Some(task.clone());
                }
                if !state.active.contains_key(task_id) {
                    return None;
                }
            }
            if Instant::now() >= deadline {
                return None;
            }
            tokio::time::sleep(StdDuration::from_millis(20)).await;
        }
    }

    /// 等待全部任务完成，超时返回 false
    pub async fn wait_for_all(&self, timeout: StdDuration) -> bool {
        let deadline = Instant::now() + timeout;
        loop {
            {
                let state = self.inner.state.lock().await;
                if state.active.is_empty() && state.queue.is_empty() && !state.is_processing_batch
                {
                    return true;
                }
            }
            if Instant::now() >= deadline {
                return false;
            }
            tokio::time::sleep(StdDuration::from_millis(20)).await;
        }
    }

    pub async fn stats(&self) -> OrchestratorStats {
        let state = self.inner.state.lock().await;
        OrchestratorStats {
            submitted: state.counters.submitted,
            completed: state.counters.completed,
            failed: state.counters.failed,
            cancelled: state.counters.cancelled,
            cache_hits: state.counters.cache_hits,
            batches: state.counters.batches,
            queue_depth: state.queue.len(),
            active: state.active.len(),
        }
    }

    /// 请求停止调度循环（已入队任务不再被调度）
    pub fn shutdown(&self) {
        self.inner.shutdown.store(true, Ordering::Relaxed);
    }

    async fn ensure_loop_running(&self) {
        let mut state = self.inner.state.lock().await;
        if !state.loop_running {
            state.loop_running = true;
            let inner = self.inner.clone();
            tokio::spawn(scheduling_loop(inner));
        }
    }
}

/// 调度循环
///
/// 单逻辑调度器：每个轮询周期，在没有批次在途时取出至多
/// `batch_size` 个已到期任务；逐任务复查缓存（入队后可能已有
/// 相同请求完成），命中者立即完成且不占用批次席位；其余组成
/// 批次交给执行器，在独立的工作任务上运行，调度循环继续响应
/// 新的提交与状态查询。
async fn scheduling_loop(inner: Arc<Inner>) {
    info!(
        batch_size = inner.config.batch_size,
        poll_interval_ms = inner.config.poll_interval_ms,
        "调度循环启动"
    );
    let poll = StdDuration::from_millis(inner.config.poll_interval_ms);

    loop {
        tokio::time::sleep(poll).await;

        if inner.shutdown.load(Ordering::Relaxed) {
            let mut state = inner.state.lock().await;
            state.loop_running = false;
            info!("调度循环停止");
            return;
        }

        let candidates = {
            let mut state = inner.state.lock().await;
            if state.is_processing_batch {
                continue;
            }
            state.queue.drain_ready(inner.config.batch_size, Utc::now())
        };
        if candidates.is_empty() {
            continue;
        }

        dispatch_candidates(&inner, candidates).await;
    }
}

/// 处理一轮取出的候选任务：取消、缓存复查、组批、派发
async fn dispatch_candidates(inner: &Arc<Inner>, candidates: Vec<String>) {
    let mut runnable: Vec<SimulationTask> = Vec::new();

    for task_id in candidates {
        let snapshot = {
            let state = inner.state.lock().await;
            state.active.get(&task_id).cloned()
        };
        // 出队后任务可能已被取消路径移出活跃表
        let Some(task) = snapshot else { continue };
        if task.state != TaskState::Queued {
            continue;
        }

        if task.cancel_requested {
            let mut state = inner.state.lock().await;
            if let Some(mut task) = state.active.remove(&task_id) {
                task.mark_cancelled();
                state.finish(task);
            }
            continue;
        }

        if task.use_cache {
            match inner.cache.get_cached_result(&task.request).await {
                Ok(Some(outcome)) => {
                    debug!(task_id = %task_id, "出队时命中缓存，不占用批次席位");
                    let mut state = inner.state.lock().await;
                    if let Some(mut task) = state.active.remove(&task_id) {
                        task.mark_completed(outcome);
                        state.counters.cache_hits += 1;
                        state.finish(task);
                    }
                    continue;
                }
                Ok(None) => {}
                Err(e) => {
                    warn!(task_id = %task_id, error = %e, "缓存复查失败，按未命中处理");
                }
            }
        }
        runnable.push(task);
    }

    if runnable.is_empty() {
        return;
    }

    // 一个批次对应引擎的一次调用，整批必须共享同一模型；
    // 其他模型的任务放回队列，下一周期处理
    let lead_model = runnable[0].request.model.name.clone();
    let (batch, deferred): (Vec<_>, Vec<_>) = runnable
        .into_iter()
        .partition(|t| t.request.model.name == lead_model);

    let batch_tasks = {
        let mut state = inner.state.lock().await;
        for task in deferred {
            state
                .queue
                .push(&task.id, task.priority, task.created_at, task.not_before);
        }
        let mut batch_tasks = Vec::with_capacity(batch.len());
        for task in &batch {
            if let Some(entry) = state.active.get_mut(&task.id) {
                entry.mark_running();
                batch_tasks.push(entry.clone());
            }
        }
        if batch_tasks.is_empty() {
            return;
        }
        state.is_processing_batch = true;
        batch_tasks
    };

    let inner = inner.clone();
    tokio::spawn(process_batch(inner, batch_tasks));
}

/// 批次结果的统一表示
enum BatchVerdict {
    /// 引擎调用成功，逐任务结果按位置对应
    PerTask(Vec<SimulationOutcome>),
    /// 整批失败（传输错误或接口违约）
    AllFailed { message: String, retryable: bool },
}

/// 批次完成处理器：写缓存、应用状态迁移、释放批次席位
///
/// 执行器抛出的任何错误都在这里吸收，调度循环永远不会因批次
/// 失败而终止。
async fn process_batch(inner: Arc<Inner>, tasks: Vec<SimulationTask>) {
    let verdict = match inner.executor.execute_batch(&tasks).await {
        Ok(outcomes) => BatchVerdict::PerTask(outcomes),
        Err(e) => {
            error!(batch_size = tasks.len(), error = %e, "批量执行失败，整批任务进入重试路径");
            BatchVerdict::AllFailed {
                retryable: e.is_retryable(),
                message: e.to_string(),
            }
        }
    };

    // 成功结果先写缓存，再在一次加锁内完成全部状态迁移
    if let BatchVerdict::PerTask(outcomes) = &verdict {
        for (task, outcome) in tasks.iter().zip(outcomes) {
            if outcome.success && task.use_cache && !task.cancel_requested {
                if let Err(e) = inner
                    .cache
                    .cache_result(&task.request, &outcome.timeseries, &outcome.metadata)
                    .await
                {
                    warn!(task_id = %task.id, error = %e, "缓存写入失败，不影响任务完成");
                }
            }
        }
    }

    let now = Utc::now();
    let retry_gate = now + chrono::Duration::milliseconds(inner.config.retry_delay_ms as i64);
    let mut state = inner.state.lock().await;
    state.counters.batches += 1;

    for (index, submitted) in tasks.iter().enumerate() {
        let Some(mut task) = state.active.remove(&submitted.id) else {
            continue;
        };

        // 批次在途期间被请求取消的任务：席位已消耗，结果丢弃
        if task.cancel_requested {
            task.mark_cancelled();
            state.finish(task);
            continue;
        }

        let failure = match &verdict {
            BatchVerdict::PerTask(outcomes) => {
                let outcome = &outcomes[index];
                if outcome.success {
                    task.mark_completed(outcome.clone());
                    state.finish(task);
                    continue;
                }
                (
                    outcome
                        .error
                        .clone()
                        .unwrap_or_else(|| "仿真失败，引擎未提供原因".to_string()),
                    true,
                )
            }
            BatchVerdict::AllFailed { message, retryable } => (message.clone(), *retryable),
        };

        let (message, retryable) = failure;
        if retryable && task.can_retry() {
            task.requeue_for_retry(message, retry_gate);
            debug!(
                task_id = %task.id,
                retry_count = task.retry_count,
                "任务失败，延迟重新入队"
            );
            state
                .queue
                .push(&task.id, task.priority, task.created_at, task.not_before);
            state.active.insert(task.id.clone(), task);
        } else {
            warn!(task_id = %task.id, error = %message, "任务终态失败");
            task.mark_failed(message);
            state.finish(task);
        }
    }

    state.is_processing_batch = false;
}
