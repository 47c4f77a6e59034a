use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::request::SimulationRequest;
use super::result::SimulationOutcome;

/// 任务优先级
///
/// 数值越小优先级越高，队列按 (优先级, 创建时间) 排序，
/// 同优先级内按提交顺序先进先出。
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum TaskPriority {
    #[serde(rename = "CRITICAL")]
    Critical = 0,
    #[serde(rename = "HIGH")]
    High = 1,
    #[serde(rename = "NORMAL")]
    Normal = 2,
    #[serde(rename = "LOW")]
    Low = 3,
}

impl Default for TaskPriority {
    fn default() -> Self {
        TaskPriority::Normal
    }
}

/// 任务状态
///
/// 生命周期：`QUEUED → RUNNING → {COMPLETED | FAILED | CANCELLED}`；
/// 失败且剩余重试次数时允许 `RUNNING → QUEUED` 回退一次。
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum TaskState {
    #[serde(rename = "QUEUED")]
    Queued,
    #[serde(rename = "RUNNING")]
    Running,
    #[serde(rename = "COMPLETED")]
    Completed,
    #[serde(rename = "FAILED")]
    Failed,
    #[serde(rename = "CANCELLED")]
    Cancelled,
}

impl TaskState {
    /// 终态任务只存在于已完成表中，不再被调度
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            TaskState::Completed | TaskState::Failed | TaskState::Cancelled
        )
    }
}

/// 仿真任务
///
/// 编排器的工作单元，包装一个仿真请求走完整个生命周期。
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SimulationTask {
    pub id: String,
    pub request: SimulationRequest,
    pub priority: TaskPriority,
    pub state: TaskState,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub result: Option<SimulationOutcome>,
    pub error: Option<String>,
    pub retry_count: u32,
    pub max_retries: u32,
    /// 协作式取消标记，由批次完成处理器检查
    pub cancel_requested: bool,
    /// 重试延迟门限：在此时间之前不进入批次
    pub not_before: Option<DateTime<Utc>>,
    /// 本任务是否参与缓存读写
    pub use_cache: bool,
}

impl SimulationTask {
    /// 创建新任务，初始状态为 QUEUED
    pub fn new(request: SimulationRequest, priority: TaskPriority, max_retries: u32) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            request,
            priority,
            state: TaskState::Queued,
            created_at: Utc::now(),
            started_at: None,
            completed_at: None,
            result: None,
            error: None,
            retry_count: 0,
            max_retries,
            cancel_requested: false,
            not_before: None,
            use_cache: true,
        }
    }

    /// 标记任务开始执行
    pub fn mark_running(&mut self) {
        self.state = TaskState::Running;
        if self.started_at.is_none() {
            self.started_at = Some(Utc::now());
        }
    }

    /// 标记任务成功完成
    pub fn mark_completed(&mut self, result: SimulationOutcome) {
        self.state = TaskState::Completed;
        self.completed_at = Some(Utc::now());
        self.error = None;
        self.result = Some(result);
    }

    /// 标记任务终态失败
    pub fn mark_failed(&mut self, error: impl Into<String>) {
        self.state = TaskState::Failed;
        self.completed_at = Some(Utc::now());
        self.error = Some(error.into());
    }

    /// 标记任务已取消，丢弃批次内可能产生的结果
    pub fn mark_cancelled(&mut self) {
        self.state = TaskState::Cancelled;
        self.completed_at = Some(Utc::now());
        self.result = None;
    }

    /// 失败后重新入队：递增重试计数并设置延迟门限
    pub fn requeue_for_retry(&mut self, error: impl Into<String>, eligible_at: DateTime<Utc>) {
        self.retry_count += 1;
        self.state = TaskState::Queued;
        self.error = Some(error.into());
        self.not_before = Some(eligible_at);
    }

    /// 是否还有剩余重试次数
    pub fn can_retry(&self) -> bool {
        self.retry_count < self.max_retries
    }

    /// 延迟门限检查：到期前不允许进入批次
    pub fn is_eligible_at(&self, now: DateTime<Utc>) -> bool {
        self.not_before.map(|t| t <= now).unwrap_or(true)
    }
}
