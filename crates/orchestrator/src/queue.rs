use std::cmp::Ordering;
use std::collections::BinaryHeap;

use chrono::{DateTime, Utc};

use simbatch_core::TaskPriority;

/// 队列条目：按 (优先级, 创建时间, 序号) 排序
///
/// 创建时间可能在同一纳秒内相同，单调递增的序号保证同优先级
/// 条目严格按提交顺序出队。
#[derive(Debug, Clone)]
struct QueueEntry {
    task_id: String,
    priority: TaskPriority,
    created_at: DateTime<Utc>,
    seq: u64,
    /// 重试延迟门限，到期前不可出队
    not_before: Option<DateTime<Utc>>,
}

impl PartialEq for QueueEntry {
    fn eq(&self, other: &Self) -> bool {
        self.seq == other.seq
    }
}

impl Eq for QueueEntry {}

impl Ord for QueueEntry {
    fn cmp(&self, other: &Self) -> Ordering {
        // BinaryHeap 是大顶堆，反转比较得到"小值先出"
        (other.priority, other.created_at, other.seq).cmp(&(
            self.priority,
            self.created_at,
            self.seq,
        ))
    }
}

impl PartialOrd for QueueEntry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// 任务优先级队列
///
/// 只保存任务 id 和排序键，任务本体在编排器的活跃表中。
/// 出队时跳过尚未到达延迟门限的条目（不阻塞调度循环）。
#[derive(Debug, Default)]
pub struct TaskQueue {
    heap: BinaryHeap<QueueEntry>,
    next_seq: u64,
}

impl TaskQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(
        &mut self,
        task_id: impl Into<String>,
        priority: TaskPriority,
        created_at: DateTime<Utc>,
        not_before: Option<DateTime<Utc>>,
    ) {
        let seq = self.next_seq;
        self.next_seq += 1;
        self.heap.push(QueueEntry {
            task_id: task_id.into(),
            priority,
            created_at,
            seq,
            not_before,
        });
    }

    /// 按序取出至多 `max` 个已到期的任务 id
    ///
    /// 未到期的条目被暂存并原样放回，保持原有排序键。
    pub fn drain_ready(&mut self, max: usize, now: DateTime<Utc>) -> Vec<String> {
        let mut ready = Vec::new();
        let mut held_back = Vec::new();

        while ready.len() < max {
            let Some(entry) = self.heap.pop() else { break };
            let eligible = entry.not_before.map(|t| t <= now).unwrap_or(true);
            if eligible {
                ready.push(entry.task_id);
            } else {
                held_back.push(entry);
            }
        }

        for entry in held_back {
            self.heap.push(entry);
        }
        ready
    }

    /// 直接移除一个排队中的任务（取消路径），返回是否存在
    pub fn remove(&mut self, task_id: &str) -> bool {
        let before = self.heap.len();
        let entries: Vec<QueueEntry> = std::mem::take(&mut self.heap)
            .into_iter()
            .filter(|e| e.task_id != task_id)
            .collect();
        self.heap = entries.into();
        self.heap.len() != before
    }

    pub fn len(&self) -> usize {
        self.heap.len()
    }

    pub fn is_empty(&self) -> bool {
        self.heap.is_empty()
    }
}
