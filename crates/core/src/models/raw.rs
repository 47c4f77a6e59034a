use serde::{Deserialize, Serialize};

use super::result::{SimulationOutcome, TimeSeries};

/// 仿真引擎批量调用的原始输出
///
/// 在引擎客户端边界处构造一次，之后通过穷尽匹配统一归一化成
/// [`SimulationOutcome`]，编排层不再做任何形状嗅探。
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum RawOutput {
    /// 完整时间序列：一列时间轴加若干信号列
    Series {
        time: Vec<f64>,
        signals: Vec<(String, Vec<f64>)>,
    },
    /// 仅终值的运行：每个信号一个标量
    Scalars { values: Vec<(String, f64)> },
    /// 引擎报告的失败标记
    Failure { message: String },
}

impl RawOutput {
    /// 归一化为仿真结果
    ///
    /// 形状不合法（空时间轴、信号列与时间轴长度不一致）只导致
    /// 该任务失败，不影响同批次的其他任务。
    pub fn normalize(self, duration_seconds: f64) -> SimulationOutcome {
        match self {
            RawOutput::Series { time, signals } => {
                if time.is_empty() {
                    return SimulationOutcome::failure("引擎返回了空的时间轴");
                }
                let mut ts = TimeSeries::new(time);
                for (name, values) in signals {
                    ts = ts.with_signal(name, values);
                }
                if !ts.is_consistent() {
                    return SimulationOutcome::failure(format!(
                        "引擎返回的信号列长度与时间轴不一致 (时间点 {} 个)",
                        ts.len()
                    ));
                }
                SimulationOutcome::success(ts, duration_seconds)
            }
            RawOutput::Scalars { values } => {
                if values.is_empty() {
                    return SimulationOutcome::failure("引擎返回了空的终值集合");
                }
                let mut ts = TimeSeries::new(vec![0.0]);
                for (name, value) in values {
                    ts = ts.with_signal(name, vec![value]);
                }
                SimulationOutcome::success(ts, duration_seconds)
            }
            RawOutput::Failure { message } => SimulationOutcome::failure(message),
        }
    }
}
