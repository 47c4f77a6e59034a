use std::collections::HashMap;

use serde::{Deserialize, Serialize};

/// 单个信号列
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Signal {
    pub name: String,
    pub values: Vec<f64>,
}

/// 仿真结果时间序列
///
/// 一列时间轴加 N 列信号，所有信号列长度与时间轴一致。
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TimeSeries {
    pub time: Vec<f64>,
    pub signals: Vec<Signal>,
}

impl TimeSeries {
    pub fn new(time: Vec<f64>) -> Self {
        Self {
            time,
            signals: Vec::new(),
        }
    }

    pub fn with_signal(mut self, name: impl Into<String>, values: Vec<f64>) -> Self {
        self.signals.push(Signal {
            name: name.into(),
            values,
        });
        self
    }

    pub fn len(&self) -> usize {
        self.time.len()
    }

    pub fn is_empty(&self) -> bool {
        self.time.is_empty()
    }

    /// 校验所有信号列与时间轴等长
    pub fn is_consistent(&self) -> bool {
        self.signals.iter().all(|s| s.values.len() == self.time.len())
    }

    pub fn signal(&self, name: &str) -> Option<&Signal> {
        self.signals.iter().find(|s| s.name == name)
    }
}

/// 单次仿真的最终结果
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SimulationOutcome {
    pub success: bool,
    pub timeseries: TimeSeries,
    #[serde(default)]
    pub metadata: HashMap<String, serde_json::Value>,
    /// 执行耗时（秒），缓存命中时为 0
    pub duration_seconds: f64,
    /// 结果是否来自缓存
    pub cached: bool,
    pub error: Option<String>,
}

impl SimulationOutcome {
    pub fn success(timeseries: TimeSeries, duration_seconds: f64) -> Self {
        Self {
            success: true,
            timeseries,
            metadata: HashMap::new(),
            duration_seconds,
            cached: false,
            error: None,
        }
    }

    pub fn failure(error: impl Into<String>) -> Self {
        Self {
            success: false,
            timeseries: TimeSeries::default(),
            metadata: HashMap::new(),
            duration_seconds: 0.0,
            cached: false,
            error: Some(error.into()),
        }
    }

    /// 标记为缓存命中结果
    pub fn from_cache(mut self) -> Self {
        self.cached = true;
        self.duration_seconds = 0.0;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_timeseries_consistency() {
        let ts = TimeSeries::new(vec![0.0, 0.5, 1.0])
            .with_signal("x", vec![1.0, 2.0, 3.0])
            .with_signal("y", vec![0.1, 0.2, 0.3]);
        assert!(ts.is_consistent());
        assert_eq!(ts.len(), 3);
        assert_eq!(ts.signal("y").unwrap().values[2], 0.3);

        let bad = TimeSeries::new(vec![0.0, 1.0]).with_signal("x", vec![1.0]);
        assert!(!bad.is_consistent());
    }

    #[test]
    fn test_cached_outcome_zeroes_duration() {
        let outcome = SimulationOutcome::success(TimeSeries::default(), 12.5).from_cache();
        assert!(outcome.cached);
        assert_eq!(outcome.duration_seconds, 0.0);
    }
}
