use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

/// 仿真模型引用
///
/// 指向外部仿真引擎可加载的模型文件，`name` 是引擎侧的模型名，
/// `path` 是模型文件在磁盘上的位置（用于内容指纹计算）。
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModelRef {
    pub name: String,
    pub path: PathBuf,
}

impl ModelRef {
    /// 从模型文件路径创建引用，模型名取文件名主干
    pub fn from_path(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let name = path
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_default();
        Self { name, path }
    }

    pub fn new(name: impl Into<String>, path: impl Into<PathBuf>) -> Self {
        Self {
            name: name.into(),
            path: path.into(),
        }
    }

    /// 规范化字符串形式，参与内容指纹计算，必须保持稳定
    pub fn canonical_string(&self) -> String {
        format!("{}@{}", self.name, self.path.display())
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

/// 仿真请求
///
/// 一次仿真的完整描述：模型引用、参数映射、可选的仿真时长和
/// 自由格式的元数据。参数使用 BTreeMap 保证键序稳定，
/// 使同一组参数无论构造顺序如何都产生相同的内容指纹。
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SimulationRequest {
    pub model: ModelRef,
    pub parameters: BTreeMap<String, serde_json::Value>,
    /// 显式仿真时长（秒），None 表示使用模型默认值
    pub stop_time: Option<f64>,
    #[serde(default)]
    pub metadata: HashMap<String, String>,
}

impl SimulationRequest {
    pub fn new(model: ModelRef) -> Self {
        Self {
            model,
            parameters: BTreeMap::new(),
            stop_time: None,
            metadata: HashMap::new(),
        }
    }

    pub fn with_parameter(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.parameters.insert(key.into(), value);
        self
    }

    pub fn with_stop_time(mut self, stop_time: f64) -> Self {
        self.stop_time = Some(stop_time);
        self
    }

    /// 有效参数集：显式仿真时长折叠为 `stop_time` 键
    ///
    /// 引擎调用与内容指纹都使用这个视图，保证仅 stop_time 不同的
    /// 两个请求不会共享同一个缓存条目。
    pub fn effective_parameters(&self) -> BTreeMap<String, serde_json::Value> {
        let mut params = self.parameters.clone();
        if let Some(stop_time) = self.stop_time {
            params.insert("stop_time".to_string(), serde_json::json!(stop_time));
        }
        params
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_model_ref_from_path() {
        let model = ModelRef::from_path("/models/plant/Heater.fmu");
        assert_eq!(model.name, "Heater");
        assert_eq!(model.canonical_string(), "Heater@/models/plant/Heater.fmu");
    }

    #[test]
    fn test_parameters_key_order_is_stable() {
        let model = ModelRef::from_path("/models/m.fmu");
        let a = SimulationRequest::new(model.clone())
            .with_parameter("zeta", json!(0.7))
            .with_parameter("alpha", json!(1.0));
        let b = SimulationRequest::new(model)
            .with_parameter("alpha", json!(1.0))
            .with_parameter("zeta", json!(0.7));
        assert_eq!(
            serde_json::to_string(&a.parameters).unwrap(),
            serde_json::to_string(&b.parameters).unwrap()
        );
    }

    #[test]
    fn test_effective_parameters_fold_stop_time() {
        let model = ModelRef::from_path("/models/m.fmu");
        let req = SimulationRequest::new(model)
            .with_parameter("gain", json!(2.0))
            .with_stop_time(10.0);
        let params = req.effective_parameters();
        assert_eq!(params["gain"], json!(2.0));
        assert_eq!(params["stop_time"], json!(10.0));
        // 原始参数映射不被修改
        assert!(!req.parameters.contains_key("stop_time"));
    }
}
