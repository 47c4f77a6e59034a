//! 应用配置模型
//!
//! 配置来源按优先级叠加：默认值 < TOML 配置文件 < `SIMBATCH` 前缀
//! 环境变量。所有校验在构造/加载时同步完成，不会推迟到异步管线中。

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::errors::{SimResult, SimulationError};

/// 缓存索引后端类型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CacheBackendKind {
    /// 文件系统后端，每个键一个文件
    Filesystem,
    /// 进程内内存后端，适用于测试和嵌入式场景
    Memory,
}

/// 时间序列载荷的序列化格式
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CodecKind {
    /// 列式二进制（bincode）
    Bincode,
    /// 层次化文本（JSON）
    Json,
    /// 纯分隔文本（CSV 形式）
    Csv,
}

/// 缓存子系统配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheConfig {
    /// 总开关：关闭后读永远未命中，写是空操作
    pub enabled: bool,
    /// 缓存根目录，索引与结果存储各占一个子目录
    pub root_dir: PathBuf,
    pub backend: CacheBackendKind,
    pub codec: CodecKind,
    /// 索引条目默认 TTL（秒），None 表示永不过期
    pub default_ttl_seconds: Option<u64>,
    /// 指纹计算是否读入模型文件内容
    pub include_file_content: bool,
    /// 模型文件不可读时的策略：true 则报错，false 则跳过文件内容继续
    pub strict_file_hashing: bool,
    /// 参与指纹计算前从参数映射中剔除的键（时间戳、运行号等）
    pub ignored_keys: Vec<String>,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            root_dir: PathBuf::from(".simbatch_cache"),
            backend: CacheBackendKind::Filesystem,
            codec: CodecKind::Bincode,
            default_ttl_seconds: None,
            include_file_content: true,
            strict_file_hashing: false,
            ignored_keys: vec!["timestamp".to_string(), "run_id".to_string()],
        }
    }
}

/// 编排器配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrchestratorConfig {
    /// 单个批次最多容纳的任务数
    pub batch_size: usize,
    /// 默认最大重试次数
    pub max_retries: u32,
    /// 失败任务重新入队的延迟（毫秒）
    pub retry_delay_ms: u64,
    /// 调度循环的轮询间隔（毫秒）
    pub poll_interval_ms: u64,
    /// 提交时是否对照模型声明的变量校验参数名
    pub validate_parameters: bool,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            batch_size: 4,
            max_retries: 2,
            retry_delay_ms: 1000,
            poll_interval_ms: 50,
            validate_parameters: false,
        }
    }
}

/// 应用配置
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub cache: CacheConfig,
    #[serde(default)]
    pub orchestrator: OrchestratorConfig,
}

impl AppConfig {
    /// 加载配置：默认值 + 可选 TOML 文件 + 环境变量覆盖
    pub fn load(config_path: Option<&Path>) -> SimResult<Self> {
        let mut builder = config::Config::builder()
            .add_source(config::Config::try_from(&AppConfig::default()).map_err(|e| {
                SimulationError::Configuration(format!("构造默认配置失败: {e}"))
            })?);

        if let Some(path) = config_path {
            builder = builder.add_source(config::File::from(path));
        }

        builder = builder.add_source(
            config::Environment::with_prefix("SIMBATCH")
                .separator("__")
                .try_parsing(true),
        );

        let app_config: AppConfig = builder
            .build()
            .map_err(|e| SimulationError::Configuration(format!("加载配置失败: {e}")))?
            .try_deserialize()
            .map_err(|e| SimulationError::Configuration(format!("解析配置失败: {e}")))?;

        app_config.validate()?;
        Ok(app_config)
    }

    /// 配置合法性校验，在构造时同步报错
    pub fn validate(&self) -> SimResult<()> {
        if self.orchestrator.batch_size == 0 {
            return Err(SimulationError::Configuration(
                "orchestrator.batch_size 必须大于 0".to_string(),
            ));
        }
        if self.orchestrator.poll_interval_ms == 0 {
            return Err(SimulationError::Configuration(
                "orchestrator.poll_interval_ms 必须大于 0".to_string(),
            ));
        }
        if self.cache.enabled && self.cache.root_dir.as_os_str().is_empty() {
            return Err(SimulationError::Configuration(
                "cache.root_dir 不能为空".to_string(),
            ));
        }
        if let Some(ttl) = self.cache.default_ttl_seconds {
            if ttl == 0 {
                return Err(SimulationError::Configuration(
                    "cache.default_ttl_seconds 为 0 没有意义，永不过期请使用 None".to_string(),
                ));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_default_config_is_valid() {
        let config = AppConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.orchestrator.batch_size, 4);
        assert!(config.cache.enabled);
    }

    #[test]
    fn test_zero_batch_size_rejected() {
        let mut config = AppConfig::default();
        config.orchestrator.batch_size = 0;
        let err = config.validate().unwrap_err();
        assert!(matches!(err, SimulationError::Configuration(_)));
    }

    #[test]
    fn test_zero_ttl_rejected() {
        let mut config = AppConfig::default();
        config.cache.default_ttl_seconds = Some(0);
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_load_from_toml_file() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("simbatch.toml");
        let mut file = std::fs::File::create(&path).unwrap();
        writeln!(
            file,
            r#"
[orchestrator]
batch_size = 8
max_retries = 5

[cache]
enabled = false
codec = "json"
"#
        )
        .unwrap();

        let config = AppConfig::load(Some(&path)).unwrap();
        assert_eq!(config.orchestrator.batch_size, 8);
        assert_eq!(config.orchestrator.max_retries, 5);
        assert!(!config.cache.enabled);
        assert_eq!(config.cache.codec, CodecKind::Json);
        // 未出现的字段保持默认值
        assert_eq!(config.orchestrator.retry_delay_ms, 1000);
    }
}
