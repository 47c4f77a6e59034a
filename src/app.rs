use std::sync::Arc;

use anyhow::{Context, Result};
use tracing::info;

use simbatch_cache::{CacheStats, SimulationCache};
use simbatch_core::{AppConfig, BatchSimulator, ModelInspector};
use simbatch_orchestrator::{BatchExecutor, ExecutorStats, SimulationOrchestrator};

/// 嵌入式应用
///
/// 按配置把缓存、批量执行器和编排器装配成一个可直接使用的实例。
/// 引擎客户端从外部注入，应用自身不关心引擎的传输细节。
pub struct SimbatchApp {
    config: AppConfig,
    cache: Arc<SimulationCache>,
    executor: Arc<BatchExecutor>,
    orchestrator: SimulationOrchestrator,
}

impl SimbatchApp {
    /// 创建应用实例
    pub fn new(config: AppConfig, engine: Arc<dyn BatchSimulator>) -> Result<Self> {
        Self::with_inspector(config, engine, None)
    }

    /// 创建应用实例并挂载模型解析器
    pub fn with_inspector(
        config: AppConfig,
        engine: Arc<dyn BatchSimulator>,
        inspector: Option<Arc<dyn ModelInspector>>,
    ) -> Result<Self> {
        config.validate().context("应用配置校验失败")?;
        info!(
            cache_enabled = config.cache.enabled,
            batch_size = config.orchestrator.batch_size,
            "初始化仿真编排应用"
        );

        let cache = Arc::new(
            SimulationCache::from_config(&config.cache).context("初始化缓存子系统失败")?,
        );
        let executor = Arc::new(BatchExecutor::new(engine));
        let orchestrator = SimulationOrchestrator::with_inspector(
            cache.clone(),
            executor.clone(),
            inspector,
            config.orchestrator.clone(),
        )
        .context("初始化编排器失败")?;

        Ok(Self {
            config,
            cache,
            executor,
            orchestrator,
        })
    }

    pub fn orchestrator(&self) -> &SimulationOrchestrator {
        &self.orchestrator
    }

    pub fn cache(&self) -> &Arc<SimulationCache> {
        &self.cache
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    pub async fn cache_stats(&self) -> Result<CacheStats> {
        Ok(self.cache.stats().await?)
    }

    pub async fn executor_stats(&self) -> ExecutorStats {
        self.executor.stats().await
    }

    /// 停止调度循环；已入队但未执行的任务保持排队状态
    pub fn shutdown(&self) {
        info!("关闭仿真编排应用");
        self.orchestrator.shutdown();
    }
}
