//! 编排器端到端行为测试：假引擎驱动完整的调度/重试/取消路径。

use std::collections::{BTreeMap, VecDeque};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::json;
use tempfile::TempDir;

use simbatch_cache::SimulationCache;
use simbatch_core::{
    BatchSimulator, CacheBackendKind, CacheConfig, ModelInspector, ModelRef, OrchestratorConfig,
    RawOutput, SimResult, SimulationError, SimulationRequest, TaskPriority, TaskState,
};
use simbatch_orchestrator::{BatchExecutor, SimulationOrchestrator};

/// 假引擎的单次响应脚本
enum Response {
    /// 为每个参数集返回一条成功时间序列
    OkAll,
    /// 为每个参数集返回失败标记
    FailAll(&'static str),
    /// 传输层错误
    TransportError,
    /// 接口违约：返回数量与提交数量不一致
    WrongCardinality,
}

/// 可脚本化的假引擎，记录每次调用收到的参数集
struct FakeEngine {
    script: std::sync::Mutex<VecDeque<Response>>,
    calls: std::sync::Mutex<Vec<Vec<BTreeMap<String, serde_json::Value>>>>,
    delay: Option<Duration>,
}

impl FakeEngine {
    fn new(script: Vec<Response>) -> Self {
        Self {
            script: std::sync::Mutex::new(script.into()),
            calls: std::sync::Mutex::new(Vec::new()),
            delay: None,
        }
    }

    fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }

    fn recorded_calls(&self) -> Vec<Vec<BTreeMap<String, serde_json::Value>>> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl BatchSimulator for FakeEngine {
    async fn simulate_batch(
        &self,
        _model_name: &str,
        parameter_sets: Vec<BTreeMap<String, serde_json::Value>>,
    ) -> SimResult<Vec<RawOutput>> {
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        let n = parameter_sets.len();
        self.calls.lock().unwrap().push(parameter_sets);
        // 脚本耗尽后默认全部成功
        let response = self
            .script
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or(Response::OkAll);
        match response {
            Response::OkAll => Ok((0..n)
                .map(|_| RawOutput::Series {
                    time: vec![0.0, 1.0],
                    signals: vec![("y".to_string(), vec![0.0, 1.0])],
                })
                .collect()),
            Response::FailAll(message) => Ok((0..n)
                .map(|_| RawOutput::Failure {
                    message: message.to_string(),
                })
                .collect()),
            Response::TransportError => Err(SimulationError::Engine("连接被重置".to_string())),
            Response::WrongCardinality => Ok(vec![]),
        }
    }
}

struct Fixture {
    orchestrator: SimulationOrchestrator,
    engine: Arc<FakeEngine>,
    _dir: TempDir,
}

fn fixture(engine: FakeEngine, config: OrchestratorConfig) -> Fixture {
    let dir = TempDir::new().unwrap();
    let cache_config = CacheConfig {
        root_dir: dir.path().to_path_buf(),
        backend: CacheBackendKind::Memory,
        include_file_content: false,
        ..CacheConfig::default()
    };
    let cache = Arc::new(SimulationCache::from_config(&cache_config).unwrap());
    let engine = Arc::new(engine);
    let executor = Arc::new(BatchExecutor::new(engine.clone()));
    let orchestrator = SimulationOrchestrator::new(cache, executor, config).unwrap();
    Fixture {
        orchestrator,
        engine,
        _dir: dir,
    }
}

fn fast_config() -> OrchestratorConfig {
    OrchestratorConfig {
        batch_size: 4,
        max_retries: 2,
        retry_delay_ms: 10,
        poll_interval_ms: 10,
        validate_parameters: false,
    }
}

fn request(gain: f64) -> SimulationRequest {
    SimulationRequest::new(ModelRef::from_path("/models/plant.fmu"))
        .with_parameter("gain", json!(gain))
}

#[tokio::test]
async fn test_single_task_completes() {
    let f = fixture(FakeEngine::new(vec![]), fast_config());
    let id = f
        .orchestrator
        .submit(request(1.0), TaskPriority::Normal, true)
        .await
        .unwrap();

    let task = f
        .orchestrator
        .wait_for_completion(&id, Duration::from_secs(5))
        .await
        .expect("任务应在超时前完成");
    assert_eq!(task.state, TaskState::Completed);
    let outcome = task.result.unwrap();
    assert!(outcome.success);
    assert!(!outcome.cached);
    assert_eq!(f.engine.call_count(), 1);

    let stats = f.orchestrator.stats().await;
    assert_eq!(stats.submitted, 1);
    assert_eq!(stats.completed, 1);
    assert_eq!(stats.active, 0);
}

#[tokio::test]
async fn test_ten_identical_requests_one_batch_nine_hits() {
    let mut config = fast_config();
    config.batch_size = 1;
    let f = fixture(FakeEngine::new(vec![]), config);

    let mut ids = Vec::new();
    for _ in 0..10 {
        ids.push(
            f.orchestrator
                .submit(request(1.0), TaskPriority::Normal, true)
                .await
                .unwrap(),
        );
    }

    assert!(f.orchestrator.wait_for_all(Duration::from_secs(10)).await);

    // 恰好一次批量执行（批大小 1），其余 9 个任务由缓存完成
    assert_eq!(f.engine.call_count(), 1);
    let mut cached = 0;
    for id in &ids {
        let task = f.orchestrator.get_status(id).await.unwrap();
        assert_eq!(task.state, TaskState::Completed);
        if task.result.unwrap().cached {
            cached += 1;
        }
    }
    assert_eq!(cached, 9);

    let stats = f.orchestrator.stats().await;
    assert_eq!(stats.cache_hits, 9);
    assert_eq!(stats.batches, 1);
}

#[tokio::test]
async fn test_priority_dispatch_order() {
    let mut config = fast_config();
    config.batch_size = 1;
    config.poll_interval_ms = 50;
    // 缓存开着也无妨：三个请求参数互不相同
    let f = fixture(FakeEngine::new(vec![]), config);

    f.orchestrator
        .submit(request(1.0), TaskPriority::Low, false)
        .await
        .unwrap();
    f.orchestrator
        .submit(request(2.0), TaskPriority::Critical, false)
        .await
        .unwrap();
    f.orchestrator
        .submit(request(3.0), TaskPriority::Normal, false)
        .await
        .unwrap();

    assert!(f.orchestrator.wait_for_all(Duration::from_secs(10)).await);

    let calls = f.engine.recorded_calls();
    assert_eq!(calls.len(), 3);
    let gains: Vec<f64> = calls
        .iter()
        .map(|batch| batch[0]["gain"].as_f64().unwrap())
        .collect();
    // CRITICAL → NORMAL → LOW
    assert_eq!(gains, vec![2.0, 3.0, 1.0]);
}

#[tokio::test]
async fn test_retry_exhaustion_reaches_failed() {
    let f = fixture(
        FakeEngine::new(vec![
            Response::FailAll("发散"),
            Response::FailAll("发散"),
            Response::FailAll("发散"),
        ]),
        fast_config(),
    );
    let id = f
        .orchestrator
        .submit(request(1.0), TaskPriority::Normal, false)
        .await
        .unwrap();

    let task = f
        .orchestrator
        .wait_for_completion(&id, Duration::from_secs(10))
        .await
        .unwrap();
    assert_eq!(task.state, TaskState::Failed);
    assert_eq!(task.retry_count, task.max_retries);
    assert_eq!(task.error.as_deref(), Some("发散"));
    // 首次执行 + 两次重试
    assert_eq!(f.engine.call_count(), 3);

    let stats = f.orchestrator.stats().await;
    assert_eq!(stats.failed, 1);
    assert_eq!(stats.active, 0);
    assert_eq!(stats.queue_depth, 0);
}

#[tokio::test]
async fn test_transport_failure_then_recovery() {
    let f = fixture(
        FakeEngine::new(vec![Response::TransportError, Response::OkAll]),
        fast_config(),
    );
    let id = f
        .orchestrator
        .submit(request(1.0), TaskPriority::Normal, false)
        .await
        .unwrap();

    let task = f
        .orchestrator
        .wait_for_completion(&id, Duration::from_secs(10))
        .await
        .unwrap();
    assert_eq!(task.state, TaskState::Completed);
    assert_eq!(task.retry_count, 1);
    assert_eq!(f.engine.call_count(), 2);
}

#[tokio::test]
async fn test_cardinality_violation_fails_batch_without_retry() {
    let f = fixture(FakeEngine::new(vec![Response::WrongCardinality]), fast_config());
    let id_a = f
        .orchestrator
        .submit(request(1.0), TaskPriority::Normal, false)
        .await
        .unwrap();
    let id_b = f
        .orchestrator
        .submit(request(2.0), TaskPriority::Normal, false)
        .await
        .unwrap();

    assert!(f.orchestrator.wait_for_all(Duration::from_secs(10)).await);

    for id in [&id_a, &id_b] {
        let task = f.orchestrator.get_status(id).await.unwrap();
        assert_eq!(task.state, TaskState::Failed);
        assert_eq!(task.retry_count, 0, "接口违约不进入重试路径");
    }
    assert_eq!(f.engine.call_count(), 1);
}

#[tokio::test]
async fn test_cancel_queued_task() {
    let mut config = fast_config();
    // 放慢循环，保证取消先于首次出队
    config.poll_interval_ms = 500;
    let f = fixture(FakeEngine::new(vec![]), config);
    let id = f
        .orchestrator
        .submit(request(1.0), TaskPriority::Normal, false)
        .await
        .unwrap();

    assert!(f.orchestrator.cancel(&id).await);
    let task = f
        .orchestrator
        .wait_for_completion(&id, Duration::from_secs(2))
        .await
        .unwrap();
    assert_eq!(task.state, TaskState::Cancelled);
    assert_eq!(f.engine.call_count(), 0);
    assert!(!f.orchestrator.cancel(&id).await);
}

#[tokio::test]
async fn test_cancel_running_task_is_cooperative() {
    let engine = FakeEngine::new(vec![]).with_delay(Duration::from_millis(300));
    let f = fixture(engine, fast_config());
    let id = f
        .orchestrator
        .submit(request(1.0), TaskPriority::Normal, false)
        .await
        .unwrap();

    // 等任务进入 RUNNING
    let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
    loop {
        let task = f.orchestrator.get_status(&id).await.unwrap();
        if task.state == TaskState::Running {
            break;
        }
        assert!(tokio::time::Instant::now() < deadline, "任务未进入运行状态");
        tokio::time::sleep(Duration::from_millis(10)).await;
    }

    assert!(f.orchestrator.cancel(&id).await);
    let task = f
        .orchestrator
        .wait_for_completion(&id, Duration::from_secs(5))
        .await
        .unwrap();
    // 批次跑完，但结果被丢弃
    assert_eq!(task.state, TaskState::Cancelled);
    assert!(task.result.is_none());
    assert_eq!(f.engine.call_count(), 1);
}

#[tokio::test]
async fn test_submit_empty_model_name_rejected() {
    let f = fixture(FakeEngine::new(vec![]), fast_config());
    let request = SimulationRequest::new(ModelRef::new("", "/models/x.fmu"));
    let err = f
        .orchestrator
        .submit(request, TaskPriority::Normal, false)
        .await
        .unwrap_err();
    assert!(matches!(err, SimulationError::InvalidParams(_)));
}

#[tokio::test]
async fn test_parameter_validation_against_inspector() {
    struct StaticInspector;

    #[async_trait]
    impl ModelInspector for StaticInspector {
        async fn declared_variables(
            &self,
            _model: &ModelRef,
        ) -> SimResult<std::collections::HashSet<String>> {
            Ok(["gain".to_string()].into_iter().collect())
        }
    }

    let dir = TempDir::new().unwrap();
    let cache_config = CacheConfig {
        root_dir: dir.path().to_path_buf(),
        backend: CacheBackendKind::Memory,
        include_file_content: false,
        ..CacheConfig::default()
    };
    let cache = Arc::new(SimulationCache::from_config(&cache_config).unwrap());
    let engine = Arc::new(FakeEngine::new(vec![]));
    let executor = Arc::new(BatchExecutor::new(engine));
    let mut config = fast_config();
    config.validate_parameters = true;
    let orchestrator = SimulationOrchestrator::with_inspector(
        cache,
        executor,
        Some(Arc::new(StaticInspector)),
        config,
    )
    .unwrap();

    // 合法参数通过
    orchestrator
        .submit(request(1.0), TaskPriority::Normal, false)
        .await
        .unwrap();

    // 未声明的变量同步拒绝
    let bad = SimulationRequest::new(ModelRef::from_path("/models/plant.fmu"))
        .with_parameter("typo", json!(1.0));
    let err = orchestrator
        .submit(bad, TaskPriority::Normal, false)
        .await
        .unwrap_err();
    assert!(matches!(err, SimulationError::InvalidParams(_)));
}

#[tokio::test]
async fn test_get_status_unknown_id() {
    let f = fixture(FakeEngine::new(vec![]), fast_config());
    assert!(f.orchestrator.get_status("不存在").await.is_none());
    assert!(f
        .orchestrator
        .wait_for_completion("不存在", Duration::from_millis(100))
        .await
        .is_none());
}

#[tokio::test]
async fn test_wait_for_all_times_out_while_pending() {
    let engine = FakeEngine::new(vec![]).with_delay(Duration::from_millis(500));
    let f = fixture(engine, fast_config());
    f.orchestrator
        .submit(request(1.0), TaskPriority::Normal, false)
        .await
        .unwrap();
    assert!(!f.orchestrator.wait_for_all(Duration::from_millis(50)).await);
    assert!(f.orchestrator.wait_for_all(Duration::from_secs(10)).await);
}

#[tokio::test]
async fn test_mixed_models_split_across_batches() {
    let f = fixture(FakeEngine::new(vec![]), fast_config());
    let req_a = SimulationRequest::new(ModelRef::from_path("/models/alpha.fmu"))
        .with_parameter("g", json!(1.0));
    let req_b = SimulationRequest::new(ModelRef::from_path("/models/beta.fmu"))
        .with_parameter("g", json!(2.0));

    let id_a = f
        .orchestrator
        .submit(req_a, TaskPriority::Normal, false)
        .await
        .unwrap();
    let id_b = f
        .orchestrator
        .submit(req_b, TaskPriority::Normal, false)
        .await
        .unwrap();

    assert!(f.orchestrator.wait_for_all(Duration::from_secs(10)).await);
    // 不同模型不会混进同一次引擎调用
    assert_eq!(f.engine.call_count(), 2);
    for id in [&id_a, &id_b] {
        let task = f.orchestrator.get_status(id).await.unwrap();
        assert_eq!(task.state, TaskState::Completed);
    }
}

#[tokio::test]
async fn test_shutdown_stops_scheduling() {
    let f = fixture(FakeEngine::new(vec![]), fast_config());
    let id = f
        .orchestrator
        .submit(request(1.0), TaskPriority::Normal, false)
        .await
        .unwrap();
    assert!(f.orchestrator.wait_for_all(Duration::from_secs(5)).await);
    f.orchestrator.shutdown();
    tokio::time::sleep(Duration::from_millis(50)).await;

    // 已完成任务仍可查询
    let task = f.orchestrator.get_status(&id).await.unwrap();
    assert!(task.state.is_terminal());
}
