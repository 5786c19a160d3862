//! 审计采样：为开启采样的端点记录每次调用的摘要，持久化在调用线程之外完成。
//!
//! # 设计背景（Why）
//! - 采样持久化（写盘、写库）可能很慢，绝不能拖慢业务调用；
//! - 热路径只做一次 `try_send`，队列满时丢弃样本并以 `warn` 记录，而不是阻塞调用方。
//!
//! # 契约（What）
//! - [`AuditSampler`] 持有一个后台线程与有界队列，样本按提交顺序交给 [`SampleSink`]；
//! - [`AuditSampler::shutdown`] 关闭队列并等待后台线程处理完已入队的样本；
//! - 样本的持久化格式由 [`SampleSink`] 实现决定。

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

use arc_swap::ArcSwapOption;
use crossbeam_channel::{Receiver, Sender, TrySendError};
use parking_lot::Mutex;
use serde::Serialize;
use thiserror::Error;
use tracing::{debug, warn};

use crate::error::BoxError;

/// 默认队列容量。
pub const DEFAULT_QUEUE_CAPACITY: usize = 1024;

/// 一条审计样本。
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct SampleRecord {
    pub installation_id: String,
    pub service: String,
    pub path: String,
    pub strategy: &'static str,
    pub variant: String,
    pub client_version: String,
    /// `success` 或稳定错误码。
    pub outcome: String,
    pub started_at_unix_ms: u64,
    pub duration_micros: u64,
}

/// 采样持久化失败。
#[derive(Debug, Error)]
pub enum SampleError {
    #[error("sample sink rejected the record: {reason}")]
    Rejected {
        reason: String,
        #[source]
        source: Option<BoxError>,
    },

    #[error("failed to start sampling worker: {0}")]
    Spawn(#[source] std::io::Error),
}

impl SampleError {
    pub fn rejected(reason: impl Into<String>) -> Self {
        SampleError::Rejected {
            reason: reason.into(),
            source: None,
        }
    }
}

/// 样本持久化契约，在后台线程上被调用。
pub trait SampleSink: Send + Sync + 'static {
    fn persist(&self, record: SampleRecord) -> Result<(), SampleError>;
}

/// 已开启、尚未关闭的样本。
///
/// 调度器在进入 `Executing` 之前打开，调用结束后以 outcome 关闭。
#[derive(Debug)]
pub struct OpenSample {
    started: Instant,
    started_at_unix_ms: u64,
    installation_id: String,
    service: String,
    path: String,
    strategy: &'static str,
    variant: String,
    client_version: String,
}

impl OpenSample {
    pub fn open(
        installation_id: impl Into<String>,
        service: impl Into<String>,
        path: impl Into<String>,
        strategy: &'static str,
        variant: impl Into<String>,
        client_version: impl Into<String>,
    ) -> Self {
        let started_at_unix_ms = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|elapsed| u64::try_from(elapsed.as_millis()).unwrap_or(u64::MAX))
            .unwrap_or(0);
        Self {
            started: Instant::now(),
            started_at_unix_ms,
            installation_id: installation_id.into(),
            service: service.into(),
            path: path.into(),
            strategy,
            variant: variant.into(),
            client_version: client_version.into(),
        }
    }

    /// 以调用结果关闭样本。
    pub fn close(self, outcome: &str) -> SampleRecord {
        let duration_micros = saturating_micros(self.started.elapsed());
        SampleRecord {
            installation_id: self.installation_id,
            service: self.service,
            path: self.path,
            strategy: self.strategy,
            variant: self.variant,
            client_version: self.client_version,
            outcome: outcome.to_owned(),
            started_at_unix_ms: self.started_at_unix_ms,
            duration_micros,
        }
    }
}

/// 后台采样器。
///
/// # 教案式说明
/// - **提交 (How)**：发送端以 `ArcSwapOption` 持有，热路径加载快照后 `try_send`，不持有任何锁；
/// - **背压**：队列满或已关闭时样本被丢弃，计入 [`Self::dropped`]，并以 `warn` 记录；
/// - **关闭**：[`Self::shutdown`] 摘除发送端后等待后台线程退出；`Drop` 时自动执行。
pub struct AuditSampler {
    sender: ArcSwapOption<Sender<SampleRecord>>,
    worker: Mutex<Option<JoinHandle<()>>>,
    dropped: AtomicU64,
    persisted: Arc<AtomicU64>,
}

impl AuditSampler {
    /// 启动后台线程。
    pub fn spawn(sink: Arc<dyn SampleSink>, capacity: usize) -> Result<Self, SampleError> {
        let (sender, receiver) = crossbeam_channel::bounded(capacity.max(1));
        let persisted = Arc::new(AtomicU64::new(0));
        let worker_persisted = Arc::clone(&persisted);
        let worker = thread::Builder::new()
            .name("spark-invoke-sampler".to_owned())
            .spawn(move || drain(receiver, sink, worker_persisted))
            .map_err(SampleError::Spawn)?;
        Ok(Self {
            sender: ArcSwapOption::from_pointee(sender),
            worker: Mutex::new(Some(worker)),
            dropped: AtomicU64::new(0),
            persisted,
        })
    }

    /// 非阻塞提交样本。
    pub fn submit(&self, record: SampleRecord) {
        let sender = self.sender.load();
        let Some(sender) = sender.as_deref() else {
            self.dropped.fetch_add(1, Ordering::Relaxed);
            warn!(service = %record.service, path = %record.path, "sampler is shut down, dropping sample");
            return;
        };
        match sender.try_send(record) {
            Ok(()) => {}
            Err(TrySendError::Full(record)) => {
                self.dropped.fetch_add(1, Ordering::Relaxed);
                warn!(service = %record.service, path = %record.path, "sample queue full, dropping sample");
            }
            Err(TrySendError::Disconnected(record)) => {
                self.dropped.fetch_add(1, Ordering::Relaxed);
                warn!(service = %record.service, path = %record.path, "sampling worker gone, dropping sample");
            }
        }
    }

    /// 被丢弃的样本数。
    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }

    /// 已成功持久化的样本数。
    pub fn persisted(&self) -> u64 {
        self.persisted.load(Ordering::Acquire)
    }

    /// 关闭队列并等待已入队样本处理完毕；可重复调用。
    pub fn shutdown(&self) {
        drop(self.sender.swap(None));
        if let Some(worker) = self.worker.lock().take()
            && worker.join().is_err()
        {
            warn!("sampling worker panicked during shutdown");
        }
    }
}

impl Drop for AuditSampler {
    fn drop(&mut self) {
        self.shutdown();
    }
}

/// 耗时的微秒数，超出 `u64` 时饱和。
pub(crate) fn saturating_micros(elapsed: Duration) -> u64 {
    u64::try_from(elapsed.as_micros()).unwrap_or(u64::MAX)
}

fn drain(receiver: Receiver<SampleRecord>, sink: Arc<dyn SampleSink>, persisted: Arc<AtomicU64>) {
    for record in receiver {
        let service = record.service.clone();
        match sink.persist(record) {
            Ok(()) => {
                persisted.fetch_add(1, Ordering::AcqRel);
            }
            Err(err) => warn!(%service, error = %err, "failed to persist audit sample"),
        }
    }
    debug!("sampling worker drained");
}

/// 内存样本存储，可注入固定延迟以模拟慢速持久化。
#[derive(Debug, Default)]
pub struct InMemorySampleSink {
    records: Mutex<Vec<SampleRecord>>,
    latency: Option<Duration>,
}

impl InMemorySampleSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_latency(latency: Duration) -> Self {
        Self {
            records: Mutex::new(Vec::new()),
            latency: Some(latency),
        }
    }

    pub fn records(&self) -> Vec<SampleRecord> {
        self.records.lock().clone()
    }

    pub fn len(&self) -> usize {
        self.records.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.lock().is_empty()
    }
}

impl SampleSink for InMemorySampleSink {
    fn persist(&self, record: SampleRecord) -> Result<(), SampleError> {
        if let Some(latency) = self.latency {
            thread::sleep(latency);
        }
        self.records.lock().push(record);
        Ok(())
    }
}
