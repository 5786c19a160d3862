//! 调用链路的可观测性：耗时指标、审计采样与日志订阅器安装。
//!
//! - [`metrics`]：`spark.invoke.duration` 直方图的描述符、标签与记录契约；
//! - [`sampling`]：审计样本在后台线程持久化，热路径只做一次非阻塞入队；
//! - `logging`（`subscriber` 特性）：一次性安装 `tracing-subscriber` 全局订阅器。
//!
//! 可观测性只做加法：任何记录失败都不会改变调用结果。

pub mod metrics;
pub mod sampling;

#[cfg(feature = "subscriber")]
pub mod logging;

pub use metrics::{
    INVOKE_DURATION, InMemoryMetrics, InstrumentDescriptor, InvocationLabels, InvocationMetrics, NoopMetrics,
};
pub use sampling::{AuditSampler, InMemorySampleSink, OpenSample, SampleError, SampleRecord, SampleSink};
