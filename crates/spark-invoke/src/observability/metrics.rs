use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;

/// 指标描述符：名称、描述与单位在编译期固定。
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct InstrumentDescriptor {
    name: &'static str,
    description: &'static str,
    unit: &'static str,
}

impl InstrumentDescriptor {
    pub const fn new(name: &'static str) -> Self {
        Self {
            name,
            description: "",
            unit: "",
        }
    }

    pub const fn with_description(mut self, description: &'static str) -> Self {
        self.description = description;
        self
    }

    pub const fn with_unit(mut self, unit: &'static str) -> Self {
        self.unit = unit;
        self
    }

    pub const fn name(&self) -> &'static str {
        self.name
    }

    pub const fn description(&self) -> &'static str {
        self.description
    }

    pub const fn unit(&self) -> &'static str {
        self.unit
    }
}

/// 单次调用端到端耗时直方图。
pub const INVOKE_DURATION: InstrumentDescriptor = InstrumentDescriptor::new("spark.invoke.duration")
    .with_description("单次调用从解析到响应过滤完成的耗时")
    .with_unit("ms");

/// 结构化标签键常量。
pub const ATTR_INSTALLATION_ID: &str = "spark.invoke.installation_id";
pub const ATTR_STRATEGY: &str = "spark.invoke.strategy";
pub const ATTR_SERVICE: &str = "spark.invoke.service";
pub const ATTR_METHOD: &str = "spark.invoke.method";
pub const ATTR_OUTCOME: &str = "spark.invoke.outcome";

/// 成功调用的 outcome 标签值；失败时使用错误码。
pub const OUTCOME_SUCCESS: &str = "success";
/// 端点尚未解析出策略时的 strategy 标签值。
pub const STRATEGY_UNRESOLVED: &str = "unresolved";

/// 一次调用的指标标签。
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct InvocationLabels {
    pub installation_id: Arc<str>,
    pub strategy: &'static str,
    pub service: Arc<str>,
    pub method: Arc<str>,
    pub outcome: &'static str,
}

impl InvocationLabels {
    /// 以 `(键, 值)` 形式导出，供外部指标后端直接使用。
    pub fn attributes(&self) -> [(&'static str, &str); 5] {
        [
            (ATTR_INSTALLATION_ID, &*self.installation_id),
            (ATTR_STRATEGY, self.strategy),
            (ATTR_SERVICE, &*self.service),
            (ATTR_METHOD, &*self.method),
            (ATTR_OUTCOME, self.outcome),
        ]
    }
}

/// 指标记录契约。
///
/// # 契约说明（What）
/// - 每次调用恰好记录一次，无论成功与否；
/// - 实现必须廉价且不可阻塞，记录失败应自行吞掉，不得影响调用结果。
pub trait InvocationMetrics: Send + Sync + 'static {
    fn record_duration(&self, instrument: &InstrumentDescriptor, elapsed: Duration, labels: &InvocationLabels);
}

/// 丢弃所有记录。
#[derive(Clone, Copy, Debug, Default)]
pub struct NoopMetrics;

impl InvocationMetrics for NoopMetrics {
    fn record_duration(&self, _: &InstrumentDescriptor, _: Duration, _: &InvocationLabels) {}
}

/// 一条内存中的耗时记录。
#[derive(Clone, Debug, PartialEq)]
pub struct DurationRecord {
    pub instrument: &'static str,
    pub elapsed: Duration,
    pub labels: InvocationLabels,
}

/// 内存指标收集器，便于测试断言标签。
#[derive(Debug, Default)]
pub struct InMemoryMetrics {
    records: Mutex<Vec<DurationRecord>>,
}

impl InMemoryMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn records(&self) -> Vec<DurationRecord> {
        self.records.lock().clone()
    }

    pub fn len(&self) -> usize {
        self.records.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.lock().is_empty()
    }

    /// 按 outcome 统计记录条数。
    pub fn count_outcome(&self, outcome: &str) -> usize {
        self.records
            .lock()
            .iter()
            .filter(|record| record.labels.outcome == outcome)
            .count()
    }
}

impl InvocationMetrics for InMemoryMetrics {
    fn record_duration(&self, instrument: &InstrumentDescriptor, elapsed: Duration, labels: &InvocationLabels) {
        self.records.lock().push(DurationRecord {
            instrument: instrument.name(),
            elapsed,
            labels: labels.clone(),
        });
    }
}
