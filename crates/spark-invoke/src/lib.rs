//! # spark-invoke
//!
//! ## 定位与职责（Why）
//! - 把对逻辑服务操作的调用解析为具体实现（进程内 Handler 或远端实例），按选定的执行策略执行；
//! - 在请求进入 Handler 之前、响应返回客户端之前，按客户端版本改写载荷，
//!   使旧线格式的客户端在规范领域模型演进后仍可正常工作。
//!
//! ## 架构嵌入（Where）
//! - `registry`：端点注册与优先级解析，按服务缓存解析结果；
//! - `strategy`：`local_only`、`remote_only`、`remote_first`、`simulated_remote` 四种执行策略与远端传输契约；
//! - `filter`：按方向、路径与版本区间选择的兼容过滤管线；
//! - `context`：单次调用上下文与调用级覆盖合并；
//! - `config`：TOML 策略配置与热更新；
//! - `invoker`：串联上述组件的调度器与调用桩；
//! - `deferred`：调用作用域覆盖（`defer(..).using(..).execute()`）；
//! - `observability`：耗时指标、后台审计采样与日志订阅器安装；
//! - `error`：带稳定错误码的错误分类。
//!
//! ## 调用链路（How）
//! 调用方 → 注册表解析描述符 → 构造上下文（配置 + 声明策略 + 调用级覆盖）→ 请求过滤 →
//! 策略执行 → 响应过滤 → 指标与采样 → 结果。
//!
//! ## Feature 策略（Trade-offs）
//! - `subscriber`（默认开启）提供 `observability::logging::install`；已有可观测体系的宿主可关闭，
//!   仅保留 `tracing` 事件输出。

pub mod codec;
pub mod config;
pub mod context;
pub mod deferred;
pub mod error;
pub mod filter;
pub mod invoker;
pub mod observability;
pub mod registry;
pub mod strategy;
pub mod value;
pub mod version;

pub use codec::{JsonWireCodec, WireCodec};
pub use config::{EndpointConfig, InvocationConfig, ServiceConfig, StrategyConfigStore};
pub use context::{InvocationContext, InvocationState, MethodId, Overrides, ProfileId};
pub use deferred::{Deferred, defer};
pub use error::{
    BoxError, CodecError, ConfigError, FilterError, HandlerError, InvokeError, RangeError, RegistrationError,
    RemoteFailure,
};
pub use filter::{Direction, FilterDescriptor, FilterPipeline};
pub use invoker::{InvocationRequest, Invoker, InvokerBuilder, ServiceClient};
pub use registry::{
    EndpointDescriptor, EndpointHandler, EndpointRegistry, RegistrationTable, Resolution, ServiceDescriptor, Variant,
};
pub use strategy::{InvocationStrategy, RemoteCall, RemoteCaller, StrategyKind};
pub use value::{Record, TypeTag, Value};
pub use version::{ClientVersion, VersionRange};
