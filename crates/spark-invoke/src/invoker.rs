//! 调度器：把一次逻辑调用串成“解析 → 请求过滤 → 策略执行 → 响应过滤 → 观测”的完整链路。
//!
//! # 设计背景（Why）
//! - 取代动态代理：调用方显式构造 [`InvocationRequest`]，或通过绑定了服务与客户端版本的
//!   [`ServiceClient`] 发起调用；
//! - 所有步骤在调用线程上同步完成，上下文由本次调用独占。
//!
//! # 契约（What）
//! - 策略与过滤器返回的错误原样透传；
//! - 响应过滤失败时即便 Handler 已成功执行也返回过滤错误（已知限制：副作用已经发生）；
//! - 无论成败都恰好记录一次 `spark.invoke.duration`；开启采样的端点另外提交一条审计样本。

use std::sync::Arc;
use std::time::Instant;

use tracing::{debug, debug_span, warn};

use crate::codec::{JsonWireCodec, WireCodec};
use crate::config::{InvocationConfig, StrategyConfigStore};
use crate::context::{InvocationContext, InvocationState, MethodId, Overrides};
use crate::deferred;
use crate::error::InvokeError;
use crate::filter::{Direction, FilterPipeline};
use crate::observability::metrics::{OUTCOME_SUCCESS, STRATEGY_UNRESOLVED};
use crate::observability::sampling::saturating_micros;
use crate::observability::{AuditSampler, INVOKE_DURATION, InvocationLabels, InvocationMetrics, NoopMetrics, OpenSample};
use crate::registry::{EndpointRegistry, Resolution};
use crate::strategy::{RemoteCaller, StrategyEnv, UnconfiguredRemote};
use crate::value::Value;
use crate::version::ClientVersion;

/// 一次调用请求。
#[derive(Clone, Debug)]
pub struct InvocationRequest {
    method: MethodId,
    client_version: ClientVersion,
    args: Vec<Value>,
    overrides: Overrides,
    canonical: bool,
}

impl InvocationRequest {
    pub fn new(service: impl Into<Arc<str>>, path: impl Into<Arc<str>>, args: Vec<Value>) -> Self {
        Self {
            method: MethodId::new(service, path),
            client_version: ClientVersion::Unknown,
            args,
            overrides: Overrides::new(),
            canonical: false,
        }
    }

    pub fn with_client_version(mut self, version: impl Into<ClientVersion>) -> Self {
        self.client_version = version.into();
        self
    }

    /// 显式携带调用级覆盖；与调用作用域槽位中的覆盖同时存在时，槽位中的非平凡字段优先。
    pub fn with_overrides(mut self, overrides: Overrides) -> Self {
        self.overrides = overrides;
        self
    }

    /// 标记参数已是规范形状，请求与响应过滤都不再运行。
    ///
    /// 远端实例执行经 [`RemoteCall`](crate::strategy::RemoteCall) 转发过来的调用时使用，
    /// 保证每个方向的过滤在整条链路上只运行一次。
    pub fn canonical(mut self) -> Self {
        self.canonical = true;
        self
    }

    pub fn method(&self) -> &MethodId {
        &self.method
    }

    pub fn client_version(&self) -> &ClientVersion {
        &self.client_version
    }

    pub fn args(&self) -> &[Value] {
        &self.args
    }

    pub fn overrides(&self) -> &Overrides {
        &self.overrides
    }

    pub fn is_canonical(&self) -> bool {
        self.canonical
    }
}

/// 调度器。
///
/// # 教案式说明
/// - **协作者 (What)**：注册表、过滤管线、策略配置、远端传输、线格式编解码、指标与可选的采样器；
///   全部以 `Arc` 共享，可跨线程并发调度；
/// - **构造 (How)**：通过 [`Invoker::builder`] 组装，未提供的协作者使用安全缺省值
///   （空注册表、空过滤管线、缺省配置、[`UnconfiguredRemote`]、[`JsonWireCodec`]、[`NoopMetrics`]）。
pub struct Invoker {
    registry: Arc<EndpointRegistry>,
    filters: Arc<FilterPipeline>,
    config: Arc<StrategyConfigStore>,
    remote: Arc<dyn RemoteCaller>,
    codec: Arc<dyn WireCodec>,
    metrics: Arc<dyn InvocationMetrics>,
    sampler: Option<Arc<AuditSampler>>,
}

impl Invoker {
    pub fn builder() -> InvokerBuilder {
        InvokerBuilder::default()
    }

    pub fn registry(&self) -> &Arc<EndpointRegistry> {
        &self.registry
    }

    pub fn filters(&self) -> &Arc<FilterPipeline> {
        &self.filters
    }

    pub fn config(&self) -> &Arc<StrategyConfigStore> {
        &self.config
    }

    /// 以最常用的参数发起调用。
    pub fn invoke(
        &self,
        service: &str,
        path: &str,
        client_version: impl Into<ClientVersion>,
        args: Vec<Value>,
    ) -> Result<Value, InvokeError> {
        self.dispatch(InvocationRequest::new(service, path, args).with_client_version(client_version))
    }

    /// 绑定服务与客户端版本的调用桩。
    pub fn client(self: &Arc<Self>, service: impl Into<Arc<str>>, client_version: impl Into<ClientVersion>) -> ServiceClient {
        ServiceClient {
            invoker: Arc::clone(self),
            service: service.into(),
            client_version: client_version.into(),
        }
    }

    /// 调度一次调用。
    ///
    /// # 执行逻辑（How）
    /// 1. 取走调用作用域槽位中的覆盖（在任何执行开始之前，嵌套调用因此不会继承）；
    /// 2. 解析端点：覆盖指定了变体时按该变体解析，否则按服务当前生效变体解析；发生默认回退时告警；
    /// 3. 构造上下文，依次叠加配置层策略与调用级覆盖；
    /// 4. 采样开启时打开审计样本，随后执行请求过滤、策略、响应过滤；
    /// 5. 记录耗时指标、关闭样本，把结果写入上下文并返回。
    pub fn dispatch(&self, request: InvocationRequest) -> Result<Value, InvokeError> {
        let pending = deferred::take_pending();
        let InvocationRequest {
            method,
            client_version,
            args,
            overrides,
            canonical,
        } = request;
        let overrides = match pending {
            Some(pending) => overrides.preferring(&pending),
            None => overrides,
        };

        let span = debug_span!(
            "invoke",
            service = method.service(),
            path = method.path(),
            client_version = %client_version,
        );
        let _entered = span.enter();
        let started = Instant::now();
        let installation_id = self.config.installation_id();

        let resolution = match self.resolve(&method, &overrides) {
            Ok(resolution) => resolution,
            Err(err) => {
                self.record(&installation_id, &method, STRATEGY_UNRESOLVED, err.code(), started);
                debug!(error = %err, "endpoint resolution failed");
                return Err(err);
            }
        };
        if resolution.is_fallback() {
            warn!(
                requested = %resolution.requested(),
                actual = %resolution.actual(),
                "requested variant is not registered, using the default implementation"
            );
        }

        let policy = self.config.policy(&method);
        let mut ctx = policy
            .apply(InvocationContext::from_resolution(
                method,
                &resolution,
                client_version,
                args,
            ))
            .preferring(&overrides);
        if canonical {
            ctx.mark_request_filtered();
            ctx.mark_response_filtered();
        }

        let strategy = ctx.strategy().as_str();
        let sample = self
            .sampler
            .as_ref()
            .filter(|_| ctx.sampling())
            .map(|_| {
                OpenSample::open(
                    installation_id.to_string(),
                    ctx.method().service(),
                    ctx.method().path(),
                    strategy,
                    ctx.actual_variant().as_str(),
                    ctx.client_version().to_string(),
                )
            });

        let result = self.run(&mut ctx);
        let outcome = match &result {
            Ok(_) => OUTCOME_SUCCESS,
            Err(err) => err.code(),
        };
        self.record(&installation_id, ctx.method(), strategy, outcome, started);
        if let (Some(sample), Some(sampler)) = (sample, &self.sampler) {
            sampler.submit(sample.close(outcome));
        }
        debug!(strategy, outcome, elapsed_us = saturating_micros(started.elapsed()), "invocation finished");

        ctx.complete(result)?;
        ctx.into_result()
    }

    fn resolve(&self, method: &MethodId, overrides: &Overrides) -> Result<Resolution, InvokeError> {
        match overrides.variant() {
            Some(variant) => self.registry.resolve(method.service(), method.path(), variant),
            None => self.registry.resolve_active(method.service(), method.path()),
        }
    }

    fn run(&self, ctx: &mut InvocationContext) -> Result<Value, InvokeError> {
        ctx.advance(InvocationState::RequestFiltering)?;
        if !ctx.request_filtered() {
            let args = ctx.take_args();
            let args = self.filters.run_arguments(
                Direction::Request,
                ctx.method().path(),
                ctx.client_version(),
                args,
            )?;
            ctx.set_args(args);
            ctx.mark_request_filtered();
        }

        ctx.advance(InvocationState::Executing)?;
        let env = StrategyEnv::new(self.remote.as_ref(), self.codec.as_ref());
        let value = ctx.strategy().strategy().invoke(ctx, &env)?;

        ctx.advance(InvocationState::ResponseFiltering)?;
        if ctx.response_filtered() {
            return Ok(value);
        }
        let value = self
            .filters
            .run(Direction::Response, ctx.method().path(), ctx.client_version(), value)?;
        ctx.mark_response_filtered();
        Ok(value)
    }

    fn record(&self, installation_id: &Arc<str>, method: &MethodId, strategy: &'static str, outcome: &'static str, started: Instant) {
        let labels = InvocationLabels {
            installation_id: Arc::clone(installation_id),
            strategy,
            service: method.shared_service(),
            method: method.shared_path(),
            outcome,
        };
        self.metrics.record_duration(&INVOKE_DURATION, started.elapsed(), &labels);
    }
}

/// [`Invoker`] 构造器。
#[derive(Default)]
pub struct InvokerBuilder {
    registry: Option<Arc<EndpointRegistry>>,
    filters: Option<Arc<FilterPipeline>>,
    config: Option<Arc<StrategyConfigStore>>,
    remote: Option<Arc<dyn RemoteCaller>>,
    codec: Option<Arc<dyn WireCodec>>,
    metrics: Option<Arc<dyn InvocationMetrics>>,
    sampler: Option<Arc<AuditSampler>>,
}

impl InvokerBuilder {
    pub fn registry(mut self, registry: impl Into<Arc<EndpointRegistry>>) -> Self {
        self.registry = Some(registry.into());
        self
    }

    pub fn filters(mut self, filters: impl Into<Arc<FilterPipeline>>) -> Self {
        self.filters = Some(filters.into());
        self
    }

    pub fn config(mut self, config: InvocationConfig) -> Self {
        self.config = Some(Arc::new(StrategyConfigStore::new(config)));
        self
    }

    /// 共享一个可在外部热更新的配置存储。
    pub fn config_store(mut self, store: Arc<StrategyConfigStore>) -> Self {
        self.config = Some(store);
        self
    }

    pub fn remote(mut self, remote: impl RemoteCaller) -> Self {
        self.remote = Some(Arc::new(remote));
        self
    }

    pub fn shared_remote(mut self, remote: Arc<dyn RemoteCaller>) -> Self {
        self.remote = Some(remote);
        self
    }

    pub fn codec(mut self, codec: impl WireCodec) -> Self {
        self.codec = Some(Arc::new(codec));
        self
    }

    pub fn metrics(mut self, metrics: Arc<dyn InvocationMetrics>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    pub fn sampler(mut self, sampler: Arc<AuditSampler>) -> Self {
        self.sampler = Some(sampler);
        self
    }

    pub fn build(self) -> Invoker {
        Invoker {
            registry: self.registry.unwrap_or_default(),
            filters: self.filters.unwrap_or_default(),
            config: self.config.unwrap_or_default(),
            remote: self.remote.unwrap_or_else(|| Arc::new(UnconfiguredRemote)),
            codec: self.codec.unwrap_or_else(|| Arc::new(JsonWireCodec)),
            metrics: self.metrics.unwrap_or_else(|| Arc::new(NoopMetrics)),
            sampler: self.sampler,
        }
    }
}

/// 绑定服务与客户端版本的显式调用桩。
#[derive(Clone)]
pub struct ServiceClient {
    invoker: Arc<Invoker>,
    service: Arc<str>,
    client_version: ClientVersion,
}

impl ServiceClient {
    pub fn service(&self) -> &str {
        &self.service
    }

    pub fn client_version(&self) -> &ClientVersion {
        &self.client_version
    }

    pub fn call(&self, path: &str, args: Vec<Value>) -> Result<Value, InvokeError> {
        self.invoker.dispatch(self.request(path, args))
    }

    /// 携带显式覆盖调用。
    pub fn call_with(&self, path: &str, args: Vec<Value>, overrides: Overrides) -> Result<Value, InvokeError> {
        self.invoker.dispatch(self.request(path, args).with_overrides(overrides))
    }

    fn request(&self, path: &str, args: Vec<Value>) -> InvocationRequest {
        InvocationRequest::new(Arc::clone(&self.service), path, args).with_client_version(self.client_version.clone())
    }
}
