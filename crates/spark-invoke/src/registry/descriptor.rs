use std::borrow::Cow;
use std::fmt;
use std::sync::Arc;

use crate::context::ProfileId;
use crate::error::HandlerError;
use crate::strategy::StrategyKind;
use crate::value::Value;

/// 端点实现变体标签，例如 `default`、`training` 或具名替代实现。
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Variant(Cow<'static, str>);

impl Variant {
    pub const DEFAULT: Variant = Variant(Cow::Borrowed("default"));
    pub const TRAINING: Variant = Variant(Cow::Borrowed("training"));

    pub fn new(name: impl Into<Cow<'static, str>>) -> Self {
        Self(name.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_default(&self) -> bool {
        *self == Self::DEFAULT
    }
}

impl Default for Variant {
    fn default() -> Self {
        Self::DEFAULT
    }
}

impl fmt::Display for Variant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// 一个逻辑操作的具体实现。
///
/// # 契约说明（What）
/// - 参数以有序切片传入，Handler 不拥有参数所有权，策略可在回退场景下复用同一组参数；
/// - 错误以 [`HandlerError`] 返回，并原样透传给调用方。
pub trait EndpointHandler: Send + Sync + 'static {
    fn handle(&self, args: &[Value]) -> Result<Value, HandlerError>;
}

impl<F> EndpointHandler for F
where
    F: Fn(&[Value]) -> Result<Value, HandlerError> + Send + Sync + 'static,
{
    fn handle(&self, args: &[Value]) -> Result<Value, HandlerError> {
        self(args)
    }
}

/// 端点描述符：一个 (path, variant) 的候选实现及其声明属性。
///
/// # 教案式说明
/// - **意图 (Why)**：以显式注册表取代注解扫描，描述符在启动期构造并在注册后只读；
/// - **字段语义 (What)**：
///   - `path`：操作路径；
///   - `variant`：实现变体，缺省为 [`Variant::DEFAULT`]；
///   - `is_override`：是否为显式 override，override 在同一 (path, variant) 上优先级最高；
///   - `strategy`/`profile`：声明的执行策略与 profile，缺省时继承服务级配置；
///   - `sampling`：是否为该端点开启审计采样；
/// - **风险 (Trade-offs)**：Handler 以 `Arc` 共享，多个描述符可指向同一实现。
#[derive(Clone)]
pub struct EndpointDescriptor {
    path: Arc<str>,
    variant: Variant,
    is_override: bool,
    strategy: Option<StrategyKind>,
    profile: Option<ProfileId>,
    sampling: bool,
    handler: Arc<dyn EndpointHandler>,
}

impl EndpointDescriptor {
    pub fn new(path: impl Into<Arc<str>>, handler: impl EndpointHandler) -> Self {
        Self::with_shared_handler(path, Arc::new(handler))
    }

    pub fn with_shared_handler(path: impl Into<Arc<str>>, handler: Arc<dyn EndpointHandler>) -> Self {
        Self {
            path: path.into(),
            variant: Variant::DEFAULT,
            is_override: false,
            strategy: None,
            profile: None,
            sampling: false,
            handler,
        }
    }

    pub fn with_variant(mut self, variant: Variant) -> Self {
        self.variant = variant;
        self
    }

    /// 标记为 override。
    pub fn as_override(mut self) -> Self {
        self.is_override = true;
        self
    }

    pub fn with_strategy(mut self, strategy: StrategyKind) -> Self {
        self.strategy = Some(strategy);
        self
    }

    pub fn with_profile(mut self, profile: ProfileId) -> Self {
        self.profile = Some(profile);
        self
    }

    pub fn with_sampling(mut self, enabled: bool) -> Self {
        self.sampling = enabled;
        self
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    pub(crate) fn path_arc(&self) -> &Arc<str> {
        &self.path
    }

    pub fn variant(&self) -> &Variant {
        &self.variant
    }

    pub fn is_override(&self) -> bool {
        self.is_override
    }

    pub fn strategy(&self) -> Option<StrategyKind> {
        self.strategy
    }

    pub fn profile(&self) -> Option<&ProfileId> {
        self.profile.as_ref()
    }

    pub fn sampling(&self) -> bool {
        self.sampling
    }

    pub fn handler(&self) -> &Arc<dyn EndpointHandler> {
        &self.handler
    }

    /// 直接调用本地 Handler。
    pub fn handle(&self, args: &[Value]) -> Result<Value, HandlerError> {
        self.handler.handle(args)
    }
}

impl fmt::Debug for EndpointDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EndpointDescriptor")
            .field("path", &self.path)
            .field("variant", &self.variant)
            .field("is_override", &self.is_override)
            .field("strategy", &self.strategy)
            .field("profile", &self.profile)
            .field("sampling", &self.sampling)
            .finish_non_exhaustive()
    }
}

/// 服务描述符：服务名与其全部端点。
#[derive(Clone, Debug)]
pub struct ServiceDescriptor {
    name: Arc<str>,
    endpoints: Vec<EndpointDescriptor>,
}

impl ServiceDescriptor {
    pub fn new(name: impl Into<Arc<str>>) -> Self {
        Self {
            name: name.into(),
            endpoints: Vec::new(),
        }
    }

    pub fn with_endpoint(mut self, endpoint: EndpointDescriptor) -> Self {
        self.endpoints.push(endpoint);
        self
    }

    pub fn push(&mut self, endpoint: EndpointDescriptor) {
        self.endpoints.push(endpoint);
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn endpoints(&self) -> &[EndpointDescriptor] {
        &self.endpoints
    }

    pub(crate) fn into_parts(self) -> (Arc<str>, Vec<EndpointDescriptor>) {
        (self.name, self.endpoints)
    }
}
