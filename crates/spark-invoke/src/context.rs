//! 调用上下文：单次调用的全部可变状态。
//!
//! # 设计背景（Why）
//! - 每次调用由调度器独占一个 [`InvocationContext`]，从不跨调用或跨线程共享；
//! - 结果槽只写一次，写入后上下文进入终态，任何再次驱动都会被拒绝，
//!   防止同一上下文被重复执行而产生两次副作用。
//!
//! # 覆盖合并（What）
//! [`InvocationContext::preferring`] 以“非平凡字段优先”的规则合并调用级覆盖：
//! - `strategy`/`variant` 为 `Some` 时覆盖；
//! - `profile_ids` 非空且不全是哨兵值 [`ProfileId::LOCAL`] 时覆盖；
//! - 方法标识、已解析端点与客户端版本永不被合并改变。

use std::borrow::Cow;
use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::error::InvokeError;
use crate::registry::{EndpointDescriptor, Resolution, Variant};
use crate::strategy::StrategyKind;
use crate::value::Value;
use crate::version::ClientVersion;

/// 方法标识：服务名 + 操作路径。
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct MethodId {
    service: Arc<str>,
    path: Arc<str>,
}

impl MethodId {
    pub fn new(service: impl Into<Arc<str>>, path: impl Into<Arc<str>>) -> Self {
        Self {
            service: service.into(),
            path: path.into(),
        }
    }

    pub fn service(&self) -> &str {
        &self.service
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    pub(crate) fn shared_service(&self) -> Arc<str> {
        Arc::clone(&self.service)
    }

    pub(crate) fn shared_path(&self) -> Arc<str> {
        Arc::clone(&self.path)
    }
}

impl fmt::Display for MethodId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", self.service, self.path)
    }
}

/// 远端 profile 标识（部署拓扑中的目标节点组）。
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ProfileId(Cow<'static, str>);

impl ProfileId {
    /// 哨兵值：表示“本机”，在合并时视同未设置。
    pub const LOCAL: ProfileId = ProfileId(Cow::Borrowed("local"));

    pub fn new(name: impl Into<Cow<'static, str>>) -> Self {
        Self(name.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_local(&self) -> bool {
        *self == Self::LOCAL
    }
}

impl fmt::Display for ProfileId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&'static str> for ProfileId {
    fn from(name: &'static str) -> Self {
        Self::new(name)
    }
}

/// profile 列表为空或只包含哨兵值时视为“未设置”。
pub(crate) fn profiles_are_trivial(profiles: &[ProfileId]) -> bool {
    profiles.iter().all(ProfileId::is_local)
}

/// 调用级覆盖。
///
/// 既可以通过 [`crate::deferred::defer`] 放入调用作用域槽位，也可以经由
/// [`InvocationRequest::with_overrides`](crate::invoker::InvocationRequest::with_overrides) 显式传递。
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Overrides {
    strategy: Option<StrategyKind>,
    variant: Option<Variant>,
    profile_ids: Vec<ProfileId>,
}

impl Overrides {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_strategy(mut self, strategy: StrategyKind) -> Self {
        self.strategy = Some(strategy);
        self
    }

    pub fn with_variant(mut self, variant: Variant) -> Self {
        self.variant = Some(variant);
        self
    }

    pub fn with_profile_ids<I, P>(mut self, profiles: I) -> Self
    where
        I: IntoIterator<Item = P>,
        P: Into<ProfileId>,
    {
        self.profile_ids = profiles.into_iter().map(Into::into).collect();
        self
    }

    pub fn strategy(&self) -> Option<StrategyKind> {
        self.strategy
    }

    pub fn variant(&self) -> Option<&Variant> {
        self.variant.as_ref()
    }

    pub fn profile_ids(&self) -> &[ProfileId] {
        &self.profile_ids
    }

    /// 没有任何非平凡字段。
    pub fn is_empty(&self) -> bool {
        self.strategy.is_none() && self.variant.is_none() && profiles_are_trivial(&self.profile_ids)
    }

    /// 以 `other` 的非平凡字段覆盖自身。
    pub fn preferring(mut self, other: &Overrides) -> Self {
        if let Some(strategy) = other.strategy {
            self.strategy = Some(strategy);
        }
        if let Some(variant) = &other.variant {
            self.variant = Some(variant.clone());
        }
        if !profiles_are_trivial(&other.profile_ids) {
            self.profile_ids = other.profile_ids.clone();
        }
        self
    }
}

/// 调用生命周期状态。
///
/// `Resolving → RequestFiltering → Executing → ResponseFiltering → Done`，任一状态都可进入 `Failed`。
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum InvocationState {
    Resolving,
    RequestFiltering,
    Executing,
    ResponseFiltering,
    Done,
    Failed,
}

impl InvocationState {
    pub fn is_terminal(self) -> bool {
        matches!(self, InvocationState::Done | InvocationState::Failed)
    }
}

/// 单次调用的上下文。
///
/// # 教案式说明
/// - **构造 (How)**：调度器在解析成功后以 [`InvocationContext::from_resolution`] 构造，
///   依次叠加策略配置（`with_*`）与调用级覆盖（[`InvocationContext::preferring`]）；
/// - **只写一次 (What)**：结果经由内部的 `complete` 写入，写入后状态为 `Done`/`Failed`，
///   再次写入返回 [`InvokeError::InvalidContextState`]；
/// - **过滤标记**：每个方向的过滤管线在一次调用中恰好运行一次，上下文记录已运行的方向。
#[derive(Debug)]
pub struct InvocationContext {
    method: MethodId,
    args: Vec<Value>,
    endpoint: Arc<EndpointDescriptor>,
    requested_variant: Variant,
    strategy: StrategyKind,
    profile_ids: Vec<ProfileId>,
    client_version: ClientVersion,
    sampling: bool,
    state: InvocationState,
    request_filtered: bool,
    response_filtered: bool,
    outcome: Option<Result<Value, InvokeError>>,
}

impl InvocationContext {
    pub fn new(
        method: MethodId,
        endpoint: Arc<EndpointDescriptor>,
        client_version: ClientVersion,
        args: Vec<Value>,
    ) -> Self {
        Self {
            method,
            args,
            requested_variant: endpoint.variant().clone(),
            strategy: endpoint.strategy().unwrap_or_default(),
            profile_ids: endpoint.profile().cloned().into_iter().collect(),
            sampling: endpoint.sampling(),
            endpoint,
            client_version,
            state: InvocationState::Resolving,
            request_filtered: false,
            response_filtered: false,
            outcome: None,
        }
    }

    /// 以解析结果构造，请求变体取自解析时的请求值。
    pub fn from_resolution(
        method: MethodId,
        resolution: &Resolution,
        client_version: ClientVersion,
        args: Vec<Value>,
    ) -> Self {
        let mut context = Self::new(method, Arc::clone(resolution.endpoint()), client_version, args);
        context.requested_variant = resolution.requested().clone();
        context
    }

    pub fn with_strategy(mut self, strategy: StrategyKind) -> Self {
        self.strategy = strategy;
        self
    }

    pub fn with_profile_ids<I, P>(mut self, profiles: I) -> Self
    where
        I: IntoIterator<Item = P>,
        P: Into<ProfileId>,
    {
        self.profile_ids = profiles.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_sampling(mut self, enabled: bool) -> Self {
        self.sampling = enabled;
        self
    }

    /// 合并调用级覆盖，覆盖中的非平凡字段优先。
    pub fn preferring(mut self, overrides: &Overrides) -> Self {
        if let Some(strategy) = overrides.strategy {
            self.strategy = strategy;
        }
        if let Some(variant) = &overrides.variant {
            self.requested_variant = variant.clone();
        }
        if !profiles_are_trivial(&overrides.profile_ids) {
            self.profile_ids = overrides.profile_ids.clone();
        }
        self
    }

    pub fn method(&self) -> &MethodId {
        &self.method
    }

    pub fn args(&self) -> &[Value] {
        &self.args
    }

    pub fn endpoint(&self) -> &Arc<EndpointDescriptor> {
        &self.endpoint
    }

    pub fn requested_variant(&self) -> &Variant {
        &self.requested_variant
    }

    pub fn actual_variant(&self) -> &Variant {
        self.endpoint.variant()
    }

    pub fn strategy(&self) -> StrategyKind {
        self.strategy
    }

    pub fn profile_ids(&self) -> &[ProfileId] {
        &self.profile_ids
    }

    pub fn client_version(&self) -> &ClientVersion {
        &self.client_version
    }

    pub fn sampling(&self) -> bool {
        self.sampling
    }

    pub fn state(&self) -> InvocationState {
        self.state
    }

    pub fn request_filtered(&self) -> bool {
        self.request_filtered
    }

    pub fn response_filtered(&self) -> bool {
        self.response_filtered
    }

    pub fn is_terminal(&self) -> bool {
        self.state.is_terminal()
    }

    /// 推进到下一个非终态；状态只能前进。
    pub(crate) fn advance(&mut self, next: InvocationState) -> Result<(), InvokeError> {
        if self.state.is_terminal() {
            return Err(InvokeError::invalid_state(
                &self.method,
                self.state,
                "context already holds a result",
            ));
        }
        if next.is_terminal() || next <= self.state {
            return Err(InvokeError::invalid_state(
                &self.method,
                self.state,
                "state transitions are forward-only",
            ));
        }
        self.state = next;
        Ok(())
    }

    pub(crate) fn take_args(&mut self) -> Vec<Value> {
        std::mem::take(&mut self.args)
    }

    pub(crate) fn set_args(&mut self, args: Vec<Value>) {
        self.args = args;
    }

    pub(crate) fn mark_request_filtered(&mut self) {
        self.request_filtered = true;
    }

    pub(crate) fn mark_response_filtered(&mut self) {
        self.response_filtered = true;
    }

    /// 写入结果并进入终态；重复写入被拒绝，原结果保持不变。
    pub(crate) fn complete(&mut self, result: Result<Value, InvokeError>) -> Result<(), InvokeError> {
        if self.state.is_terminal() {
            return Err(InvokeError::invalid_state(
                &self.method,
                self.state,
                "context already holds a result",
            ));
        }
        self.state = if result.is_ok() {
            InvocationState::Done
        } else {
            InvocationState::Failed
        };
        self.outcome = Some(result);
        Ok(())
    }

    /// 取出结果；尚未写入结果时返回状态错误。
    pub fn into_result(self) -> Result<Value, InvokeError> {
        match self.outcome {
            Some(result) => result,
            None => Err(InvokeError::invalid_state(
                &self.method,
                self.state,
                "no result has been recorded",
            )),
        }
    }
}
