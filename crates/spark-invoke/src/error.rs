//! # error 模块说明
//!
//! ## 角色定位（Why）
//! - 集中定义调用链路上的错误语义：端点解析、远端传输、兼容过滤、本地 Handler 与编解码；
//! - 每个变体都提供 `<域>.<语义>` 形式的稳定错误码，供上游映射为线协议状态码或指标标签。
//!
//! ## 设计要求（What）
//! - 错误枚举统一派生 `thiserror::Error`；
//! - 策略层产生的错误原样透传，不做二次包装，调用方可区分业务错误与基础设施错误；
//! - 注册期、配置期错误与调用期错误分属不同类型，避免调用方在热路径上匹配无关变体。

use std::{error::Error as StdError, fmt};

use thiserror::Error;

use crate::context::{InvocationState, MethodId};
use crate::filter::Direction;
use crate::registry::Variant;

/// 跨模块复用的装箱错误类型。
pub type BoxError = Box<dyn StdError + Send + Sync + 'static>;

/// 稳定错误码集合。
///
/// 命名遵循 `invoke.<领域>.<语义>`，一经发布不可修改，仅允许新增。
pub mod codes {
    pub const ENDPOINT_NOT_FOUND: &str = "invoke.endpoint.not_found";
    pub const REMOTE_UNAVAILABLE: &str = "invoke.remote.unavailable";
    pub const REMOTE_REJECTED: &str = "invoke.remote.rejected";
    pub const FILTER_FAILED: &str = "invoke.filter.failed";
    pub const HANDLER_FAILED: &str = "invoke.handler.failed";
    pub const CODEC_FAILED: &str = "invoke.codec.failed";
    pub const CONTEXT_INVALID_STATE: &str = "invoke.context.invalid_state";
}

/// 单次调用可能返回的错误。
///
/// # 教案式说明
/// - **意图 (Why)**：把“解析失败 / 远端不可达 / 远端拒绝 / 过滤失败 / Handler 失败”拆成独立变体，
///   `RemoteFirst` 策略只对 [`InvokeError::RemoteUnavailable`] 回退，避免重复执行带副作用的操作；
/// - **契约 (What)**：
///   - `Handler` 保留原始错误对象，可通过 [`HandlerError::downcast_ref`] 还原具体类型；
///   - `Filter` 标识出错的过滤器、方向与路径；
///   - [`InvokeError::code`] 返回稳定错误码；
/// - **风险 (Trade-offs)**：变体携带 `String` 上下文，失败路径会有少量分配。
#[derive(Debug, Error)]
pub enum InvokeError {
    /// 没有任何描述符能够解析 (service, path, variant)。
    #[error("no endpoint resolves for service `{service}` path `{path}` (variant `{variant}`)")]
    EndpointNotFound {
        service: String,
        path: String,
        variant: Variant,
    },

    /// 远端传输层失败（连接拒绝、超时等），`RemoteFirst` 下触发本地回退。
    #[error("remote peer unavailable for `{service}` `{path}`: {reason}")]
    RemoteUnavailable {
        service: String,
        path: String,
        reason: String,
        #[source]
        source: Option<BoxError>,
    },

    /// 远端已执行调用并返回业务错误，永不触发回退。
    #[error("remote peer rejected `{service}` `{path}`: [{code}] {message}")]
    RemoteError {
        service: String,
        path: String,
        code: String,
        message: String,
    },

    /// 兼容过滤器失败，本次调用的结果整体作废。
    #[error(transparent)]
    Filter(#[from] FilterError),

    /// 本地 Handler 自身失败。
    #[error(transparent)]
    Handler(#[from] HandlerError),

    /// 模拟远端时编解码失败。
    #[error(transparent)]
    Codec(#[from] CodecError),

    /// 上下文已处于终态或尚未产出结果时被再次驱动。
    #[error("invocation context for `{service}` `{path}` is in state {state:?}: {detail}")]
    InvalidContextState {
        service: String,
        path: String,
        state: InvocationState,
        detail: &'static str,
    },
}

impl InvokeError {
    /// 返回稳定错误码。
    pub fn code(&self) -> &'static str {
        match self {
            InvokeError::EndpointNotFound { .. } => codes::ENDPOINT_NOT_FOUND,
            InvokeError::RemoteUnavailable { .. } => codes::REMOTE_UNAVAILABLE,
            InvokeError::RemoteError { .. } => codes::REMOTE_REJECTED,
            InvokeError::Filter(_) => codes::FILTER_FAILED,
            InvokeError::Handler(_) => codes::HANDLER_FAILED,
            InvokeError::Codec(_) => codes::CODEC_FAILED,
            InvokeError::InvalidContextState { .. } => codes::CONTEXT_INVALID_STATE,
        }
    }

    /// 是否为基础设施层错误（与业务错误相对）。
    ///
    /// - Handler 与远端业务拒绝属于业务错误，其余均视为基础设施错误；
    /// - 上游可据此决定是否告警或映射为 5xx。
    pub fn is_infrastructure(&self) -> bool {
        !matches!(
            self,
            InvokeError::Handler(_) | InvokeError::RemoteError { .. }
        )
    }

    pub(crate) fn endpoint_not_found(service: &str, path: &str, variant: &Variant) -> Self {
        InvokeError::EndpointNotFound {
            service: service.to_owned(),
            path: path.to_owned(),
            variant: variant.clone(),
        }
    }

    pub(crate) fn invalid_state(
        method: &MethodId,
        state: InvocationState,
        detail: &'static str,
    ) -> Self {
        InvokeError::InvalidContextState {
            service: method.service().to_owned(),
            path: method.path().to_owned(),
            state,
            detail,
        }
    }
}

/// 远端调用方（[`RemoteCaller`](crate::strategy::RemoteCaller)）返回的失败。
///
/// 传输实现只需区分两类：对端不可达与对端业务拒绝；前者允许回退，后者不允许。
#[derive(Debug, Error)]
pub enum RemoteFailure {
    #[error("remote transport unavailable: {reason}")]
    Unavailable {
        reason: String,
        #[source]
        source: Option<BoxError>,
    },

    #[error("remote rejected the call: [{code}] {message}")]
    Rejected { code: String, message: String },
}

impl RemoteFailure {
    /// 构造不可达错误。
    pub fn unavailable(reason: impl Into<String>) -> Self {
        RemoteFailure::Unavailable {
            reason: reason.into(),
            source: None,
        }
    }

    /// 构造带底层原因的不可达错误。
    pub fn unavailable_with(reason: impl Into<String>, source: impl Into<BoxError>) -> Self {
        RemoteFailure::Unavailable {
            reason: reason.into(),
            source: Some(source.into()),
        }
    }

    /// 构造业务拒绝错误。
    pub fn rejected(code: impl Into<String>, message: impl Into<String>) -> Self {
        RemoteFailure::Rejected {
            code: code.into(),
            message: message.into(),
        }
    }

    /// 附带方法标识转换为调用错误。
    pub(crate) fn into_invoke_error(self, method: &MethodId) -> InvokeError {
        match self {
            RemoteFailure::Unavailable { reason, source } => InvokeError::RemoteUnavailable {
                service: method.service().to_owned(),
                path: method.path().to_owned(),
                reason,
                source,
            },
            RemoteFailure::Rejected { code, message } => InvokeError::RemoteError {
                service: method.service().to_owned(),
                path: method.path().to_owned(),
                code,
                message,
            },
        }
    }
}

/// 本地 Handler 抛出的错误，保留原始错误对象。
///
/// - **意图 (Why)**：上游错误映射（例如映射到线协议状态码）需要检查原始类型，因此不做扁平化；
/// - **契约 (What)**：[`HandlerError::downcast_ref`] 可取回 Handler 构造时传入的具体错误。
#[derive(Debug, Error)]
#[error("{source}")]
pub struct HandlerError {
    source: BoxError,
}

impl HandlerError {
    pub fn new(source: impl Into<BoxError>) -> Self {
        Self {
            source: source.into(),
        }
    }

    /// 仅携带文本信息的 Handler 错误。
    pub fn msg(message: impl Into<String>) -> Self {
        Self::new(message.into())
    }

    /// 尝试还原为具体错误类型。
    pub fn downcast_ref<T: StdError + 'static>(&self) -> Option<&T> {
        self.source.downcast_ref::<T>()
    }

    pub fn into_inner(self) -> BoxError {
        self.source
    }
}

/// 兼容过滤器失败。
///
/// # 教案式说明
/// - **意图 (Why)**：过滤器失败必须让整次调用失败，不允许返回“过滤到一半”的结果；
/// - **契约 (What)**：`filter` 为注册名，`path` 为调用路径，`direction` 区分请求/响应阶段，
///   `source` 为转换函数返回的原始错误。
#[derive(Debug, Error)]
#[error("filter `{filter}` failed during {direction} filtering of `{path}`: {source}")]
pub struct FilterError {
    filter: String,
    path: String,
    direction: Direction,
    source: BoxError,
}

impl FilterError {
    pub(crate) fn new(
        filter: &str,
        path: &str,
        direction: Direction,
        source: impl Into<BoxError>,
    ) -> Self {
        Self {
            filter: filter.to_owned(),
            path: path.to_owned(),
            direction,
            source: source.into(),
        }
    }

    pub fn filter(&self) -> &str {
        &self.filter
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn direction(&self) -> Direction {
        self.direction
    }
}

/// 编解码阶段。
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CodecStage {
    Encode,
    Decode,
}

impl fmt::Display for CodecStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CodecStage::Encode => f.write_str("encode"),
            CodecStage::Decode => f.write_str("decode"),
        }
    }
}

/// 线格式编解码失败。
#[derive(Debug, Error)]
#[error("wire codec `{codec}` failed to {stage}: {source}")]
pub struct CodecError {
    codec: &'static str,
    stage: CodecStage,
    source: BoxError,
}

impl CodecError {
    pub fn new(codec: &'static str, stage: CodecStage, source: impl Into<BoxError>) -> Self {
        Self {
            codec,
            stage,
            source: source.into(),
        }
    }

    pub fn stage(&self) -> CodecStage {
        self.stage
    }
}

/// 注册期错误：在启动阶段快速失败，而不是拖到调用时才暴露。
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum RegistrationError {
    /// 同一 (path, variant) 声明了多个 override。
    #[error("service `{service}` declares more than one override for `{path}` (variant `{variant}`)")]
    DuplicateOverride {
        service: String,
        path: String,
        variant: Variant,
    },

    /// 同一 (path, variant) 声明了多个普通实现。
    #[error("service `{service}` declares more than one endpoint for `{path}` (variant `{variant}`)")]
    DuplicateEndpoint {
        service: String,
        path: String,
        variant: Variant,
    },

    #[error("service `{service}` is already registered")]
    DuplicateService { service: String },

    #[error("service `{service}` is not registered")]
    UnknownService { service: String },
}

/// 版本区间构造失败。
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum RangeError {
    #[error("`{input}` is not a valid version bound")]
    InvalidBound { input: String },

    #[error("lower bound {lower} must be strictly below upper bound {upper}")]
    Inverted { lower: String, upper: String },
}

/// 配置加载失败。
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to parse invocation config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("failed to read invocation config `{path}`: {source}")]
    Io {
        path: String,
        source: std::io::Error,
    },
}
