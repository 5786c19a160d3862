//! 执行策略：决定一次已解析的调用在本地、远端，还是“先远端后本地”执行。
//!
//! # 设计背景（Why）
//! - 同一业务操作在不同部署形态下需要不同的执行位置，策略与 Handler 解耦后可按配置或调用级覆盖切换；
//! - 每个策略都有稳定名称（见 [`StrategyKind::as_str`]），同时用作配置值、指标标签与显式选择参数。
//!
//! # 契约（What）
//! - 策略只读上下文，不写结果槽，结果由调度器统一写回；
//! - 策略返回的错误原样透传给调用方，不做二次包装；
//! - 只有 [`StrategyKind::RemoteFirst`] 会在传输层不可达时回退本地执行。

mod local;
mod remote;
mod remote_first;
mod simulated;
mod transport;

pub use local::LocalOnly;
pub use remote::RemoteOnly;
pub use remote_first::RemoteFirst;
pub use simulated::SimulatedRemote;
pub use transport::{RemoteCall, RemoteCaller, UnconfiguredRemote};

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::codec::WireCodec;
use crate::context::InvocationContext;
use crate::error::InvokeError;
use crate::value::Value;

/// 策略枚举，用于配置与显式选择。
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StrategyKind {
    #[default]
    LocalOnly,
    RemoteOnly,
    RemoteFirst,
    SimulatedRemote,
}

impl StrategyKind {
    pub const ALL: [StrategyKind; 4] = [
        StrategyKind::LocalOnly,
        StrategyKind::RemoteOnly,
        StrategyKind::RemoteFirst,
        StrategyKind::SimulatedRemote,
    ];

    /// 稳定名称。
    pub const fn as_str(self) -> &'static str {
        match self {
            StrategyKind::LocalOnly => "local_only",
            StrategyKind::RemoteOnly => "remote_only",
            StrategyKind::RemoteFirst => "remote_first",
            StrategyKind::SimulatedRemote => "simulated_remote",
        }
    }

    /// 对应的无状态策略实例。
    pub fn strategy(self) -> &'static dyn InvocationStrategy {
        match self {
            StrategyKind::LocalOnly => &LocalOnly,
            StrategyKind::RemoteOnly => &RemoteOnly,
            StrategyKind::RemoteFirst => &RemoteFirst,
            StrategyKind::SimulatedRemote => &SimulatedRemote,
        }
    }
}

impl fmt::Display for StrategyKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 无法识别的策略名称。
#[derive(Clone, Debug, Error, PartialEq, Eq)]
#[error("unknown invocation strategy `{0}`")]
pub struct UnknownStrategy(pub String);

impl FromStr for StrategyKind {
    type Err = UnknownStrategy;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        StrategyKind::ALL
            .into_iter()
            .find(|kind| kind.as_str() == raw)
            .ok_or_else(|| UnknownStrategy(raw.to_owned()))
    }
}

/// 策略执行时可用的外部协作者。
#[derive(Clone, Copy)]
pub struct StrategyEnv<'a> {
    remote: &'a dyn RemoteCaller,
    codec: &'a dyn WireCodec,
}

impl<'a> StrategyEnv<'a> {
    pub fn new(remote: &'a dyn RemoteCaller, codec: &'a dyn WireCodec) -> Self {
        Self { remote, codec }
    }

    pub fn remote(&self) -> &'a dyn RemoteCaller {
        self.remote
    }

    pub fn codec(&self) -> &'a dyn WireCodec {
        self.codec
    }
}

/// 执行策略契约。
///
/// # 教案式说明
/// - **输入 (What)**：已完成请求过滤的上下文，参数即 [`InvocationContext::args`]；
/// - **输出**：Handler 或远端返回的值；错误保持原始变体；
/// - **线程模型**：在调用线程上同步执行，实现必须无状态或自带同步。
pub trait InvocationStrategy: Send + Sync {
    fn name(&self) -> &'static str;

    fn invoke(&self, ctx: &InvocationContext, env: &StrategyEnv<'_>) -> Result<Value, InvokeError>;
}

/// 直接调用本地 Handler，策略之间共用。
pub(crate) fn call_local(ctx: &InvocationContext) -> Result<Value, InvokeError> {
    ctx.endpoint().handle(ctx.args()).map_err(InvokeError::from)
}

/// 通过注入的传输调用远端。
pub(crate) fn call_remote(ctx: &InvocationContext, env: &StrategyEnv<'_>) -> Result<Value, InvokeError> {
    env.remote()
        .call(&RemoteCall::from_context(ctx))
        .map_err(|failure| failure.into_invoke_error(ctx.method()))
}
