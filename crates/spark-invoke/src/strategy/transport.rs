use crate::context::{InvocationContext, MethodId, ProfileId};
use crate::error::RemoteFailure;
use crate::registry::Variant;
use crate::value::Value;
use crate::version::ClientVersion;

/// 发往远端的一次调用。
///
/// 参数为请求过滤之后的规范形状；远端实例应以
/// [`InvocationRequest::canonical`](crate::invoker::InvocationRequest::canonical) 执行，不再重复过滤。
#[derive(Clone, Copy, Debug)]
pub struct RemoteCall<'a> {
    pub method: &'a MethodId,
    pub variant: &'a Variant,
    pub profile_ids: &'a [ProfileId],
    pub client_version: &'a ClientVersion,
    pub args: &'a [Value],
}

impl<'a> RemoteCall<'a> {
    pub fn from_context(ctx: &'a InvocationContext) -> Self {
        Self {
            method: ctx.method(),
            variant: ctx.requested_variant(),
            profile_ids: ctx.profile_ids(),
            client_version: ctx.client_version(),
            args: ctx.args(),
        }
    }
}

/// 远端传输契约。
///
/// # 契约说明（What）
/// - 传输层失败（连接拒绝、超时、对端未部署）返回 [`RemoteFailure::Unavailable`]；
/// - 对端已执行但返回业务错误时返回 [`RemoteFailure::Rejected`]；
/// - 物理绑定（HTTP、消息队列等）由宿主实现，调用线程上同步阻塞，超时由实现自行负责。
pub trait RemoteCaller: Send + Sync + 'static {
    fn call(&self, call: &RemoteCall<'_>) -> Result<Value, RemoteFailure>;
}

impl<F> RemoteCaller for F
where
    F: Fn(&RemoteCall<'_>) -> Result<Value, RemoteFailure> + Send + Sync + 'static,
{
    fn call(&self, call: &RemoteCall<'_>) -> Result<Value, RemoteFailure> {
        self(call)
    }
}

/// 未配置传输时的占位实现：所有调用均视为不可达。
#[derive(Clone, Copy, Debug, Default)]
pub struct UnconfiguredRemote;

impl RemoteCaller for UnconfiguredRemote {
    fn call(&self, call: &RemoteCall<'_>) -> Result<Value, RemoteFailure> {
        Err(RemoteFailure::unavailable(format!(
            "no remote transport configured for `{}`",
            call.method
        )))
    }
}
