use tracing::warn;

use crate::context::InvocationContext;
use crate::error::InvokeError;
use crate::value::Value;

use super::{InvocationStrategy, StrategyEnv, StrategyKind, call_local, call_remote};

/// 先远端，传输不可达时回退本地。
///
/// # 教案式说明
/// - **回退条件 (What)**：仅 [`InvokeError::RemoteUnavailable`]；远端业务拒绝说明操作可能已在对端执行，
///   回退会造成重复副作用，因此原样返回；
/// - **回退失败**：本地也失败时只返回本地错误，远端不可达原因在回退前以 `warn` 级别记录。
#[derive(Clone, Copy, Debug, Default)]
pub struct RemoteFirst;

impl InvocationStrategy for RemoteFirst {
    fn name(&self) -> &'static str {
        StrategyKind::RemoteFirst.as_str()
    }

    fn invoke(&self, ctx: &InvocationContext, env: &StrategyEnv<'_>) -> Result<Value, InvokeError> {
        match call_remote(ctx, env) {
            Err(InvokeError::RemoteUnavailable { reason, .. }) => {
                warn!(
                    service = ctx.method().service(),
                    path = ctx.method().path(),
                    %reason,
                    "remote peer unavailable, falling back to local handler"
                );
                call_local(ctx)
            }
            other => other,
        }
    }
}
