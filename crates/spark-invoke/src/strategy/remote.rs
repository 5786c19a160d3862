use crate::context::InvocationContext;
use crate::error::InvokeError;
use crate::value::Value;

use super::{InvocationStrategy, StrategyEnv, StrategyKind, call_remote};

/// 只走远端，任何失败都不回退。
#[derive(Clone, Copy, Debug, Default)]
pub struct RemoteOnly;

impl InvocationStrategy for RemoteOnly {
    fn name(&self) -> &'static str {
        StrategyKind::RemoteOnly.as_str()
    }

    fn invoke(&self, ctx: &InvocationContext, env: &StrategyEnv<'_>) -> Result<Value, InvokeError> {
        call_remote(ctx, env)
    }
}
