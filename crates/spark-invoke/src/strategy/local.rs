use crate::context::InvocationContext;
use crate::error::InvokeError;
use crate::value::Value;

use super::{InvocationStrategy, StrategyEnv, StrategyKind, call_local};

/// 直接调用本地 Handler，错误原样返回。
#[derive(Clone, Copy, Debug, Default)]
pub struct LocalOnly;

impl InvocationStrategy for LocalOnly {
    fn name(&self) -> &'static str {
        StrategyKind::LocalOnly.as_str()
    }

    fn invoke(&self, ctx: &InvocationContext, _env: &StrategyEnv<'_>) -> Result<Value, InvokeError> {
        call_local(ctx)
    }
}
