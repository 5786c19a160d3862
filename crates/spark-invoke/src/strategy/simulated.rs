use crate::context::InvocationContext;
use crate::error::{CodecError, CodecStage, InvokeError};
use crate::value::Value;

use super::{InvocationStrategy, StrategyEnv, StrategyKind};

/// 本地执行，但参数与结果都经过一次线格式往返，模拟跨实例调用。
///
/// 用于在单实例环境中验证兼容过滤产出的载荷能否被真实远端接受；编解码失败以
/// [`InvokeError::Codec`] 返回，Handler 失败原样返回。
#[derive(Clone, Copy, Debug, Default)]
pub struct SimulatedRemote;

impl InvocationStrategy for SimulatedRemote {
    fn name(&self) -> &'static str {
        StrategyKind::SimulatedRemote.as_str()
    }

    fn invoke(&self, ctx: &InvocationContext, env: &StrategyEnv<'_>) -> Result<Value, InvokeError> {
        let codec = env.codec();
        let args = codec.round_trip(&Value::List(ctx.args().to_vec()))?;
        let Value::List(args) = args else {
            return Err(CodecError::new(
                codec.name(),
                CodecStage::Decode,
                "argument list was not preserved by the round trip",
            )
            .into());
        };
        let result = ctx.endpoint().handle(&args)?;
        Ok(codec.round_trip(&result)?)
    }
}
