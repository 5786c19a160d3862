//! 节点间线格式编解码。
//!
//! `SimulatedRemote` 策略借助该契约把参数与结果强制走一遍真实远端调用会经历的
//! 编码→解码往返，以便在没有第二个实例的情况下验证兼容管线产出的载荷。

use crate::error::{CodecError, CodecStage};
use crate::value::Value;

/// 线格式编解码契约。
///
/// # 契约说明（What）
/// - `encode`/`decode` 必须互逆：`decode(encode(v)) == v`，类型标签需完整保留；
/// - 实现需满足 `Send + Sync + 'static`，以便在 `Arc` 中跨线程共享。
pub trait WireCodec: Send + Sync + 'static {
    /// 编解码器的稳定名称，用于错误信息与日志。
    fn name(&self) -> &'static str;

    fn encode(&self, value: &Value) -> Result<Vec<u8>, CodecError>;

    fn decode(&self, bytes: &[u8]) -> Result<Value, CodecError>;

    /// 编码后立即解码。
    fn round_trip(&self, value: &Value) -> Result<Value, CodecError> {
        let bytes = self.encode(value)?;
        self.decode(&bytes)
    }
}

/// 基于 `serde_json` 的默认编解码器。
#[derive(Clone, Copy, Debug, Default)]
pub struct JsonWireCodec;

impl JsonWireCodec {
    const NAME: &'static str = "json";
}

impl WireCodec for JsonWireCodec {
    fn name(&self) -> &'static str {
        Self::NAME
    }

    fn encode(&self, value: &Value) -> Result<Vec<u8>, CodecError> {
        serde_json::to_vec(value).map_err(|err| CodecError::new(Self::NAME, CodecStage::Encode, err))
    }

    fn decode(&self, bytes: &[u8]) -> Result<Value, CodecError> {
        serde_json::from_slice(bytes)
            .map_err(|err| CodecError::new(Self::NAME, CodecStage::Decode, err))
    }
}
