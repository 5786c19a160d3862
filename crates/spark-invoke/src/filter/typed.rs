use std::sync::Arc;

use serde::Serialize;
use serde::de::DeserializeOwned;

use crate::error::BoxError;
use crate::value::{Record, TypeTag};

use super::{Direction, FilterDescriptor};

/// 以 serde 类型编写请求过滤器。
///
/// 输入记录先按线上形状反序列化为 `I`，变换结果 `O` 序列化回记录并打上 `output` 标签。
/// `O` 内部的嵌套对象会成为匿名记录，需要被后续过滤器按类型匹配的嵌套形状应单独声明过滤器。
pub fn request_typed<I, O, F>(name: impl Into<Arc<str>>, input: TypeTag, output: TypeTag, transform: F) -> FilterDescriptor
where
    I: DeserializeOwned + 'static,
    O: Serialize + 'static,
    F: Fn(I) -> Result<O, BoxError> + Send + Sync + 'static,
{
    typed(name, Direction::Request, input, output, transform)
}

/// 以 serde 类型编写响应过滤器。
pub fn response_typed<I, O, F>(name: impl Into<Arc<str>>, input: TypeTag, output: TypeTag, transform: F) -> FilterDescriptor
where
    I: DeserializeOwned + 'static,
    O: Serialize + 'static,
    F: Fn(I) -> Result<O, BoxError> + Send + Sync + 'static,
{
    typed(name, Direction::Response, input, output, transform)
}

fn typed<I, O, F>(
    name: impl Into<Arc<str>>,
    direction: Direction,
    input: TypeTag,
    output: TypeTag,
    transform: F,
) -> FilterDescriptor
where
    I: DeserializeOwned + 'static,
    O: Serialize + 'static,
    F: Fn(I) -> Result<O, BoxError> + Send + Sync + 'static,
{
    let tag = output.clone();
    FilterDescriptor::new(name, direction, input, output, move |record: Record| -> Result<Record, BoxError> {
        let typed_input: I = record.deserialize_into()?;
        let typed_output = transform(typed_input)?;
        Ok(Record::from_serialize(tag.clone(), &typed_output)?)
    })
}
