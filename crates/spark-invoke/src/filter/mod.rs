//! 版本兼容过滤器：在请求进入 Handler 之前、响应返回客户端之前，按客户端版本改写载荷形状。
//!
//! # 设计背景（Why）
//! - 规范领域模型会持续演进，旧版本客户端仍按旧线格式收发；
//! - 过滤器以 (方向, 可选路径, 版本区间) 声明作用域，在整张值图中定位声明的输入类型并原地替换，
//!   使 Handler 永远只面对规范形状。
//!
//! # 契约（What）
//! - 过滤器在启动期注册，之后只读；
//! - 变换输出必须带有声明的输出类型标签，否则以 [`ShapeMismatch`] 失败；
//! - 任一变换失败，整张部分改写的值图被丢弃，错误以 [`FilterError`] 上报。

mod pipeline;
mod typed;

pub use pipeline::FilterPipeline;
pub use typed::{request_typed, response_typed};

use std::fmt;
use std::sync::Arc;

use thiserror::Error;

use crate::error::{BoxError, FilterError};
use crate::value::{Record, TypeTag, Value};
use crate::version::{ClientVersion, VersionRange};

/// 过滤方向。
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Direction {
    Request,
    Response,
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Direction::Request => f.write_str("request"),
            Direction::Response => f.write_str("response"),
        }
    }
}

/// 记录级变换函数。
pub trait Transform: Send + Sync + 'static {
    fn transform(&self, input: Record) -> Result<Record, BoxError>;
}

impl<F> Transform for F
where
    F: Fn(Record) -> Result<Record, BoxError> + Send + Sync + 'static,
{
    fn transform(&self, input: Record) -> Result<Record, BoxError> {
        self(input)
    }
}

/// 变换输出的类型标签与声明不符。
#[derive(Clone, Debug, Error, PartialEq, Eq)]
#[error("transform produced `{found}` but declares `{expected}` as its output")]
pub struct ShapeMismatch {
    pub expected: TypeTag,
    pub found: TypeTag,
}

/// 过滤器描述符。
///
/// # 教案式说明
/// - **作用域 (What)**：`path` 为空表示作用于所有路径；`range` 两端均为开区间；
///   `requires_known_version` 为真时未知版本的客户端永不命中；
/// - **形状契约**：`input` 为要匹配的记录类型，`output` 为变换后必须呈现的类型；
/// - **风险 (Trade-offs)**：`input == output` 的过滤器同样安全，后序遍历不会重访变换输出。
#[derive(Clone)]
pub struct FilterDescriptor {
    name: Arc<str>,
    direction: Direction,
    path: Option<Arc<str>>,
    range: VersionRange,
    requires_known_version: bool,
    input: TypeTag,
    output: TypeTag,
    transform: Arc<dyn Transform>,
}

impl FilterDescriptor {
    pub fn new(
        name: impl Into<Arc<str>>,
        direction: Direction,
        input: TypeTag,
        output: TypeTag,
        transform: impl Transform,
    ) -> Self {
        Self {
            name: name.into(),
            direction,
            path: None,
            range: VersionRange::unbounded(),
            requires_known_version: false,
            input,
            output,
            transform: Arc::new(transform),
        }
    }

    /// 请求方向过滤器：旧形状 → 规范形状。
    pub fn request(name: impl Into<Arc<str>>, input: TypeTag, output: TypeTag, transform: impl Transform) -> Self {
        Self::new(name, Direction::Request, input, output, transform)
    }

    /// 响应方向过滤器：规范形状 → 旧形状。
    pub fn response(name: impl Into<Arc<str>>, input: TypeTag, output: TypeTag, transform: impl Transform) -> Self {
        Self::new(name, Direction::Response, input, output, transform)
    }

    /// 限定到精确路径。
    pub fn on_path(mut self, path: impl Into<Arc<str>>) -> Self {
        self.path = Some(path.into());
        self
    }

    pub fn within(mut self, range: VersionRange) -> Self {
        self.range = range;
        self
    }

    pub fn requiring_known_version(mut self) -> Self {
        self.requires_known_version = true;
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn direction(&self) -> Direction {
        self.direction
    }

    pub fn path(&self) -> Option<&str> {
        self.path.as_deref()
    }

    pub fn range(&self) -> &VersionRange {
        &self.range
    }

    pub fn requires_known_version(&self) -> bool {
        self.requires_known_version
    }

    pub fn input(&self) -> &TypeTag {
        &self.input
    }

    pub fn output(&self) -> &TypeTag {
        &self.output
    }

    /// 该过滤器是否作用于给定路径与客户端版本（不含方向判断）。
    pub fn applies_to(&self, path: &str, client: &ClientVersion) -> bool {
        if self.path.as_deref().is_some_and(|declared| declared != path) {
            return false;
        }
        if self.requires_known_version && !client.is_known() {
            return false;
        }
        self.range.matches(client)
    }

    /// 对整张值图应用变换。
    ///
    /// # 执行逻辑（How）
    /// 1. 后序遍历值图，类型标签等于 `input` 的记录交给变换函数；
    /// 2. 校验输出标签等于 `output`，不符即失败；
    /// 3. 其余记录原样保留，列表与嵌套字段都会被遍历。
    pub fn apply(&self, path: &str, value: Value) -> Result<Value, FilterError> {
        value.try_rewrite_records(&mut |record: Record| {
            if record.tag() != &self.input {
                return Ok(Value::Record(record));
            }
            let output = self
                .transform
                .transform(record)
                .map_err(|source| self.failure(path, source))?;
            if output.tag() != &self.output {
                return Err(self.failure(
                    path,
                    ShapeMismatch {
                        expected: self.output.clone(),
                        found: output.tag().clone(),
                    },
                ));
            }
            Ok(Value::Record(output))
        })
    }

    fn failure(&self, path: &str, source: impl Into<BoxError>) -> FilterError {
        FilterError::new(&self.name, path, self.direction, source)
    }
}

impl fmt::Debug for FilterDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FilterDescriptor")
            .field("name", &self.name)
            .field("direction", &self.direction)
            .field("path", &self.path)
            .field("range", &self.range)
            .field("requires_known_version", &self.requires_known_version)
            .field("input", &self.input)
            .field("output", &self.output)
            .finish_non_exhaustive()
    }
}
