use tracing::trace;

use crate::error::FilterError;
use crate::value::Value;
use crate::version::ClientVersion;

use super::{Direction, FilterDescriptor};

/// 有序的过滤器集合。
///
/// # 教案式说明
/// - **顺序 (What)**：同一方向上命中的过滤器按注册顺序依次执行，前一个的输出是后一个的输入；
///   注册顺序即构建时 `with_filter`/`push` 的调用顺序，与过滤器名称无关；
/// - **并发**：构建完成后只读，可包装在 `Arc` 中被任意线程共享。
#[derive(Clone, Debug, Default)]
pub struct FilterPipeline {
    filters: Vec<FilterDescriptor>,
}

impl FilterPipeline {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_filter(mut self, filter: FilterDescriptor) -> Self {
        self.filters.push(filter);
        self
    }

    pub fn push(&mut self, filter: FilterDescriptor) {
        self.filters.push(filter);
    }

    pub fn len(&self) -> usize {
        self.filters.len()
    }

    pub fn is_empty(&self) -> bool {
        self.filters.is_empty()
    }

    pub fn filters(&self) -> &[FilterDescriptor] {
        &self.filters
    }

    /// 选出作用于 (方向, 路径, 客户端版本) 的过滤器，保持注册顺序。
    pub fn select(&self, direction: Direction, path: &str, client: &ClientVersion) -> Vec<&FilterDescriptor> {
        self.filters
            .iter()
            .filter(|filter| filter.direction() == direction && filter.applies_to(path, client))
            .collect()
    }

    pub fn select_request_filters(&self, path: &str, client: &ClientVersion) -> Vec<&FilterDescriptor> {
        self.select(Direction::Request, path, client)
    }

    pub fn select_response_filters(&self, path: &str, client: &ClientVersion) -> Vec<&FilterDescriptor> {
        self.select(Direction::Response, path, client)
    }

    /// 对单个值运行一个方向的全部命中过滤器。
    pub fn run(
        &self,
        direction: Direction,
        path: &str,
        client: &ClientVersion,
        value: Value,
    ) -> Result<Value, FilterError> {
        let selected = self.select(direction, path, client);
        apply_all(&selected, path, value)
    }

    /// 对参数列表逐个运行请求或响应过滤器，任一失败即整体失败。
    pub fn run_arguments(
        &self,
        direction: Direction,
        path: &str,
        client: &ClientVersion,
        args: Vec<Value>,
    ) -> Result<Vec<Value>, FilterError> {
        let selected = self.select(direction, path, client);
        if selected.is_empty() {
            return Ok(args);
        }
        args.into_iter()
            .map(|arg| apply_all(&selected, path, arg))
            .collect()
    }
}

fn apply_all(selected: &[&FilterDescriptor], path: &str, value: Value) -> Result<Value, FilterError> {
    selected.iter().try_fold(value, |value, filter| {
        trace!(filter = filter.name(), direction = %filter.direction(), path, "applying filter");
        filter.apply(path, value)
    })
}
