//! 全局日志订阅器安装。
//!
//! # 教案式说明
//! - **意图（Why）**：宿主只需调用一次 [`install`]，即可让调用链路上的 `tracing` 事件与 span 输出到标准输出；
//! - **逻辑（How）**：组装 `EnvFilter + fmt` Layer 并设置为全局 Subscriber；过滤指令优先读取
//!   `RUST_LOG`，缺省为 `info`；
//! - **契约（What）**：重复安装返回 [`LoggingError::AlreadyInstalled`]；外部已设置 Subscriber 时返回
//!   [`LoggingError::SubscriberAlreadySet`]。

use std::sync::OnceLock;

use thiserror::Error;
use tracing::dispatcher;
use tracing_subscriber::filter::ParseError;
use tracing_subscriber::{EnvFilter, layer::SubscriberExt};

static INSTALLED: OnceLock<()> = OnceLock::new();

/// 默认过滤指令。
pub const DEFAULT_DIRECTIVES: &str = "info";

#[derive(Debug, Error)]
pub enum LoggingError {
    #[error("spark-invoke logging is already installed")]
    AlreadyInstalled,

    #[error("a global tracing subscriber has already been set elsewhere")]
    SubscriberAlreadySet,

    #[error("invalid filter directives: {0}")]
    Directives(#[from] ParseError),

    #[error("failed to set global subscriber: {0}")]
    SetGlobalSubscriber(#[from] tracing::subscriber::SetGlobalDefaultError),
}

/// 以 `RUST_LOG`（缺省 `info`）安装全局订阅器。
pub fn install() -> Result<(), LoggingError> {
    install_filter(build_env_filter())
}

/// 以显式过滤指令安装全局订阅器，忽略 `RUST_LOG`。
pub fn install_with_directives(directives: &str) -> Result<(), LoggingError> {
    install_filter(EnvFilter::try_new(directives)?)
}

fn install_filter(filter: EnvFilter) -> Result<(), LoggingError> {
    if INSTALLED.get().is_some() {
        return Err(LoggingError::AlreadyInstalled);
    }
    if dispatcher::has_been_set() {
        return Err(LoggingError::SubscriberAlreadySet);
    }

    let subscriber = tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer());
    tracing::subscriber::set_global_default(subscriber)?;
    INSTALLED.set(()).map_err(|_| LoggingError::AlreadyInstalled)
}

fn build_env_filter() -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_DIRECTIVES))
}
