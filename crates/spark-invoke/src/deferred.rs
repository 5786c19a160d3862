//! 延迟调用与调用级覆盖。
//!
//! # 设计背景（Why）
//! - 调用方有时需要对“接下来这一次调用”强制指定策略、变体或远端 profile，
//!   而不修改全局配置，也不改变被调用的服务接口签名；
//! - 覆盖放在当前线程的调用作用域槽位中，调度器在开始执行之前取走（清空）它，
//!   因此嵌套的下游调用不会继承外层覆盖。
//!
//! # 用法（How）
//! ```ignore
//! let result = defer(|| client.call("/customer/enroll", args))
//!     .using(StrategyKind::LocalOnly)
//!     .execute()?;
//! ```
//!
//! 显式传参的等价写法见 [`InvocationRequest::with_overrides`](crate::invoker::InvocationRequest::with_overrides)。

use std::cell::RefCell;

use crate::context::{Overrides, ProfileId};
use crate::registry::Variant;
use crate::strategy::StrategyKind;

thread_local! {
    static PENDING: RefCell<Option<Overrides>> = const { RefCell::new(None) };
}

/// 取走当前线程上待生效的覆盖，之后槽位为空。
pub(crate) fn take_pending() -> Option<Overrides> {
    PENDING.with(|slot| slot.borrow_mut().take())
}

/// 当前线程是否存在尚未被取走的覆盖。
pub fn has_pending_override() -> bool {
    PENDING.with(|slot| slot.borrow().is_some())
}

/// 包装一次尚未执行的调用。
pub fn defer<F>(call: F) -> Deferred<F> {
    Deferred {
        call,
        overrides: Overrides::new(),
    }
}

/// 携带覆盖的延迟调用。
#[must_use = "a deferred call does nothing until `execute` is called"]
pub struct Deferred<F> {
    call: F,
    overrides: Overrides,
}

impl<F> Deferred<F> {
    /// 强制使用指定策略。
    pub fn using(mut self, strategy: StrategyKind) -> Self {
        self.overrides = self.overrides.with_strategy(strategy);
        self
    }

    pub fn with_profiles<I, P>(mut self, profiles: I) -> Self
    where
        I: IntoIterator<Item = P>,
        P: Into<ProfileId>,
    {
        self.overrides = self.overrides.with_profile_ids(profiles);
        self
    }

    pub fn with_variant(mut self, variant: Variant) -> Self {
        self.overrides = self.overrides.with_variant(variant);
        self
    }

    pub fn overrides(&self) -> &Overrides {
        &self.overrides
    }

    /// 放入覆盖并执行被包装的调用。
    ///
    /// # 契约说明（What）
    /// - 覆盖只对被包装闭包发起的**第一次**调度生效；
    /// - 闭包返回（或 panic 展开）时，若覆盖仍未被取走，守卫会清空槽位并恢复外层的待生效覆盖，
    ///   避免泄漏到之后无关的调用。
    pub fn execute<T>(self) -> T
    where
        F: FnOnce() -> T,
    {
        let _guard = SlotGuard::install(self.overrides);
        (self.call)()
    }
}

/// 安装覆盖并在离开作用域时恢复之前的槽位内容。
struct SlotGuard {
    previous: Option<Overrides>,
}

impl SlotGuard {
    fn install(overrides: Overrides) -> Self {
        let previous = PENDING.with(|slot| slot.borrow_mut().replace(overrides));
        Self { previous }
    }
}

impl Drop for SlotGuard {
    fn drop(&mut self) {
        let previous = self.previous.take();
        PENDING.with(|slot| *slot.borrow_mut() = previous);
    }
}
