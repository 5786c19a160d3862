use std::sync::Arc;

use super::descriptor::{EndpointDescriptor, ServiceDescriptor};

/// 启动期注册表：取代注解扫描的显式 `(service, endpoint)` 行集合。
///
/// # 教案式说明
/// - **意图 (Why)**：端点发现不依赖运行时反射，所有实现都在一张可审阅的表中列出；
/// - **契约 (What)**：行的顺序即服务内端点的注册顺序；同一服务的行在
///   [`RegistrationTable::into_services`] 中按首次出现的位置聚合；
/// - **后置条件**：表本身不做冲突校验，冲突在 [`EndpointRegistry::register`](super::EndpointRegistry::register)
///   时以 [`RegistrationError`](crate::error::RegistrationError) 快速失败。
#[derive(Clone, Debug, Default)]
pub struct RegistrationTable {
    rows: Vec<(Arc<str>, EndpointDescriptor)>,
}

impl RegistrationTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// 追加一行。
    pub fn endpoint(mut self, service: impl Into<Arc<str>>, descriptor: EndpointDescriptor) -> Self {
        self.push(service, descriptor);
        self
    }

    pub fn push(&mut self, service: impl Into<Arc<str>>, descriptor: EndpointDescriptor) {
        self.rows.push((service.into(), descriptor));
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// 按服务聚合为 [`ServiceDescriptor`] 列表。
    pub fn into_services(self) -> Vec<ServiceDescriptor> {
        let mut services: Vec<ServiceDescriptor> = Vec::new();
        for (service, descriptor) in self.rows {
            match services.iter_mut().find(|existing| existing.name() == &*service) {
                Some(existing) => existing.push(descriptor),
                None => services.push(ServiceDescriptor::new(service).with_endpoint(descriptor)),
            }
        }
        services
    }
}
