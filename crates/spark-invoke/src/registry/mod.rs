//! 端点注册表：把逻辑 (service, path, variant) 解析为唯一胜出的端点描述符。
//!
//! # 设计动机（Why）
//! - **读路径零锁**：服务表与每个服务的解析缓存都以 `ArcSwap` 持有，解析时只做 `load`；
//! - **按服务隔离写入**：运行时切换某个服务的实现变体只替换该服务自己的状态（变体 + 缓存），
//!   不影响其他服务的读者，也不需要全局锁；
//! - **注册期快速失败**：重复的 override 或重复的实现在注册时就报错，而不是拖到调用时。
//!
//! # 解析优先级（How）
//! 1. 命中 (path, variant) 的 override；
//! 2. 否则命中 (path, variant) 的变体实现；
//! 3. 否则回退到默认变体（默认变体上的 override 优先于普通默认实现），并在
//!    [`Resolution`] 中报告实际使用的变体；
//! 4. 仍未命中则返回 [`InvokeError::EndpointNotFound`]。

mod descriptor;
mod table;

pub use descriptor::{EndpointDescriptor, EndpointHandler, ServiceDescriptor, Variant};
pub use table::RegistrationTable;

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use arc_swap::ArcSwap;
use parking_lot::Mutex;
use tracing::{debug, info};

use crate::error::{InvokeError, RegistrationError};

/// 解析结果来源。
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ResolutionSource {
    Override,
    Variant,
    Default,
}

/// 一次端点解析的结果。
///
/// - `requested` 为调用方请求的变体，`actual` 为实际命中描述符的变体；
/// - 两者不同即发生了默认变体回退，需要精确匹配的调用方可据此告警。
#[derive(Clone, Debug)]
pub struct Resolution {
    endpoint: Arc<EndpointDescriptor>,
    requested: Variant,
    source: ResolutionSource,
}

impl Resolution {
    pub fn endpoint(&self) -> &Arc<EndpointDescriptor> {
        &self.endpoint
    }

    pub fn requested(&self) -> &Variant {
        &self.requested
    }

    pub fn actual(&self) -> &Variant {
        self.endpoint.variant()
    }

    pub fn source(&self) -> ResolutionSource {
        self.source
    }

    /// 是否回退到了默认变体。
    pub fn is_fallback(&self) -> bool {
        self.requested != *self.actual()
    }
}

/// 线程安全的端点注册表。
///
/// # 契约（What）
/// - [`Self::register`]/[`Self::from_table`] 在启动期调用；
/// - [`Self::resolve`] 按显式变体解析，不缓存；
/// - [`Self::resolve_active`] 按服务当前生效变体解析并缓存；
/// - [`Self::switch_variant`] 原子替换单个服务的生效变体并清空该服务缓存。
pub struct EndpointRegistry {
    services: ArcSwap<HashMap<Arc<str>, Arc<ServiceSlot>>>,
    writer: Mutex<()>,
    revision: AtomicU64,
}

impl EndpointRegistry {
    pub fn new() -> Self {
        Self {
            services: ArcSwap::from_pointee(HashMap::new()),
            writer: Mutex::new(()),
            revision: AtomicU64::new(0),
        }
    }

    /// 由启动期注册表构造。
    pub fn from_table(table: RegistrationTable) -> Result<Self, RegistrationError> {
        let registry = Self::new();
        for service in table.into_services() {
            registry.register(service)?;
        }
        Ok(registry)
    }

    /// 注册一个服务。
    ///
    /// # 教案式说明
    /// - **流程 (How)**：先构建只读的优先级索引（期间校验冲突），再以整表替换的方式发布；
    /// - **契约 (What)**：同名服务重复注册、同一 (path, variant) 多个 override 或多个普通实现都会失败，
    ///   失败时注册表保持不变。
    pub fn register(&self, service: ServiceDescriptor) -> Result<(), RegistrationError> {
        let index = ServiceIndex::build(service)?;
        let name = Arc::clone(&index.name);

        let _guard = self.writer.lock();
        let current = self.services.load();
        if current.contains_key(&name) {
            return Err(RegistrationError::DuplicateService {
                service: name.to_string(),
            });
        }
        let mut next = HashMap::clone(&current);
        next.insert(
            Arc::clone(&name),
            Arc::new(ServiceSlot {
                index,
                state: ArcSwap::from_pointee(ServiceState::new(Variant::DEFAULT)),
            }),
        );
        self.services.store(Arc::new(next));
        let revision = self.revision.fetch_add(1, Ordering::AcqRel) + 1;
        debug!(service = %name, revision, "service registered");
        Ok(())
    }

    /// 按显式变体解析端点。
    pub fn resolve(&self, service: &str, path: &str, variant: &Variant) -> Result<Resolution, InvokeError> {
        let services = self.services.load();
        services
            .get(service)
            .and_then(|slot| slot.index.resolve(path, variant))
            .ok_or_else(|| InvokeError::endpoint_not_found(service, path, variant))
    }

    /// 按显式变体解析，且要求命中的正是该变体（不接受默认回退）。
    pub fn resolve_exact(&self, service: &str, path: &str, variant: &Variant) -> Result<Resolution, InvokeError> {
        let resolution = self.resolve(service, path, variant)?;
        if resolution.is_fallback() {
            return Err(InvokeError::endpoint_not_found(service, path, variant));
        }
        Ok(resolution)
    }

    /// 按服务当前生效变体解析，并缓存结果。
    ///
    /// # 教案式说明
    /// - **读路径 (How)**：加载服务状态快照，命中缓存直接返回；
    /// - **写回 (How)**：未命中时解析并以 `rcu` 写回，只有快照中的生效变体仍与解析所用变体一致时才写入，
    ///   避免并发的 [`Self::switch_variant`] 被旧结果污染。
    pub fn resolve_active(&self, service: &str, path: &str) -> Result<Resolution, InvokeError> {
        let services = self.services.load();
        let Some(slot) = services.get(service) else {
            return Err(InvokeError::endpoint_not_found(service, path, &Variant::DEFAULT));
        };

        let state = slot.state.load();
        if let Some(hit) = state.cache.get(path) {
            return Ok(hit.clone());
        }

        let resolution = slot
            .index
            .resolve(path, &state.active)
            .ok_or_else(|| InvokeError::endpoint_not_found(service, path, &state.active))?;

        slot.state.rcu(|current| {
            if current.active != resolution.requested || current.cache.contains_key(path) {
                return Arc::clone(current);
            }
            let mut next = ServiceState::clone(current);
            next.cache
                .insert(Arc::clone(resolution.endpoint.path_arc()), resolution.clone());
            Arc::new(next)
        });
        Ok(resolution)
    }

    /// 运行时把某个服务切换到指定实现变体。
    ///
    /// 仅替换该服务的状态快照：新变体与空缓存一次性发布，其他服务的缓存保持不变。
    pub fn switch_variant(&self, service: &str, variant: Variant) -> Result<(), RegistrationError> {
        let services = self.services.load();
        let slot = services
            .get(service)
            .ok_or_else(|| RegistrationError::UnknownService {
                service: service.to_owned(),
            })?;
        info!(service, variant = %variant, "switching active implementation variant");
        slot.state.store(Arc::new(ServiceState::new(variant)));
        Ok(())
    }

    /// 服务当前生效的变体。
    pub fn active_variant(&self, service: &str) -> Option<Variant> {
        self.services
            .load()
            .get(service)
            .map(|slot| slot.state.load().active.clone())
    }

    /// 服务当前缓存的解析条目数量，用于观测缓存失效行为。
    pub fn cached_paths(&self, service: &str) -> usize {
        self.services
            .load()
            .get(service)
            .map(|slot| slot.state.load().cache.len())
            .unwrap_or(0)
    }

    /// 导出只读目录快照。
    pub fn snapshot(&self) -> RegistrySnapshot {
        let services = self.services.load();
        let mut summaries: Vec<ServiceSummary> = services
            .values()
            .map(|slot| ServiceSummary {
                name: slot.index.name.to_string(),
                active_variant: slot.state.load().active.clone(),
                endpoints: slot
                    .index
                    .order
                    .iter()
                    .map(|endpoint| EndpointSummary {
                        path: endpoint.path().to_owned(),
                        variant: endpoint.variant().clone(),
                        is_override: endpoint.is_override(),
                    })
                    .collect(),
            })
            .collect();
        summaries.sort_by(|a, b| a.name.cmp(&b.name));
        RegistrySnapshot {
            revision: self.revision.load(Ordering::Acquire),
            services: summaries,
        }
    }
}

impl Default for EndpointRegistry {
    fn default() -> Self {
        Self::new()
    }
}

/// 注册表目录快照。
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RegistrySnapshot {
    pub revision: u64,
    pub services: Vec<ServiceSummary>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ServiceSummary {
    pub name: String,
    pub active_variant: Variant,
    pub endpoints: Vec<EndpointSummary>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct EndpointSummary {
    pub path: String,
    pub variant: Variant,
    pub is_override: bool,
}

struct ServiceSlot {
    index: ServiceIndex,
    state: ArcSwap<ServiceState>,
}

/// 单个服务的可变部分：生效变体与解析缓存，整体替换。
#[derive(Clone)]
struct ServiceState {
    active: Variant,
    cache: HashMap<Arc<str>, Resolution>,
}

impl ServiceState {
    fn new(active: Variant) -> Self {
        Self {
            active,
            cache: HashMap::new(),
        }
    }
}

/// 注册后只读的优先级索引。
struct ServiceIndex {
    name: Arc<str>,
    paths: HashMap<Arc<str>, PathCandidates>,
    order: Vec<Arc<EndpointDescriptor>>,
}

#[derive(Default)]
struct PathCandidates {
    overrides: HashMap<Variant, Arc<EndpointDescriptor>>,
    variants: HashMap<Variant, Arc<EndpointDescriptor>>,
}

impl ServiceIndex {
    fn build(service: ServiceDescriptor) -> Result<Self, RegistrationError> {
        let (name, endpoints) = service.into_parts();
        let mut paths: HashMap<Arc<str>, PathCandidates> = HashMap::new();
        let mut order = Vec::with_capacity(endpoints.len());

        for endpoint in endpoints {
            let endpoint = Arc::new(endpoint);
            let candidates = paths.entry(Arc::clone(endpoint.path_arc())).or_default();
            let bucket = if endpoint.is_override() {
                &mut candidates.overrides
            } else {
                &mut candidates.variants
            };
            if bucket.contains_key(endpoint.variant()) {
                let service = name.to_string();
                let path = endpoint.path().to_owned();
                let variant = endpoint.variant().clone();
                return Err(if endpoint.is_override() {
                    RegistrationError::DuplicateOverride { service, path, variant }
                } else {
                    RegistrationError::DuplicateEndpoint { service, path, variant }
                });
            }
            bucket.insert(endpoint.variant().clone(), Arc::clone(&endpoint));
            order.push(endpoint);
        }

        Ok(Self { name, paths, order })
    }

    fn resolve(&self, path: &str, variant: &Variant) -> Option<Resolution> {
        let candidates = self.paths.get(path)?;
        let hit = |endpoint: &Arc<EndpointDescriptor>, source| Resolution {
            endpoint: Arc::clone(endpoint),
            requested: variant.clone(),
            source,
        };

        if let Some(endpoint) = candidates.overrides.get(variant) {
            return Some(hit(endpoint, ResolutionSource::Override));
        }
        if !variant.is_default()
            && let Some(endpoint) = candidates.variants.get(variant)
        {
            return Some(hit(endpoint, ResolutionSource::Variant));
        }
        if !variant.is_default()
            && let Some(endpoint) = candidates.overrides.get(&Variant::DEFAULT)
        {
            return Some(hit(endpoint, ResolutionSource::Override));
        }
        candidates
            .variants
            .get(&Variant::DEFAULT)
            .map(|endpoint| hit(endpoint, ResolutionSource::Default))
    }
}
