//! 策略配置：按服务、按端点声明执行策略、远端 profile 与审计采样开关。
//!
//! # 设计背景（Why）
//! - 运维需要在不重新部署的情况下把某个服务从本地切到远端、或临时打开采样；
//! - 配置以 TOML 描述，整份替换后通过 `ArcSwap` 发布，读路径不加锁；
//! - 每次调用都要查一次 (service, path) 的生效策略，查询结果缓存在 `DashMap` 中，
//!   重新加载时整体失效。
//!
//! # 配置形状（What）
//! ```toml
//! installation_id = "store-0042"
//!
//! [services.loyalty]
//! strategy = "remote_first"
//! profile_ids = ["central"]
//! sampling_enabled = true
//!
//! [services.loyalty.endpoints."/customer/enroll"]
//! strategy = "local_only"
//! ```
//!
//! # 优先级
//! - 策略：调用级覆盖 > 端点配置 > 描述符声明 > 服务配置 > `local_only`；
//! - profile：端点配置 > 描述符声明 > 服务配置；
//! - 采样：端点配置 > 服务配置 > 描述符声明。

use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use arc_swap::ArcSwap;
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::context::{InvocationContext, MethodId, ProfileId, profiles_are_trivial};
use crate::error::ConfigError;
use crate::registry::EndpointDescriptor;
use crate::strategy::StrategyKind;

/// 未配置安装标识时使用的占位值。
pub const UNASSIGNED_INSTALLATION: &str = "unassigned";

/// 调用层配置根。
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct InvocationConfig {
    /// 当前实例的安装标识，作为指标标签与审计样本字段。
    pub installation_id: String,
    pub services: BTreeMap<String, ServiceConfig>,
}

impl Default for InvocationConfig {
    fn default() -> Self {
        Self {
            installation_id: UNASSIGNED_INSTALLATION.to_owned(),
            services: BTreeMap::new(),
        }
    }
}

impl InvocationConfig {
    pub fn from_toml_str(raw: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(raw)?)
    }

    /// 从文件加载。
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_toml_str(&raw)
    }

    pub fn with_installation_id(mut self, id: impl Into<String>) -> Self {
        self.installation_id = id.into();
        self
    }

    pub fn with_service(mut self, name: impl Into<String>, service: ServiceConfig) -> Self {
        self.services.insert(name.into(), service);
        self
    }

    /// 计算 (service, path) 的配置层策略。
    pub fn policy(&self, service: &str, path: &str) -> StrategyPolicy {
        let Some(service) = self.services.get(service) else {
            return StrategyPolicy::default();
        };
        let endpoint = service.endpoints.get(path);
        StrategyPolicy {
            endpoint_strategy: endpoint.and_then(|e| e.strategy),
            service_strategy: service.strategy,
            endpoint_profiles: endpoint.map(|e| e.profile_ids.clone()).unwrap_or_default(),
            service_profiles: service.profile_ids.clone(),
            sampling: endpoint
                .and_then(|e| e.sampling_enabled)
                .or(service.sampling_enabled),
        }
    }
}

/// 服务级配置。
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServiceConfig {
    pub strategy: Option<StrategyKind>,
    pub profile_ids: Vec<ProfileId>,
    pub sampling_enabled: Option<bool>,
    pub endpoints: BTreeMap<String, EndpointConfig>,
}

impl ServiceConfig {
    pub fn with_strategy(mut self, strategy: StrategyKind) -> Self {
        self.strategy = Some(strategy);
        self
    }

    pub fn with_sampling(mut self, enabled: bool) -> Self {
        self.sampling_enabled = Some(enabled);
        self
    }

    pub fn with_endpoint(mut self, path: impl Into<String>, endpoint: EndpointConfig) -> Self {
        self.endpoints.insert(path.into(), endpoint);
        self
    }
}

/// 端点级配置，覆盖服务级同名字段。
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EndpointConfig {
    pub strategy: Option<StrategyKind>,
    pub profile_ids: Vec<ProfileId>,
    pub sampling_enabled: Option<bool>,
}

impl EndpointConfig {
    pub fn with_strategy(mut self, strategy: StrategyKind) -> Self {
        self.strategy = Some(strategy);
        self
    }

    pub fn with_sampling(mut self, enabled: bool) -> Self {
        self.sampling_enabled = Some(enabled);
        self
    }
}

/// 配置层对某个 (service, path) 给出的策略，尚未与描述符声明合并。
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct StrategyPolicy {
    endpoint_strategy: Option<StrategyKind>,
    service_strategy: Option<StrategyKind>,
    endpoint_profiles: Vec<ProfileId>,
    service_profiles: Vec<ProfileId>,
    sampling: Option<bool>,
}

impl StrategyPolicy {
    pub fn strategy_for(&self, endpoint: &EndpointDescriptor) -> StrategyKind {
        self.endpoint_strategy
            .or(endpoint.strategy())
            .or(self.service_strategy)
            .unwrap_or_default()
    }

    pub fn profile_ids_for(&self, endpoint: &EndpointDescriptor) -> Vec<ProfileId> {
        if !profiles_are_trivial(&self.endpoint_profiles) {
            return self.endpoint_profiles.clone();
        }
        if let Some(declared) = endpoint.profile() {
            return vec![declared.clone()];
        }
        self.service_profiles.clone()
    }

    pub fn sampling_for(&self, endpoint: &EndpointDescriptor) -> bool {
        self.sampling.unwrap_or(endpoint.sampling())
    }

    /// 把配置层策略写入上下文（调用级覆盖在此之后合并）。
    pub fn apply(&self, ctx: InvocationContext) -> InvocationContext {
        let endpoint = Arc::clone(ctx.endpoint());
        ctx.with_strategy(self.strategy_for(&endpoint))
            .with_profile_ids(self.profile_ids_for(&endpoint))
            .with_sampling(self.sampling_for(&endpoint))
    }
}

struct CachedPolicy {
    generation: u64,
    policy: Arc<StrategyPolicy>,
}

/// 可热更新的配置存储。
///
/// # 教案式说明
/// - **读路径 (How)**：先查 `DashMap` 缓存，条目代数与当前代数一致即命中；否则基于当前配置快照重算并回填；
/// - **写路径**：[`Self::reload`] 先发布新配置、再递增代数、最后清空缓存，
///   并发读者即便回填了旧结果，也会因代数不符在下次读取时重算；
/// - **风险 (Trade-offs)**：`DashMap` guard 持有期间会阻塞同分片写入，本实现只在克隆 `Arc` 的瞬间持有。
pub struct StrategyConfigStore {
    config: ArcSwap<InvocationConfig>,
    generation: AtomicU64,
    cache: DashMap<MethodId, CachedPolicy>,
}

impl StrategyConfigStore {
    pub fn new(config: InvocationConfig) -> Self {
        Self {
            config: ArcSwap::from_pointee(config),
            generation: AtomicU64::new(0),
            cache: DashMap::new(),
        }
    }

    pub fn current(&self) -> Arc<InvocationConfig> {
        self.config.load_full()
    }

    pub fn installation_id(&self) -> Arc<str> {
        Arc::from(self.config.load().installation_id.as_str())
    }

    pub fn generation(&self) -> u64 {
        self.generation.load(Ordering::Acquire)
    }

    /// 查询 (service, path) 的配置层策略。
    pub fn policy(&self, method: &MethodId) -> Arc<StrategyPolicy> {
        let generation = self.generation.load(Ordering::Acquire);
        if let Some(cached) = self.cache.get(method)
            && cached.generation == generation
        {
            return Arc::clone(&cached.policy);
        }
        let policy = Arc::new(self.config.load().policy(method.service(), method.path()));
        self.cache.insert(
            method.clone(),
            CachedPolicy {
                generation,
                policy: Arc::clone(&policy),
            },
        );
        policy
    }

    /// 整份替换配置并使全部缓存失效。
    pub fn reload(&self, config: InvocationConfig) {
        let services = config.services.len();
        self.config.store(Arc::new(config));
        let generation = self.generation.fetch_add(1, Ordering::AcqRel) + 1;
        self.cache.clear();
        info!(generation, services, "invocation config reloaded");
    }

    pub fn reload_from_toml(&self, raw: &str) -> Result<(), ConfigError> {
        self.reload(InvocationConfig::from_toml_str(raw)?);
        Ok(())
    }

    pub fn cached_entries(&self) -> usize {
        self.cache.len()
    }
}

impl Default for StrategyConfigStore {
    fn default() -> Self {
        Self::new(InvocationConfig::default())
    }
}
