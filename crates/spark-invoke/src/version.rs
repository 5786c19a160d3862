//! 客户端版本与版本区间。
//!
//! # 设计背景（Why）
//! - 兼容过滤器与策略配置都以“客户端版本落在哪个区间”作为作用域；
//! - 客户端通过自定义请求头上报版本，格式并不总是完整的语义化版本（常见 `1.5`、`v2`），
//!   因此解析采用宽松补零，但解析失败时绝不猜测，统一视为 [`ClientVersion::Unknown`]。
//!
//! # 契约（What）
//! - [`VersionRange`] 两端均为开区间，任一端可缺省；两端都存在时必须满足 lower < upper；
//! - 未知版本只命中两端都未设界的区间。

use std::cmp::Ordering;
use std::fmt;

use semver::Version;

use crate::error::RangeError;

/// 调用方上报的客户端版本。
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash)]
pub enum ClientVersion {
    Known(Version),
    #[default]
    Unknown,
}

impl ClientVersion {
    /// 解析请求头中的版本字符串；缺省或无法解析时返回 `Unknown`。
    pub fn from_header(raw: Option<&str>) -> Self {
        raw.and_then(parse_lenient)
            .map(ClientVersion::Known)
            .unwrap_or(ClientVersion::Unknown)
    }

    pub fn known(&self) -> Option<&Version> {
        match self {
            ClientVersion::Known(version) => Some(version),
            ClientVersion::Unknown => None,
        }
    }

    pub fn is_known(&self) -> bool {
        matches!(self, ClientVersion::Known(_))
    }
}

impl From<&str> for ClientVersion {
    fn from(raw: &str) -> Self {
        ClientVersion::from_header(Some(raw))
    }
}

impl From<Option<&str>> for ClientVersion {
    fn from(raw: Option<&str>) -> Self {
        ClientVersion::from_header(raw)
    }
}

impl From<Version> for ClientVersion {
    fn from(version: Version) -> Self {
        ClientVersion::Known(version)
    }
}

impl fmt::Display for ClientVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ClientVersion::Known(version) => write!(f, "{version}"),
            ClientVersion::Unknown => f.write_str("unknown"),
        }
    }
}

/// 宽松解析语义化版本。
///
/// # 执行逻辑（How）
/// 1. 去除首尾空白与可选的 `v`/`V` 前缀；
/// 2. 优先按严格语义化版本解析；
/// 3. 失败时将核心部分补零至三段（`1.5` → `1.5.0`），保留预发布/构建后缀后重试；
/// 4. 仍失败则返回 `None`。
pub fn parse_lenient(raw: &str) -> Option<Version> {
    let trimmed = raw.trim();
    let trimmed = trimmed.strip_prefix(['v', 'V']).unwrap_or(trimmed);
    if trimmed.is_empty() {
        return None;
    }
    if let Ok(version) = Version::parse(trimmed) {
        return Some(version);
    }

    let split = trimmed.find(['-', '+']).unwrap_or(trimmed.len());
    let (core, suffix) = trimmed.split_at(split);
    let segments = core.split('.').count();
    if core.is_empty() || segments >= 3 {
        return None;
    }
    let mut padded = String::with_capacity(trimmed.len() + 4);
    padded.push_str(core);
    for _ in segments..3 {
        padded.push_str(".0");
    }
    padded.push_str(suffix);
    Version::parse(&padded).ok()
}

/// 开区间版本范围，任一端可缺省。
///
/// # 教案式说明
/// - **意图 (Why)**：过滤器声明 `greater_than = 1.0, less_than = 2.0` 时，只作用于 `(1.0, 2.0)`
///   之间的客户端；边界版本本身不命中；
/// - **契约 (What)**：通过 [`VersionRange::new`] 构造时校验 lower < upper；
///   [`VersionRange::unbounded`] 命中所有版本（含未知）。
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct VersionRange {
    greater_than: Option<Version>,
    less_than: Option<Version>,
}

impl VersionRange {
    pub const fn unbounded() -> Self {
        Self {
            greater_than: None,
            less_than: None,
        }
    }

    pub fn new(
        greater_than: Option<Version>,
        less_than: Option<Version>,
    ) -> Result<Self, RangeError> {
        if let (Some(lower), Some(upper)) = (&greater_than, &less_than)
            && lower.cmp_precedence(upper) != Ordering::Less
        {
            return Err(RangeError::Inverted {
                lower: lower.to_string(),
                upper: upper.to_string(),
            });
        }
        Ok(Self {
            greater_than,
            less_than,
        })
    }

    /// 以字符串边界构造，边界同样采用宽松解析。
    pub fn parse(greater_than: Option<&str>, less_than: Option<&str>) -> Result<Self, RangeError> {
        Self::new(
            greater_than.map(parse_bound).transpose()?,
            less_than.map(parse_bound).transpose()?,
        )
    }

    /// `(version, +∞)`
    pub fn greater_than(version: &str) -> Result<Self, RangeError> {
        Self::parse(Some(version), None)
    }

    /// `(-∞, version)`
    pub fn less_than(version: &str) -> Result<Self, RangeError> {
        Self::parse(None, Some(version))
    }

    /// `(lower, upper)`
    pub fn between(lower: &str, upper: &str) -> Result<Self, RangeError> {
        Self::parse(Some(lower), Some(upper))
    }

    pub fn lower(&self) -> Option<&Version> {
        self.greater_than.as_ref()
    }

    pub fn upper(&self) -> Option<&Version> {
        self.less_than.as_ref()
    }

    pub fn is_unbounded(&self) -> bool {
        self.greater_than.is_none() && self.less_than.is_none()
    }

    /// 已知版本是否落在区间内。
    ///
    /// 按语义化版本优先级比较，构建元数据（`+build.7`）不参与排序。
    pub fn contains(&self, version: &Version) -> bool {
        let above = self
            .greater_than
            .as_ref()
            .is_none_or(|lower| version.cmp_precedence(lower) == Ordering::Greater);
        let below = self
            .less_than
            .as_ref()
            .is_none_or(|upper| version.cmp_precedence(upper) == Ordering::Less);
        above && below
    }

    /// 客户端版本是否命中；未知版本仅命中完全无界的区间。
    pub fn matches(&self, client: &ClientVersion) -> bool {
        match client {
            ClientVersion::Known(version) => self.contains(version),
            ClientVersion::Unknown => self.is_unbounded(),
        }
    }
}

impl fmt::Display for VersionRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (&self.greater_than, &self.less_than) {
            (None, None) => f.write_str("(*, *)"),
            (Some(lower), None) => write!(f, "({lower}, *)"),
            (None, Some(upper)) => write!(f, "(*, {upper})"),
            (Some(lower), Some(upper)) => write!(f, "({lower}, {upper})"),
        }
    }
}

fn parse_bound(raw: &str) -> Result<Version, RangeError> {
    parse_lenient(raw).ok_or_else(|| RangeError::InvalidBound {
        input: raw.to_owned(),
    })
}
