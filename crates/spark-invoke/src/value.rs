//! 逻辑值图：请求参数与响应结果在调用链路中的统一表示。
//!
//! # 设计背景（Why）
//! - 兼容过滤器需要在整张对象图（含任意深度的嵌套字段）中定位“某种类型”的对象并原地替换；
//! - 以显式的 [`TypeTag`] 标注每个记录的具体形状，取代运行时反射，过滤器按声明的输入标签匹配。
//!
//! # 契约（What）
//! - [`Record`] 携带类型标签与有序字段表，字段顺序稳定（`BTreeMap`），便于比较与快照；
//! - [`Value::to_json`] 输出面向客户端的线上形状（不含类型标签）；
//! - `serde` 派生的表示保留类型标签，用于节点间编解码（见 [`crate::codec`]）。

use std::borrow::Cow;
use std::collections::BTreeMap;
use std::fmt;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

/// 记录的具体形状标签。
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TypeTag(Cow<'static, str>);

impl TypeTag {
    /// 未声明类型的记录（例如从客户端 JSON 解析得到的嵌套对象）。
    pub const ANONYMOUS: TypeTag = TypeTag(Cow::Borrowed("anonymous"));

    pub const fn from_static(name: &'static str) -> Self {
        Self(Cow::Borrowed(name))
    }

    pub fn new(name: impl Into<Cow<'static, str>>) -> Self {
        Self(name.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_anonymous(&self) -> bool {
        *self == Self::ANONYMOUS
    }
}

impl fmt::Display for TypeTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// 值图节点。
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum Value {
    Null,
    Bool(bool),
    Int(i64),
    /// 超出 `i64` 的无符号整数（例如旧客户端的 64 位数字编号）。
    UInt(u64),
    Float(f64),
    Text(String),
    List(Vec<Value>),
    Record(Record),
}

impl Value {
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            Value::Text(text) => Some(text),
            _ => None,
        }
    }

    pub fn as_int(&self) -> Option<i64> {
        match self {
            Value::Int(value) => Some(*value),
            Value::UInt(value) => i64::try_from(*value).ok(),
            _ => None,
        }
    }

    pub fn as_uint(&self) -> Option<u64> {
        match self {
            Value::Int(value) => u64::try_from(*value).ok(),
            Value::UInt(value) => Some(*value),
            _ => None,
        }
    }

    pub fn as_list(&self) -> Option<&[Value]> {
        match self {
            Value::List(items) => Some(items),
            _ => None,
        }
    }

    pub fn as_record(&self) -> Option<&Record> {
        match self {
            Value::Record(record) => Some(record),
            _ => None,
        }
    }

    pub fn into_record(self) -> Option<Record> {
        match self {
            Value::Record(record) => Some(record),
            _ => None,
        }
    }

    /// 从客户端 JSON 构造值图；对象一律成为匿名记录。
    pub fn from_json(json: serde_json::Value) -> Self {
        match json {
            serde_json::Value::Null => Value::Null,
            serde_json::Value::Bool(flag) => Value::Bool(flag),
            serde_json::Value::Number(number) => {
                if let Some(int) = number.as_i64() {
                    Value::Int(int)
                } else if let Some(uint) = number.as_u64() {
                    Value::UInt(uint)
                } else {
                    number.as_f64().map(Value::Float).unwrap_or(Value::Null)
                }
            }
            serde_json::Value::String(text) => Value::Text(text),
            serde_json::Value::Array(items) => {
                Value::List(items.into_iter().map(Value::from_json).collect())
            }
            serde_json::Value::Object(map) => Value::Record(Record::from_json_map(TypeTag::ANONYMOUS, map)),
        }
    }

    /// 输出线上形状：记录退化为普通对象，类型标签不外泄。
    pub fn to_json(&self) -> serde_json::Value {
        match self {
            Value::Null => serde_json::Value::Null,
            Value::Bool(flag) => serde_json::Value::Bool(*flag),
            Value::Int(int) => serde_json::Value::from(*int),
            Value::UInt(uint) => serde_json::Value::from(*uint),
            Value::Float(float) => serde_json::Number::from_f64(*float)
                .map(serde_json::Value::Number)
                .unwrap_or(serde_json::Value::Null),
            Value::Text(text) => serde_json::Value::String(text.clone()),
            Value::List(items) => serde_json::Value::Array(items.iter().map(Value::to_json).collect()),
            Value::Record(record) => record.to_json(),
        }
    }

    /// 后序遍历整张值图，对每个记录调用 `rewrite` 并以其返回值原地替换。
    ///
    /// # 教案式说明
    /// - **执行逻辑 (How)**：先递归处理列表元素与记录字段，再把处理后的记录交给 `rewrite`；
    ///   `rewrite` 的输出不会再次被遍历，因此输出与输入同形状时也不会陷入循环；
    /// - **契约 (What)**：任一节点返回错误时立即中止，部分改写的值图随之丢弃。
    pub fn try_rewrite_records<E, F>(self, rewrite: &mut F) -> Result<Value, E>
    where
        F: FnMut(Record) -> Result<Value, E>,
    {
        match self {
            Value::List(items) => items
                .into_iter()
                .map(|item| item.try_rewrite_records(rewrite))
                .collect::<Result<Vec<_>, E>>()
                .map(Value::List),
            Value::Record(record) => {
                let Record { tag, fields } = record;
                let mut rewritten = BTreeMap::new();
                for (key, value) in fields {
                    rewritten.insert(key, value.try_rewrite_records(rewrite)?);
                }
                rewrite(Record {
                    tag,
                    fields: rewritten,
                })
            }
            scalar => Ok(scalar),
        }
    }
}

impl From<&str> for Value {
    fn from(text: &str) -> Self {
        Value::Text(text.to_owned())
    }
}

impl From<String> for Value {
    fn from(text: String) -> Self {
        Value::Text(text)
    }
}

impl From<i64> for Value {
    fn from(value: i64) -> Self {
        Value::Int(value)
    }
}

impl From<u64> for Value {
    fn from(value: u64) -> Self {
        Value::UInt(value)
    }
}

impl From<bool> for Value {
    fn from(flag: bool) -> Self {
        Value::Bool(flag)
    }
}

impl From<f64> for Value {
    fn from(value: f64) -> Self {
        Value::Float(value)
    }
}

impl From<Record> for Value {
    fn from(record: Record) -> Self {
        Value::Record(record)
    }
}

impl From<Vec<Value>> for Value {
    fn from(items: Vec<Value>) -> Self {
        Value::List(items)
    }
}

/// 带类型标签的记录。
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Record {
    #[serde(rename = "type")]
    tag: TypeTag,
    fields: BTreeMap<String, Value>,
}

impl Record {
    pub fn new(tag: TypeTag) -> Self {
        Self {
            tag,
            fields: BTreeMap::new(),
        }
    }

    /// 链式追加字段。
    pub fn with(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.fields.insert(key.into(), value.into());
        self
    }

    pub fn tag(&self) -> &TypeTag {
        &self.tag
    }

    /// 更换类型标签，常用于“读入匿名对象后声明其形状”。
    pub fn retag(mut self, tag: TypeTag) -> Self {
        self.tag = tag;
        self
    }

    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<Value>) -> Option<Value> {
        self.fields.insert(key.into(), value.into())
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.fields.get(key)
    }

    pub fn remove(&mut self, key: &str) -> Option<Value> {
        self.fields.remove(key)
    }

    pub fn text(&self, key: &str) -> Option<&str> {
        self.get(key).and_then(Value::as_text)
    }

    pub fn record(&self, key: &str) -> Option<&Record> {
        self.get(key).and_then(Value::as_record)
    }

    pub fn contains(&self, key: &str) -> bool {
        self.fields.contains_key(key)
    }

    pub fn fields(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.fields.iter().map(|(key, value)| (key.as_str(), value))
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// 以客户端 JSON 对象构造记录，根记录使用给定标签，嵌套对象为匿名记录。
    pub fn from_json(tag: TypeTag, json: serde_json::Value) -> Result<Self, serde_json::Error> {
        match json {
            serde_json::Value::Object(map) => Ok(Self::from_json_map(tag, map)),
            other => Err(serde::de::Error::custom(format!(
                "expected a JSON object for `{tag}`, found `{other}`"
            ))),
        }
    }

    /// 把任意可序列化的结构体转换为记录。
    pub fn from_serialize<T: Serialize>(tag: TypeTag, value: &T) -> Result<Self, serde_json::Error> {
        Self::from_json(tag, serde_json::to_value(value)?)
    }

    /// 把记录的线上形状反序列化为具体类型。
    pub fn deserialize_into<T: DeserializeOwned>(&self) -> Result<T, serde_json::Error> {
        serde_json::from_value(self.to_json())
    }

    pub fn to_json(&self) -> serde_json::Value {
        serde_json::Value::Object(
            self.fields
                .iter()
                .map(|(key, value)| (key.clone(), value.to_json()))
                .collect(),
        )
    }

    fn from_json_map(tag: TypeTag, map: serde_json::Map<String, serde_json::Value>) -> Self {
        Self {
            tag,
            fields: map
                .into_iter()
                .map(|(key, value)| (key, Value::from_json(value)))
                .collect(),
        }
    }
}
