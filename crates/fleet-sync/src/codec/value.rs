//! 远端文档的弱类型字段模型
//!
//! 远端文档是 `key -> FieldValue` 的映射，值可以嵌套。时间戳是原生类型，
//! 服务端时间戳用哨兵值表示，由远端在写入时解析。

use std::collections::BTreeMap;

use chrono::{DateTime, Timelike, Utc};

// [-2^63, 2^63)：f64 能精确表示这两个边界
const I64_MIN_F64: f64 = -9_223_372_036_854_775_808.0;
const I64_MAX_F64: f64 = 9_223_372_036_854_775_808.0;

/// 文档字段映射（按 key 排序，便于比较与调试输出）
pub type FieldMap = BTreeMap<String, FieldValue>;

/// 由远端在写入时填充的服务端时间戳
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ServerTimestamp {
    /// 仅在文档首次创建时写入，之后保持不变
    OnCreate,
    /// 每次写入都刷新
    Always,
}

#[derive(Debug, Clone, PartialEq)]
pub enum FieldValue {
    Null,
    Bool(bool),
    Integer(i64),
    Double(f64),
    String(String),
    Timestamp(DateTime<Utc>),
    Array(Vec<FieldValue>),
    Map(FieldMap),
    ServerTimestamp(ServerTimestamp),
}

impl FieldValue {
    /// 构造时间戳值；远端精度为微秒，超出部分截断
    pub fn timestamp(dt: DateTime<Utc>) -> Self {
        FieldValue::Timestamp(truncate_to_micros(dt))
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            FieldValue::String(s) => Some(s),
            _ => None,
        }
    }

    /// 整数；值为整数的 Double 也接受（如 `2021.0`），小数与超出 i64 范围的值返回 None
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            FieldValue::Integer(i) => Some(*i),
            FieldValue::Double(d) if d.fract() == 0.0 && (I64_MIN_F64..I64_MAX_F64).contains(d) => {
                Some(*d as i64)
            }
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            FieldValue::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_timestamp(&self) -> Option<DateTime<Utc>> {
        match self {
            FieldValue::Timestamp(t) => Some(*t),
            _ => None,
        }
    }

    pub fn as_map(&self) -> Option<&FieldMap> {
        match self {
            FieldValue::Map(m) => Some(m),
            _ => None,
        }
    }

    pub fn as_array(&self) -> Option<&[FieldValue]> {
        match self {
            FieldValue::Array(a) => Some(a),
            _ => None,
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, FieldValue::Null)
    }

    /// 类型名（用于错误信息）
    pub fn type_name(&self) -> &'static str {
        match self {
            FieldValue::Null => "null",
            FieldValue::Bool(_) => "bool",
            FieldValue::Integer(_) => "integer",
            FieldValue::Double(_) => "double",
            FieldValue::String(_) => "string",
            FieldValue::Timestamp(_) => "timestamp",
            FieldValue::Array(_) => "array",
            FieldValue::Map(_) => "map",
            FieldValue::ServerTimestamp(_) => "server_timestamp",
        }
    }
}

fn truncate_to_micros(dt: DateTime<Utc>) -> DateTime<Utc> {
    let nanos = dt.nanosecond();
    dt.with_nanosecond(nanos - nanos % 1_000).unwrap_or(dt)
}

impl From<&str> for FieldValue {
    fn from(v: &str) -> Self {
        FieldValue::String(v.to_string())
    }
}

impl From<String> for FieldValue {
    fn from(v: String) -> Self {
        FieldValue::String(v)
    }
}

impl From<&String> for FieldValue {
    fn from(v: &String) -> Self {
        FieldValue::String(v.clone())
    }
}

impl From<i64> for FieldValue {
    fn from(v: i64) -> Self {
        FieldValue::Integer(v)
    }
}

impl From<i32> for FieldValue {
    fn from(v: i32) -> Self {
        FieldValue::Integer(i64::from(v))
    }
}

impl From<bool> for FieldValue {
    fn from(v: bool) -> Self {
        FieldValue::Bool(v)
    }
}

impl From<f64> for FieldValue {
    fn from(v: f64) -> Self {
        FieldValue::Double(v)
    }
}

impl From<DateTime<Utc>> for FieldValue {
    fn from(v: DateTime<Utc>) -> Self {
        FieldValue::timestamp(v)
    }
}

impl From<FieldMap> for FieldValue {
    fn from(v: FieldMap) -> Self {
        FieldValue::Map(v)
    }
}

impl From<Vec<FieldValue>> for FieldValue {
    fn from(v: Vec<FieldValue>) -> Self {
        FieldValue::Array(v)
    }
}

/// JSON → 文档值。JSON 没有时间戳类型，字符串保持为字符串；
/// 可无损表示为 i64 的数字映射为 Integer，其余为 Double。
impl From<serde_json::Value> for FieldValue {
    fn from(v: serde_json::Value) -> Self {
        match v {
            serde_json::Value::Null => FieldValue::Null,
            serde_json::Value::Bool(b) => FieldValue::Bool(b),
            serde_json::Value::Number(n) => match n.as_i64() {
                Some(i) => FieldValue::Integer(i),
                None => FieldValue::Double(n.as_f64().unwrap_or_default()),
            },
            serde_json::Value::String(s) => FieldValue::String(s),
            serde_json::Value::Array(items) => {
                FieldValue::Array(items.into_iter().map(FieldValue::from).collect())
            }
            serde_json::Value::Object(obj) => FieldValue::Map(
                obj.into_iter()
                    .map(|(k, v)| (k, FieldValue::from(v)))
                    .collect(),
            ),
        }
    }
}

/// 从 JSON 对象构造文档；非对象返回空文档
pub fn field_map_from_json(v: serde_json::Value) -> FieldMap {
    match FieldValue::from(v) {
        FieldValue::Map(m) => m,
        _ => FieldMap::new(),
    }
}
