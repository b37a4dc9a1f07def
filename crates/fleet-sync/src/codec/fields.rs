//! 逐字段的类型化提取
//!
//! 每个提取步骤只产出一个字段级结果：必填字段返回 `Result`，
//! 其余字段在缺失或类型不符时回退到默认值。

use chrono::{DateTime, Utc};
use uuid::Uuid;

use super::value::{FieldMap, FieldValue};
use super::{parse_document_id, DecodeError};

/// 文档（或嵌套 map）的只读视图；缺失的嵌套 map 视为空
#[derive(Debug, Clone, Copy)]
pub struct Fields<'a> {
    map: Option<&'a FieldMap>,
}

impl<'a> Fields<'a> {
    pub fn new(map: &'a FieldMap) -> Self {
        Self { map: Some(map) }
    }

    /// 空视图：所有可选字段取默认值
    pub fn empty() -> Self {
        Self { map: None }
    }

    pub fn get(&self, key: &str) -> Option<&'a FieldValue> {
        self.map.and_then(|m| m.get(key))
    }

    pub fn contains(&self, key: &str) -> bool {
        self.get(key).is_some()
    }

    // ---- 必填 ----

    pub fn required_str(&self, key: &'static str) -> Result<&'a str, DecodeError> {
        match self.get(key) {
            None | Some(FieldValue::Null) => Err(DecodeError::MissingField(key)),
            Some(FieldValue::String(s)) => Ok(s),
            Some(other) => Err(DecodeError::wrong_type(key, "string", other)),
        }
    }

    pub fn required_i64(&self, key: &'static str) -> Result<i64, DecodeError> {
        match self.get(key) {
            None | Some(FieldValue::Null) => Err(DecodeError::MissingField(key)),
            Some(other) => other
                .as_i64()
                .ok_or_else(|| DecodeError::wrong_type(key, "integer", other)),
        }
    }

    /// 字符串形式的 UUID（嵌套条目的 id）
    pub fn required_uuid(&self, key: &'static str) -> Result<Uuid, DecodeError> {
        let raw = self.required_str(key)?;
        parse_document_id(raw).ok_or_else(|| DecodeError::InvalidId {
            field: key,
            value: raw.to_string(),
        })
    }

    // ---- 可选（带默认值）----

    pub fn str_or_default(&self, key: &str) -> String {
        self.get(key)
            .and_then(FieldValue::as_str)
            .map(str::to_string)
            .unwrap_or_default()
    }

    pub fn i64_or_default(&self, key: &str) -> i64 {
        self.optional_i64(key).unwrap_or(0)
    }

    pub fn optional_i64(&self, key: &str) -> Option<i64> {
        self.get(key).and_then(FieldValue::as_i64)
    }

    pub fn bool_or_default(&self, key: &str) -> bool {
        self.get(key).and_then(FieldValue::as_bool).unwrap_or(false)
    }

    pub fn optional_str(&self, key: &str) -> Option<&'a str> {
        self.get(key).and_then(FieldValue::as_str)
    }

    pub fn timestamp_or(&self, key: &str, fallback: DateTime<Utc>) -> DateTime<Utc> {
        self.get(key)
            .and_then(FieldValue::as_timestamp)
            .unwrap_or(fallback)
    }

    /// 嵌套 map；缺失或不是 map 时返回空视图
    pub fn nested(&self, key: &str) -> Fields<'a> {
        Fields {
            map: self.get(key).and_then(FieldValue::as_map),
        }
    }

    /// 嵌套 map，严格模式：缺失或不是 map 返回 None
    pub fn nested_strict(&self, key: &str) -> Option<Fields<'a>> {
        self.get(key).and_then(FieldValue::as_map).map(Fields::new)
    }

    /// 数组元素；字段缺失或不是数组时为空
    pub fn array(&self, key: &str) -> &'a [FieldValue] {
        self.get(key).and_then(FieldValue::as_array).unwrap_or(&[])
    }
}
