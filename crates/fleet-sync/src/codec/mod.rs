//! 记录编解码：Vehicle 聚合 ⇄ 远端弱类型文档
//!
//! - 编码是全函数：任何 Vehicle 都能编码成文档
//! - 解码是部分函数：`make` / `model` / `year` 与文档 key 必须合法，
//!   其他字段各自回退默认值；召回 / 保养条目独立校验，坏条目只丢弃自身

mod fields;
mod record;
pub mod value;

pub use fields::Fields;
pub use record::{keys, DecodeOutcome, RecordCodec};
pub use value::{field_map_from_json, FieldMap, FieldValue, ServerTimestamp};

use uuid::Uuid;

/// 整条记录解码失败的原因
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DecodeError {
    #[error("invalid document id: {0:?}")]
    InvalidDocumentId(String),
    #[error("missing field `{0}`")]
    MissingField(&'static str),
    #[error("field `{field}` expected {expected}, found {found}")]
    WrongType {
        field: &'static str,
        expected: &'static str,
        found: &'static str,
    },
    #[error("field `{field}` is not a valid id: {value:?}")]
    InvalidId { field: &'static str, value: String },
}

impl DecodeError {
    pub(crate) fn wrong_type(field: &'static str, expected: &'static str, found: &FieldValue) -> Self {
        DecodeError::WrongType {
            field,
            expected,
            found: found.type_name(),
        }
    }
}

/// 被丢弃的嵌套条目（召回 / 保养），父记录照常解码
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DroppedEntry {
    /// 所在数组的 key，如 "recalls"
    pub collection: &'static str,
    pub index: usize,
    pub reason: DecodeError,
}

/// Vehicle.id → 文档 key（大写带连字符的 UUID）
pub fn document_id(id: Uuid) -> String {
    id.hyphenated().to_string().to_uppercase()
}

/// 文档 key → Vehicle.id；只接受 36 位带连字符形式，大小写不限
pub fn parse_document_id(raw: &str) -> Option<Uuid> {
    if raw.len() != 36 {
        return None;
    }
    Uuid::parse_str(raw).ok()
}
