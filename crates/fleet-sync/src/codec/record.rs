use chrono::{DateTime, Utc};
use tracing::debug;

use super::fields::Fields;
use super::value::{FieldMap, FieldValue, ServerTimestamp};
use super::{document_id, parse_document_id, DecodeError, DroppedEntry};
use crate::model::{
    Insurance, MaintenanceRecord, Recall, Registration, TrendDirection, Valuation, ValuationTrend,
    Vehicle,
};

/// 远端文档字段名
pub mod keys {
    pub const MAKE: &str = "make";
    pub const MODEL: &str = "model";
    pub const YEAR: &str = "year";
    pub const TRIM: &str = "trim";
    pub const COLOR: &str = "color";
    pub const MILEAGE: &str = "mileage";
    pub const VIN: &str = "vin";
    pub const IMAGE_URL: &str = "imageURL";
    pub const REGISTRATION: &str = "registration";
    pub const INSURANCE: &str = "insurance";
    pub const RECALLS: &str = "recalls";
    pub const MAINTENANCE_RECORDS: &str = "maintenanceRecords";
    pub const VALUATION: &str = "valuation";
    pub const CREATED_AT: &str = "createdAt";
    pub const UPDATED_AT: &str = "updatedAt";

    pub const ID: &str = "id";
    pub const TITLE: &str = "title";
    pub const DESCRIPTION: &str = "description";
    pub const SOURCE: &str = "source";
    pub const DATE_ISSUED: &str = "dateIssued";
    pub const IS_RESOLVED: &str = "isResolved";
    pub const DATE: &str = "date";
    pub const PROVIDER: &str = "provider";
    pub const IS_COMPLETED: &str = "isCompleted";
    pub const EXPIRY_DATE: &str = "expiryDate";
    pub const STATE: &str = "state";
    pub const COVERAGE_TYPE: &str = "coverageType";

    pub const TRADE_IN: &str = "tradeIn";
    pub const PRIVATE_SALE: &str = "privateSale";
    pub const DEALER: &str = "dealer";
    pub const TREND: &str = "trend";
    pub const AMOUNT: &str = "amount";
    pub const DIRECTION: &str = "direction";
    pub const LAST_UPDATED: &str = "lastUpdated";
}

/// 解码结果：车辆本身 + 被丢弃的嵌套条目
#[derive(Debug, Clone, PartialEq)]
pub struct DecodeOutcome {
    pub vehicle: Vehicle,
    pub dropped: Vec<DroppedEntry>,
}

/// Vehicle ⇄ FieldMap 编解码器
#[derive(Debug, Clone, Default)]
pub struct RecordCodec {
    /// 缺失时间戳的回退值；None 表示解码时刻
    fallback_time: Option<DateTime<Utc>>,
}

impl RecordCodec {
    pub fn new() -> Self {
        Self::default()
    }

    /// 固定缺失时间戳的回退值（测试用）
    pub fn with_fallback_time(time: DateTime<Utc>) -> Self {
        Self {
            fallback_time: Some(time),
        }
    }

    // ============================================================
    // 编码
    // ============================================================

    pub fn encode(&self, vehicle: &Vehicle) -> FieldMap {
        let mut doc = FieldMap::new();
        doc.insert(keys::MAKE.into(), FieldValue::from(&vehicle.make));
        doc.insert(keys::MODEL.into(), FieldValue::from(&vehicle.model));
        doc.insert(keys::YEAR.into(), FieldValue::from(vehicle.year));
        doc.insert(keys::TRIM.into(), FieldValue::from(&vehicle.trim));
        doc.insert(keys::COLOR.into(), FieldValue::from(&vehicle.color));
        doc.insert(keys::MILEAGE.into(), FieldValue::from(vehicle.mileage));
        doc.insert(keys::VIN.into(), FieldValue::from(&vehicle.vin));
        doc.insert(keys::IMAGE_URL.into(), FieldValue::from(&vehicle.image_url));
        doc.insert(
            keys::REGISTRATION.into(),
            FieldValue::Map(encode_registration(&vehicle.registration)),
        );
        doc.insert(
            keys::INSURANCE.into(),
            FieldValue::Map(encode_insurance(&vehicle.insurance)),
        );
        doc.insert(
            keys::RECALLS.into(),
            FieldValue::Array(
                vehicle
                    .recalls
                    .iter()
                    .map(|r| FieldValue::Map(encode_recall(r)))
                    .collect(),
            ),
        );
        doc.insert(
            keys::MAINTENANCE_RECORDS.into(),
            FieldValue::Array(
                vehicle
                    .maintenance_records
                    .iter()
                    .map(|m| FieldValue::Map(encode_maintenance(m)))
                    .collect(),
            ),
        );
        doc.insert(
            keys::CREATED_AT.into(),
            FieldValue::ServerTimestamp(ServerTimestamp::OnCreate),
        );
        doc.insert(
            keys::UPDATED_AT.into(),
            FieldValue::ServerTimestamp(ServerTimestamp::Always),
        );
        if let Some(valuation) = &vehicle.valuation {
            doc.insert(
                keys::VALUATION.into(),
                FieldValue::Map(encode_valuation(valuation)),
            );
        }
        doc
    }

    // ============================================================
    // 解码
    // ============================================================

    pub fn decode(&self, fields: &FieldMap, key: &str) -> Result<Vehicle, DecodeError> {
        self.decode_with_report(fields, key).map(|o| o.vehicle)
    }

    /// 解码并返回被丢弃的嵌套条目
    pub fn decode_with_report(
        &self,
        fields: &FieldMap,
        key: &str,
    ) -> Result<DecodeOutcome, DecodeError> {
        let id = parse_document_id(key)
            .ok_or_else(|| DecodeError::InvalidDocumentId(key.to_string()))?;
        let f = Fields::new(fields);
        let make = f.required_str(keys::MAKE)?.to_string();
        let model = f.required_str(keys::MODEL)?.to_string();
        let year = f.required_i64(keys::YEAR)?;

        let now = self.fallback_time.unwrap_or_else(Utc::now);
        let mut dropped = Vec::new();

        let reg = f.nested(keys::REGISTRATION);
        let registration = Registration {
            expiry_date: reg.timestamp_or(keys::EXPIRY_DATE, now),
            state: reg.str_or_default(keys::STATE),
        };

        let ins = f.nested(keys::INSURANCE);
        let insurance = Insurance {
            provider: ins.str_or_default(keys::PROVIDER),
            coverage_type: ins.str_or_default(keys::COVERAGE_TYPE),
            expiry_date: ins.timestamp_or(keys::EXPIRY_DATE, now),
        };

        let recalls = decode_entries(&f, keys::RECALLS, &mut dropped, |e| decode_recall(e, now));
        let maintenance_records = decode_entries(&f, keys::MAINTENANCE_RECORDS, &mut dropped, |e| {
            decode_maintenance(e, now)
        });

        let valuation = f
            .nested_strict(keys::VALUATION)
            .and_then(|v| decode_valuation(v, now));

        Ok(DecodeOutcome {
            vehicle: Vehicle {
                id,
                make,
                model,
                year,
                trim: f.str_or_default(keys::TRIM),
                color: f.str_or_default(keys::COLOR),
                mileage: f.i64_or_default(keys::MILEAGE),
                vin: f.str_or_default(keys::VIN),
                image_url: f.str_or_default(keys::IMAGE_URL),
                registration,
                insurance,
                recalls,
                maintenance_records,
                valuation,
            },
            dropped,
        })
    }
}

fn encode_registration(reg: &Registration) -> FieldMap {
    let mut m = FieldMap::new();
    m.insert(keys::EXPIRY_DATE.into(), FieldValue::timestamp(reg.expiry_date));
    m.insert(keys::STATE.into(), FieldValue::from(&reg.state));
    m
}

fn encode_insurance(ins: &Insurance) -> FieldMap {
    let mut m = FieldMap::new();
    m.insert(keys::PROVIDER.into(), FieldValue::from(&ins.provider));
    m.insert(keys::COVERAGE_TYPE.into(), FieldValue::from(&ins.coverage_type));
    m.insert(keys::EXPIRY_DATE.into(), FieldValue::timestamp(ins.expiry_date));
    m
}

fn encode_recall(recall: &Recall) -> FieldMap {
    let mut m = FieldMap::new();
    m.insert(keys::ID.into(), FieldValue::from(document_id(recall.id)));
    m.insert(keys::TITLE.into(), FieldValue::from(&recall.title));
    m.insert(keys::DESCRIPTION.into(), FieldValue::from(&recall.details));
    m.insert(keys::SOURCE.into(), FieldValue::from(&recall.source));
    m.insert(keys::DATE_ISSUED.into(), FieldValue::timestamp(recall.date_issued));
    m.insert(keys::IS_RESOLVED.into(), FieldValue::from(recall.is_resolved));
    m
}

fn encode_maintenance(record: &MaintenanceRecord) -> FieldMap {
    let mut m = FieldMap::new();
    m.insert(keys::ID.into(), FieldValue::from(document_id(record.id)));
    m.insert(keys::TITLE.into(), FieldValue::from(&record.title));
    m.insert(keys::DATE.into(), FieldValue::timestamp(record.date));
    m.insert(keys::PROVIDER.into(), FieldValue::from(&record.provider));
    m.insert(keys::IS_COMPLETED.into(), FieldValue::from(record.is_completed));
    // 无里程时不写该 key
    if let Some(mileage) = record.mileage {
        m.insert(keys::MILEAGE.into(), FieldValue::from(mileage));
    }
    m
}

fn encode_valuation(val: &Valuation) -> FieldMap {
    let mut trend = FieldMap::new();
    trend.insert(keys::AMOUNT.into(), FieldValue::from(val.trend.amount));
    trend.insert(
        keys::DIRECTION.into(),
        FieldValue::from(val.trend.direction.as_str()),
    );
    trend.insert(keys::DESCRIPTION.into(), FieldValue::from(&val.trend.summary));

    let mut m = FieldMap::new();
    m.insert(keys::TRADE_IN.into(), FieldValue::from(val.trade_in));
    m.insert(keys::PRIVATE_SALE.into(), FieldValue::from(val.private_sale));
    m.insert(keys::DEALER.into(), FieldValue::from(val.dealer));
    m.insert(keys::TREND.into(), FieldValue::Map(trend));
    m.insert(keys::LAST_UPDATED.into(), FieldValue::timestamp(val.last_updated));
    m
}

/// 逐条解码数组条目，失败的条目记入 `dropped` 后跳过
fn decode_entries<T>(
    parent: &Fields<'_>,
    collection: &'static str,
    dropped: &mut Vec<DroppedEntry>,
    decode: impl Fn(Fields<'_>) -> Result<T, DecodeError>,
) -> Vec<T> {
    let mut out = Vec::new();
    for (index, raw) in parent.array(collection).iter().enumerate() {
        let result = match raw.as_map() {
            Some(m) => decode(Fields::new(m)),
            None => Err(DecodeError::wrong_type(collection, "map", raw)),
        };
        match result {
            Ok(entry) => out.push(entry),
            Err(reason) => {
                debug!("丢弃嵌套条目 {}[{}]: {}", collection, index, reason);
                dropped.push(DroppedEntry {
                    collection,
                    index,
                    reason,
                });
            }
        }
    }
    out
}

fn decode_recall(f: Fields<'_>, now: DateTime<Utc>) -> Result<Recall, DecodeError> {
    Ok(Recall {
        id: f.required_uuid(keys::ID)?,
        title: f.required_str(keys::TITLE)?.to_string(),
        details: f.str_or_default(keys::DESCRIPTION),
        source: f.str_or_default(keys::SOURCE),
        date_issued: f.timestamp_or(keys::DATE_ISSUED, now),
        is_resolved: f.bool_or_default(keys::IS_RESOLVED),
    })
}

fn decode_maintenance(f: Fields<'_>, now: DateTime<Utc>) -> Result<MaintenanceRecord, DecodeError> {
    Ok(MaintenanceRecord {
        id: f.required_uuid(keys::ID)?,
        title: f.required_str(keys::TITLE)?.to_string(),
        date: f.timestamp_or(keys::DATE, now),
        provider: f.str_or_default(keys::PROVIDER),
        is_completed: f.bool_or_default(keys::IS_COMPLETED),
        mileage: f.optional_i64(keys::MILEAGE),
    })
}

/// 三个价格与 trend 缺一不可，否则整体视为无估值（不影响父记录）
fn decode_valuation(f: Fields<'_>, now: DateTime<Utc>) -> Option<Valuation> {
    let trade_in = f.optional_i64(keys::TRADE_IN)?;
    let private_sale = f.optional_i64(keys::PRIVATE_SALE)?;
    let dealer = f.optional_i64(keys::DEALER)?;
    let trend = f.nested_strict(keys::TREND)?;
    Some(Valuation {
        trade_in,
        private_sale,
        dealer,
        trend: ValuationTrend {
            amount: trend.i64_or_default(keys::AMOUNT),
            direction: TrendDirection::from_tag_lenient(trend.optional_str(keys::DIRECTION)),
            summary: trend.str_or_default(keys::DESCRIPTION),
        },
        last_updated: f.timestamp_or(keys::LAST_UPDATED, now),
    })
}
