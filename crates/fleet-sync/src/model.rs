//! 车辆聚合模型
//!
//! `Vehicle` 是同步的最小单位：车辆本身 + 登记、保险、召回、保养、估值等子记录，
//! 作为一个整体写入本地集合、编码为远端文档。

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// 注册登记到期提醒阈值（天）
pub const REGISTRATION_WARNING_DAYS: i64 = 30;

/// 车辆（聚合根）
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Vehicle {
    /// 主键，同时也是远端文档 key
    pub id: Uuid,
    pub make: String,
    pub model: String,
    pub year: i64,
    pub trim: String,
    pub color: String,
    pub mileage: i64,
    pub vin: String,
    pub image_url: String,
    pub registration: Registration,
    pub insurance: Insurance,
    /// 召回列表（保持顺序）
    pub recalls: Vec<Recall>,
    /// 保养记录（保持顺序）
    pub maintenance_records: Vec<MaintenanceRecord>,
    pub valuation: Option<Valuation>,
}

impl Vehicle {
    /// 以必填字段创建车辆，其余字段取默认值
    pub fn new(make: impl Into<String>, model: impl Into<String>, year: i64) -> Self {
        Self::with_id(Uuid::new_v4(), make, model, year)
    }

    pub fn with_id(id: Uuid, make: impl Into<String>, model: impl Into<String>, year: i64) -> Self {
        let now = Utc::now();
        Self {
            id,
            make: make.into(),
            model: model.into(),
            year,
            trim: String::new(),
            color: String::new(),
            mileage: 0,
            vin: String::new(),
            image_url: String::new(),
            registration: Registration {
                expiry_date: now,
                state: String::new(),
            },
            insurance: Insurance {
                provider: String::new(),
                coverage_type: String::new(),
                expiry_date: now,
            },
            recalls: Vec::new(),
            maintenance_records: Vec::new(),
            valuation: None,
        }
    }

    /// "Make Model"，也用作同步失败时的可读标签
    pub fn display_name(&self) -> String {
        format!("{} {}", self.make, self.model)
    }

    pub fn subtitle(&self) -> String {
        format!("{} · {} · {}", self.year, self.trim, self.color)
    }

    pub fn unresolved_recall_count(&self) -> usize {
        self.recalls.iter().filter(|r| !r.is_resolved).count()
    }

    pub fn health_status(&self) -> HealthStatus {
        self.health_status_at(Utc::now())
    }

    /// 未处理召回 → Urgent；登记 30 天内到期 → Warning；否则 Good
    pub fn health_status_at(&self, now: DateTime<Utc>) -> HealthStatus {
        if self.unresolved_recall_count() > 0 {
            return HealthStatus::Urgent;
        }
        if self.registration.days_until_expiry_at(now) < REGISTRATION_WARNING_DAYS {
            return HealthStatus::Warning;
        }
        HealthStatus::Good
    }

    /// 用另一份记录整体覆盖本记录（主键不变）
    ///
    /// 远端为准：不做字段级合并。
    pub fn overwrite_with(&mut self, other: &Vehicle) {
        self.make = other.make.clone();
        self.model = other.model.clone();
        self.year = other.year;
        self.trim = other.trim.clone();
        self.color = other.color.clone();
        self.mileage = other.mileage;
        self.vin = other.vin.clone();
        self.image_url = other.image_url.clone();
        self.registration = other.registration.clone();
        self.insurance = other.insurance.clone();
        self.recalls = other.recalls.clone();
        self.maintenance_records = other.maintenance_records.clone();
        self.valuation = other.valuation.clone();
    }
}

/// 车辆健康状态
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum HealthStatus {
    Good,
    Warning,
    Urgent,
}

/// 注册登记信息
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Registration {
    pub expiry_date: DateTime<Utc>,
    pub state: String,
}

impl Registration {
    pub fn days_until_expiry_at(&self, now: DateTime<Utc>) -> i64 {
        (self.expiry_date - now).num_days()
    }

    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        self.days_until_expiry_at(now) <= 0
    }
}

/// 保险信息
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Insurance {
    pub provider: String,
    pub coverage_type: String,
    pub expiry_date: DateTime<Utc>,
}

impl Insurance {
    pub fn days_until_expiry_at(&self, now: DateTime<Utc>) -> i64 {
        (self.expiry_date - now).num_days()
    }

    pub fn is_active_at(&self, now: DateTime<Utc>) -> bool {
        self.days_until_expiry_at(now) > 0
    }
}

/// 召回
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Recall {
    pub id: Uuid,
    pub title: String,
    pub details: String,
    pub source: String,
    pub date_issued: DateTime<Utc>,
    pub is_resolved: bool,
}

/// 保养记录
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MaintenanceRecord {
    pub id: Uuid,
    pub title: String,
    pub date: DateTime<Utc>,
    pub provider: String,
    pub is_completed: bool,
    pub mileage: Option<i64>,
}

/// 估值
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Valuation {
    pub trade_in: i64,
    pub private_sale: i64,
    pub dealer: i64,
    pub trend: ValuationTrend,
    pub last_updated: DateTime<Utc>,
}

/// 估值趋势
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValuationTrend {
    pub amount: i64,
    pub direction: TrendDirection,
    pub summary: String,
}

/// 趋势方向；远端以小写 tag 存储
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TrendDirection {
    Up,
    Down,
}

impl TrendDirection {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Up => "up",
            Self::Down => "down",
        }
    }

    /// 解析远端 tag；无法识别的值一律视为 `Up`（沿用既有客户端行为）
    pub fn from_tag_lenient(tag: Option<&str>) -> Self {
        match tag {
            Some("down") => Self::Down,
            _ => Self::Up,
        }
    }
}

impl std::fmt::Display for TrendDirection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};

    fn fixed_now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 6, 1, 12, 0, 0).unwrap()
    }

    fn recall(resolved: bool) -> Recall {
        Recall {
            id: Uuid::new_v4(),
            title: "Airbag".to_string(),
            details: String::new(),
            source: "NHTSA".to_string(),
            date_issued: fixed_now(),
            is_resolved: resolved,
        }
    }

    #[test]
    fn display_name_and_subtitle() {
        let mut v = Vehicle::new("Tesla", "Model 3", 2021);
        v.trim = "Long Range".to_string();
        v.color = "White".to_string();
        assert_eq!(v.display_name(), "Tesla Model 3");
        assert_eq!(v.subtitle(), "2021 · Long Range · White");
    }

    #[test]
    fn health_status_prefers_unresolved_recalls() {
        let now = fixed_now();
        let mut v = Vehicle::new("Honda", "Civic", 2024);
        v.registration.expiry_date = now + Duration::days(365);
        assert_eq!(v.health_status_at(now), HealthStatus::Good);

        v.registration.expiry_date = now + Duration::days(10);
        assert_eq!(v.health_status_at(now), HealthStatus::Warning);

        v.recalls.push(recall(true));
        assert_eq!(v.health_status_at(now), HealthStatus::Warning);
        v.recalls.push(recall(false));
        assert_eq!(v.health_status_at(now), HealthStatus::Urgent);
        assert_eq!(v.unresolved_recall_count(), 1);
    }

    #[test]
    fn overwrite_keeps_identity() {
        let mut local = Vehicle::new("Honda", "Civic", 2020);
        let mut remote = Vehicle::new("Honda", "Accord", 2024);
        remote.mileage = 12_000;
        remote.recalls.push(recall(false));
        let id = local.id;

        local.overwrite_with(&remote);

        assert_eq!(local.id, id);
        assert_eq!(local.model, "Accord");
        assert_eq!(local.year, 2024);
        assert_eq!(local.mileage, 12_000);
        assert_eq!(local.recalls, remote.recalls);
    }

    #[test]
    fn trend_direction_tags() {
        assert_eq!(TrendDirection::from_tag_lenient(Some("down")), TrendDirection::Down);
        assert_eq!(TrendDirection::from_tag_lenient(Some("up")), TrendDirection::Up);
        assert_eq!(TrendDirection::from_tag_lenient(Some("sideways")), TrendDirection::Up);
        assert_eq!(TrendDirection::from_tag_lenient(None), TrendDirection::Up);
        assert_eq!(TrendDirection::Down.to_string(), "down");
    }

    #[test]
    fn insurance_and_registration_expiry() {
        let now = fixed_now();
        let reg = Registration {
            expiry_date: now - Duration::days(1),
            state: "CA".to_string(),
        };
        assert!(reg.is_expired_at(now));
        let ins = Insurance {
            provider: "State Farm".to_string(),
            coverage_type: "Full".to_string(),
            expiry_date: now + Duration::days(90),
        };
        assert!(ins.is_active_at(now));
        assert_eq!(ins.days_until_expiry_at(now), 90);
    }
}
