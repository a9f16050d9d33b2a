//! Kitchen Order Model
//!
//! 厨房看板上的一张单：由外部订单库创建，看板只做展示和状态推进。

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use validator::Validate;

use crate::error::{ModelError, ModelResult};

/// Order status (kitchen lifecycle)
///
/// ```text
/// pending ──start──▶ preparing ──complete──▶ ready ──serve──▶ served
///    └──────────────complete─────────────────▲
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum OrderStatus {
    #[default]
    Pending,
    Preparing,
    Ready,
    Served,
}

impl OrderStatus {
    /// Whether `target` is immediately reachable from `self`
    pub fn can_transition_to(self, target: OrderStatus) -> bool {
        matches!(
            (self, target),
            (OrderStatus::Pending, OrderStatus::Preparing)
                | (OrderStatus::Pending, OrderStatus::Ready)
                | (OrderStatus::Preparing, OrderStatus::Ready)
                | (OrderStatus::Ready, OrderStatus::Served)
        )
    }

    /// 终态：确认后移出看板
    pub fn is_terminal(self) -> bool {
        self == OrderStatus::Served
    }

    /// `pending` / `preparing`
    pub fn is_active(self) -> bool {
        matches!(self, OrderStatus::Pending | OrderStatus::Preparing)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            OrderStatus::Pending => "pending",
            OrderStatus::Preparing => "preparing",
            OrderStatus::Ready => "ready",
            OrderStatus::Served => "served",
        }
    }
}

impl fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for OrderStatus {
    type Err = ModelError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "pending" => Ok(OrderStatus::Pending),
            "preparing" => Ok(OrderStatus::Preparing),
            "ready" => Ok(OrderStatus::Ready),
            "served" => Ok(OrderStatus::Served),
            other => Err(ModelError::UnknownStatus(other.to_string())),
        }
    }
}

/// Priority set by the order origin (independent of elapsed time)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    #[default]
    Normal,
    High,
    Urgent,
}

/// Where the order goes: a dining table or a hotel room, never both
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "ref", rename_all = "lowercase")]
pub enum Destination {
    Table(String),
    Room(String),
}

impl fmt::Display for Destination {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Destination::Table(t) => write!(f, "table {}", t),
            Destination::Room(r) => write!(f, "room {}", r),
        }
    }
}

/// 菜品行
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Validate)]
pub struct OrderItem {
    #[validate(range(min = 1))]
    pub quantity: u32,
    #[validate(length(min = 1))]
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub modifications: Vec<String>,
    /// 出品工位 (grill, fryer, bar ...)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub station: Option<String>,
}

impl OrderItem {
    pub fn new(quantity: u32, name: impl Into<String>) -> Self {
        Self {
            quantity,
            name: name.into(),
            note: None,
            modifications: Vec::new(),
            station: None,
        }
    }

    pub fn with_station(mut self, station: impl Into<String>) -> Self {
        self.station = Some(station.into());
        self
    }

    pub fn with_note(mut self, note: impl Into<String>) -> Self {
        self.note = Some(note.into());
        self
    }

    pub fn with_modification(mut self, modification: impl Into<String>) -> Self {
        self.modifications.push(modification.into());
        self
    }
}

/// Recency marker
///
/// Compared lexicographically: `version` first, then `updated_at`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Recency {
    pub version: u64,
    pub updated_at: DateTime<Utc>,
}

/// Kitchen order as served by `GET /orders/board`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Validate)]
pub struct KitchenOrder {
    /// Stable id, unique for the lifetime of the board
    #[validate(length(min = 1))]
    pub id: String,
    /// 人看的单号，跨天可能重复
    pub order_number: u32,
    pub destination: Destination,
    #[validate(nested)]
    pub items: Vec<OrderItem>,
    #[serde(default)]
    pub status: OrderStatus,
    #[serde(default)]
    pub priority: Priority,
    pub ordered_at: DateTime<Utc>,
    #[serde(default)]
    pub version: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<DateTime<Utc>>,
}

impl KitchenOrder {
    pub fn new(
        id: impl Into<String>,
        order_number: u32,
        destination: Destination,
        ordered_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id: id.into(),
            order_number,
            destination,
            items: Vec::new(),
            status: OrderStatus::Pending,
            priority: Priority::Normal,
            ordered_at,
            version: 0,
            updated_at: None,
        }
    }

    pub fn with_item(mut self, item: OrderItem) -> Self {
        self.items.push(item);
        self
    }

    pub fn with_status(mut self, status: OrderStatus) -> Self {
        self.status = status;
        self
    }

    pub fn with_priority(mut self, priority: Priority) -> Self {
        self.priority = priority;
        self
    }

    pub fn with_version(mut self, version: u64, updated_at: DateTime<Utc>) -> Self {
        self.version = version;
        self.updated_at = Some(updated_at);
        self
    }

    /// Recency marker, falling back to `ordered_at` when the store sent no `updated_at`
    pub fn recency(&self) -> Recency {
        Recency {
            version: self.version,
            updated_at: self.updated_at.unwrap_or(self.ordered_at),
        }
    }

    /// Whether any item carries `station`
    pub fn has_station(&self, station: &str) -> bool {
        self.items
            .iter()
            .any(|item| item.station.as_deref() == Some(station))
    }

    /// Station tags of this order's items (may repeat)
    pub fn stations(&self) -> impl Iterator<Item = &str> {
        self.items.iter().filter_map(|item| item.station.as_deref())
    }

    /// Field validation (quantity >= 1, non-empty names)
    pub fn check(&self) -> ModelResult<()> {
        self.validate().map_err(|e| ModelError::InvalidOrder {
            id: self.id.clone(),
            reason: e.to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};

    fn sample() -> KitchenOrder {
        let at = Utc.with_ymd_and_hms(2026, 3, 1, 12, 0, 0).unwrap();
        KitchenOrder::new("A1", 17, Destination::Table("T4".into()), at)
            .with_item(OrderItem::new(2, "Burger").with_station("grill"))
            .with_item(OrderItem::new(1, "Fries").with_station("fryer").with_note("no salt"))
    }

    #[test]
    fn test_forward_transitions_only() {
        use OrderStatus::*;
        assert!(Pending.can_transition_to(Preparing));
        assert!(Pending.can_transition_to(Ready));
        assert!(Preparing.can_transition_to(Ready));
        assert!(Ready.can_transition_to(Served));

        assert!(!Served.can_transition_to(Preparing));
        assert!(!Ready.can_transition_to(Pending));
        assert!(!Preparing.can_transition_to(Pending));
        assert!(!Pending.can_transition_to(Served));
        assert!(!Preparing.can_transition_to(Preparing));
    }

    #[test]
    fn test_json_shape() {
        let json = serde_json::json!({
            "id": "A1",
            "order_number": 17,
            "destination": { "type": "room", "ref": "1204" },
            "items": [{ "quantity": 1, "name": "Club sandwich", "modifications": ["no mayo"] }],
            "status": "preparing",
            "priority": "urgent",
            "ordered_at": "2026-03-01T12:00:00Z",
            "version": 3
        });
        let order: KitchenOrder = serde_json::from_value(json).unwrap();
        assert_eq!(order.destination, Destination::Room("1204".into()));
        assert_eq!(order.status, OrderStatus::Preparing);
        assert_eq!(order.priority, Priority::Urgent);
        assert_eq!(order.items[0].modifications, vec!["no mayo".to_string()]);
        assert!(order.items[0].station.is_none());
        assert!(order.updated_at.is_none());
    }

    #[test]
    fn test_recency_ordering() {
        let base = sample();
        let later = base.ordered_at + Duration::seconds(30);

        let v1 = base.clone().with_version(1, later);
        let v2 = base.clone().with_version(2, base.ordered_at);
        assert!(v2.recency() > v1.recency(), "version dominates timestamp");

        let same_version_newer = base.clone().with_version(1, later + Duration::seconds(1));
        assert!(same_version_newer.recency() > v1.recency());

        // No updated_at falls back to ordered_at
        assert_eq!(base.recency().updated_at, base.ordered_at);
    }

    #[test]
    fn test_stations() {
        let order = sample();
        assert!(order.has_station("grill"));
        assert!(!order.has_station("bar"));
        assert_eq!(order.stations().collect::<Vec<_>>(), vec!["grill", "fryer"]);
    }

    #[test]
    fn test_check_rejects_zero_quantity() {
        let mut order = sample();
        assert!(order.check().is_ok());
        order.items[0].quantity = 0;
        let err = order.check().unwrap_err();
        assert!(matches!(err, ModelError::InvalidOrder { ref id, .. } if id == "A1"));
    }

    #[test]
    fn test_status_from_str() {
        assert_eq!("Ready".parse::<OrderStatus>().unwrap(), OrderStatus::Ready);
        assert!("cooking".parse::<OrderStatus>().is_err());
    }
}
