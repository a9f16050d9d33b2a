//! 超时分级
//!
//! 纯函数，每次渲染按 `now` 重新计算，结果不写回订单。

use std::cmp::Ordering;

use chrono::{DateTime, Utc};
use shared::models::{KitchenOrder, Priority};

/// Thresholds for escalation and the rail size
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UrgencyConfig {
    /// 超过该分钟数即升级
    pub escalation_threshold_minutes: i64,
    /// 超过该分钟数即严重
    pub critical_threshold_minutes: i64,
    /// 升级栏展示数量
    pub rail_size: usize,
}

impl Default for UrgencyConfig {
    fn default() -> Self {
        Self {
            escalation_threshold_minutes: 12,
            critical_threshold_minutes: 15,
            rail_size: 4,
        }
    }
}

/// Display tier
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Severity {
    Normal,
    Escalated,
    Critical,
}

/// Derived urgency of one order at one instant
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Urgency {
    pub elapsed_minutes: i64,
    pub is_escalated: bool,
    pub is_critical: bool,
}

impl Urgency {
    pub fn severity(&self) -> Severity {
        if self.is_critical {
            Severity::Critical
        } else if self.is_escalated {
            Severity::Escalated
        } else {
            Severity::Normal
        }
    }
}

/// Order paired with its urgency
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClassifiedOrder {
    pub order: KitchenOrder,
    pub urgency: Urgency,
}

impl UrgencyConfig {
    pub fn classify(&self, order: &KitchenOrder, now: DateTime<Utc>) -> Urgency {
        // 时钟漂移可能让下单时间在未来，按 0 处理
        let elapsed_minutes = (now - order.ordered_at).num_minutes().max(0);
        Urgency {
            elapsed_minutes,
            is_escalated: elapsed_minutes > self.escalation_threshold_minutes
                || order.priority == Priority::Urgent,
            is_critical: elapsed_minutes > self.critical_threshold_minutes,
        }
    }

    pub fn classify_all(&self, orders: Vec<KitchenOrder>, now: DateTime<Utc>) -> Vec<ClassifiedOrder> {
        orders
            .into_iter()
            .map(|order| {
                let urgency = self.classify(&order, now);
                ClassifiedOrder { order, urgency }
            })
            .collect()
    }

    /// Top `rail_size` escalated orders, longest waiting first
    pub fn escalation_rail(&self, orders: &[ClassifiedOrder]) -> Vec<ClassifiedOrder> {
        let mut escalated: Vec<&ClassifiedOrder> = orders.iter().filter(|c| c.urgency.is_escalated).collect();
        escalated.sort_by(|a, b| rail_order(a, b));
        escalated.into_iter().take(self.rail_size).cloned().collect()
    }
}

fn rail_order(a: &ClassifiedOrder, b: &ClassifiedOrder) -> Ordering {
    b.urgency
        .elapsed_minutes
        .cmp(&a.urgency.elapsed_minutes)
        .then_with(|| a.order.ordered_at.cmp(&b.order.ordered_at))
        .then_with(|| a.order.id.cmp(&b.order.id))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};
    use shared::models::{Destination, OrderItem};

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 5, 4, 20, 0, 0).unwrap()
    }

    fn placed(id: &str, ago: Duration) -> KitchenOrder {
        KitchenOrder::new(id, 1, Destination::Table("T1".into()), now() - ago)
            .with_item(OrderItem::new(1, "Pasta").with_station("hot"))
    }

    #[test]
    fn test_escalation_threshold() {
        let config = UrgencyConfig::default();

        let late = config.classify(&placed("A1", Duration::minutes(13)), now());
        assert_eq!(late.elapsed_minutes, 13);
        assert!(late.is_escalated);
        assert!(!late.is_critical);

        let fresh = config.classify(&placed("A2", Duration::minutes(11)), now());
        assert!(!fresh.is_escalated);
        assert_eq!(fresh.severity(), Severity::Normal);

        // 恰好 12 分钟不算超过
        assert!(!config.classify(&placed("A3", Duration::minutes(12)), now()).is_escalated);
    }

    #[test]
    fn test_critical_and_urgent_priority() {
        let config = UrgencyConfig::default();
        let old = config.classify(&placed("A1", Duration::minutes(16)), now());
        assert_eq!(old.severity(), Severity::Critical);

        let urgent = placed("A2", Duration::minutes(1)).with_priority(Priority::Urgent);
        let urgency = config.classify(&urgent, now());
        assert!(urgency.is_escalated);
        assert!(!urgency.is_critical);
        assert_eq!(urgency.severity(), Severity::Escalated);
    }

    #[test]
    fn test_future_ordered_at_clamps_to_zero() {
        let config = UrgencyConfig::default();
        let order = KitchenOrder::new("A1", 1, Destination::Room("12".into()), now() + Duration::minutes(3));
        assert_eq!(config.classify(&order, now()).elapsed_minutes, 0);
    }

    #[test]
    fn test_rail_takes_top_k_with_ties_by_ordered_at() {
        let config = UrgencyConfig {
            rail_size: 3,
            ..Default::default()
        };
        let orders = vec![
            placed("late", Duration::minutes(30)),
            // 同为 20 分钟，按下单时间先后
            placed("tie-b", Duration::seconds(20 * 60 + 10)),
            placed("tie-a", Duration::seconds(20 * 60 + 40)),
            placed("recent", Duration::minutes(13)),
            placed("calm", Duration::minutes(2)),
        ];
        let classified = config.classify_all(orders, now());
        let rail: Vec<String> = config
            .escalation_rail(&classified)
            .into_iter()
            .map(|c| c.order.id)
            .collect();
        assert_eq!(rail, vec!["late", "tie-a", "tie-b"]);
    }

    #[test]
    fn test_rail_excludes_non_escalated() {
        let config = UrgencyConfig::default();
        let classified = config.classify_all(vec![placed("calm", Duration::minutes(2))], now());
        assert!(config.escalation_rail(&classified).is_empty());
    }
}
