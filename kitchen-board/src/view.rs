//! 工位/状态筛选
//!
//! 工位和状态两个条件同时满足才显示。工位选项每次从当前看板推导。

use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

use shared::models::{KitchenOrder, OrderStatus};

/// Status filter
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum StatusFilter {
    /// pending + preparing
    #[default]
    Active,
    Ready,
    All,
}

impl StatusFilter {
    pub fn matches(self, status: OrderStatus) -> bool {
        match self {
            StatusFilter::Active => matches!(status, OrderStatus::Pending | OrderStatus::Preparing),
            StatusFilter::Ready => status == OrderStatus::Ready,
            StatusFilter::All => true,
        }
    }
}

impl FromStr for StatusFilter {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "active" => Ok(StatusFilter::Active),
            "ready" => Ok(StatusFilter::Ready),
            "all" => Ok(StatusFilter::All),
            other => Err(format!("Unknown status filter: {}", other)),
        }
    }
}

impl fmt::Display for StatusFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StatusFilter::Active => write!(f, "active"),
            StatusFilter::Ready => write!(f, "ready"),
            StatusFilter::All => write!(f, "all"),
        }
    }
}

/// Station filter: `all` or one station tag
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum StationFilter {
    #[default]
    All,
    Station(String),
}

impl StationFilter {
    pub fn matches(&self, order: &KitchenOrder) -> bool {
        match self {
            StationFilter::All => true,
            StationFilter::Station(tag) => order.has_station(tag),
        }
    }
}

impl From<&str> for StationFilter {
    fn from(s: &str) -> Self {
        if s == "all" {
            StationFilter::All
        } else {
            StationFilter::Station(s.to_string())
        }
    }
}

/// Active (station, status) pair
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct BoardFilter {
    pub station: StationFilter,
    pub status: StatusFilter,
}

impl BoardFilter {
    pub fn new(station: impl Into<StationFilter>, status: StatusFilter) -> Self {
        Self {
            station: station.into(),
            status,
        }
    }

    pub fn matches(&self, order: &KitchenOrder) -> bool {
        self.status.matches(order.status) && self.station.matches(order)
    }

    pub fn apply<'a>(&self, orders: impl IntoIterator<Item = &'a KitchenOrder>) -> Vec<&'a KitchenOrder> {
        orders.into_iter().filter(|o| self.matches(o)).collect()
    }
}

/// Distinct station tags across all items, sorted
pub fn station_options(orders: &[KitchenOrder]) -> Vec<String> {
    orders
        .iter()
        .flat_map(KitchenOrder::stations)
        .collect::<BTreeSet<_>>()
        .into_iter()
        .map(str::to_string)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use shared::models::{Destination, OrderItem};

    fn order(id: &str, status: OrderStatus, stations: &[&str]) -> KitchenOrder {
        let mut order = KitchenOrder::new(id, 2, Destination::Table("T3".into()), Utc::now()).with_status(status);
        for station in stations {
            order = order.with_item(OrderItem::new(1, "Dish").with_station(*station));
        }
        order.with_item(OrderItem::new(1, "Water"))
    }

    #[test]
    fn test_filter_conjunction() {
        let filter = BoardFilter::new("grill", StatusFilter::Active);

        assert!(filter.matches(&order("A1", OrderStatus::Preparing, &["grill", "cold"])));
        assert!(!filter.matches(&order("A1", OrderStatus::Served, &["grill", "cold"])));
        for status in [OrderStatus::Pending, OrderStatus::Preparing, OrderStatus::Ready, OrderStatus::Served] {
            assert!(!filter.matches(&order("A2", status, &["cold"])));
        }
    }

    #[test]
    fn test_status_filters() {
        let ready = order("A1", OrderStatus::Ready, &[]);
        assert!(!StatusFilter::Active.matches(ready.status));
        assert!(StatusFilter::Ready.matches(ready.status));
        assert!(StatusFilter::All.matches(ready.status));
        assert!(BoardFilter::default().matches(&order("A2", OrderStatus::Pending, &[])));
    }

    #[test]
    fn test_apply_keeps_input_order() {
        let orders = vec![
            order("A1", OrderStatus::Pending, &["bar"]),
            order("A2", OrderStatus::Ready, &["bar"]),
            order("A3", OrderStatus::Preparing, &["bar"]),
        ];
        let ids: Vec<&str> = BoardFilter::new("bar", StatusFilter::Active)
            .apply(&orders)
            .into_iter()
            .map(|o| o.id.as_str())
            .collect();
        assert_eq!(ids, vec!["A1", "A3"]);
    }

    #[test]
    fn test_station_options_distinct() {
        let orders = vec![
            order("A1", OrderStatus::Pending, &["grill", "cold"]),
            order("A2", OrderStatus::Ready, &["grill"]),
        ];
        assert_eq!(station_options(&orders), vec!["cold", "grill"]);
        assert!(station_options(&[]).is_empty());
    }

    #[test]
    fn test_parse_filters() {
        assert_eq!("ready".parse::<StatusFilter>().unwrap(), StatusFilter::Ready);
        assert!("served".parse::<StatusFilter>().is_err());
        assert_eq!(StationFilter::from("all"), StationFilter::All);
        assert_eq!(StationFilter::from("grill"), StationFilter::Station("grill".into()));
    }
}
