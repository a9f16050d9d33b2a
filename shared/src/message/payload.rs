use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::models::KitchenOrder;

/// 厨房看板推送主题
pub const KITCHEN_ORDERS_TOPIC: &str = "kitchen_orders";

/// 握手载荷 (客户端 -> 服务端)
///
/// 包含客户端的协议版本信息和订阅的主题列表。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HandshakePayload {
    /// 协议版本
    pub version: u16,
    /// 客户端名称/标识
    pub client_name: Option<String>,
    /// 客户端版本
    pub client_version: Option<String>,
    /// 订阅主题
    #[serde(default)]
    pub topics: Vec<String>,
}

/// 主题发布载荷 (服务端 -> 订阅者)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PublishPayload {
    pub topic: String,
    pub data: serde_json::Value,
}

impl PublishPayload {
    /// 解析主题数据
    pub fn decode<T: DeserializeOwned>(&self) -> Result<T, serde_json::Error> {
        T::deserialize(&self.data)
    }
}

/// `kitchen_orders` 主题的消息体：完整快照 + 服务端时间戳
///
/// 推送是整板替换，不是增量。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BoardSnapshotPayload {
    pub orders: Vec<KitchenOrder>,
    pub timestamp: DateTime<Utc>,
}
