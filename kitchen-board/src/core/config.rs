use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use crab_client::{ClientConfig, MessageClientConfig};
use shared::message::KITCHEN_ORDERS_TOPIC;

use crate::urgency::UrgencyConfig;
use crate::view::{BoardFilter, StatusFilter};

/// When the fallback poll runs
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PollPolicy {
    /// 每个间隔都拉取，无论推送是否在线
    #[default]
    Always,
    /// 推送在线时跳过
    WhenDisconnected,
}

impl FromStr for PollPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "always" => Ok(PollPolicy::Always),
            "when_disconnected" => Ok(PollPolicy::WhenDisconnected),
            other => Err(format!("Unknown poll policy: {}", other)),
        }
    }
}

impl fmt::Display for PollPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PollPolicy::Always => write!(f, "always"),
            PollPolicy::WhenDisconnected => write!(f, "when_disconnected"),
        }
    }
}

/// 看板配置
///
/// # 环境变量
///
/// | 环境变量 | 默认值 | 说明 |
/// |----------|--------|------|
/// | STORE_BASE_URL | http://localhost:3000 | 订单库地址 |
/// | STORE_TOKEN | - | Bearer token |
/// | REQUEST_TIMEOUT_MS | 10000 | 请求超时(毫秒) |
/// | PUSH_TCP_ADDR | - | 推送总线地址，不设置则只轮询 |
/// | PUSH_TOPIC | kitchen_orders | 订阅主题 |
/// | POLL_INTERVAL_MS | 5000 | 轮询间隔(毫秒) |
/// | POLL_POLICY | always | always / when_disconnected |
/// | ESCALATION_THRESHOLD_MIN | 12 | 升级阈值(分钟) |
/// | CRITICAL_THRESHOLD_MIN | 15 | 严重阈值(分钟) |
/// | ESCALATION_RAIL_SIZE | 4 | 升级栏数量 |
/// | RENDER_TICK_MS | 1000 | 刷新间隔(毫秒) |
/// | BOARD_STATION | all | 初始工位筛选 |
/// | BOARD_STATUS | active | 初始状态筛选 (active / ready / all) |
/// | CLIENT_NAME | kitchen-board | 设备名 (握手与审计) |
/// | LOG_LEVEL | info | 日志级别 |
/// | LOG_JSON | false | JSON 日志 |
/// | LOG_DIR | - | 日志文件目录 |
#[derive(Debug, Clone)]
pub struct BoardConfig {
    pub store_base_url: String,
    pub store_token: Option<String>,
    pub request_timeout_ms: u64,
    pub push_tcp_addr: Option<String>,
    pub push_topic: String,
    pub poll_interval_ms: u64,
    pub poll_policy: PollPolicy,
    pub urgency: UrgencyConfig,
    pub render_tick_ms: u64,
    pub station_filter: String,
    pub status_filter: StatusFilter,
    pub client_name: String,
    pub log_level: String,
    pub log_json: bool,
    pub log_dir: Option<String>,
}

impl Default for BoardConfig {
    fn default() -> Self {
        Self {
            store_base_url: "http://localhost:3000".into(),
            store_token: None,
            request_timeout_ms: 10_000,
            push_tcp_addr: None,
            push_topic: KITCHEN_ORDERS_TOPIC.into(),
            poll_interval_ms: 5_000,
            poll_policy: PollPolicy::Always,
            urgency: UrgencyConfig::default(),
            render_tick_ms: 1_000,
            station_filter: "all".into(),
            status_filter: StatusFilter::Active,
            client_name: "kitchen-board".into(),
            log_level: "info".into(),
            log_json: false,
            log_dir: None,
        }
    }
}

fn env_parse<T: FromStr>(key: &str, default: T) -> T {
    std::env::var(key).ok().and_then(|v| v.parse().ok()).unwrap_or(default)
}

fn env_opt(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.trim().is_empty())
}

impl BoardConfig {
    /// 从环境变量加载配置
    ///
    /// 未设置或无法解析的变量使用默认值
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            store_base_url: std::env::var("STORE_BASE_URL").unwrap_or(defaults.store_base_url),
            store_token: env_opt("STORE_TOKEN"),
            request_timeout_ms: env_parse("REQUEST_TIMEOUT_MS", defaults.request_timeout_ms),
            push_tcp_addr: env_opt("PUSH_TCP_ADDR"),
            push_topic: std::env::var("PUSH_TOPIC").unwrap_or(defaults.push_topic),
            poll_interval_ms: env_parse("POLL_INTERVAL_MS", defaults.poll_interval_ms),
            poll_policy: env_parse("POLL_POLICY", defaults.poll_policy),
            urgency: UrgencyConfig {
                escalation_threshold_minutes: env_parse(
                    "ESCALATION_THRESHOLD_MIN",
                    defaults.urgency.escalation_threshold_minutes,
                ),
                critical_threshold_minutes: env_parse(
                    "CRITICAL_THRESHOLD_MIN",
                    defaults.urgency.critical_threshold_minutes,
                ),
                rail_size: env_parse("ESCALATION_RAIL_SIZE", defaults.urgency.rail_size),
            },
            render_tick_ms: env_parse("RENDER_TICK_MS", defaults.render_tick_ms),
            station_filter: std::env::var("BOARD_STATION").unwrap_or(defaults.station_filter),
            status_filter: env_parse("BOARD_STATUS", defaults.status_filter),
            client_name: std::env::var("CLIENT_NAME").unwrap_or(defaults.client_name),
            log_level: std::env::var("LOG_LEVEL").unwrap_or(defaults.log_level),
            log_json: env_parse("LOG_JSON", defaults.log_json),
            log_dir: env_opt("LOG_DIR"),
        }
    }

    pub fn with_store(mut self, base_url: impl Into<String>) -> Self {
        self.store_base_url = base_url.into();
        self
    }

    pub fn with_push_addr(mut self, addr: impl Into<String>) -> Self {
        self.push_tcp_addr = Some(addr.into());
        self
    }

    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval_ms = interval.as_millis() as u64;
        self
    }

    pub fn with_poll_policy(mut self, policy: PollPolicy) -> Self {
        self.poll_policy = policy;
        self
    }

    pub fn with_urgency(mut self, urgency: UrgencyConfig) -> Self {
        self.urgency = urgency;
        self
    }

    pub fn with_client_name(mut self, name: impl Into<String>) -> Self {
        self.client_name = name.into();
        self
    }

    pub fn poll_interval(&self) -> Duration {
        // interval(0) 会 panic
        Duration::from_millis(self.poll_interval_ms.max(1))
    }

    /// Initial (station, status) filter of the display
    pub fn filter(&self) -> BoardFilter {
        BoardFilter::new(self.station_filter.as_str(), self.status_filter)
    }

    pub fn render_tick(&self) -> Duration {
        Duration::from_millis(self.render_tick_ms.max(1))
    }

    /// HTTP client settings for the order store
    pub fn client_config(&self) -> ClientConfig {
        let config = ClientConfig::new(&self.store_base_url)
            .with_timeout_ms(self.request_timeout_ms)
            .with_client_name(&self.client_name);
        match &self.store_token {
            Some(token) => config.with_token(token),
            None => config,
        }
    }

    pub fn message_config(&self) -> MessageClientConfig {
        MessageClientConfig::default()
    }
}
