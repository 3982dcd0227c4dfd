//! BrokerBlueprint - Config Loader 输出
//!
//! 描述完整的 broker 配置：运行时参数、源声明、重试与会话策略。

use serde::{Deserialize, Serialize};

use crate::{BackoffPolicy, ContextType, SourceId};

/// 配置版本
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ConfigVersion {
    #[default]
    V1,
}

/// 完整的 broker 配置蓝图
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BrokerBlueprint {
    /// 配置版本
    #[serde(default)]
    pub version: ConfigVersion,

    /// Broker 运行时设置
    #[serde(default)]
    pub broker: BrokerSettings,

    /// 源声明列表 (mock host 使用)
    #[serde(default)]
    pub sources: Vec<SourceDecl>,
}

/// Broker 运行时设置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BrokerSettings {
    /// 快照有效期 (秒)
    #[serde(default = "default_validity_window_s")]
    pub validity_window_s: f64,

    /// 请求等待上限 (秒)
    #[serde(default = "default_request_timeout_s")]
    pub request_timeout_s: f64,

    /// 每类型 ingest 队列容量
    #[serde(default = "default_queue_capacity")]
    pub queue_capacity: usize,

    /// 过期扫描间隔 (秒)
    #[serde(default = "default_sweep_interval_s")]
    pub sweep_interval_s: f64,

    /// 订阅重试策略
    #[serde(default)]
    pub backoff: BackoffPolicy,

    /// 会话重连间隔 (秒)
    #[serde(default = "default_session_retry_s")]
    pub session_retry_s: f64,

    /// Prometheus 导出端口 (None 则关闭)
    #[serde(default)]
    pub metrics_port: Option<u16>,

    /// Broker 自身的源标识 (发现与扇出时跳过)
    #[serde(default)]
    pub own_source_id: Option<SourceId>,
}

fn default_validity_window_s() -> f64 {
    60.0
}

fn default_request_timeout_s() -> f64 {
    5.0
}

fn default_queue_capacity() -> usize {
    100
}

fn default_sweep_interval_s() -> f64 {
    1.0
}

fn default_session_retry_s() -> f64 {
    2.0
}

impl Default for BrokerSettings {
    fn default() -> Self {
        Self {
            validity_window_s: default_validity_window_s(),
            request_timeout_s: default_request_timeout_s(),
            queue_capacity: default_queue_capacity(),
            sweep_interval_s: default_sweep_interval_s(),
            backoff: BackoffPolicy::default(),
            session_retry_s: default_session_retry_s(),
            metrics_port: None,
            own_source_id: None,
        }
    }
}

/// 源交付模式
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceMode {
    /// 订阅后主动推送
    #[default]
    Push,
    /// 仅响应显式拉取
    Pull,
}

/// 单个源声明
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceDecl {
    /// 唯一标识符
    pub id: SourceId,

    /// 该源提供的 context 类型
    pub context_types: Vec<ContextType>,

    /// 交付模式
    #[serde(default)]
    pub mode: SourceMode,

    /// Mock 负载文本 (e.g., "87%")
    #[serde(default)]
    pub payload: Option<String>,

    /// 推送间隔 (毫秒，push 模式)
    #[serde(default = "default_push_interval_ms")]
    pub push_interval_ms: u64,

    /// 拉取响应延迟 (毫秒，pull 模式)
    #[serde(default)]
    pub pull_delay_ms: u64,
}

fn default_push_interval_ms() -> u64 {
    1000
}

/// Runtime configuration derived from the blueprint.
///
/// This is what the broker components consume; the blueprint keeps
/// the serde surface and defaults separate from runtime wiring.
#[derive(Debug, Clone)]
pub struct BrokerConfig {
    pub validity_window_s: f64,
    pub request_timeout_s: f64,
    pub queue_capacity: usize,
    pub sweep_interval_s: f64,
    pub backoff: BackoffPolicy,
    pub session_retry_s: f64,
    pub own_source_id: Option<SourceId>,
}

impl Default for BrokerConfig {
    fn default() -> Self {
        BrokerSettings::default().to_broker_config()
    }
}

impl BrokerSettings {
    /// Build the runtime config from these settings.
    pub fn to_broker_config(&self) -> BrokerConfig {
        BrokerConfig {
            validity_window_s: self.validity_window_s,
            request_timeout_s: self.request_timeout_s,
            queue_capacity: self.queue_capacity,
            sweep_interval_s: self.sweep_interval_s,
            backoff: self.backoff,
            session_retry_s: self.session_retry_s,
            own_source_id: self.own_source_id.clone(),
        }
    }
}
