//! # Observability
//!
//! Prometheus 指标导出与请求统计。
//!
//! 日志初始化由二进制入口装配（CLI 按命令行参数选择 fmt 层），
//! 这里只承载指标侧：Prometheus 导出器与内存内的运行统计。
//!
//! ## 使用示例
//!
//! ```ignore
//! observability::init_metrics_only(9000)?;
//! observability::record_request_metrics(&meta);
//! ```

pub mod metrics;

use anyhow::{Context, Result};
use metrics_exporter_prometheus::PrometheusBuilder;

// Re-exports
pub use crate::metrics::{
    record_request_metrics, record_snapshot_counts, MetricsSummary, RequestStatsAggregator,
    RunningStats, StatsSummary,
};

/// 启动 Prometheus 导出器，监听 0.0.0.0:<port>。
///
/// 进程内只能安装一个 recorder，重复调用会返回错误。
pub fn init_metrics_only(port: u16) -> Result<()> {
    PrometheusBuilder::new()
        .with_http_listener(([0, 0, 0, 0], port))
        .install()
        .context("Failed to install Prometheus recorder")?;

    tracing::info!(port = port, "Prometheus metrics endpoint initialized");
    Ok(())
}
