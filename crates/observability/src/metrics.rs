//! 请求指标收集模块
//!
//! 基于 RequestMeta 收集和统计 broker 的运行指标。

use contracts::{RequestMeta, RequestOutcome};
use metrics::{counter, gauge, histogram};

/// 从 RequestMeta 记录指标
///
/// 每个请求到达终态时调用此函数来记录指标。
///
/// # Example
///
/// ```ignore
/// use observability::metrics::record_request_metrics;
///
/// record_request_metrics(&meta);
/// ```
pub fn record_request_metrics(meta: &RequestMeta) {
    // 请求计数器
    counter!("context_broker_requests_total").increment(1);

    // 各终态计数
    let outcome = match meta.outcome {
        RequestOutcome::Fulfilled => "fulfilled",
        RequestOutcome::TimedOut => "timed_out",
        RequestOutcome::Unsupported => "unsupported",
    };
    counter!(
        "context_broker_request_outcomes_total",
        "outcome" => outcome,
        "context_type" => meta.context_type.to_string()
    )
    .increment(1);

    // 延迟 (秒 -> 毫秒)
    histogram!("context_broker_request_latency_ms").record(meta.latency_s * 1000.0);

    // 快路径命中
    if meta.fast_path {
        counter!("context_broker_fast_path_total").increment(1);
    }

    // 部分应答
    if meta.partial {
        counter!("context_broker_partial_replies_total").increment(1);
    }

    // 扇出规模
    if meta.sources_queried > 0 {
        histogram!("context_broker_fan_out_size").record(meta.sources_queried as f64);
    }
}

/// 记录快照存量
pub fn record_snapshot_counts(live: usize, total: usize) {
    gauge!("context_broker_snapshots_live").set(live as f64);
    gauge!("context_broker_snapshots_total").set(total as f64);
}

/// 请求指标聚合器
///
/// 在内存中聚合指标，便于统计和输出摘要。
#[derive(Debug, Clone, Default)]
pub struct RequestStatsAggregator {
    /// 总请求数
    pub total_requests: u64,

    /// 各终态计数
    pub fulfilled: u64,
    pub timed_out: u64,
    pub unsupported: u64,

    /// 快路径命中数
    pub fast_path_hits: u64,

    /// 部分应答数
    pub partial_replies: u64,

    /// 延迟统计 (毫秒)
    pub latency_stats: RunningStats,

    /// 扇出规模统计
    pub fan_out_stats: RunningStats,

    /// 各 context 类型请求计数
    pub type_counts: std::collections::HashMap<String, u64>,
}

impl RequestStatsAggregator {
    /// 创建新的聚合器
    pub fn new() -> Self {
        Self::default()
    }

    /// 更新聚合统计
    pub fn update(&mut self, meta: &RequestMeta) {
        self.total_requests += 1;

        match meta.outcome {
            RequestOutcome::Fulfilled => self.fulfilled += 1,
            RequestOutcome::TimedOut => self.timed_out += 1,
            RequestOutcome::Unsupported => self.unsupported += 1,
        }

        if meta.fast_path {
            self.fast_path_hits += 1;
        }
        if meta.partial {
            self.partial_replies += 1;
        }

        // 延迟 (毫秒)
        self.latency_stats.push(meta.latency_s * 1000.0);

        if meta.sources_queried > 0 {
            self.fan_out_stats.push(meta.sources_queried as f64);
        }

        *self
            .type_counts
            .entry(meta.context_type.to_string())
            .or_insert(0) += 1;
    }

    /// 生成摘要报告
    pub fn summary(&self) -> MetricsSummary {
        MetricsSummary {
            total_requests: self.total_requests,
            fulfilled: self.fulfilled,
            timed_out: self.timed_out,
            unsupported: self.unsupported,
            fast_path_hits: self.fast_path_hits,
            partial_replies: self.partial_replies,
            fulfillment_rate: if self.total_requests > 0 {
                self.fulfilled as f64 / self.total_requests as f64 * 100.0
            } else {
                0.0
            },
            fast_path_rate: if self.total_requests > 0 {
                self.fast_path_hits as f64 / self.total_requests as f64 * 100.0
            } else {
                0.0
            },
            latency_ms: StatsSummary::from(&self.latency_stats),
            fan_out_size: StatsSummary::from(&self.fan_out_stats),
            type_counts: self.type_counts.clone(),
        }
    }

    /// 重置统计
    pub fn reset(&mut self) {
        *self = Self::default();
    }
}

/// 指标摘要
#[derive(Debug, Clone, Default)]
pub struct MetricsSummary {
    pub total_requests: u64,
    pub fulfilled: u64,
    pub timed_out: u64,
    pub unsupported: u64,
    pub fast_path_hits: u64,
    pub partial_replies: u64,
    pub fulfillment_rate: f64,
    pub fast_path_rate: f64,
    pub latency_ms: StatsSummary,
    pub fan_out_size: StatsSummary,
    pub type_counts: std::collections::HashMap<String, u64>,
}

impl std::fmt::Display for MetricsSummary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "=== Request Metrics Summary ===")?;
        writeln!(f, "Total requests: {}", self.total_requests)?;
        writeln!(
            f,
            "Fulfilled: {} ({:.2}%)",
            self.fulfilled, self.fulfillment_rate
        )?;
        writeln!(f, "Timed out: {}", self.timed_out)?;
        writeln!(f, "Unsupported: {}", self.unsupported)?;
        writeln!(
            f,
            "Fast path hits: {} ({:.2}%)",
            self.fast_path_hits, self.fast_path_rate
        )?;
        writeln!(f, "Partial replies: {}", self.partial_replies)?;
        writeln!(f, "Latency (ms): {}", self.latency_ms)?;
        writeln!(f, "Fan-out size: {}", self.fan_out_size)?;

        if !self.type_counts.is_empty() {
            writeln!(f, "Requests by context type:")?;
            for (context_type, count) in &self.type_counts {
                writeln!(f, "  {}: {}", context_type, count)?;
            }
        }

        Ok(())
    }
}

/// 统计摘要
#[derive(Debug, Clone, Default)]
pub struct StatsSummary {
    pub count: u64,
    pub min: f64,
    pub max: f64,
    pub mean: f64,
    pub std_dev: f64,
}

impl From<&RunningStats> for StatsSummary {
    fn from(stats: &RunningStats) -> Self {
        Self {
            count: stats.count(),
            min: stats.min(),
            max: stats.max(),
            mean: stats.mean(),
            std_dev: stats.std_dev(),
        }
    }
}

impl std::fmt::Display for StatsSummary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.count == 0 {
            write!(f, "N/A")
        } else {
            write!(
                f,
                "min={:.3}, max={:.3}, mean={:.3}, std={:.3} (n={})",
                self.min, self.max, self.mean, self.std_dev, self.count
            )
        }
    }
}

/// 在线统计计算器 (Welford's algorithm)
#[derive(Debug, Clone, Default)]
pub struct RunningStats {
    count: u64,
    mean: f64,
    m2: f64,
    min: f64,
    max: f64,
}

impl RunningStats {
    /// 添加新值
    pub fn push(&mut self, value: f64) {
        self.count += 1;

        if self.count == 1 {
            self.min = value;
            self.max = value;
            self.mean = value;
            self.m2 = 0.0;
        } else {
            self.min = self.min.min(value);
            self.max = self.max.max(value);

            let delta = value - self.mean;
            self.mean += delta / self.count as f64;
            let delta2 = value - self.mean;
            self.m2 += delta * delta2;
        }
    }

    /// 样本数量
    pub fn count(&self) -> u64 {
        self.count
    }

    /// 均值
    pub fn mean(&self) -> f64 {
        if self.count == 0 {
            0.0
        } else {
            self.mean
        }
    }

    /// 方差
    pub fn variance(&self) -> f64 {
        if self.count < 2 {
            0.0
        } else {
            self.m2 / (self.count - 1) as f64
        }
    }

    /// 标准差
    pub fn std_dev(&self) -> f64 {
        self.variance().sqrt()
    }

    /// 最小值
    pub fn min(&self) -> f64 {
        self.min
    }

    /// 最大值
    pub fn max(&self) -> f64 {
        self.max
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use contracts::RequestMeta;

    fn fulfilled_meta(context_type: &str, latency_s: f64, fast_path: bool) -> RequestMeta {
        let mut meta = RequestMeta::new(context_type.into(), "test");
        meta.outcome = RequestOutcome::Fulfilled;
        meta.latency_s = latency_s;
        meta.fast_path = fast_path;
        meta
    }

    #[test]
    fn test_running_stats() {
        let mut stats = RunningStats::default();

        stats.push(1.0);
        stats.push(2.0);
        stats.push(3.0);
        stats.push(4.0);
        stats.push(5.0);

        assert_eq!(stats.count(), 5);
        assert!((stats.mean() - 3.0).abs() < 1e-10);
        assert!((stats.min() - 1.0).abs() < 1e-10);
        assert!((stats.max() - 5.0).abs() < 1e-10);
        assert!((stats.variance() - 2.5).abs() < 1e-10);
    }

    #[test]
    fn test_aggregator_update() {
        let mut aggregator = RequestStatsAggregator::new();

        aggregator.update(&fulfilled_meta("battery", 0.001, true));

        let mut timed_out = RequestMeta::new("location".into(), "test");
        timed_out.outcome = RequestOutcome::TimedOut;
        timed_out.latency_s = 5.0;
        timed_out.sources_queried = 3;
        aggregator.update(&timed_out);

        assert_eq!(aggregator.total_requests, 2);
        assert_eq!(aggregator.fulfilled, 1);
        assert_eq!(aggregator.timed_out, 1);
        assert_eq!(aggregator.fast_path_hits, 1);
        assert_eq!(aggregator.type_counts.get("battery"), Some(&1));
        assert_eq!(aggregator.fan_out_stats.count(), 1);
    }

    #[test]
    fn test_summary_display() {
        let mut aggregator = RequestStatsAggregator::new();
        for _ in 0..9 {
            aggregator.update(&fulfilled_meta("battery", 0.002, true));
        }
        let mut unsupported = RequestMeta::new("weather".into(), "test");
        unsupported.outcome = RequestOutcome::Unsupported;
        aggregator.update(&unsupported);

        let output = format!("{}", aggregator.summary());
        assert!(output.contains("Total requests: 10"));
        assert!(output.contains("90.00%"));
        assert!(output.contains("Unsupported: 1"));
    }
}
