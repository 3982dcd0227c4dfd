//! Broker run statistics.

use std::time::Duration;

use observability::RequestStatsAggregator;

/// Statistics from a broker run
#[derive(Debug, Clone, Default)]
pub struct BrokerStats {
    /// Total context requests issued by the request loop
    pub requests_issued: u64,

    /// Requests answered with a snapshot reply
    pub fulfilled: u64,

    /// Requests served straight from a live snapshot
    pub fast_path_hits: u64,

    /// Replies flagged partial (some sources failed during fan-out)
    pub partial_replies: u64,

    /// Requests that hit the bounded-wait timeout
    pub timed_out: u64,

    /// Requests for context types no source advertises
    pub unsupported: u64,

    /// Sources discovered during session establishment
    pub sources_discovered: usize,

    /// Subscriptions active at the end of the run
    pub active_subscriptions: usize,

    /// Events accepted into the snapshot store
    pub events_merged: u64,

    /// Total duration of the broker run
    pub duration: Duration,

    /// Per-request metrics folded from each request's RequestMeta
    pub request_stats: RequestStatsAggregator,
}

impl BrokerStats {
    /// Fulfilled requests as a percentage of requests issued
    pub fn fulfillment_rate(&self) -> f64 {
        if self.requests_issued > 0 {
            (self.fulfilled as f64 / self.requests_issued as f64) * 100.0
        } else {
            0.0
        }
    }

    /// Fast-path hits as a percentage of fulfilled requests
    pub fn fast_path_rate(&self) -> f64 {
        if self.fulfilled > 0 {
            (self.fast_path_hits as f64 / self.fulfilled as f64) * 100.0
        } else {
            0.0
        }
    }

    /// Requests issued per second
    #[allow(dead_code)]
    pub fn request_rate(&self) -> f64 {
        if self.duration.as_secs_f64() > 0.0 {
            self.requests_issued as f64 / self.duration.as_secs_f64()
        } else {
            0.0
        }
    }

    /// Print detailed summary
    pub fn print_summary(&self) {
        println!("\n╔══════════════════════════════════════════════════════════════╗");
        println!("║                     Broker Statistics                        ║");
        println!("╚══════════════════════════════════════════════════════════════╝\n");

        println!("📊 Overview");
        println!("   ├─ Duration: {:.2}s", self.duration.as_secs_f64());
        println!("   ├─ Requests issued: {}", self.requests_issued);
        println!(
            "   ├─ Fulfilled: {} ({:.2}%)",
            self.fulfilled,
            self.fulfillment_rate()
        );
        println!("   ├─ Timed out: {}", self.timed_out);
        println!("   ├─ Unsupported: {}", self.unsupported);
        println!("   ├─ Sources discovered: {}", self.sources_discovered);
        println!("   └─ Active subscriptions: {}", self.active_subscriptions);

        println!("\n📈 Snapshot Path");
        println!(
            "   ├─ Fast path hits: {} ({:.2}% of fulfilled)",
            self.fast_path_hits,
            self.fast_path_rate()
        );
        println!("   ├─ Partial replies: {}", self.partial_replies);
        println!("   └─ Events merged: {}", self.events_merged);

        let latency = &self.request_stats.latency_stats;
        if latency.count() > 0 {
            println!("\n⏱  Request Latency (ms)");
            println!("   ├─ Min: {:.3}", latency.min());
            println!("   ├─ Mean: {:.3}", latency.mean());
            println!("   ├─ Max: {:.3}", latency.max());
            println!("   └─ Std dev: {:.3}", latency.std_dev());
        }

        if !self.request_stats.type_counts.is_empty() {
            println!("\n🗂  Requests by Context Type");
            let mut entries: Vec<_> = self.request_stats.type_counts.iter().collect();
            entries.sort();
            for (i, (context_type, count)) in entries.iter().enumerate() {
                let prefix = if i + 1 == entries.len() {
                    "└─"
                } else {
                    "├─"
                };
                println!("   {} {}: {}", prefix, context_type, count);
            }
        }

        println!();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rates_with_no_requests() {
        let stats = BrokerStats::default();
        assert_eq!(stats.fulfillment_rate(), 0.0);
        assert_eq!(stats.fast_path_rate(), 0.0);
        assert_eq!(stats.request_rate(), 0.0);
    }

    #[test]
    fn test_fulfillment_rate() {
        let stats = BrokerStats {
            requests_issued: 10,
            fulfilled: 9,
            fast_path_hits: 3,
            ..Default::default()
        };
        assert!((stats.fulfillment_rate() - 90.0).abs() < 1e-9);
        assert!((stats.fast_path_rate() - 33.333).abs() < 0.001);
    }
}
