//! Pipeline statistics.

use std::time::Duration;

use dispatcher::MetricsSnapshot;
use matcher::MatcherStats;
use observability::CorrelationSummary;

/// Statistics from a pipeline run
#[derive(Debug, Clone, Default)]
pub struct PipelineStats {
    /// Camera frames delivered by the replay
    pub images: u64,

    /// Events delivered by the replay
    pub events: u64,

    /// Correlations produced, by kind and region
    pub correlations: CorrelationSummary,

    /// Matcher totals, including overflow evictions
    pub matcher: MatcherStats,

    /// Correlations lost because the dispatcher input was full or closed
    pub forward_dropped: u64,

    /// Final per-sink metrics
    pub sinks: Vec<(String, MetricsSnapshot)>,

    /// Number of configured sinks
    pub active_sinks: usize,

    /// Stopped by signal or timeout before the end of the record
    pub interrupted: bool,

    pub duration: Duration,
}

impl PipelineStats {
    /// Delivered items (images and events) per second
    pub fn throughput(&self) -> f64 {
        if self.duration.as_secs_f64() > 0.0 {
            (self.images + self.events) as f64 / self.duration.as_secs_f64()
        } else {
            0.0
        }
    }

    /// Share of events that found an image, as a percentage
    pub fn match_rate(&self) -> f64 {
        let totals = &self.correlations.totals;
        let events = totals.matched + totals.orphan_events;
        if events > 0 {
            (totals.matched as f64 / events as f64) * 100.0
        } else {
            0.0
        }
    }

    /// Print detailed summary
    pub fn print_summary(&self) {
        println!("\n╔══════════════════════════════════════════════════════════════╗");
        println!("║                    Pipeline Statistics                       ║");
        println!("╚══════════════════════════════════════════════════════════════╝\n");

        println!("📊 Overview");
        println!("   ├─ Duration: {:.2}s", self.duration.as_secs_f64());
        println!("   ├─ Completed: {}", if self.interrupted { "no (interrupted)" } else { "yes" });
        println!("   ├─ Images: {}", self.images);
        println!("   ├─ Events: {}", self.events);
        println!("   ├─ Items/s: {:.2}", self.throughput());
        println!("   └─ Active sinks: {}", self.active_sinks);

        println!("\n🔗 Matcher");
        println!("   ├─ Match rate: {:.2}%", self.match_rate());
        println!("   ├─ Overflow-evicted events: {}", self.matcher.dropped_events);
        println!("   ├─ Overflow-evicted images: {}", self.matcher.dropped_images);
        println!("   ├─ Untagged images: {}", self.matcher.untagged_images);
        println!("   └─ Dropped before dispatch: {}", self.forward_dropped);

        println!();
        print!("{}", self.correlations);

        if !self.sinks.is_empty() {
            println!("\n📤 Sinks");
            for (i, (name, metrics)) in self.sinks.iter().enumerate() {
                let prefix = if i == self.sinks.len() - 1 { "└─" } else { "├─" };
                println!("   {} {}: {}", prefix, name, metrics);
            }
        }

        println!();
    }
}
