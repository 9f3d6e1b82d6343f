//! Pipeline metrics
//!
//! Thin wrappers over the `metrics` macros so every crate reports under the
//! same names and labels, plus an in-memory aggregator for run summaries.

use std::collections::HashMap;

use contracts::{Correlation, CorrelationKind};
use metrics::{counter, gauge, histogram};

/// Record one matcher result
///
/// # Example
///
/// ```ignore
/// for correlation in matcher.add_image(frame) {
///     observability::record_correlation(&correlation);
///     dispatcher_tx.try_send(correlation)?;
/// }
/// ```
pub fn record_correlation(correlation: &Correlation) {
    let kind = correlation.kind();
    counter!(
        "regionsync_correlations_total",
        "kind" => kind.as_str(),
        "region" => correlation.region.to_string()
    )
    .increment(1);

    if let Some(gap) = correlation.gap_ms() {
        histogram!("regionsync_match_gap_ms").record(gap as f64);
    }
}

/// Drop-oldest eviction in a bounded queue
pub fn record_queue_eviction(queue: &str) {
    counter!("regionsync_queue_evictions_total", "queue" => queue.to_string()).increment(1);
}

pub fn record_queue_depth(queue: &str, depth: usize) {
    gauge!("regionsync_queue_depth", "queue" => queue.to_string()).set(depth as f64);
}

/// Matcher region queue overflow (`side` is `event` or `image`)
pub fn record_matcher_overflow(region: &str, side: &'static str) {
    counter!(
        "regionsync_matcher_overflow_total",
        "region" => region.to_string(),
        "side" => side
    )
    .increment(1);
}

/// Point cloud dropped from an event bundle for exceeding the gap bound
pub fn record_stale_points(gap_ms: u64) {
    counter!("regionsync_stale_point_clouds_total").increment(1);
    histogram!("regionsync_stale_point_gap_ms").record(gap_ms as f64);
}

/// Message dispatched by record replay
pub fn record_record_message(kind: &str) {
    counter!("regionsync_record_messages_total", "kind" => kind.to_string()).increment(1);
}

pub fn record_callback_missing(kind: &str) {
    counter!("regionsync_callback_missing_total", "kind" => kind.to_string()).increment(1);
}

pub fn record_codec_error() {
    counter!("regionsync_codec_errors_total").increment(1);
}

/// Correlation handed to (or dropped before) a sink
pub fn record_correlation_dispatched(sink_name: &str, success: bool) {
    let status = if success { "success" } else { "failure" };
    counter!(
        "regionsync_correlations_dispatched_total",
        "sink" => sink_name.to_string(),
        "status" => status
    )
    .increment(1);
}

/// Per-region correlation counts
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RegionCounts {
    pub matched: u64,
    pub orphan_events: u64,
    pub orphan_images: u64,
}

/// In-memory correlation statistics for one run
#[derive(Debug, Clone, Default)]
pub struct CorrelationAggregator {
    regions: HashMap<String, RegionCounts>,
    gap_stats: RunningStats,
}

impl CorrelationAggregator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn update(&mut self, correlation: &Correlation) {
        let counts = self
            .regions
            .entry(correlation.region.to_string())
            .or_default();

        match correlation.kind() {
            CorrelationKind::Matched => counts.matched += 1,
            CorrelationKind::OrphanEvent => counts.orphan_events += 1,
            CorrelationKind::OrphanImage => counts.orphan_images += 1,
        }

        if let Some(gap) = correlation.gap_ms() {
            self.gap_stats.push(gap as f64);
        }
    }

    pub fn summary(&self) -> CorrelationSummary {
        let totals = self
            .regions
            .values()
            .fold(RegionCounts::default(), |acc, c| RegionCounts {
                matched: acc.matched + c.matched,
                orphan_events: acc.orphan_events + c.orphan_events,
                orphan_images: acc.orphan_images + c.orphan_images,
            });

        let mut regions: Vec<(String, RegionCounts)> = self
            .regions
            .iter()
            .map(|(name, counts)| (name.clone(), *counts))
            .collect();
        regions.sort_by(|a, b| a.0.cmp(&b.0));

        CorrelationSummary {
            totals,
            match_gap_ms: StatsSummary::from(&self.gap_stats),
            regions,
        }
    }

    pub fn reset(&mut self) {
        *self = Self::default();
    }
}

/// Correlation summary report
#[derive(Debug, Clone, Default)]
pub struct CorrelationSummary {
    pub totals: RegionCounts,
    pub match_gap_ms: StatsSummary,
    /// Sorted by region name
    pub regions: Vec<(String, RegionCounts)>,
}

impl CorrelationSummary {
    pub fn total(&self) -> u64 {
        self.totals.matched + self.totals.orphan_events + self.totals.orphan_images
    }
}

impl std::fmt::Display for CorrelationSummary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "=== Correlation Summary ===")?;
        writeln!(f, "Matched pairs: {}", self.totals.matched)?;
        writeln!(f, "Orphan events: {}", self.totals.orphan_events)?;
        writeln!(f, "Orphan images: {}", self.totals.orphan_images)?;
        writeln!(f, "Match gap (ms): {}", self.match_gap_ms)?;

        if !self.regions.is_empty() {
            writeln!(f, "Per region:")?;
            for (region, counts) in &self.regions {
                writeln!(
                    f,
                    "  {}: matched={}, orphan_events={}, orphan_images={}",
                    region, counts.matched, counts.orphan_events, counts.orphan_images
                )?;
            }
        }

        Ok(())
    }
}

/// Summary of a [`RunningStats`]
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
            count: stats.count,
            min: stats.min,
            max: stats.max,
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
                "min={:.1}, max={:.1}, mean={:.1}, std={:.1} (n={})",
                self.min, self.max, self.mean, self.std_dev, self.count
            )
        }
    }
}

/// Online mean/variance (Welford)
#[derive(Debug, Clone, Default)]
pub struct RunningStats {
    count: u64,
    mean: f64,
    m2: f64,
    min: f64,
    max: f64,
}

impl RunningStats {
    pub fn push(&mut self, value: f64) {
        self.count += 1;

        if self.count == 1 {
            self.min = value;
            self.max = value;
            self.mean = value;
            self.m2 = 0.0;
            return;
        }

        self.min = self.min.min(value);
        self.max = self.max.max(value);
        let delta = value - self.mean;
        self.mean += delta / self.count as f64;
        self.m2 += delta * (value - self.mean);
    }

    pub fn count(&self) -> u64 {
        self.count
    }

    pub fn mean(&self) -> f64 {
        if self.count == 0 {
            0.0
        } else {
            self.mean
        }
    }

    /// Sample variance
    pub fn variance(&self) -> f64 {
        if self.count < 2 {
            0.0
        } else {
            self.m2 / (self.count - 1) as f64
        }
    }

    pub fn std_dev(&self) -> f64 {
        self.variance().sqrt()
    }
}
