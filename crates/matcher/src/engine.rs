//! Matcher core
//!
//! Every arriving item scans the opposing queue of its region from the head:
//! heads too old to ever match become orphans, a head within tolerance is
//! paired, a head too far in the future ends the scan and the item waits in
//! its own queue.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};

use contracts::{
    Correlation, CorrelationKind, EventRecord, ImageFrame, MatchClock, MatchPolicy, MatcherConfig,
    RegionName, Timestamped,
};
use tracing::{debug, error, info, trace, warn};

use crate::buffer::RegionBuffer;

/// Running totals since construction
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MatcherStats {
    pub matched: u64,
    pub orphan_events: u64,
    pub orphan_images: u64,
    /// Pending events evicted by queue overflow
    pub dropped_events: u64,
    /// Pending images evicted by queue overflow
    pub dropped_images: u64,
    /// Images rejected for lack of a region tag
    pub untagged_images: u64,
}

impl MatcherStats {
    fn count(&mut self, correlations: &[Correlation]) {
        for correlation in correlations {
            match correlation.kind() {
                CorrelationKind::Matched => self.matched += 1,
                CorrelationKind::OrphanEvent => self.orphan_events += 1,
                CorrelationKind::OrphanImage => self.orphan_images += 1,
            }
            observability::record_correlation(correlation);
        }
    }
}

#[derive(Default)]
struct State {
    events: HashMap<RegionName, RegionBuffer<EventRecord>>,
    images: HashMap<RegionName, RegionBuffer<ImageFrame>>,
    stats: MatcherStats,
}

/// Region-keyed event/image correlator, safe to share across callback threads
pub struct Matcher {
    config: MatcherConfig,
    state: Mutex<State>,
}

impl Default for Matcher {
    fn default() -> Self {
        Self::new(MatcherConfig::default())
    }
}

impl Matcher {
    pub fn new(config: MatcherConfig) -> Self {
        info!(
            max_time_diff_ms = config.max_time_diff_ms,
            max_queue_size = config.max_queue_size,
            clock = ?config.clock,
            policy = ?config.policy,
            "Matcher created"
        );
        Self {
            config,
            state: Mutex::new(State::default()),
        }
    }

    pub fn config(&self) -> &MatcherConfig {
        &self.config
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Offer an event; returns orphaned images and at most one match
    pub fn add_event(&self, event: EventRecord) -> Vec<Correlation> {
        let region = event.region_name.clone();
        let mut out = Vec::new();

        let mut guard = self.lock();
        let state = &mut *guard;
        let pending = scan(
            event,
            state.images.get_mut(&region),
            &self.config,
            &mut out,
            |image| Correlation::orphan_image(region.clone(), image),
            |event, image| Correlation::matched(region.clone(), event, image),
        );

        if let Some(event) = pending {
            let queue = state
                .events
                .entry(region.clone())
                .or_insert_with(|| RegionBuffer::new(self.config.max_queue_size));
            if let Some(dropped) = queue.push(event) {
                state.stats.dropped_events += 1;
                observability::record_matcher_overflow(&region, "event");
                warn!(
                    region = %region,
                    dropped_time_ms = dropped.time_ms(self.config.clock),
                    "Event queue full, dropping oldest"
                );
            }
        }

        state.stats.count(&out);
        out
    }

    /// Offer a region-tagged image; returns orphaned events and at most one match.
    ///
    /// Images without a region produce nothing.
    pub fn add_image(&self, image: ImageFrame) -> Vec<Correlation> {
        let Some(region) = image.region.clone() else {
            error!(
                time_ms = image.time_ms(self.config.clock),
                "Image has no region tag, ignoring"
            );
            self.lock().stats.untagged_images += 1;
            return Vec::new();
        };
        let mut out = Vec::new();

        let mut guard = self.lock();
        let state = &mut *guard;
        let pending = scan(
            image,
            state.events.get_mut(&region),
            &self.config,
            &mut out,
            |event| Correlation::orphan_event(region.clone(), event),
            |image, event| Correlation::matched(region.clone(), event, image),
        );

        if let Some(image) = pending {
            let queue = state
                .images
                .entry(region.clone())
                .or_insert_with(|| RegionBuffer::new(self.config.max_queue_size));
            if let Some(dropped) = queue.push(image) {
                state.stats.dropped_images += 1;
                observability::record_matcher_overflow(&region, "image");
                warn!(
                    region = %region,
                    dropped_time_ms = dropped.time_ms(self.config.clock),
                    "Image queue full, dropping oldest"
                );
            }
        }

        state.stats.count(&out);
        out
    }

    /// Pending (events, images) for `region`
    pub fn pending(&self, region: &str) -> (usize, usize) {
        let state = self.lock();
        (
            state.events.get(region).map_or(0, RegionBuffer::len),
            state.images.get(region).map_or(0, RegionBuffer::len),
        )
    }

    /// Regions with anything pending, sorted
    pub fn regions(&self) -> Vec<RegionName> {
        let state = self.lock();
        let mut regions: Vec<RegionName> = state
            .events
            .iter()
            .filter(|(_, q)| !q.is_empty())
            .map(|(r, _)| r.clone())
            .chain(
                state
                    .images
                    .iter()
                    .filter(|(_, q)| !q.is_empty())
                    .map(|(r, _)| r.clone()),
            )
            .collect();
        regions.sort_by(|a, b| a.as_str().cmp(b.as_str()));
        regions.dedup();
        regions
    }

    /// Discard everything pending
    pub fn clear(&self) {
        let mut state = self.lock();
        let events: usize = state.events.values().map(RegionBuffer::len).sum();
        let images: usize = state.images.values().map(RegionBuffer::len).sum();
        state.events.clear();
        state.images.clear();
        debug!(events, images, "Matcher queues cleared");
    }

    /// Turn everything pending into orphans: all events first, then all
    /// images, regions in name order, each queue oldest first.
    pub fn flush(&self) -> Vec<Correlation> {
        let mut guard = self.lock();
        let state = &mut *guard;
        let mut out = Vec::new();

        for (region, mut queue) in sorted(std::mem::take(&mut state.events)) {
            out.extend(
                queue
                    .drain()
                    .map(|event| Correlation::orphan_event(region.clone(), event)),
            );
        }
        for (region, mut queue) in sorted(std::mem::take(&mut state.images)) {
            out.extend(
                queue
                    .drain()
                    .map(|image| Correlation::orphan_image(region.clone(), image)),
            );
        }

        state.stats.count(&out);
        debug!(orphans = out.len(), "Matcher flushed");
        out
    }

    pub fn stats(&self) -> MatcherStats {
        self.lock().stats
    }
}

fn sorted<T>(map: HashMap<RegionName, T>) -> Vec<(RegionName, T)> {
    let mut entries: Vec<_> = map.into_iter().collect();
    entries.sort_by(|(a, _), (b, _)| a.as_str().cmp(b.as_str()));
    entries
}

/// Scan `opposing` for a counterpart of `item`.
///
/// Returns the item when it stays unmatched and must be enqueued.
fn scan<X, H>(
    item: X,
    opposing: Option<&mut RegionBuffer<H>>,
    config: &MatcherConfig,
    out: &mut Vec<Correlation>,
    orphan: impl Fn(H) -> Correlation,
    pair: impl FnOnce(X, H) -> Correlation,
) -> Option<X>
where
    X: Timestamped,
    H: Timestamped,
{
    let clock: MatchClock = config.clock;
    let max_diff = config.max_time_diff_ms;
    let t = item.time_ms(clock);

    let Some(queue) = opposing else {
        return Some(item);
    };

    let mut item = Some(item);
    let mut pair = Some(pair);

    while let Some(head_t) = queue.front().map(|head| head.time_ms(clock)) {
        if t > head_t.saturating_add(max_diff) {
            if let Some(stale) = queue.pop() {
                trace!(time_ms = t, stale_time_ms = head_t, "Evicting stale head");
                out.push(orphan(stale));
            }
            continue;
        }

        // After a match only stale heads are evicted
        if item.is_none() || t.saturating_add(max_diff) < head_t {
            break;
        }

        if let (Some(head), Some(x), Some(pair)) = (queue.pop(), item.take(), pair.take()) {
            debug!(time_ms = t, matched_time_ms = head_t, "Matched");
            out.push(pair(x, head));
        }
        if config.policy == MatchPolicy::FirstMatch {
            break;
        }
    }

    item
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;
    use contracts::Timestamps;

    fn event(region: &str, t: u64) -> EventRecord {
        EventRecord {
            timestamps: Timestamps::same(t),
            region_name: region.into(),
            region_id: 1,
            spatial_box: None,
            points: None,
        }
    }

    fn image(region: &str, t: u64) -> ImageFrame {
        ImageFrame {
            timestamps: Timestamps::same(t),
            pixels: Bytes::new(),
            width: 0,
            height: 0,
            channels: 3,
            region: Some(region.into()),
            spatial_box: None,
        }
    }

    fn matcher(max_time_diff_ms: u64) -> Matcher {
        Matcher::new(MatcherConfig {
            max_time_diff_ms,
            ..Default::default()
        })
    }

    fn times(correlations: &[Correlation]) -> Vec<(CorrelationKind, u64)> {
        correlations
            .iter()
            .map(|c| (c.kind(), c.timestamps().local_time_ms))
            .collect()
    }

    #[test]
    fn test_event_then_image_matches() {
        let matcher = matcher(150);
        assert!(matcher.add_event(event("lane_1", 1000)).is_empty());

        let out = matcher.add_image(image("lane_1", 1080));
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].kind(), CorrelationKind::Matched);
        assert_eq!(out[0].gap_ms(), Some(80));
        assert_eq!(matcher.pending("lane_1"), (0, 0));
    }

    #[test]
    fn test_matching_is_symmetric() {
        let matcher = matcher(150);
        assert!(matcher.add_image(image("lane_1", 1080)).is_empty());

        let out = matcher.add_event(event("lane_1", 1000));
        assert_eq!(times(&out), vec![(CorrelationKind::Matched, 1000)]);
        assert_eq!(matcher.pending("lane_1"), (0, 0));
    }

    #[test]
    fn test_regions_are_independent() {
        let matcher = matcher(150);
        matcher.add_event(event("lane_1", 1000));

        assert!(matcher.add_image(image("lane_2", 1000)).is_empty());
        assert_eq!(matcher.pending("lane_1"), (1, 0));
        assert_eq!(matcher.pending("lane_2"), (0, 1));
        assert_eq!(matcher.regions().len(), 2);
    }

    #[test]
    fn test_stale_head_evicted_fresh_head_kept() {
        let matcher = matcher(5);
        matcher.add_event(event("r", 0));
        matcher.add_event(event("r", 20));

        let out = matcher.add_image(image("r", 10));
        assert_eq!(times(&out), vec![(CorrelationKind::OrphanEvent, 0)]);
        assert_eq!(matcher.pending("r"), (1, 1));
    }

    #[test]
    fn test_first_match_stops_scan() {
        let matcher = matcher(50);
        matcher.add_image(image("r", 100));
        matcher.add_image(image("r", 110));

        let out = matcher.add_event(event("r", 120));
        assert_eq!(times(&out), vec![(CorrelationKind::Matched, 120)]);
        assert_eq!(out[0].image.as_ref().map(|i| i.timestamps.local_time_ms), Some(100));
        assert_eq!(matcher.pending("r"), (0, 1));
    }

    #[test]
    fn test_drain_stale_keeps_evicting_after_match() {
        let matcher = Matcher::new(MatcherConfig {
            max_time_diff_ms: 10,
            policy: MatchPolicy::DrainStale,
            ..Default::default()
        });
        // Out-of-order arrivals leave a stale image behind the matching head
        matcher.add_image(image("r", 95));
        matcher.add_image(image("r", 50));
        matcher.add_image(image("r", 200));

        let out = matcher.add_event(event("r", 100));
        assert_eq!(
            times(&out),
            vec![
                (CorrelationKind::Matched, 100),
                (CorrelationKind::OrphanImage, 50),
            ]
        );
        assert_eq!(matcher.pending("r"), (0, 1));
    }

    #[test]
    fn test_no_match_outside_tolerance() {
        let matcher = matcher(50);
        matcher.add_event(event("r", 1000));

        // Image far in the past relative to the event: scan stops, image waits
        assert!(matcher.add_image(image("r", 900)).is_empty());
        assert_eq!(matcher.pending("r"), (1, 1));

        let out = matcher.flush();
        assert_eq!(
            times(&out),
            vec![
                (CorrelationKind::OrphanEvent, 1000),
                (CorrelationKind::OrphanImage, 900),
            ]
        );
        assert_eq!(matcher.pending("r"), (0, 0));
    }

    #[test]
    fn test_untagged_image_is_rejected() {
        let matcher = matcher(150);
        matcher.add_event(event("r", 0));
        let mut untagged = image("r", 0);
        untagged.region = None;

        assert!(matcher.add_image(untagged).is_empty());
        assert_eq!(matcher.pending("r"), (1, 0));
        assert_eq!(matcher.stats().untagged_images, 1);
    }

    #[test]
    fn test_own_queue_overflow_drops_oldest() {
        let matcher = Matcher::new(MatcherConfig {
            max_time_diff_ms: 5,
            max_queue_size: 2,
            ..Default::default()
        });
        for t in [0, 100, 200] {
            matcher.add_event(event("r", t));
        }
        assert_eq!(matcher.pending("r"), (2, 0));
        assert_eq!(matcher.stats().dropped_events, 1);

        let out = matcher.add_image(image("r", 100));
        assert_eq!(times(&out), vec![(CorrelationKind::Matched, 100)]);
    }

    #[test]
    fn test_device_clock_is_used_when_configured() {
        let matcher = Matcher::new(MatcherConfig {
            max_time_diff_ms: 10,
            clock: MatchClock::Device,
            ..Default::default()
        });
        let mut e = event("r", 0);
        e.timestamps = Timestamps::new(500, 0);
        let mut i = image("r", 0);
        i.timestamps = Timestamps::new(505, 10_000);

        matcher.add_event(e);
        let out = matcher.add_image(i);
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].kind(), CorrelationKind::Matched);
    }

    #[test]
    fn test_clear_discards_pending() {
        let matcher = matcher(150);
        matcher.add_event(event("r", 0));
        matcher.add_image(image("q", 0));
        matcher.clear();
        assert!(matcher.regions().is_empty());
        assert!(matcher.flush().is_empty());
        assert_eq!(matcher.stats().matched, 0);
    }
}
