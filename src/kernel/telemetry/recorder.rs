use serde_json::Value;
use std::collections::{BTreeMap, HashMap, VecDeque};
use tracing::debug;

use super::event::{EntryDetail, MetricEntry, MetricKind, RawMetricEvent};
use super::metrics::{
    AggregatedRawView, CellKey, CumulativeCounter, KindClass, KindRegistry, ReceivedEntry,
    SeriesState, TimelineSeries, TimelineView, TokenComponent,
};
use crate::kernel::time::{now, time_key, Timestamp};

/// Raw metric events retained per session.
pub const RAW_WINDOW_CAPACITY: usize = 200;

#[derive(Debug)]
struct RetainedEvent {
    seq: u64,
    event: RawMetricEvent,
    time_key: i64,
    /// One `(kind, processor)` per entry, in the order they were appended.
    contributions: Vec<(MetricKind, String)>,
    /// Timeline cells this event wrote at `time_key`.
    cells: Vec<(MetricKind, CellKey)>,
}

/// Turns the metrics stream into a grouped raw view and aligned timelines.
///
/// Memory is bounded by the raw window: every timeline cell is owned by the
/// retained event that wrote it last and leaves with that event. Cumulative
/// counters outlive eviction and are cleared only by `reset`.
#[derive(Debug)]
pub struct MetricsAggregator {
    registry: KindRegistry,
    capacity: usize,
    window: VecDeque<RetainedEvent>,
    next_seq: u64,
    raw: BTreeMap<MetricKind, BTreeMap<String, VecDeque<ReceivedEntry>>>,
    series: BTreeMap<MetricKind, SeriesState>,
    counters: HashMap<(MetricKind, String), CumulativeCounter>,
    owners: HashMap<(MetricKind, i64, CellKey), u64>,
}

impl MetricsAggregator {
    pub fn new(registry: KindRegistry) -> Self {
        Self::with_capacity(registry, RAW_WINDOW_CAPACITY)
    }

    pub fn with_capacity(registry: KindRegistry, capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            registry,
            capacity,
            window: VecDeque::with_capacity(capacity),
            next_seq: 0,
            raw: BTreeMap::new(),
            series: BTreeMap::new(),
            counters: HashMap::new(),
            owners: HashMap::new(),
        }
    }

    /// Ingests a raw bag received now.
    pub fn ingest(&mut self, bag: &Value) {
        self.ingest_at(bag, now());
    }

    pub fn ingest_at(&mut self, bag: &Value, received_at: Timestamp) {
        self.ingest_event(RawMetricEvent::from_bag(bag, received_at));
    }

    pub fn ingest_event(&mut self, event: RawMetricEvent) {
        // Arrival order is authoritative: a receipt stamped before the newest
        // retained point merges into that point instead of rewriting history.
        let stamped = time_key(&event.received_at);
        let key = match self.window.back() {
            Some(newest) if stamped < newest.time_key => newest.time_key,
            _ => stamped,
        };
        let seq = self.next_seq;
        self.next_seq += 1;

        let mut contributions = Vec::with_capacity(event.entry_count());
        let mut cells = Vec::new();
        for batch in &event.batches {
            let class = self.registry.classify(&batch.kind);
            for entry in &batch.entries {
                // 1. Raw view
                self.raw
                    .entry(batch.kind.clone())
                    .or_default()
                    .entry(entry.processor.clone())
                    .or_default()
                    .push_back(ReceivedEntry {
                        entry: entry.clone(),
                        received_at: event.received_at,
                    });
                contributions.push((batch.kind.clone(), entry.processor.clone()));

                // 2. Timeline
                for (cell, value) in self.timeline_cells(&batch.kind, class, entry) {
                    self.series_mut(&batch.kind, class).point_mut(key).insert(cell.clone(), value);
                    self.owners.insert((batch.kind.clone(), key, cell.clone()), seq);
                    cells.push((batch.kind.clone(), cell));
                }
            }
        }

        self.window.push_back(RetainedEvent {
            seq,
            event,
            time_key: key,
            contributions,
            cells,
        });

        // 3. Window bound (FIFO)
        while self.window.len() > self.capacity {
            if let Some(evicted) = self.window.pop_front() {
                self.evict(evicted);
            }
        }
    }

    /// Cells one entry writes. Cumulative kinds advance their counters here.
    fn timeline_cells(
        &mut self,
        kind: &MetricKind,
        class: KindClass,
        entry: &MetricEntry,
    ) -> Vec<(CellKey, f64)> {
        match class {
            KindClass::Instantaneous => match entry.value {
                Some(value) => vec![(CellKey::total(&entry.processor), value)],
                // No value means no sample; the point stays null for this processor.
                None => Vec::new(),
            },
            KindClass::Cumulative => {
                let counter = self
                    .counters
                    .entry((kind.clone(), entry.processor.clone()))
                    .or_default();
                match &entry.detail {
                    EntryDetail::Tokens(usage) => {
                        counter.completion += increment(usage.completion);
                        counter.prompt += increment(usage.prompt);
                        counter.total += increment(usage.total);
                        vec![
                            (CellKey::total(&entry.processor), counter.total),
                            (
                                CellKey::component(&entry.processor, TokenComponent::Completion),
                                counter.completion,
                            ),
                            (CellKey::component(&entry.processor, TokenComponent::Prompt), counter.prompt),
                        ]
                    }
                    _ => {
                        counter.total += increment(entry.value.unwrap_or(0.0));
                        vec![(CellKey::total(&entry.processor), counter.total)]
                    }
                }
            }
        }
    }

    fn series_mut(&mut self, kind: &MetricKind, class: KindClass) -> &mut SeriesState {
        self.series
            .entry(kind.clone())
            .or_insert_with(|| SeriesState::new(class))
    }

    fn evict(&mut self, evicted: RetainedEvent) {
        // The evicted event is the oldest, so its entries sit at the front of
        // every list they were appended to.
        for (kind, processor) in &evicted.contributions {
            if let Some(by_processor) = self.raw.get_mut(kind) {
                if let Some(entries) = by_processor.get_mut(processor) {
                    entries.pop_front();
                    if entries.is_empty() {
                        by_processor.remove(processor);
                    }
                }
                if by_processor.is_empty() {
                    self.raw.remove(kind);
                }
            }
        }

        // A cell overwritten by a later retained event at the same time key
        // belongs to that event now and stays.
        for (kind, cell) in evicted.cells {
            let owner = (kind, evicted.time_key, cell);
            if self.owners.get(&owner) != Some(&evicted.seq) {
                continue;
            }
            self.owners.remove(&owner);
            let (kind, key, cell) = owner;
            if let Some(state) = self.series.get_mut(&kind) {
                state.remove_cell(key, &cell);
                if state.points.is_empty() {
                    self.series.remove(&kind);
                }
            }
        }

        debug!(event_id = %evicted.event.id, "metrics event evicted from window");
    }

    /// Clears window, views and counters.
    pub fn reset(&mut self) {
        self.window.clear();
        self.raw.clear();
        self.series.clear();
        self.counters.clear();
        self.owners.clear();
    }

    pub fn raw_view(&self) -> AggregatedRawView {
        self.raw
            .iter()
            .map(|(kind, by_processor)| {
                let grouped = by_processor
                    .iter()
                    .map(|(processor, entries)| (processor.clone(), entries.iter().cloned().collect()))
                    .collect();
                (kind.clone(), grouped)
            })
            .collect()
    }

    pub fn timeline_view(&self) -> TimelineView {
        self.series
            .iter()
            .map(|(kind, state)| (kind.clone(), state.to_series(kind)))
            .collect()
    }

    pub fn series(&self, kind: &MetricKind) -> Option<TimelineSeries> {
        self.series.get(kind).map(|state| state.to_series(kind))
    }

    pub fn counter(&self, kind: &MetricKind, processor: &str) -> Option<CumulativeCounter> {
        self.counters.get(&(kind.clone(), processor.to_string())).copied()
    }

    /// Retained raw events, oldest first.
    pub fn events(&self) -> impl Iterator<Item = &RawMetricEvent> {
        self.window.iter().map(|retained| &retained.event)
    }

    pub fn window_len(&self) -> usize {
        self.window.len()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn registry(&self) -> &KindRegistry {
        &self.registry
    }
}

impl Default for MetricsAggregator {
    fn default() -> Self {
        Self::new(KindRegistry::default())
    }
}

// Counters never move backwards: negative or non-finite samples add nothing.
fn increment(value: f64) -> f64 {
    if value.is_finite() && value > 0.0 {
        value
    } else {
        0.0
    }
}
