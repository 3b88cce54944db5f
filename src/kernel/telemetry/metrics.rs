use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet, HashMap};

use super::event::{MetricEntry, MetricKind};
use crate::kernel::time::{format_timestamp, from_time_key, Timestamp};

/// How a kind is charted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum KindClass {
    /// The point value is the sample itself (latencies, durations).
    Instantaneous,
    /// The point value is the running per-processor total (counts).
    Cumulative,
}

/// Explicit kind -> class table. Kinds not listed fall back to `fallback`.
#[derive(Debug, Clone)]
pub struct KindRegistry {
    classes: HashMap<String, KindClass>,
    fallback: KindClass,
}

impl KindRegistry {
    /// Empty table: every kind resolves to `fallback`.
    pub fn empty(fallback: KindClass) -> Self {
        Self {
            classes: HashMap::new(),
            fallback,
        }
    }

    pub fn register(&mut self, name: &str, class: KindClass) -> &mut Self {
        self.classes.insert(name.to_string(), class);
        self
    }

    pub fn with(mut self, name: &str, class: KindClass) -> Self {
        self.register(name, class);
        self
    }

    pub fn classify(&self, kind: &MetricKind) -> KindClass {
        self.classes.get(kind.name()).copied().unwrap_or(self.fallback)
    }
}

impl Default for KindRegistry {
    fn default() -> Self {
        Self::empty(KindClass::Instantaneous)
            .with("ttfb", KindClass::Instantaneous)
            .with("processing", KindClass::Instantaneous)
            .with("tokens", KindClass::Cumulative)
            .with("characters", KindClass::Cumulative)
    }
}

/// Running per-processor totals for one cumulative kind.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct CumulativeCounter {
    pub total: f64,
    pub completion: f64,
    pub prompt: f64,
}

/// Token sub-counter charted next to a processor's total.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TokenComponent {
    Completion,
    Prompt,
}

/// One cell column inside a kind's points. Components live in their own
/// namespace, so no processor name can collide with them.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub(crate) struct CellKey {
    pub(crate) component: Option<TokenComponent>,
    pub(crate) processor: String,
}

impl CellKey {
    pub(crate) fn total(processor: &str) -> Self {
        Self {
            component: None,
            processor: processor.to_string(),
        }
    }

    pub(crate) fn component(processor: &str, component: TokenComponent) -> Self {
        Self {
            component: Some(component),
            processor: processor.to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ReceivedEntry {
    #[serde(flatten)]
    pub entry: MetricEntry,
    pub received_at: Timestamp,
}

/// `kind -> processor -> entries`, oldest first.
pub type AggregatedRawView = BTreeMap<MetricKind, BTreeMap<String, Vec<ReceivedEntry>>>;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TimelinePoint {
    /// Unix milliseconds.
    pub time: i64,
    pub timestamp: String,
    /// Every processor of the kind appears; absent samples are `None`, never zero.
    pub values: BTreeMap<String, Option<f64>>,
    /// Token sub-counters, `component -> processor -> value`, aligned the same way.
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub components: BTreeMap<TokenComponent, BTreeMap<String, Option<f64>>>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TimelineSeries {
    pub kind: MetricKind,
    pub class: KindClass,
    /// Processor names, sorted.
    pub series: Vec<String>,
    pub points: Vec<TimelinePoint>,
}

impl TimelineSeries {
    /// `(time, value)` pairs for one processor, in time order.
    pub fn values_of(&self, series: &str) -> Vec<(i64, Option<f64>)> {
        self.points
            .iter()
            .map(|p| (p.time, p.values.get(series).copied().flatten()))
            .collect()
    }

    pub fn value_at(&self, time: i64, series: &str) -> Option<f64> {
        self.points
            .iter()
            .find(|p| p.time == time)
            .and_then(|p| p.values.get(series).copied().flatten())
    }

    pub fn component_at(&self, time: i64, component: TokenComponent, processor: &str) -> Option<f64> {
        self.points
            .iter()
            .find(|p| p.time == time)
            .and_then(|p| p.components.get(&component))
            .and_then(|by_processor| by_processor.get(processor).copied().flatten())
    }
}

pub type TimelineView = BTreeMap<MetricKind, TimelineSeries>;

/// Incrementally maintained points for one kind.
#[derive(Debug, Clone)]
pub(crate) struct SeriesState {
    pub(crate) class: KindClass,
    pub(crate) points: BTreeMap<i64, BTreeMap<CellKey, f64>>,
}

impl SeriesState {
    pub(crate) fn new(class: KindClass) -> Self {
        Self {
            class,
            points: BTreeMap::new(),
        }
    }

    pub(crate) fn point_mut(&mut self, key: i64) -> &mut BTreeMap<CellKey, f64> {
        self.points.entry(key).or_default()
    }

    /// Drops one cell; a point left without cells goes with it.
    pub(crate) fn remove_cell(&mut self, key: i64, cell: &CellKey) {
        if let Some(point) = self.points.get_mut(&key) {
            point.remove(cell);
            if point.is_empty() {
                self.points.remove(&key);
            }
        }
    }

    /// Aligns every point on the full set of cells seen in the window.
    pub(crate) fn to_series(&self, kind: &MetricKind) -> TimelineSeries {
        let cells: BTreeSet<&CellKey> = self.points.values().flat_map(|p| p.keys()).collect();

        let points = self
            .points
            .iter()
            .map(|(time, values)| {
                let mut point = TimelinePoint {
                    time: *time,
                    timestamp: from_time_key(*time)
                        .map(|at| format_timestamp(&at))
                        .unwrap_or_default(),
                    values: BTreeMap::new(),
                    components: BTreeMap::new(),
                };
                for cell in &cells {
                    let value = values.get(*cell).copied();
                    match cell.component {
                        None => {
                            point.values.insert(cell.processor.clone(), value);
                        }
                        Some(component) => {
                            point
                                .components
                                .entry(component)
                                .or_default()
                                .insert(cell.processor.clone(), value);
                        }
                    }
                }
                point
            })
            .collect();

        TimelineSeries {
            kind: kind.clone(),
            class: self.class,
            series: cells
                .iter()
                .filter(|cell| cell.component.is_none())
                .map(|cell| cell.processor.clone())
                .collect(),
            points,
        }
    }
}
