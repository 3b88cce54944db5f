//! Streaming telemetry aggregation.
//!
//! # BOUNDEDNESS INVARIANT
//! At most `RAW_WINDOW_CAPACITY` raw events are retained. The raw view and the
//! timeline only describe retained events, so nothing grows with session length
//! except the per-processor cumulative counters.
//!
//! # CHARTING INVARIANT
//! Cumulative series never decrease. Instantaneous series report `None` for a
//! processor with no sample at a point, never a fabricated zero.
//!
//! Telemetry is best-effort: malformed payloads are normalized or skipped,
//! never escalated to the session.

pub mod event;
pub mod metrics;
pub mod mock;
pub mod recorder;

pub use event::{MetricEntry, MetricKind, RawMetricEvent, UNKNOWN_PROCESSOR};
pub use metrics::{
    AggregatedRawView, KindClass, KindRegistry, TimelineSeries, TimelineView, TokenComponent,
};
pub use recorder::{MetricsAggregator, RAW_WINDOW_CAPACITY};
