use chrono::{Duration, TimeZone, Utc};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde_json::json;

use voxlink::kernel::telemetry::event::EntryDetail;
use voxlink::kernel::telemetry::mock::{generate_mock_metrics, MOCK_PROCESSORS};
use voxlink::kernel::telemetry::{
    KindClass, KindRegistry, MetricKind, MetricsAggregator, TokenComponent, RAW_WINDOW_CAPACITY,
    UNKNOWN_PROCESSOR,
};
use voxlink::kernel::time::{time_key, Timestamp};

fn t0() -> Timestamp {
    Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap()
}

fn at(seconds: i64) -> Timestamp {
    t0() + Duration::seconds(seconds)
}

#[test]
fn test_cumulative_tokens_running_totals() {
    let mut agg = MetricsAggregator::default();

    // 1. Three token samples for p1 at t1 < t2 < t3
    for (i, value) in [10, 5, 7].into_iter().enumerate() {
        agg.ingest_at(&json!({"tokens": [{"processor": "p1", "value": value}]}), at(i as i64));
    }

    // 2. Timeline carries running totals, not deltas
    let series = agg.series(&MetricKind::Tokens).expect("tokens series");
    assert_eq!(series.class, KindClass::Cumulative);
    assert_eq!(
        series.values_of("p1"),
        vec![
            (time_key(&at(0)), Some(10.0)),
            (time_key(&at(1)), Some(15.0)),
            (time_key(&at(2)), Some(22.0)),
        ]
    );
    assert_eq!(agg.counter(&MetricKind::Tokens, "p1").unwrap().total, 22.0);
}

#[test]
fn test_token_components_tracked_independently() {
    let mut agg = MetricsAggregator::default();
    agg.ingest_at(
        &json!({"tokens": [{"processor": "llm", "completion_tokens": 12, "prompt_tokens": 30, "total_tokens": 42}]}),
        at(0),
    );
    agg.ingest_at(
        &json!({"tokens": [{"processor": "llm", "value": {"completion_tokens": 3, "prompt_tokens": 5}}]}),
        at(1),
    );

    let series = agg.series(&MetricKind::Tokens).unwrap();
    let t1 = time_key(&at(1));
    assert_eq!(series.value_at(t1, "llm"), Some(50.0), "nested total falls back to completion + prompt");
    assert_eq!(series.component_at(t1, TokenComponent::Completion, "llm"), Some(15.0));
    assert_eq!(series.component_at(t1, TokenComponent::Prompt, "llm"), Some(35.0));
}

#[test]
fn test_token_components_never_collide_with_processor_names() {
    let mut agg = MetricsAggregator::default();
    agg.ingest_at(
        &json!({"tokens": [
            {"processor": "llm", "completion_tokens": 4, "prompt_tokens": 6, "total_tokens": 10},
            {"processor": "llm_completion", "value": 100}
        ]}),
        at(0),
    );

    let series = agg.series(&MetricKind::Tokens).unwrap();
    let t = time_key(&at(0));
    assert_eq!(series.series, vec!["llm".to_string(), "llm_completion".to_string()]);
    assert_eq!(series.value_at(t, "llm_completion"), Some(100.0), "real processor keeps its own total");
    assert_eq!(series.component_at(t, TokenComponent::Completion, "llm"), Some(4.0));
    assert_eq!(series.component_at(t, TokenComponent::Completion, "llm_completion"), Some(0.0));
}

#[test]
fn test_instantaneous_absent_processor_is_null_not_zero() {
    let mut agg = MetricsAggregator::default();
    agg.ingest_at(&json!({"ttfb": [{"processor": "stt", "value": 0.12}]}), at(0));
    agg.ingest_at(&json!({"ttfb": [{"processor": "llm", "value": 0.48}]}), at(3));

    let series = agg.series(&MetricKind::Ttfb).unwrap();
    assert_eq!(series.class, KindClass::Instantaneous);
    assert_eq!(series.series, vec!["llm".to_string(), "stt".to_string()]);

    let first = &series.points[0];
    assert_eq!(first.values.get("stt"), Some(&Some(0.12)));
    assert_eq!(first.values.get("llm"), Some(&None), "absent processor must be null");

    let second = &series.points[1];
    assert_eq!(second.values.get("stt"), Some(&None));
    assert_eq!(second.values.get("llm"), Some(&Some(0.48)));
}

#[test]
fn test_entry_without_value_sets_no_point_value() {
    let mut agg = MetricsAggregator::default();
    agg.ingest_at(
        &json!({"processing": [{"processor": "tts", "value": "fast"}, {"processor": "llm", "value": 0.9}]}),
        at(0),
    );
    let series = agg.series(&MetricKind::Processing).unwrap();
    assert_eq!(series.value_at(time_key(&at(0)), "tts"), None);
    assert_eq!(series.value_at(time_key(&at(0)), "llm"), Some(0.9));
    // The raw view still keeps the malformed sample.
    assert_eq!(agg.raw_view()[&MetricKind::Processing]["tts"].len(), 1);
}

#[test]
fn test_same_time_events_merge_into_one_point() {
    let mut agg = MetricsAggregator::default();
    agg.ingest_at(&json!({"ttfb": [{"processor": "stt", "value": 0.1}]}), at(0));
    agg.ingest_at(&json!({"ttfb": [{"processor": "llm", "value": 0.2}]}), at(0));

    let series = agg.series(&MetricKind::Ttfb).unwrap();
    assert_eq!(series.points.len(), 1, "identical time keys collapse");
    assert_eq!(series.points[0].values.get("stt"), Some(&Some(0.1)));
    assert_eq!(series.points[0].values.get("llm"), Some(&Some(0.2)));
    assert_eq!(agg.window_len(), 2, "the raw window still holds both events");
}

#[test]
fn test_malformed_processors_share_unknown_bucket() {
    let mut agg = MetricsAggregator::default();
    agg.ingest_at(&json!({"characters": [{"processor": 7, "value": 40}]}), at(0));
    agg.ingest_at(&json!({"characters": [{"value": 10}]}), at(1));
    agg.ingest_at(&json!({"characters": [{"processor": "   ", "value": 5}]}), at(2));

    let raw = agg.raw_view();
    assert_eq!(raw[&MetricKind::Characters][UNKNOWN_PROCESSOR].len(), 3);

    let series = agg.series(&MetricKind::Characters).unwrap();
    assert_eq!(
        series.values_of(UNKNOWN_PROCESSOR).into_iter().map(|(_, v)| v).collect::<Vec<_>>(),
        vec![Some(40.0), Some(50.0), Some(55.0)]
    );
}

#[test]
fn test_processor_names_are_trimmed() {
    let mut agg = MetricsAggregator::default();
    agg.ingest_at(&json!({"ttfb": [{"processor": "  llm ", "value": 0.3}]}), at(0));
    assert!(agg.raw_view()[&MetricKind::Ttfb].contains_key("llm"));
}

#[test]
fn test_non_list_kind_values_are_skipped() {
    let mut agg = MetricsAggregator::default();
    agg.ingest_at(
        &json!({
            "ttfb": {"processor": "llm", "value": 0.2},
            "processing": "oops",
            "tokens": [{"processor": "llm", "value": 3}]
        }),
        at(0),
    );

    let raw = agg.raw_view();
    assert!(!raw.contains_key(&MetricKind::Ttfb));
    assert!(!raw.contains_key(&MetricKind::Processing));
    assert_eq!(raw[&MetricKind::Tokens]["llm"].len(), 1);

    // A bag that is not an object is accepted as an empty event.
    agg.ingest_at(&json!(["not", "a", "bag"]), at(1));
    assert_eq!(agg.window_len(), 2);
}

#[test]
fn test_raw_window_is_bounded_fifo() {
    let mut agg = MetricsAggregator::default();

    // 1. Overfill by 50 events, one per second
    for i in 0..(RAW_WINDOW_CAPACITY as i64 + 50) {
        agg.ingest_at(&json!({"ttfb": [{"processor": "llm", "value": i as f64}]}), at(i));
    }

    // 2. Only the newest 200 remain, oldest first
    assert_eq!(agg.window_len(), RAW_WINDOW_CAPACITY);
    let first = agg.events().next().unwrap();
    assert_eq!(first.received_at, at(50), "events 0..50 were evicted first");

    let raw = agg.raw_view();
    let entries = &raw[&MetricKind::Ttfb]["llm"];
    assert_eq!(entries.len(), RAW_WINDOW_CAPACITY);
    assert_eq!(entries[0].entry.value, Some(50.0));

    // 3. Timeline points follow the window
    let series = agg.series(&MetricKind::Ttfb).unwrap();
    assert_eq!(series.points.len(), RAW_WINDOW_CAPACITY);
    assert_eq!(series.points[0].time, time_key(&at(50)));
}

#[test]
fn test_evicted_sample_leaves_shared_point() {
    let mut agg = MetricsAggregator::with_capacity(KindRegistry::default(), 2);
    let t = time_key(&at(0));

    // 1. Three events in the same millisecond, window of two
    agg.ingest_at(&json!({"ttfb": [{"processor": "a", "value": 1.0}]}), at(0));
    agg.ingest_at(&json!({"ttfb": [{"processor": "b", "value": 2.0}]}), at(0));
    agg.ingest_at(&json!({"processing": [{"processor": "c", "value": 3.0}]}), at(0));

    // 2. Only retained events show on the timeline
    assert_eq!(agg.window_len(), 2);
    let ttfb = agg.series(&MetricKind::Ttfb).unwrap();
    assert_eq!(ttfb.series, vec!["b".to_string()], "evicted processor is gone");
    assert_eq!(ttfb.value_at(t, "a"), None);
    assert_eq!(ttfb.value_at(t, "b"), Some(2.0));
    assert_eq!(agg.series(&MetricKind::Processing).unwrap().value_at(t, "c"), Some(3.0));

    // 3. The timeline equals one rebuilt from the retained window alone
    let mut rebuilt = MetricsAggregator::default();
    rebuilt.ingest_at(&json!({"ttfb": [{"processor": "b", "value": 2.0}]}), at(0));
    rebuilt.ingest_at(&json!({"processing": [{"processor": "c", "value": 3.0}]}), at(0));
    assert_eq!(agg.timeline_view(), rebuilt.timeline_view());
}

#[test]
fn test_overwritten_sample_survives_eviction_of_first_writer() {
    let mut agg = MetricsAggregator::with_capacity(KindRegistry::default(), 2);
    let t = time_key(&at(0));
    agg.ingest_at(&json!({"ttfb": [{"processor": "a", "value": 1.0}]}), at(0));
    agg.ingest_at(&json!({"ttfb": [{"processor": "a", "value": 5.0}]}), at(0));
    agg.ingest_at(&json!({"ttfb": [{"processor": "b", "value": 2.0}]}), at(0));

    let ttfb = agg.series(&MetricKind::Ttfb).unwrap();
    assert_eq!(ttfb.value_at(t, "a"), Some(5.0), "the retained writer still owns the cell");
    assert_eq!(ttfb.value_at(t, "b"), Some(2.0));
}

#[test]
fn test_counters_survive_window_eviction() {
    let mut agg = MetricsAggregator::with_capacity(KindRegistry::default(), 3);
    for i in 0..5 {
        agg.ingest_at(&json!({"tokens": [{"processor": "llm", "value": 1}]}), at(i));
    }
    let series = agg.series(&MetricKind::Tokens).unwrap();
    assert_eq!(series.points.len(), 3);
    assert_eq!(series.values_of("llm").last().unwrap().1, Some(5.0));
}

#[test]
fn test_cumulative_series_never_decrease() {
    let mut rng = StdRng::seed_from_u64(42);
    let mut agg = MetricsAggregator::default();
    let processors = ["a", "b", "c", "d"];

    for i in 0..500 {
        let processor = processors[rng.gen_range(0..processors.len())];
        // Includes negative and zero samples.
        let value: f64 = rng.gen_range(-20.0..50.0);
        let seconds = i / rng.gen_range(1..3);
        agg.ingest_at(
            &json!({"characters": [{"processor": processor, "value": value}], "tokens": [{"processor": processor, "value": value}]}),
            at(seconds),
        );
    }

    for kind in [MetricKind::Characters, MetricKind::Tokens] {
        let series = agg.series(&kind).unwrap();
        for name in &series.series {
            let values: Vec<f64> = series.values_of(name).into_iter().filter_map(|(_, v)| v).collect();
            assert!(
                values.windows(2).all(|w| w[0] <= w[1]),
                "{kind} series {name} decreased: {values:?}"
            );
        }
    }
}

#[test]
fn test_backwards_clock_merges_into_newest_point() {
    let mut agg = MetricsAggregator::default();
    agg.ingest_at(&json!({"tokens": [{"processor": "p1", "value": 10}]}), at(10));
    agg.ingest_at(&json!({"tokens": [{"processor": "p1", "value": 4}]}), at(5));

    let series = agg.series(&MetricKind::Tokens).unwrap();
    assert_eq!(series.points.len(), 1, "late stamp merges into the newest point");
    assert_eq!(series.values_of("p1"), vec![(time_key(&at(10)), Some(14.0))]);
}

#[test]
fn test_unknown_kind_is_opaque_and_instantaneous() {
    let mut agg = MetricsAggregator::default();
    agg.ingest_at(
        &json!({"vad_latency": [{"processor": "vad", "value": 0.05, "frames": 3}]}),
        at(0),
    );

    let kind = MetricKind::from_name("vad_latency");
    let raw = agg.raw_view();
    let entry = &raw[&kind]["vad"][0].entry;
    match &entry.detail {
        EntryDetail::Opaque(fields) => assert_eq!(fields.get("frames"), Some(&json!(3))),
        other => panic!("expected opaque detail, got {other:?}"),
    }

    let series = agg.series(&kind).unwrap();
    assert_eq!(series.class, KindClass::Instantaneous);
    assert_eq!(series.value_at(time_key(&at(0)), "vad"), Some(0.05));
}

#[test]
fn test_registered_kind_becomes_cumulative() {
    let registry = KindRegistry::default().with("audio_seconds", KindClass::Cumulative);
    let mut agg = MetricsAggregator::new(registry);
    agg.ingest_at(&json!({"audio_seconds": [{"processor": "tts", "value": 1.5}]}), at(0));
    agg.ingest_at(&json!({"audio_seconds": [{"processor": "tts", "value": 2.0}]}), at(1));

    let series = agg.series(&MetricKind::from_name("audio_seconds")).unwrap();
    assert_eq!(series.class, KindClass::Cumulative);
    assert_eq!(series.value_at(time_key(&at(1)), "tts"), Some(3.5));
}

#[test]
fn test_reset_clears_views_and_counters() {
    let mut agg = MetricsAggregator::default();
    agg.ingest_at(&json!({"tokens": [{"processor": "p1", "value": 10}]}), at(0));
    agg.reset();

    assert_eq!(agg.window_len(), 0);
    assert!(agg.raw_view().is_empty());
    assert!(agg.timeline_view().is_empty());
    assert!(agg.counter(&MetricKind::Tokens, "p1").is_none());

    // Counting restarts from zero.
    agg.ingest_at(&json!({"tokens": [{"processor": "p1", "value": 3}]}), at(1));
    assert_eq!(agg.series(&MetricKind::Tokens).unwrap().value_at(time_key(&at(1)), "p1"), Some(3.0));
}

#[test]
fn test_mock_generator_feeds_every_known_kind() {
    let mut rng = StdRng::seed_from_u64(7);
    let events = generate_mock_metrics(&mut rng, t0(), 60);
    assert!(!events.is_empty());
    assert!(events.windows(2).all(|w| w[0].0 < w[1].0), "timestamps strictly increase");

    let mut agg = MetricsAggregator::default();
    for (received_at, bag) in &events {
        agg.ingest_at(bag, *received_at);
    }

    let raw = agg.raw_view();
    for kind in [MetricKind::Ttfb, MetricKind::Processing, MetricKind::Tokens, MetricKind::Characters] {
        let by_processor = raw.get(&kind).unwrap_or_else(|| panic!("no {kind} samples"));
        assert!(by_processor.keys().all(|p| MOCK_PROCESSORS.contains(&p.as_str())));
    }
}
