use serde_json::{Value, json};
use syncer::context::ReplicationContext;
use syncer::error::ErrorKind;
use syncer::protocol::catalog::{
    ConfiguredCatalog, ConfiguredStream, DestinationSyncMode, SyncMode,
};
use syncer::protocol::message::ProtocolMessage;
use syncer::protocol::state::{GlobalState, StateEnvelope, StateStats};
use syncer::protocol::stream::StreamDescriptor;
use syncer::state::aggregated::TypedState;
use syncer::state::aggregator::StateAggregator;
use syncer::state::injector::MissingStateInjector;
use syncer::state::tracker::CheckpointTracker;
use syncer_telemetry::tracing::init_test_tracing;
use uuid::Uuid;

fn stream(name: &str, cursor: i64) -> StateEnvelope {
    StateEnvelope::stream(StreamDescriptor::new(name), json!({ "cursor": cursor }))
}

fn global() -> StateEnvelope {
    StateEnvelope::global(GlobalState {
        shared_state: Some(json!({"lsn": 1})),
        stream_states: vec![],
    })
}

fn stats() -> StateStats {
    StateStats {
        record_count: Some(100.0),
    }
}

fn aggregator_of(envelopes: Vec<StateEnvelope>) -> StateAggregator {
    let mut aggregator = StateAggregator::new();
    for envelope in envelopes {
        aggregator.ingest(envelope).unwrap();
    }

    aggregator
}

fn stream_entries(aggregator: &StateAggregator) -> Vec<(String, Value)> {
    let TypedState::Stream(states) = aggregator.aggregated().unwrap().unwrap().typed() else {
        panic!("expected a per-stream checkpoint");
    };

    states
        .into_iter()
        .map(|state| {
            let json = serde_json::to_value(&state).unwrap();
            (
                json["stream"]["streamDescriptor"]["name"]
                    .as_str()
                    .unwrap()
                    .to_owned(),
                json["stream"]["streamState"].clone(),
            )
        })
        .collect()
}

fn catalog() -> ConfiguredCatalog {
    ConfiguredCatalog::new(vec![
        ConfiguredStream::new(
            StreamDescriptor::new("users"),
            SyncMode::FullRefresh,
            DestinationSyncMode::Overwrite,
        )
        .with_resumable(false),
        ConfiguredStream::new(
            StreamDescriptor::new("orders"),
            SyncMode::FullRefresh,
            DestinationSyncMode::Overwrite,
        )
        .with_resumable(false),
        ConfiguredStream::new(
            StreamDescriptor::new("logs"),
            SyncMode::Incremental,
            DestinationSyncMode::AppendDedup,
        ),
    ])
}

#[test]
fn repeated_stream_keeps_its_position() {
    init_test_tracing();

    let aggregator = aggregator_of(vec![
        stream("a", 1),
        stream("b", 1),
        stream("c", 1),
        stream("b", 2),
        stream("a", 3),
    ]);

    assert_eq!(
        stream_entries(&aggregator),
        vec![
            ("a".to_owned(), json!({"cursor": 3})),
            ("b".to_owned(), json!({"cursor": 2})),
            ("c".to_owned(), json!({"cursor": 1})),
        ]
    );
}

#[test]
fn incompatible_families_never_mix() {
    init_test_tracing();

    let families = [
        global(),
        stream("a", 1),
        StateEnvelope::legacy(json!({"cursor": 1})),
    ];

    for (i, first) in families.iter().enumerate() {
        for (j, second) in families.iter().enumerate() {
            let mut aggregator = StateAggregator::new();
            aggregator.ingest(first.clone()).unwrap();

            let result = aggregator.ingest(second.clone());
            if i == j {
                assert!(result.is_ok());
            } else {
                assert_eq!(result.unwrap_err().kind(), ErrorKind::StateTypeMismatch);
            }
        }
    }

    let mut aggregator = StateAggregator::new();
    aggregator
        .ingest(StateEnvelope::legacy(json!({"a": 1})))
        .unwrap();
    aggregator
        .ingest(StateEnvelope::untyped(json!({"a": 2})))
        .unwrap();
}

#[test]
fn stats_never_reach_the_aggregated_checkpoint() {
    init_test_tracing();

    let streams = aggregator_of(vec![
        stream("a", 1).with_source_stats(stats()),
        stream("b", 1).with_destination_stats(stats()),
    ]);
    let globals = aggregator_of(vec![
        global()
            .with_source_stats(stats())
            .with_destination_stats(stats()),
    ]);

    for aggregator in [streams, globals] {
        let aggregated = aggregator.aggregated().unwrap().unwrap();
        let serialized = serde_json::to_string(aggregated.as_value()).unwrap();

        assert!(!serialized.contains("sourceStats"));
        assert!(!serialized.contains("destinationStats"));
        assert!(!serialized.contains("recordCount"));
    }
}

#[test]
fn merging_overlapping_aggregators() {
    init_test_tracing();

    let mut a = aggregator_of(vec![stream("x", 1), stream("y", 1)]);
    let b = aggregator_of(vec![stream("y", 2), stream("z", 2)]);

    a.ingest_aggregator(b).unwrap();

    assert_eq!(
        stream_entries(&a),
        vec![
            ("x".to_owned(), json!({"cursor": 1})),
            ("y".to_owned(), json!({"cursor": 2})),
            ("z".to_owned(), json!({"cursor": 2})),
        ]
    );
}

#[test]
fn merging_disjoint_aggregators_in_either_order_yields_the_same_entries() {
    init_test_tracing();

    let build_a = || aggregator_of(vec![stream("x", 1), stream("y", 1)]);
    let build_b = || aggregator_of(vec![stream("z", 1)]);

    let mut ab = build_a();
    ab.ingest_aggregator(build_b()).unwrap();
    let mut ba = build_b();
    ba.ingest_aggregator(build_a()).unwrap();

    let mut ab_entries = stream_entries(&ab);
    let mut ba_entries = stream_entries(&ba);
    ab_entries.sort_by(|l, r| l.0.cmp(&r.0));
    ba_entries.sort_by(|l, r| l.0.cmp(&r.0));
    assert_eq!(ab_entries, ba_entries);
}

#[test]
fn merging_incompatible_aggregators_fails_both_ways() {
    init_test_tracing();

    let mut streams = aggregator_of(vec![stream("a", 1)]);
    let err = streams
        .ingest_aggregator(aggregator_of(vec![global()]))
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::StateTypeMismatch);

    let mut globals = aggregator_of(vec![global()]);
    let err = globals
        .ingest_aggregator(aggregator_of(vec![stream("a", 1)]))
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::StateTypeMismatch);
}

#[test]
fn emptiness() {
    init_test_tracing();

    let mut aggregator = StateAggregator::new();
    assert!(aggregator.is_empty());

    aggregator.ingest_aggregator(StateAggregator::new()).unwrap();
    assert!(aggregator.is_empty());

    aggregator
        .ingest_aggregator(aggregator_of(vec![stream("a", 1)]))
        .unwrap();
    assert!(!aggregator.is_empty());
}

#[test]
fn injects_only_for_unseen_non_resumable_full_refresh_streams() {
    init_test_tracing();

    let mut injector = MissingStateInjector::from_catalog(catalog());
    injector.track_message(&ProtocolMessage::State(stream("users", 1)));
    injector.track_message(&ProtocolMessage::Log("reading orders".to_owned()));

    assert_eq!(
        injector.states_to_inject(),
        vec![StateEnvelope::stream(
            StreamDescriptor::new("orders"),
            json!({})
        )]
    );
}

#[test]
fn global_checkpoint_disables_injection() {
    init_test_tracing();

    let mut injector = MissingStateInjector::from_catalog(catalog());
    injector.track_message(&ProtocolMessage::State(global()));

    assert!(injector.states_to_inject().is_empty());
}

#[test]
fn tracker_produces_the_checkpoint_of_an_attempt() {
    init_test_tracing();

    let context = ReplicationContext::new(Uuid::new_v4(), 7, 0, Uuid::new_v4(), catalog());
    let mut tracker = CheckpointTracker::new(&context);

    let messages = vec![
        ProtocolMessage::Record {
            stream: StreamDescriptor::new("logs"),
            data: json!({"id": 1}),
        },
        ProtocolMessage::State(stream("logs", 1).with_source_stats(stats())),
        ProtocolMessage::State(stream("users", 1)),
        ProtocolMessage::State(stream("logs", 2)),
    ];
    for message in &messages {
        tracker.track(message).unwrap();
    }

    let TypedState::Stream(states) = tracker.finish().unwrap().unwrap().typed() else {
        panic!("expected a per-stream checkpoint");
    };

    assert_eq!(
        states,
        vec![
            stream("logs", 2),
            stream("users", 1),
            StateEnvelope::stream(StreamDescriptor::new("orders"), json!({})),
        ]
    );
}
