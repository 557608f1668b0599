// tests/persistence_contract.rs

//! Behaviour every persistence engine must share, run against the in-memory
//! and the filesystem engine alike.

use datadag::data::{Dataset, Payload};
use datadag::errors::DatadagError;
use datadag::identity::{DatasetMetadata, MetadataBuilder, ParamValue, Params, TimeLevel};
use datadag::persistence::PersistenceEngine;
use datadag::time::TimeRange;
use datadag_test_utils::{DatasetBuilder, day, daily_range, init_tracing};
use serde_json::json;

fn series(engine: &dyn PersistenceEngine, name: &str) -> MetadataBuilder {
    MetadataBuilder::new(name)
        .time_level(Some(TimeLevel::Name("daily".to_string())))
        .engine(engine.state())
}

fn static_meta(engine: &dyn PersistenceEngine, name: &str) -> DatasetMetadata {
    MetadataBuilder::new(name)
        .is_static(true)
        .engine(engine.state())
        .build()
        .expect("metadata")
}

fn stored_frame(engine: &dyn PersistenceEngine, m: &DatasetMetadata) -> datadag::data::Frame {
    engine
        .read(m, None)
        .expect("read")
        .and_then(Payload::into_frame)
        .expect("stored frame")
}

fn leaf1_append_keeps_history_and_adds_new_days(engine: &dyn PersistenceEngine) {
    let meta = series(engine, "leaf1").build().expect("metadata");
    let original = DatasetBuilder::new(meta.clone())
        .rows(1..=10, 1.0)
        .declared(1, 11)
        .build();
    let update = DatasetBuilder::new(meta.clone())
        .rows(1..=12, 2.0)
        .declared(1, 13)
        .build();

    assert!(!engine.idempotent_insert(&original).expect("insert"));
    engine.append(&update).expect("append");

    let frame = stored_frame(engine, &meta);
    assert_eq!(frame.len(), 12);
    for d in 1..=10 {
        assert_eq!(frame.get(&day(d), "value"), Some(1.0), "day {d}");
    }
    for d in 11..=12 {
        assert_eq!(frame.get(&day(d), "value"), Some(2.0), "day {d}");
    }
    assert_eq!(
        engine.get_declared_time_range(&meta).expect("declared"),
        Some(daily_range(1, 13))
    );
    let data_range = engine
        .get_data_time_range(&meta)
        .expect("data range")
        .expect("some data");
    assert_eq!(data_range.start(), day(1));
    assert!(data_range.contains_point(&day(12)));
}

fn appending_the_same_dataset_twice_is_idempotent(engine: &dyn PersistenceEngine) {
    let meta = series(engine, "twice").build().expect("metadata");
    let base = DatasetBuilder::new(meta.clone())
        .rows(1..=5, 1.0)
        .declared(1, 6)
        .build();
    let more = DatasetBuilder::new(meta.clone())
        .rows(3..=8, 3.0)
        .declared(3, 9)
        .build();
    engine.replace(&base).expect("replace");

    engine.append(&more).expect("first append");
    let once = engine.get_dataset(&meta, None).expect("get").expect("stored");
    engine.append(&more).expect("second append");
    let twice = engine.get_dataset(&meta, None).expect("get").expect("stored");

    assert_eq!(once.data(), twice.data());
    assert_eq!(once.declared_time_range(), twice.declared_time_range());
    assert_eq!(twice.declared_time_range(), Some(daily_range(1, 9)));
}

fn merge_keeps_existing_cells_and_unions_coverage(engine: &dyn PersistenceEngine) {
    let meta = series(engine, "merged").build().expect("metadata");
    let existing = DatasetBuilder::new(meta.clone())
        .rows(1..=5, 1.0)
        .declared(1, 6)
        .build();
    let incoming = DatasetBuilder::new(meta.clone())
        .rows(4..=10, 2.0)
        .declared(4, 11)
        .build();
    engine.replace(&existing).expect("replace");
    engine.merge(&incoming).expect("merge");

    let frame = stored_frame(engine, &meta);
    assert_eq!(frame.len(), 10);
    assert_eq!(frame.get(&day(5), "value"), Some(1.0));
    assert_eq!(frame.get(&day(6), "value"), Some(2.0));
    assert_eq!(
        engine.get_declared_time_range(&meta).expect("declared"),
        Some(daily_range(1, 11))
    );
}

fn merge_of_disjoint_coverage_is_rejected(engine: &dyn PersistenceEngine) {
    let meta = series(engine, "gappy").build().expect("metadata");
    engine
        .replace(
            &DatasetBuilder::new(meta.clone())
                .rows(1..=2, 1.0)
                .declared(1, 3)
                .build(),
        )
        .expect("replace");
    let err = engine
        .merge(
            &DatasetBuilder::new(meta.clone())
                .rows(7..=8, 1.0)
                .declared(7, 9)
                .build(),
        )
        .unwrap_err();
    assert!(matches!(err, DatadagError::InvalidDeclaration(_)));
}

fn static_datasets_replace_and_refuse_time_operations(engine: &dyn PersistenceEngine) {
    let meta = static_meta(engine, "config_blob");
    let first = Dataset::static_value(meta.clone(), json!({"alpha": 1})).expect("dataset");
    let second = Dataset::static_value(meta.clone(), json!({"alpha": 2})).expect("dataset");

    assert!(!engine.exists(&meta).expect("exists"));
    assert!(!engine.replace(&first).expect("replace"));
    assert!(engine.exists(&meta).expect("exists"));
    assert!(engine.idempotent_insert(&second).expect("insert"));
    assert_eq!(
        engine.read(&meta, None).expect("read"),
        Some(Payload::Value(json!({"alpha": 1})))
    );
    assert!(engine.replace(&second).expect("replace"));
    assert_eq!(
        engine.read(&meta, None).expect("read"),
        Some(Payload::Value(json!({"alpha": 2})))
    );

    assert!(matches!(
        engine.get_data_time_range(&meta),
        Err(DatadagError::UnsupportedOperation(_))
    ));
    assert!(matches!(
        engine.get_declared_time_range(&meta),
        Err(DatadagError::UnsupportedOperation(_))
    ));
    assert!(matches!(
        engine.append(&second),
        Err(DatadagError::UnsupportedOperation(_))
    ));
    assert!(matches!(
        engine.merge(&second),
        Err(DatadagError::UnsupportedOperation(_))
    ));
    assert!(matches!(
        engine.get_dataset(&meta, Some(&daily_range(1, 2))),
        Err(DatadagError::UnsupportedOperation(_))
    ));
}

fn reading_a_window_restricts_rows_and_coverage(engine: &dyn PersistenceEngine) {
    let meta = series(engine, "windowed").build().expect("metadata");
    engine
        .replace(
            &DatasetBuilder::new(meta.clone())
                .rows(1..=10, 1.0)
                .declared(1, 11)
                .build(),
        )
        .expect("replace");

    let window = daily_range(5, 20);
    let ds = engine
        .get_dataset(&meta, Some(&window))
        .expect("get")
        .expect("stored");
    assert_eq!(ds.frame().map(|f| f.len()), Some(6));
    assert_eq!(ds.declared_time_range(), Some(daily_range(5, 11)));

    let disjoint = TimeRange::new(day(25), day(28)).expect("range");
    assert!(matches!(
        engine.get_dataset(&meta, Some(&disjoint)),
        Err(DatadagError::NonOverlappingRequest { .. })
    ));
}

fn delete_refuses_successors_unless_recursive(engine: &dyn PersistenceEngine) {
    let parent = series(engine, "parent").build().expect("metadata");
    let child = MetadataBuilder::new("child")
        .is_static(true)
        .engine(engine.state())
        .predecessor("up", parent.clone())
        .build()
        .expect("metadata");
    engine
        .replace(
            &DatasetBuilder::new(parent.clone())
                .rows(1..=3, 1.0)
                .declared(1, 4)
                .build(),
        )
        .expect("replace parent");
    engine
        .replace(&Dataset::static_value(child.clone(), json!("derived")).expect("dataset"))
        .expect("replace child");

    let successors = engine.find_successors(&parent).expect("successors");
    assert_eq!(successors.len(), 1);
    assert_eq!(successors[0].hash(), child.hash());

    match engine.delete(&parent, false) {
        Err(DatadagError::HasSuccessors { name, successors }) => {
            assert_eq!(name, "parent");
            assert_eq!(successors, 1);
        }
        other => panic!("expected HasSuccessors, got {other:?}"),
    }
    assert!(engine.exists(&parent).expect("exists"));

    assert!(engine.delete(&parent, true).expect("recursive delete"));
    assert!(!engine.exists(&parent).expect("exists"));
    assert!(!engine.exists(&child).expect("exists"));
    assert!(!engine.delete(&parent, false).expect("second delete"));
}

fn scan_filters_on_predecessor_parameters(engine: &dyn PersistenceEngine) {
    let mut signals = Vec::new();
    for source in ["a", "b"] {
        let upstream = series(engine, "prices")
            .param("source", source)
            .build()
            .expect("metadata");
        engine
            .replace(
                &DatasetBuilder::new(upstream.clone())
                    .rows(1..=2, 1.0)
                    .declared(1, 3)
                    .build(),
            )
            .expect("replace upstream");
        let signal = series(engine, "signal")
            .param("window", 5)
            .predecessor("upstream", upstream)
            .build()
            .expect("metadata");
        engine
            .replace(
                &DatasetBuilder::new(signal.clone())
                    .rows(1..=2, 0.5)
                    .declared(1, 3)
                    .build(),
            )
            .expect("replace signal");
        signals.push(signal);
    }

    let by_source: Params = [("upstream.source".to_string(), ParamValue::from("a"))].into();
    let hits = engine.scan("signal", &by_source).expect("scan");
    assert_eq!(hits.len(), 1);
    assert_eq!(hits[0].hash(), signals[0].hash());

    let by_window: Params = [("window".to_string(), ParamValue::from(5))].into();
    assert_eq!(engine.scan("signal", &by_window).expect("scan").len(), 2);

    let by_version: Params = [("version".to_string(), ParamValue::from("no_version"))].into();
    assert_eq!(engine.scan("signal", &by_version).expect("scan").len(), 2);

    let missing: Params = [("upstream.nope".to_string(), ParamValue::from(1))].into();
    assert!(engine.scan("signal", &missing).expect("scan").is_empty());

    assert_eq!(engine.scan("prices", &Params::new()).expect("scan").len(), 2);
}

fn find_lists_sorted_unique_names_matching_from_the_start(engine: &dyn PersistenceEngine) {
    for (name, version) in [
        ("beta", "v1"),
        ("alpha", "v1"),
        ("alpha", "v2"),
        ("alphabet", "v2"),
    ] {
        let meta = MetadataBuilder::new(name)
            .is_static(true)
            .version(version)
            .engine(engine.state())
            .build()
            .expect("metadata");
        engine
            .replace(&Dataset::static_value(meta, json!(null)).expect("dataset"))
            .expect("replace");
    }

    assert_eq!(
        engine.find("alp", None).expect("find"),
        vec!["alpha".to_string(), "alphabet".to_string()]
    );
    assert_eq!(engine.find("bet", None).expect("find"), vec!["beta".to_string()]);
    assert_eq!(
        engine.find(".*", Some("v1")).expect("find"),
        vec!["alpha".to_string(), "beta".to_string()]
    );
    assert!(engine.find("gamma", None).expect("find").is_empty());
}

fn hash_lookups_resolve_stored_identities(engine: &dyn PersistenceEngine) {
    let upstream = series(engine, "raw").build().expect("metadata");
    let derived = series(engine, "derived")
        .version("v3")
        .predecessor("input", upstream.clone())
        .build()
        .expect("metadata");
    for meta in [&upstream, &derived] {
        engine
            .replace(
                &DatasetBuilder::new(meta.clone())
                    .rows(1..=2, 1.0)
                    .declared(1, 3)
                    .build(),
            )
            .expect("replace");
    }

    let found = engine
        .metadata_from_hash("derived", "v3", derived.hash())
        .expect("lookup");
    assert_eq!(found.hash(), derived.hash());
    assert_eq!(found.version(), "v3");

    let preds = engine
        .predecessors_from_hash("derived", "v3", derived.hash())
        .expect("predecessors");
    assert_eq!(preds.get("input").map(DatasetMetadata::hash), Some(upstream.hash()));

    assert!(matches!(
        engine.metadata_from_hash("derived", "v4", derived.hash()),
        Err(DatadagError::NoMatchingDataset(_))
    ));
    assert!(matches!(
        engine.predecessors_from_hash("derived", "v3", 7),
        Err(DatadagError::NoMatchingDataset(_))
    ));
}

fn hash_ignores_time_coverage(engine: &dyn PersistenceEngine) {
    let a = series(engine, "same").param("k", 1).build().expect("metadata");
    let b = series(engine, "same").param("k", 1).build().expect("metadata");
    let short = DatasetBuilder::new(a).rows(1..=2, 1.0).declared(1, 3).build();
    let long = DatasetBuilder::new(b).rows(1..=5, 1.0).declared(1, 9).build();
    assert_eq!(short.metadata().hash(), long.metadata().hash());

    engine.replace(&short).expect("replace");
    assert!(engine.exists(long.metadata()).expect("exists"));
}

macro_rules! engine_contract {
    ($($case:ident),* $(,)?) => {
        mod memory {
            use datadag::persistence::memory::MemoryEngine;

            $(
                #[test]
                fn $case() {
                    datadag_test_utils::init_tracing();
                    super::$case(&MemoryEngine::new());
                }
            )*
        }

        mod filesystem {
            use datadag::persistence::filesystem::FileSystemEngine;

            $(
                #[test]
                fn $case() {
                    datadag_test_utils::init_tracing();
                    let dir = tempfile::tempdir().expect("tempdir");
                    super::$case(&FileSystemEngine::new(dir.path()));
                }
            )*
        }
    };
}

engine_contract!(
    leaf1_append_keeps_history_and_adds_new_days,
    appending_the_same_dataset_twice_is_idempotent,
    merge_keeps_existing_cells_and_unions_coverage,
    merge_of_disjoint_coverage_is_rejected,
    static_datasets_replace_and_refuse_time_operations,
    reading_a_window_restricts_rows_and_coverage,
    delete_refuses_successors_unless_recursive,
    scan_filters_on_predecessor_parameters,
    find_lists_sorted_unique_names_matching_from_the_start,
    hash_lookups_resolve_stored_identities,
    hash_ignores_time_coverage,
);

#[test]
fn filesystem_records_survive_a_fresh_engine() {
    init_tracing();
    let dir = tempfile::tempdir().expect("tempdir");
    let first = datadag::persistence::FileSystemEngine::new(dir.path());
    let meta = series(&first, "durable").build().expect("metadata");
    first
        .replace(
            &DatasetBuilder::new(meta.clone())
                .rows(1..=3, 4.0)
                .declared(1, 4)
                .build(),
        )
        .expect("replace");

    let reopened = datadag::persistence::FileSystemEngine::new(dir.path());
    let frame = stored_frame(&reopened, &meta);
    assert_eq!(frame.get(&day(2), "value"), Some(4.0));
    assert_eq!(reopened.find("dur", None).expect("find"), vec!["durable".to_string()]);
}
