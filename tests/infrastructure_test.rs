//! Test to verify test infrastructure works correctly

mod common;

use common::builders::ModelBuilder;
use common::mock_helpers::{test_registry, BROKEN_READER_ID, COUNTING_WRITER_ID, FLAKY_EFFECT_ID};
use kaliscope_rs::pipeline::nodes::TEST_PATTERN_ID;
use kaliscope_rs::pipeline::PluginHost;

#[test]
fn test_infrastructure_setup() {
    let model = ModelBuilder::new()
        .test_pattern(2, 8)
        .plugin(COUNTING_WRITER_ID)
        .build();

    assert_eq!(model.len(), 2);
    assert_eq!(model.identifiers(), vec![TEST_PATTERN_ID, COUNTING_WRITER_ID]);
}

#[test]
fn test_registry_has_test_plugins() {
    let (registry, log) = test_registry();
    for id in [COUNTING_WRITER_ID, FLAKY_EFFECT_ID, BROKEN_READER_ID, TEST_PATTERN_ID] {
        assert!(registry.resolve_plugin(id).is_ok(), "{} should resolve", id);
    }
    assert!(log.lock().unwrap().is_empty());
}

#[test]
fn test_counting_writer_records_frames() {
    let (registry, log) = test_registry();
    let model = ModelBuilder::new()
        .test_pattern(3, 8)
        .plugin(COUNTING_WRITER_ID)
        .build();
    let graph = common::builders::build_graph(registry, &model);

    graph.open().unwrap();
    graph.compute_frame(0).unwrap();
    graph.compute_frame(1).unwrap();
    assert_eq!(*log.lock().unwrap(), vec![0, 1]);
}
