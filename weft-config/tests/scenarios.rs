// Copyright (c) 2023 Graphcore Ltd. All rights reserved.

//! End-to-end tests driving [`Factory`] against whole JSON topologies,
//! using the fixtures from `weft-components` as the registered module
//! types.

use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

use weft_components::{Sink, Source, Store};
use weft_config::{ConfigError, Factory, TopologyConfig};
use weft_engine::{Engine, SimObject};

/// Registers the `source`/`sink`/`store` fixture types, stashing every
/// concrete [`Sink`] it builds into `sinks` (keyed by instance name) so a
/// test can inspect what arrived without downcasting `dyn SimObject`.
fn register_fixture_types(factory: &mut Factory, sinks: Rc<RefCell<HashMap<String, Rc<RefCell<Sink>>>>>) {
    factory.register_simple_type("source", |engine, name, params| {
        let count = params.get("count").and_then(serde_json::Value::as_u64).unwrap_or(5);
        let generator = Box::new((0..count).map(|i| vec![i as u8]));
        let obj: Rc<RefCell<dyn SimObject>> = Source::new(name, engine.clone(), generator);
        Ok(obj)
    });

    factory.register_simple_type("sink", move |engine, name, _params| {
        let sink = Sink::new(name, engine.clone());
        sinks.borrow_mut().insert(name.to_string(), Rc::clone(&sink));
        let obj: Rc<RefCell<dyn SimObject>> = sink;
        Ok(obj)
    });

    factory.register_simple_type("store", |engine, name, params| {
        let capacity = params
            .get("capacity")
            .and_then(serde_json::Value::as_u64)
            .unwrap_or(4) as usize;
        let obj: Rc<RefCell<dyn SimObject>> = Store::new(name, engine.clone(), capacity);
        Ok(obj)
    });
}

fn all_ok(reports: &[weft_config::ElementReport]) -> bool {
    reports.iter().all(weft_config::ElementReport::is_ok)
}

#[test]
fn wildcard_and_group_resolution_builds_a_deterministic_pipeline() {
    let config: TopologyConfig = serde_json::from_str(
        r#"{
            "groups": { "stores": { "members": ["store0", "store1"] } },
            "modules": {
                "source0": { "type": "source", "params": { "count": 6 } },
                "source1": { "type": "source", "params": { "count": 6 } },
                "store0": { "type": "store", "params": { "capacity": 8 } },
                "store1": { "type": "store", "params": { "capacity": 8 } },
                "sink0": { "type": "sink" },
                "sink1": { "type": "sink" }
            },
            "connections": [
                { "src": "source*.tx", "dst": "group:stores.rx", "latency": 1 },
                { "src": "store0.tx", "dst": "sink0.rx", "latency": 1 },
                { "src": "store1.tx", "dst": "sink1.rx", "latency": 1 }
            ]
        }"#,
    )
    .unwrap();

    let sinks = Rc::new(RefCell::new(HashMap::new()));
    let engine = Engine::new();
    let mut factory = Factory::new(engine);
    register_fixture_types(&mut factory, Rc::clone(&sinks));

    let reports = factory.instantiate_all(&config);
    assert!(all_ok(&reports), "{reports:?}");
    assert!(factory.unconnected_instances().is_empty());

    factory.start_all_ticks();
    factory.run(Some(30));

    let sinks = sinks.borrow();
    assert_eq!(sinks["sink0"].borrow().received_count(), 6);
    assert_eq!(sinks["sink1"].borrow().received_count(), 6);
}

#[test]
fn composite_aliases_resolve_to_their_internal_ports() {
    let config: TopologyConfig = serde_json::from_str(
        r#"{
            "modules": {
                "source0": { "type": "source", "params": { "count": 4 } },
                "cluster0": {
                    "type": "composite",
                    "internal": {
                        "modules": {
                            "store0": { "type": "store", "params": { "capacity": 4 } }
                        },
                        "connections": []
                    },
                    "inputs": { "in": "store0.rx" },
                    "outputs": { "out": "store0.tx" }
                },
                "sink0": { "type": "sink" }
            },
            "connections": [
                { "src": "source0.tx", "dst": "cluster0.in", "latency": 1 },
                { "src": "cluster0.out", "dst": "sink0.rx", "latency": 1 }
            ]
        }"#,
    )
    .unwrap();

    let sinks = Rc::new(RefCell::new(HashMap::new()));
    let engine = Engine::new();
    let mut factory = Factory::new(engine);
    register_fixture_types(&mut factory, Rc::clone(&sinks));

    let reports = factory.instantiate_all(&config);
    assert!(all_ok(&reports), "{reports:?}");

    factory.start_all_ticks();
    factory.run(Some(20));

    assert_eq!(sinks.borrow()["sink0"].borrow().received_count(), 4);
}

#[test]
fn include_expansion_merges_multiple_files_before_instantiation() {
    let dir = tempfile::tempdir().unwrap();
    let sinks_path = dir.path().join("sinks.json");
    let root_path = dir.path().join("root.json");

    std::fs::write(
        &sinks_path,
        r#"{ "modules": { "sink0": { "type": "sink" } } }"#,
    )
    .unwrap();
    std::fs::write(
        &root_path,
        r#"{
            "include": ["sinks.json"],
            "modules": { "source0": { "type": "source", "params": { "count": 3 } } },
            "connections": [ { "src": "source0.tx", "dst": "sink0.rx", "latency": 1 } ]
        }"#,
    )
    .unwrap();

    let config = Factory::load_and_expand_includes(&root_path).unwrap();
    assert!(config.modules.contains_key("sink0"));
    assert!(config.modules.contains_key("source0"));

    let sinks = Rc::new(RefCell::new(HashMap::new()));
    let engine = Engine::new();
    let mut factory = Factory::new(engine);
    register_fixture_types(&mut factory, Rc::clone(&sinks));

    let reports = factory.instantiate_all(&config);
    assert!(all_ok(&reports), "{reports:?}");

    factory.start_all_ticks();
    factory.run(Some(20));

    assert_eq!(sinks.borrow()["sink0"].borrow().received_count(), 3);
}

#[test]
fn an_ambiguous_fan_between_mismatched_endpoint_counts_is_reported() {
    let config: TopologyConfig = serde_json::from_str(
        r#"{
            "modules": {
                "source0": { "type": "source" },
                "source1": { "type": "source" },
                "sink0": { "type": "sink" },
                "sink1": { "type": "sink" },
                "sink2": { "type": "sink" }
            },
            "connections": [
                { "src": "source*.tx", "dst": "sink*.rx" }
            ]
        }"#,
    )
    .unwrap();

    let sinks = Rc::new(RefCell::new(HashMap::new()));
    let engine = Engine::new();
    let mut factory = Factory::new(engine);
    register_fixture_types(&mut factory, sinks);

    let reports = factory.instantiate_all(&config);
    let connection_report = reports
        .iter()
        .find(|r| r.element.ends_with("connections[0]"))
        .unwrap();
    assert!(matches!(
        connection_report.result,
        Err(ConfigError::UnresolvedEndpoint(_))
    ));
}
