use chrono::{Duration, Utc};
use peervault::model::{CollectionKind, NodeInfo, PeerInfo, TransferDirection, TransferRecord};
use peervault::store::MemBackend;
use peervault::test_utils::TestEnv;
use peervault::{EntityStore, ExportBundle, FileInfo, LoadOutcome, VaultConfig};
use serde_json::{json, Value};
use std::collections::HashMap;
use std::fs;
use tracing_subscriber::EnvFilter;

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

#[test]
fn test_records_survive_restart() {
    let env = TestEnv::new();
    {
        let store = env.entity_store();
        store.save_node_info("n1", NodeInfo::named("relay").with_address("10.0.0.2", 4001));
        store.save_file_info("f1", FileInfo::new("movie.mkv").with_size(1 << 30));
        store.set_config("lastRoute", json!({"hops": 3}));
        assert!(store.shutdown().is_clean());
    }

    let store = env.entity_store();
    assert!(store.load_outcome(CollectionKind::Nodes).is_loaded());
    let node = store.get_node_info("n1").unwrap();
    assert_eq!(node.port(), Some(4001));
    assert_eq!(store.get_file_info("f1").unwrap().size(), Some(1 << 30));
    assert_eq!(store.get_config("lastRoute"), Some(json!({"hops": 3})));
}

#[test]
fn test_on_disk_format_is_keyed_camel_case() {
    let env = TestEnv::new();
    let store = env.entity_store();
    store.save_transfer(
        "t1",
        TransferRecord::new("a.iso", TransferDirection::Upload).with_node("n7"),
    );
    store.save().into_result().unwrap();

    let raw = fs::read_to_string(env.root.join("transfers.json")).unwrap();
    let stored: Value = serde_json::from_str(&raw).unwrap();
    assert_eq!(stored["t1"]["fileName"], "a.iso");
    assert_eq!(stored["t1"]["nodeId"], "n7");
    assert_eq!(stored["t1"]["direction"], "upload");
    assert!(stored["t1"]["recordedAt"].is_string());
}

#[test]
fn test_legacy_pair_array_loads() {
    let env = TestEnv::new();
    fs::write(
        env.root.join("peers.json"),
        r#"[["p1", {"nodeId": "n1", "lastSeen": "2026-01-01T00:00:00Z"}]]"#,
    )
    .unwrap();

    let store = env.entity_store();
    let peer = store.get_peer_info("p1").unwrap();
    assert_eq!(peer.node_id(), Some("n1"));
}

#[test]
fn test_corrupt_collection_starts_empty() {
    init_tracing();
    let env = TestEnv::new();
    fs::write(env.root.join("nodes.json"), "{{{{").unwrap();
    fs::write(env.root.join("files.json"), r#"{"f1": {"name": "ok.txt"}}"#).unwrap();

    let store = env.entity_store();
    assert!(matches!(
        store.load_outcome(CollectionKind::Nodes),
        LoadOutcome::Recovered { .. }
    ));
    assert!(store.get_all_nodes().is_empty());
    assert_eq!(store.get_all_files().len(), 1);
}

#[test]
fn test_unrecognised_caller_values_survive_restart() {
    init_tracing();
    let env = TestEnv::new();
    fs::write(
        env.root.join("transfers.json"),
        r#"{"t1": {"fileName": "a.iso", "status": "paused", "direction": "sideways",
                   "recordedAt": "2026-01-01T00:00:00Z"}}"#,
    )
    .unwrap();
    fs::write(
        env.root.join("nodes.json"),
        r#"{"n1": {"name": "relay", "port": "4001"}, "n2": "legacy-string-record"}"#,
    )
    .unwrap();

    {
        let store = env.entity_store();
        let transfer = store.get_transfer("t1").unwrap();
        assert_eq!(transfer.status(), None);
        assert_eq!(transfer.field("status"), Some(&json!("paused")));
        assert_eq!(store.get_node_info("n1").unwrap().port(), Some(4001));
        assert!(store.get_node_info("n2").is_none());
        assert!(store.shutdown().is_clean());
    }

    let transfers: Value =
        serde_json::from_str(&fs::read_to_string(env.root.join("transfers.json")).unwrap())
            .unwrap();
    assert_eq!(transfers["t1"]["status"], "paused");
    assert_eq!(transfers["t1"]["direction"], "sideways");
    let nodes: Value =
        serde_json::from_str(&fs::read_to_string(env.root.join("nodes.json")).unwrap()).unwrap();
    assert_eq!(nodes["n1"]["port"], "4001");
    assert_eq!(nodes["n2"], "legacy-string-record");

    let reopened = env.entity_store();
    assert_eq!(reopened.get_node_info("n1").unwrap().name(), Some("relay"));
    assert_eq!(reopened.get_transfer("t1").unwrap().file_name(), Some("a.iso"));
}

#[test]
fn test_import_file_with_unknown_status_applies_every_section() {
    let env = TestEnv::new();
    let path = env.root.join("bundle.json");
    fs::write(
        &path,
        r#"{
            "nodes": {"n1": {"name": "relay"}},
            "transfers": {"t1": {"fileName": "b.bin", "status": "in-progress"}}
        }"#,
    )
    .unwrap();

    let store = env.mem_entity_store();
    store.import_from_file(&path).unwrap();

    assert_eq!(store.get_node_info("n1").unwrap().name(), Some("relay"));
    let transfer = store.get_transfer("t1").unwrap();
    assert_eq!(transfer.field("status"), Some(&json!("in-progress")));
}

#[test]
fn test_import_file_rejects_malformed_section_without_applying() {
    let env = TestEnv::new();
    let path = env.root.join("bundle.json");
    fs::write(&path, r#"{"nodes": {"n1": {"name": "new"}}, "peers": "oops"}"#).unwrap();

    let store = env.mem_entity_store();
    store.save_node_info("n0", NodeInfo::named("old"));

    assert!(matches!(
        store.import_from_file(&path),
        Err(peervault::VaultError::InvalidImport(_))
    ));
    assert!(store.get_node_info("n0").is_some());
    assert!(store.get_node_info("n1").is_none());
}

#[test]
fn test_stamping_on_save() {
    let env = TestEnv::new();
    let store = env.mem_entity_store();
    let before = Utc::now();

    store.save_node_info("n1", NodeInfo::named("x"));

    let node = store.get_node_info("n1").unwrap();
    assert_eq!(node.last_seen, node.updated_at);
    assert!(node.last_seen.unwrap() >= before);
}

#[test]
fn test_cleanup_retention_window() {
    let env = TestEnv::new();
    let store = env.mem_entity_store();
    let now = Utc::now();

    let at = |days: i64| Some(now - Duration::days(days));
    store
        .import_data(ExportBundle {
            nodes: Some(HashMap::from([
                ("old".to_string(), NodeInfo { last_seen: at(31), ..Default::default() }),
                ("new".to_string(), NodeInfo { last_seen: at(29), ..Default::default() }),
            ])),
            peers: Some(HashMap::from([(
                "old".to_string(),
                PeerInfo { last_seen: at(45), ..Default::default() },
            )])),
            transfers: Some(HashMap::from([
                ("old".to_string(), TransferRecord { recorded_at: at(31), ..Default::default() }),
                ("edge".to_string(), TransferRecord { recorded_at: at(30), ..Default::default() }),
            ])),
            ..Default::default()
        })
        .unwrap();

    let report = store.cleanup_old_records_at(now);

    assert_eq!((report.nodes, report.peers, report.transfers), (1, 1, 1));
    assert!(store.get_node_info("new").is_some());
    assert!(store.get_transfer("edge").is_some());
    assert!(store.get_all_peers().is_empty());
}

#[test]
fn test_custom_retention() {
    let env = TestEnv::new();
    let config = VaultConfig {
        retention_days: 7,
        ..env.config.clone()
    };
    let store = EntityStore::with_backends(&config, &env.root, |kind| {
        MemBackend::named(kind.as_str())
    });
    let now = Utc::now();
    store
        .import_data(ExportBundle {
            nodes: Some(HashMap::from([(
                "n".to_string(),
                NodeInfo { last_seen: Some(now - Duration::days(8)), ..Default::default() },
            )])),
            ..Default::default()
        })
        .unwrap();

    assert_eq!(store.cleanup_old_records_at(now).nodes, 1);
}

#[test]
fn test_save_isolation() {
    init_tracing();
    let env = TestEnv::new();
    let broken = MemBackend::named("peers");
    broken.set_simulate_write_error(true);
    let nodes = MemBackend::named("nodes");

    let (broken_handle, nodes_handle) = (broken.clone(), nodes.clone());
    let store = EntityStore::with_backends(&env.config, &env.root, move |kind| match kind {
        CollectionKind::Peers => broken.clone(),
        CollectionKind::Nodes => nodes.clone(),
        other => MemBackend::named(other.as_str()),
    });
    store.save_node_info("n1", NodeInfo::named("x"));
    store.save_peer_info("p1", PeerInfo::for_node("n1"));

    let report = store.save();

    assert_eq!(report.failures.len(), 1);
    assert_eq!(report.failures[0].collection, CollectionKind::Peers);
    assert_eq!(report.saved.len(), 4);
    assert!(nodes_handle.document().unwrap().contains("\"n1\""));
    assert!(broken_handle.document().is_none());

    broken_handle.set_simulate_write_error(false);
}

#[test]
fn test_export_import_file_roundtrip() {
    let env = TestEnv::new();
    let source = env.mem_entity_store();
    source.save_file_info("f1", FileInfo::new("a.txt"));
    source.save_peer_info("p1", PeerInfo::for_node("n1"));
    let path = env.root.join("exports").join("data.json");
    source.export_to_file(&path).unwrap();

    let target = env.mem_entity_store();
    target.save_node_info("stale", NodeInfo::named("gone"));
    target.import_from_file(&path).unwrap();

    assert!(target.get_file_info("f1").is_some());
    assert!(target.get_peer_info("p1").is_some());
    assert!(target.get_node_info("stale").is_none());
    assert_eq!(target.stats().total(), 2);
}

#[test]
fn test_autosave_flushes_in_background() {
    let env = TestEnv::new();
    let store = env.entity_store();
    store
        .start_autosave(std::time::Duration::from_millis(20))
        .unwrap();
    store.save_file_info("f1", FileInfo::new("auto.txt"));

    std::thread::sleep(std::time::Duration::from_millis(200));

    let raw = fs::read_to_string(env.root.join("files.json")).unwrap();
    assert!(raw.contains("auto.txt"));
    store.shutdown();
    assert!(!store.autosave_running());
}
