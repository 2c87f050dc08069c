//! Integration tests for Trellis
//!
//! These tests drive a vault on disk through the store, the relationship
//! index and the graph builder together.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use tempfile::TempDir;
use tokio::sync::broadcast;
use tokio::time::{sleep, timeout};
use trellis_core::{ChangeEvent, ChangeKind, DocumentId, Settings, StoreEvent};
use trellis_graph::{BuildOptions, Filters, GraphBuilder, GraphMode, PropertyFilter};
use trellis_index::RelationshipIndex;
use trellis_watcher::VaultStore;

fn write(root: &Path, path: &str, content: &str) {
    let full = root.join(path);
    if let Some(parent) = full.parent() {
        std::fs::create_dir_all(parent).unwrap();
    }
    std::fs::write(full, content).unwrap();
}

fn fast_settings() -> Settings {
    Settings {
        modify_debounce_ms: 50,
        rename_debounce_ms: 150,
        ..Settings::default()
    }
}

fn sample_vault() -> TempDir {
    let dir = TempDir::new().unwrap();
    let root = dir.path();
    write(root, "Home.md", "---\ntitle: Home\n---\n# Home\n");
    write(
        root,
        "projects/Alpha.md",
        "---\nparent: \"[[Home]]\"\nrelated:\n  - \"[[Beta]]\"\nstatus: active\n---\n",
    );
    write(
        root,
        "projects/Beta.md",
        "---\nparent: [[Home]]\nstatus: done\n---\n",
    );
    write(root, "projects/Gamma.md", "---\nparent: \"[[projects/Alpha]]\"\n---\n");
    write(root, "scratch.md", "no frontmatter here\n");
    dir
}

async fn next_event(rx: &mut broadcast::Receiver<ChangeEvent>) -> ChangeEvent {
    timeout(Duration::from_secs(10), rx.recv())
        .await
        .expect("timed out waiting for a change event")
        .unwrap()
}

#[test]
fn test_vault_hierarchy_end_to_end() {
    let dir = sample_vault();
    let store = Arc::new(VaultStore::open(dir.path()).unwrap());
    let index = RelationshipIndex::new(store.clone(), Settings::default());

    let stats = tokio_test::block_on(index.scan_all()).unwrap();
    assert_eq!(stats.listed, 5);
    assert_eq!(stats.indexed, 4);
    assert!(!index.contains(&"scratch.md".into()));

    let builder = GraphBuilder::new(index.lookup(), store, Settings::default());
    let graph = builder.build_graph(&BuildOptions::new("projects/Gamma.md", GraphMode::Hierarchy));

    let home = graph.node(&"Home.md".into()).unwrap();
    assert_eq!(home.depth, 0);
    assert_eq!(home.label, "Home");
    assert!(graph.has_edge(&"Home.md".into(), &"projects/Alpha.md".into()));
    assert!(graph.has_edge(&"Home.md".into(), &"projects/Beta.md".into()));
    assert!(graph.has_edge(&"projects/Alpha.md".into(), &"projects/Gamma.md".into()));
    let gamma = graph.node(&"projects/Gamma.md".into()).unwrap();
    assert!(gamma.is_root);
    assert_eq!(gamma.depth, 2);
}

#[tokio::test]
async fn test_filtered_graph_serializes() {
    let dir = sample_vault();
    let store = Arc::new(VaultStore::open(dir.path()).unwrap());
    let index = RelationshipIndex::new(store.clone(), Settings::default());
    index.scan_all().await.unwrap();

    let builder = GraphBuilder::new(index.lookup(), store, Settings::default());
    let filter: PropertyFilter = "status=done".parse().unwrap();
    let options = BuildOptions::new("Home.md", GraphMode::Hierarchy).with_filters(Filters {
        predicate: Some(filter.into_predicate()),
        ..Filters::default()
    });
    let graph = builder.build_graph(&options);

    let json = serde_json::to_value(&graph).unwrap();
    let ids: Vec<&str> = json["nodes"]
        .as_array()
        .unwrap()
        .iter()
        .map(|n| n["id"].as_str().unwrap())
        .collect();
    assert_eq!(ids, vec!["Home.md", "projects/Beta.md"]);
    assert_eq!(json["edges"].as_array().unwrap().len(), 1);
}

#[tokio::test]
async fn test_settings_file_controls_scope_and_properties() {
    let dir = TempDir::new().unwrap();
    let root = dir.path();
    write(
        root,
        "trellis.toml",
        "scan_directories = [\"notes\"]\n\n\
         [properties]\nparent = \"up\"\nchildren = \"down\"\nrelated = \"see\"\n",
    );
    write(root, "notes/a.md", "---\nup: \"[[b]]\"\n---\n");
    write(root, "notes/b.md", "---\n---\n");
    write(root, "other/c.md", "---\nup: \"[[b]]\"\n---\n");

    let settings = Settings::load_from_vault(root).unwrap();
    let store = Arc::new(VaultStore::open(root).unwrap());
    let index = RelationshipIndex::new(store, settings);
    index.scan_all().await.unwrap();

    assert_eq!(
        index.ids(),
        vec![DocumentId::from("notes/a.md"), DocumentId::from("notes/b.md")]
    );
    let a = index.record(&"notes/a.md".into()).unwrap();
    assert_eq!(a.parents.len(), 1);
    assert_eq!(a.parents[0].target, "b");
}

#[tokio::test]
async fn test_live_edit_is_picked_up() {
    let dir = sample_vault();
    let store = Arc::new(VaultStore::open(dir.path()).unwrap());
    let root = store.root().to_path_buf();
    let index = RelationshipIndex::new(store.clone(), fast_settings());

    store.watch().unwrap();
    let mut events = index.subscribe();
    index.start().await.unwrap();

    write(
        &root,
        "projects/Beta.md",
        "---\nparent: \"[[Home]]\"\nrelated: \"[[Gamma]]\"\n---\n",
    );

    let event = next_event(&mut events).await;
    assert_eq!(event.kind, ChangeKind::Changed);
    assert_eq!(event.id, DocumentId::from("projects/Beta.md"));
    assert_eq!(event.after.unwrap().related[0].target, "Gamma");

    let builder = GraphBuilder::new(index.lookup(), store.clone(), fast_settings());
    let graph = builder.build_graph(&BuildOptions::new("projects/Beta.md", GraphMode::Related));
    assert!(graph.has_edge(&"projects/Beta.md".into(), &"projects/Gamma.md".into()));

    index.stop();
    store.unwatch();
}

#[tokio::test]
async fn test_delete_and_rename_reconcile() {
    let dir = sample_vault();
    let store = Arc::new(VaultStore::open(dir.path()).unwrap());
    let root = store.root().to_path_buf();
    let index = RelationshipIndex::new(store.clone(), fast_settings());
    index.start().await.unwrap();
    let mut events = index.subscribe();

    std::fs::remove_file(root.join("projects/Gamma.md")).unwrap();
    store.notify(StoreEvent::Deleted("projects/Gamma.md".into()));
    let event = next_event(&mut events).await;
    assert_eq!(event.kind, ChangeKind::Deleted);
    assert!(!index.contains(&"projects/Gamma.md".into()));

    std::fs::rename(root.join("Home.md"), root.join("Start.md")).unwrap();
    store.notify(StoreEvent::Renamed {
        from: "Home.md".into(),
        to: "Start.md".into(),
    });
    sleep(Duration::from_millis(500)).await;

    assert!(events.try_recv().is_err());
    assert!(index.contains(&"Start.md".into()));
    assert!(!index.contains(&"Home.md".into()));
    index.stop();
}

#[cfg(target_os = "linux")]
#[tokio::test]
async fn test_rename_on_disk_is_silent() {
    let dir = sample_vault();
    let store = Arc::new(VaultStore::open(dir.path()).unwrap());
    let root = store.root().to_path_buf();
    let index = RelationshipIndex::new(store.clone(), fast_settings());

    store.watch().unwrap();
    let mut events = index.subscribe();
    index.start().await.unwrap();

    std::fs::rename(root.join("Home.md"), root.join("Start.md")).unwrap();
    sleep(Duration::from_millis(800)).await;

    let mut seen = Vec::new();
    while let Ok(event) = events.try_recv() {
        seen.push((event.kind, event.id.to_string()));
    }
    assert!(seen.is_empty(), "rename announced {:?}", seen);
    assert!(index.contains(&"Start.md".into()));
    assert!(!index.contains(&"Home.md".into()));

    let builder = GraphBuilder::new(index.lookup(), store.clone(), fast_settings());
    let graph = builder.build_graph(&BuildOptions::new("Start.md", GraphMode::Hierarchy));
    assert_eq!(graph.node(&"Start.md".into()).unwrap().label, "Home");

    index.stop();
    store.unwatch();
}
