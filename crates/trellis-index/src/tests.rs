//! Pipeline tests for the relationship index

use crate::*;
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tokio::time::{sleep, timeout};
use trellis_core::{
    ChangeEvent, ChangeKind, DocumentId, Frontmatter, LinkReference, MemoryStore, Settings,
};

fn fm(value: serde_json::Value) -> Option<Frontmatter> {
    Some(serde_json::from_value(value).unwrap())
}

fn fast_settings() -> Settings {
    Settings {
        modify_debounce_ms: 40,
        rename_debounce_ms: 120,
        ..Settings::default()
    }
}

fn index_over(store: &Arc<MemoryStore>, settings: Settings) -> RelationshipIndex {
    RelationshipIndex::new(store.clone(), settings)
}

async fn next_event(rx: &mut broadcast::Receiver<ChangeEvent>) -> ChangeEvent {
    timeout(Duration::from_secs(2), rx.recv())
        .await
        .expect("timed out waiting for a change event")
        .expect("event channel closed")
}

async fn assert_quiet(rx: &mut broadcast::Receiver<ChangeEvent>, wait: Duration) {
    if let Ok(Ok(event)) = timeout(wait, rx.recv()).await {
        panic!("unexpected change event: {:?}", event);
    }
}

#[tokio::test]
async fn test_start_indexes_in_scope_documents_with_frontmatter() {
    let store = Arc::new(MemoryStore::new());
    store.seed("notes/a.md", fm(json!({"parent": "[[b]]"})));
    store.seed("notes/b.md", fm(json!({})));
    store.seed("notes/plain.md", None);
    store.seed("archive/c.md", fm(json!({"parent": "[[a]]"})));
    store.seed("notes/image.png", fm(json!({})));

    let settings = Settings {
        scan_directories: vec!["notes".to_string()],
        ..fast_settings()
    };
    let index = index_over(&store, settings);
    let stats = index.start().await.unwrap();

    assert_eq!(stats.listed, 3);
    assert_eq!(stats.indexed, 2);
    assert_eq!(
        index.ids(),
        vec![DocumentId::from("notes/a.md"), DocumentId::from("notes/b.md")]
    );
    assert_eq!(
        index.record(&"notes/a.md".into()).unwrap().parents,
        vec![LinkReference::new("b")]
    );
    assert!(index.is_in_scope(&"notes/deep/x.md".into()));
    assert!(!index.is_in_scope(&"archive/c.md".into()));
}

#[tokio::test]
async fn test_rapid_modifies_coalesce_into_one_event() {
    let store = Arc::new(MemoryStore::new());
    store.seed("a.md", fm(json!({"related": "[[b]]"})));
    let index = index_over(&store, fast_settings());
    index.start().await.unwrap();
    let mut rx = index.subscribe();

    for i in 0..10 {
        store.put("a.md", fm(json!({"related": format!("[[n{}]]", i)})));
        sleep(Duration::from_millis(5)).await;
    }

    let event = next_event(&mut rx).await;
    assert_eq!(event.kind, ChangeKind::Changed);
    assert_eq!(event.id, DocumentId::from("a.md"));
    assert_eq!(event.before.unwrap().related, vec![LinkReference::new("b")]);
    assert_eq!(event.after.unwrap().related, vec![LinkReference::new("n9")]);
    assert_quiet(&mut rx, Duration::from_millis(200)).await;
}

#[tokio::test]
async fn test_debounce_is_independent_per_path() {
    let store = Arc::new(MemoryStore::new());
    let index = index_over(&store, fast_settings());
    index.start().await.unwrap();
    let mut rx = index.subscribe();

    store.put("quiet.md", fm(json!({})));
    // Keep editing another document well past the quiet document's window.
    for i in 0..8 {
        store.put("busy.md", fm(json!({"related": format!("[[x{}]]", i)})));
        sleep(Duration::from_millis(20)).await;
    }

    let first = next_event(&mut rx).await;
    assert_eq!(first.id, DocumentId::from("quiet.md"));
    let second = next_event(&mut rx).await;
    assert_eq!(second.id, DocumentId::from("busy.md"));
}

#[tokio::test]
async fn test_delete_is_immediate_and_not_reverted() {
    let store = Arc::new(MemoryStore::new());
    store.seed("a.md", fm(json!({"parent": "[[p]]"})));
    let index = index_over(&store, fast_settings());
    index.start().await.unwrap();
    let mut rx = index.subscribe();

    // A modify is still pending when the delete lands.
    store.put("a.md", fm(json!({"parent": "[[q]]"})));
    store.remove(&"a.md".into());

    let event = timeout(Duration::from_millis(30), rx.recv())
        .await
        .expect("delete should not wait for the debounce window")
        .unwrap();
    assert_eq!(event.kind, ChangeKind::Deleted);
    assert_eq!(event.before.unwrap().parents, vec![LinkReference::new("p")]);
    assert!(event.after.is_none());

    assert_quiet(&mut rx, Duration::from_millis(150)).await;
    assert!(!index.contains(&"a.md".into()));
}

#[tokio::test]
async fn test_losing_frontmatter_removes_record() {
    let store = Arc::new(MemoryStore::new());
    store.seed("a.md", fm(json!({})));
    let index = index_over(&store, fast_settings());
    index.start().await.unwrap();
    let mut rx = index.subscribe();

    store.put("a.md", None);
    let event = next_event(&mut rx).await;
    assert_eq!(event.kind, ChangeKind::Deleted);
    assert!(!index.contains(&"a.md".into()));

    store.put("a.md", fm(json!({"related": "[[z]]"})));
    let event = next_event(&mut rx).await;
    assert_eq!(event.kind, ChangeKind::Changed);
    assert!(event.before.is_none());
    assert!(index.contains(&"a.md".into()));
}

#[tokio::test]
async fn test_rename_moves_key_silently_and_recomputes_referrers() {
    let store = Arc::new(MemoryStore::new());
    store.seed("old.md", fm(json!({"parent": "[[top]]"})));
    store.seed("ref.md", fm(json!({"related": "[[old]]"})));
    store.seed("other.md", fm(json!({"related": "[[elsewhere]]"})));
    let index = index_over(&store, fast_settings());
    index.start().await.unwrap();
    let mut rx = index.subscribe();

    store.rename(&"old.md".into(), "moved/new.md");
    // The store rewrites referrers without announcing it.
    store.seed("ref.md", fm(json!({"related": "[[moved/new]]"})));
    store.seed("other.md", fm(json!({"related": "[[changed-but-unrelated]]"})));

    assert_quiet(&mut rx, Duration::from_millis(400)).await;

    assert!(!index.contains(&"old.md".into()));
    let moved = index.record(&"moved/new.md".into()).unwrap();
    assert_eq!(moved.id, DocumentId::from("moved/new.md"));
    assert_eq!(moved.parents, vec![LinkReference::new("top")]);
    assert_eq!(
        index.record(&"ref.md".into()).unwrap().related,
        vec![LinkReference::new("moved/new")]
    );
    // Documents that never referenced the old path are left alone.
    assert_eq!(
        index.record(&"other.md".into()).unwrap().related,
        vec![LinkReference::new("elsewhere")]
    );
}

#[tokio::test]
async fn test_rename_recomputes_folder_relative_referrers() {
    let store = Arc::new(MemoryStore::new());
    store.seed("b/sub/note.md", fm(json!({})));
    store.seed("b/x.md", fm(json!({"related": "[[sub/note]]"})));
    let index = index_over(&store, fast_settings());
    index.start().await.unwrap();
    let mut rx = index.subscribe();

    store.rename(&"b/sub/note.md".into(), "b/sub/renamed.md");
    store.seed("b/x.md", fm(json!({"related": "[[sub/renamed]]"})));

    assert_quiet(&mut rx, Duration::from_millis(400)).await;

    assert!(index.contains(&"b/sub/renamed.md".into()));
    assert_eq!(
        index.record(&"b/x.md".into()).unwrap().related,
        vec![LinkReference::new("sub/renamed")]
    );
}

#[tokio::test]
async fn test_chained_renames_collapse() {
    let store = Arc::new(MemoryStore::new());
    store.seed("a.md", fm(json!({"related": "[[x]]"})));
    let index = index_over(&store, fast_settings());
    index.start().await.unwrap();

    store.rename(&"a.md".into(), "b.md");
    sleep(Duration::from_millis(30)).await;
    store.rename(&"b.md".into(), "c.md");
    sleep(Duration::from_millis(400)).await;

    assert_eq!(index.ids(), vec![DocumentId::from("c.md")]);
}

#[tokio::test]
async fn test_rename_suppresses_modify_event_for_destination() {
    let store = Arc::new(MemoryStore::new());
    store.seed("a.md", fm(json!({})));
    let index = index_over(&store, fast_settings());
    index.start().await.unwrap();
    let mut rx = index.subscribe();

    store.rename(&"a.md".into(), "b.md");
    store.put("b.md", fm(json!({"related": "[[c]]"})));

    assert_quiet(&mut rx, Duration::from_millis(400)).await;
    assert_eq!(
        index.record(&"b.md".into()).unwrap().related,
        vec![LinkReference::new("c")]
    );
}

#[tokio::test]
async fn test_out_of_scope_and_non_documents_are_filtered() {
    let store = Arc::new(MemoryStore::new());
    let settings = Settings {
        scan_directories: vec!["notes".to_string()],
        ..fast_settings()
    };
    let index = index_over(&store, settings);
    index.start().await.unwrap();
    let mut rx = index.subscribe();

    store.put("elsewhere/a.md", fm(json!({})));
    store.put("notes/pic.png", fm(json!({})));
    assert_quiet(&mut rx, Duration::from_millis(150)).await;
    assert!(index.is_empty());

    store.put("notes/a.md", fm(json!({})));
    assert_eq!(next_event(&mut rx).await.id, DocumentId::from("notes/a.md"));
}

#[tokio::test]
async fn test_read_failure_keeps_last_known_record() {
    let store = Arc::new(MemoryStore::new());
    store.seed("a.md", fm(json!({"parent": "[[p]]"})));
    let index = index_over(&store, fast_settings());
    index.start().await.unwrap();
    let mut rx = index.subscribe();

    store.poison(&"a.md".into());
    store.emit(trellis_core::StoreEvent::Modified("a.md".into()));
    assert_quiet(&mut rx, Duration::from_millis(150)).await;
    assert_eq!(
        index.record(&"a.md".into()).unwrap().parents,
        vec![LinkReference::new("p")]
    );

    // The pipeline survives and keeps processing.
    store.put("b.md", fm(json!({})));
    assert_eq!(next_event(&mut rx).await.id, DocumentId::from("b.md"));
}

#[tokio::test]
async fn test_scan_all_reconciles_and_skips_failures() {
    let store = Arc::new(MemoryStore::new());
    store.seed("a.md", fm(json!({"related": "[[b]]"})));
    store.seed("b.md", fm(json!({})));
    store.seed("c.md", fm(json!({})));
    let index = index_over(&store, fast_settings());
    index.start().await.unwrap();
    let mut rx = index.subscribe();

    // Silent edits only a full rescan can pick up.
    store.seed("a.md", fm(json!({"related": "[[c]]"})));
    store.seed("b.md", None);
    store.poison(&"c.md".into());
    store.seed("d.md", fm(json!({})));

    let stats = index.scan_all().await.unwrap();
    assert_eq!(
        stats,
        ScanStats {
            listed: 4,
            indexed: 2,
            failed: 1,
            removed: 1,
        }
    );
    assert_eq!(
        index.ids(),
        vec![
            DocumentId::from("a.md"),
            DocumentId::from("c.md"),
            DocumentId::from("d.md"),
        ]
    );

    let mut seen = Vec::new();
    for _ in 0..3 {
        let event = next_event(&mut rx).await;
        seen.push((event.kind, event.id.to_string()));
    }
    seen.sort_by(|a, b| a.1.cmp(&b.1));
    assert_eq!(
        seen,
        vec![
            (ChangeKind::Changed, "a.md".to_string()),
            (ChangeKind::Deleted, "b.md".to_string()),
            (ChangeKind::Changed, "d.md".to_string()),
        ]
    );
}

#[tokio::test]
async fn test_scan_all_applies_pending_renames_silently() {
    let store = Arc::new(MemoryStore::new());
    store.seed("a.md", fm(json!({"parent": "[[top]]"})));
    store.seed("ref.md", fm(json!({"related": "[[a]]"})));
    let index = index_over(&store, fast_settings());
    index.start().await.unwrap();
    let mut rx = index.subscribe();

    store.rename(&"a.md".into(), "b.md");
    store.seed("ref.md", fm(json!({"related": "[[b]]"})));
    // Let the pipeline see the rename, well inside its window.
    sleep(Duration::from_millis(20)).await;

    let stats = index.scan_all().await.unwrap();
    assert_eq!(stats.indexed, 2);
    assert_eq!(stats.removed, 0);
    assert_eq!(
        index.ids(),
        vec![DocumentId::from("b.md"), DocumentId::from("ref.md")]
    );
    assert_eq!(
        index.record(&"ref.md".into()).unwrap().related,
        vec![LinkReference::new("b")]
    );

    // Neither the rescan nor the cancelled rename timer announces anything.
    assert_quiet(&mut rx, Duration::from_millis(300)).await;
}

#[tokio::test]
async fn test_scan_all_before_start_runs_inline() {
    let store = Arc::new(MemoryStore::new());
    store.seed("a.md", fm(json!({})));
    let index = index_over(&store, fast_settings());

    let stats = index.scan_all().await.unwrap();
    assert_eq!(stats.indexed, 1);
    assert!(!index.is_running());
}

#[tokio::test]
async fn test_start_twice_fails_and_stop_halts_processing() {
    let store = Arc::new(MemoryStore::new());
    let index = index_over(&store, fast_settings());
    index.start().await.unwrap();
    assert!(index.is_running());
    assert!(index.start().await.is_err());

    index.stop();
    assert!(!index.is_running());
    store.put("a.md", fm(json!({})));
    sleep(Duration::from_millis(150)).await;
    assert!(index.is_empty());
}

#[test]
fn test_scan_with_blocking_runtime() {
    let store = Arc::new(MemoryStore::new());
    for i in 0..25 {
        store.seed(format!("doc{:02}.md", i), fm(json!({"parent": "[[doc00]]"})));
    }
    let settings = Settings {
        scan_concurrency: 3,
        ..fast_settings()
    };
    let index = index_over(&store, settings);

    let runtime = tokio::runtime::Runtime::new().unwrap();
    let stats = runtime.block_on(index.scan_all()).unwrap();
    assert_eq!(stats.indexed, 25);
    assert_eq!(index.len(), 25);
    tokio_test::assert_ok!(runtime.block_on(index.scan_all()));
}
