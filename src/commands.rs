//! CLI command implementations

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Context;
use tokio::sync::broadcast::error::RecvError;
use trellis_core::{ChangeEvent, ChangeKind, DocumentId, Settings};
use trellis_graph::{BuildOptions, Filters, GraphBuilder, GraphMode, PropertyFilter};
use trellis_index::RelationshipIndex;
use trellis_watcher::VaultStore;

pub struct GraphRequest {
    pub document: String,
    pub mode: GraphMode,
    pub search: Option<String>,
    pub filter: Option<PropertyFilter>,
    pub depth: Option<usize>,
    pub indirect: bool,
}

fn open_vault(root: &Path) -> anyhow::Result<(Arc<VaultStore>, Settings)> {
    let store = Arc::new(VaultStore::open(root)?);
    let settings = Settings::load_from_vault(store.root())
        .with_context(|| format!("invalid settings in {}", store.root().display()))?;
    Ok((store, settings))
}

pub async fn index(root: PathBuf) -> anyhow::Result<()> {
    tracing::info!("Indexing vault: {}", root.display());

    let (store, settings) = open_vault(&root)?;
    let index = RelationshipIndex::new(store, settings);
    let stats = index.scan_all().await?;

    let links: usize = index
        .ids()
        .iter()
        .filter_map(|id| index.record(id))
        .map(|record| record.link_count())
        .sum();

    println!(
        "Indexed {} of {} documents, {} relationship links ({} unreadable)",
        stats.indexed, stats.listed, links, stats.failed
    );
    Ok(())
}

pub async fn graph(root: PathBuf, request: GraphRequest) -> anyhow::Result<()> {
    let (store, settings) = open_vault(&root)?;
    let index = RelationshipIndex::new(store.clone(), settings.clone());
    index.scan_all().await?;

    let mut document = DocumentId::new(request.document.as_str());
    if !document.is_document() {
        document = DocumentId::new(format!("{}.md", document));
    }
    if !index.contains(&document) {
        tracing::warn!("{} is not indexed; the graph will only contain it", document);
    }
    if request.mode.is_folder() {
        tracing::info!(
            "Building {} graphs for the documents in {}/",
            request.mode,
            document.folder()
        );
    }

    let mut builder = GraphBuilder::new(index.lookup(), store, settings);
    builder.set_depth_override(request.depth);

    let mut filters = Filters::default();
    if let Some(search) = request.search {
        filters = filters.search(search);
    }
    if let Some(filter) = request.filter {
        filters.predicate = Some(filter.into_predicate());
    }
    if request.indirect {
        filters = filters.maintain_indirect(true);
    }

    let options = BuildOptions::new(document, request.mode).with_filters(filters);
    let graph = builder.build_graph(&options);
    tracing::info!(
        "Built graph with {} nodes, {} edges",
        graph.node_count(),
        graph.edge_count()
    );

    println!("{}", serde_json::to_string_pretty(&graph)?);
    Ok(())
}

pub async fn watch(root: PathBuf) -> anyhow::Result<()> {
    let (store, settings) = open_vault(&root)?;
    let index = RelationshipIndex::new(store.clone(), settings);

    // Watch before the backfill so nothing written during the scan is missed.
    store.watch()?;
    let mut events = index.subscribe();
    let stats = index.start().await?;
    tracing::info!(
        "Watching {} ({} documents indexed); press Ctrl-C to stop",
        store.root().display(),
        stats.indexed
    );

    loop {
        tokio::select! {
            event = events.recv() => match event {
                Ok(event) => log_change(&event),
                Err(RecvError::Lagged(missed)) => {
                    tracing::warn!("Missed {} change events", missed);
                }
                Err(RecvError::Closed) => break,
            },
            signal = tokio::signal::ctrl_c() => {
                if let Err(e) = signal {
                    tracing::error!("Failed to listen for Ctrl-C: {}", e);
                }
                break;
            }
        }
    }

    index.stop();
    store.unwatch();
    Ok(())
}

fn log_change(event: &ChangeEvent) {
    match event.kind {
        ChangeKind::Changed => {
            let links = event.after.as_ref().map_or(0, |record| record.link_count());
            tracing::info!("Changed {} ({} links)", event.id, links);
        }
        ChangeKind::Deleted => tracing::info!("Removed {}", event.id),
    }
}
