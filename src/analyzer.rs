//! Analyzer facade
//!
//! Owns the module graph and the query cache and answers definition, usage
//! and module-membership queries for one workspace.
//!
//! # Lifecycle
//!
//! ```text
//! Uninitialized ──first query──▶ Initializing ──build ok──▶ Ready
//!       ▲                              │                      │
//!       └──────────build failed────────┘◀──module file changed─┘
//! ```
//!
//! The graph is built lazily by the first query. Queries arriving while a
//! build is in flight wait for that build instead of starting another one.
//! A change to a module declaration file rebuilds the graph from scratch and
//! clears the cache; any other change only drops the cached results of that
//! file.

use anyhow::Result;
use serde::Serialize;
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use strum::Display;
use tokio::sync::Mutex;

use crate::config::AnalyzerConfig;
use crate::index_cache::IndexCache;
use crate::models::{Position, QueryKind, SymbolDefinition, UsageLocation};
use crate::module_graph::{ModuleGraph, ModuleGraphBuilder};
use crate::resolver::SymbolResolver;
use crate::usages::UsageFinder;
use crate::workspace::{is_module_file, DocumentProvider, FileChange, FileEnumerator, FsWorkspace};

/// Lifecycle state of the module graph
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, Serialize)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum AnalyzerState {
    Uninitialized,
    Initializing,
    Ready,
}

/// A memoized query answer
#[derive(Debug, Clone)]
enum CachedResult {
    Definition(Option<SymbolDefinition>),
    Usages(Vec<UsageLocation>),
}

pub struct Analyzer {
    config: AnalyzerConfig,
    files: Arc<dyn FileEnumerator>,
    documents: Arc<dyn DocumentProvider>,
    graph: Mutex<Option<Arc<ModuleGraph>>>,
    /// Held for the whole duration of a graph build
    build_lock: Mutex<()>,
    state: Mutex<AnalyzerState>,
    cache: Mutex<IndexCache<CachedResult>>,
    /// Bumped by every invalidation; results computed across a bump are not cached
    epoch: AtomicU64,
}

impl Analyzer {
    pub fn new(
        files: Arc<dyn FileEnumerator>,
        documents: Arc<dyn DocumentProvider>,
        config: AnalyzerConfig,
    ) -> Self {
        let cache = IndexCache::new(config.cache_size);
        Self {
            config,
            files,
            documents,
            graph: Mutex::new(None),
            build_lock: Mutex::new(()),
            state: Mutex::new(AnalyzerState::Uninitialized),
            cache: Mutex::new(cache),
            epoch: AtomicU64::new(0),
        }
    }

    /// Analyzer over the file system below `root`
    pub fn for_root(root: impl AsRef<Path>, config: AnalyzerConfig) -> Self {
        let workspace = Arc::new(FsWorkspace::new(root.as_ref()));
        Self::new(workspace.clone(), workspace, config)
    }

    pub fn config(&self) -> &AnalyzerConfig {
        &self.config
    }

    pub async fn state(&self) -> AnalyzerState {
        *self.state.lock().await
    }

    /// Current module graph, building it first if needed
    pub async fn module_graph(&self) -> Result<Arc<ModuleGraph>> {
        if let Some(graph) = self.graph.lock().await.clone() {
            return Ok(graph);
        }

        let _build = self.build_lock.lock().await;
        // A build that finished while we waited for the lock already did the work
        if let Some(graph) = self.graph.lock().await.clone() {
            return Ok(graph);
        }
        self.build_graph().await
    }

    /// Build and publish a new graph; the caller holds `build_lock`
    async fn build_graph(&self) -> Result<Arc<ModuleGraph>> {
        *self.state.lock().await = AnalyzerState::Initializing;

        let builder = ModuleGraphBuilder::new(
            self.files.as_ref(),
            self.documents.as_ref(),
            &self.config.exclude_patterns,
        );

        match builder.build().await {
            Ok(graph) => {
                let graph = Arc::new(graph);
                *self.graph.lock().await = Some(graph.clone());
                *self.state.lock().await = AnalyzerState::Ready;
                Ok(graph)
            }
            Err(e) => {
                log::warn!("Module graph build failed: {:#}", e);
                *self.state.lock().await = AnalyzerState::Uninitialized;
                Err(e)
            }
        }
    }

    /// Declaration of the symbol at `position` in `path`
    pub async fn find_definition(
        &self,
        path: &Path,
        position: Position,
    ) -> Result<Option<SymbolDefinition>> {
        self.module_graph().await?;

        let key = QueryKind::Definition.cache_key(path, position);
        if let Some(CachedResult::Definition(hit)) = self.cached(&key).await {
            return Ok(hit);
        }

        let epoch = self.epoch.load(Ordering::SeqCst);
        let document = self.documents.open(path).await?;
        let resolver = SymbolResolver::new(
            self.files.as_ref(),
            self.documents.as_ref(),
            &self.config.exclude_patterns,
        );
        let definition = resolver.find_definition(&document, position).await?;

        self.store(key, epoch, CachedResult::Definition(definition.clone()))
            .await;
        Ok(definition)
    }

    /// Usages of the symbol at `position` in `path`, sorted by location
    pub async fn find_usages(&self, path: &Path, position: Position) -> Result<Vec<UsageLocation>> {
        let graph = self.module_graph().await?;

        let key = QueryKind::Usages.cache_key(path, position);
        if let Some(CachedResult::Usages(hit)) = self.cached(&key).await {
            return Ok(hit);
        }

        let epoch = self.epoch.load(Ordering::SeqCst);
        let document = self.documents.open(path).await?;
        let finder = UsageFinder::new(
            self.files.as_ref(),
            self.documents.as_ref(),
            &self.config.exclude_patterns,
        );
        let usages = finder
            .find_usages(
                &document,
                position,
                self.config.enable_module_scoping,
                None,
                Some(&graph),
            )
            .await?;

        self.store(key, epoch, CachedResult::Usages(usages.clone()))
            .await;
        Ok(usages)
    }

    /// Name of the module owning `path`
    pub async fn get_module_for_file(&self, path: &Path) -> Result<Option<String>> {
        let graph = self.module_graph().await?;
        Ok(graph.module_for_file(path).map(|m| m.name.clone()))
    }

    /// Drop every cached result computed for `path`
    pub async fn invalidate_file(&self, path: &Path) {
        self.epoch.fetch_add(1, Ordering::SeqCst);
        let mut cache = self.cache.lock().await;
        let removed: usize = QueryKind::ALL
            .iter()
            .map(|kind| cache.invalidate_by_prefix(&kind.file_prefix(path)))
            .sum();
        log::debug!("Invalidated {} cached results for {}", removed, path.display());
    }

    /// Discard the graph and every cached result, then build a new graph
    pub async fn rebuild_module_graph(&self) -> Result<()> {
        let _build = self.build_lock.lock().await;
        log::info!("Rebuilding module graph");

        *self.graph.lock().await = None;
        self.clear_cache().await;
        self.build_graph().await.map(|_| ())
    }

    /// Apply a change notification
    ///
    /// Created, changed and deleted files are treated alike.
    pub async fn handle_file_change(&self, change: &FileChange) -> Result<()> {
        log::debug!("{:?} {}", change.kind, change.path.display());

        if !is_module_file(&change.path) {
            self.invalidate_file(&change.path).await;
            return Ok(());
        }

        if self.state().await == AnalyzerState::Uninitialized {
            // The graph will be built from current content on the next query
            self.clear_cache().await;
            return Ok(());
        }

        self.rebuild_module_graph().await
    }

    async fn clear_cache(&self) {
        self.epoch.fetch_add(1, Ordering::SeqCst);
        self.cache.lock().await.clear();
    }

    async fn cached(&self, key: &str) -> Option<CachedResult> {
        let hit = self.cache.lock().await.get(key);
        log::trace!("Cache {} for {}", if hit.is_some() { "hit" } else { "miss" }, key);
        hit
    }

    async fn store(&self, key: String, epoch: u64, result: CachedResult) {
        if self.epoch.load(Ordering::SeqCst) != epoch {
            log::trace!("Not caching {}: invalidated while computing", key);
            return;
        }
        self.cache.lock().await.set(key, result);
    }
}
