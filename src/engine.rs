//! Composition root.
//!
//! [`Engine`] builds and owns every component for one browser profile. The
//! host creates it once at startup, registers [`Engine::middleware`] with
//! its session store, and hands [`Engine::groups`] and friends to the UI.

use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::{info, warn};

use crate::config::schema::Config;
use crate::error::{EngineError, StorageError};
use crate::expansion::GroupExpansionStore;
use crate::groups::GroupCache;
use crate::heuristic::AutoGrouper;
use crate::lru::LruQueue;
use crate::middleware::{LifecycleAdapter, LifecycleMiddleware};
use crate::persistence::{
    JsonFileStorage, MemoryStorage, PersistenceWriter, Storage, WriterPolicy, WriterStats,
};
use crate::session::SessionLookup;

/// Startup switches not covered by the config file.
#[derive(Debug, Clone, Default)]
pub struct EngineOptions {
    /// Keep everything in memory; nothing is read from or written to disk.
    pub ephemeral: bool,
    /// Overrides `storage.data_dir`.
    pub data_dir: Option<PathBuf>,
}

/// Running engine.
pub struct Engine {
    cache: GroupCache,
    lru: LruQueue,
    expansion: GroupExpansionStore,
    grouper: Arc<AutoGrouper>,
    middleware: LifecycleMiddleware,
    writer: PersistenceWriter,
    shutdown_tx: broadcast::Sender<()>,
    adapter_handle: JoinHandle<()>,
    writer_handle: JoinHandle<()>,
    data_dir: Option<PathBuf>,
}

impl std::fmt::Debug for Engine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Engine")
            .field("groups", &self.cache)
            .field("grouper", &self.grouper)
            .field("data_dir", &self.data_dir)
            .finish()
    }
}

impl Engine {
    /// Starts an engine backed by the configured data directory.
    pub async fn start(
        config: &Config,
        sessions: Arc<dyn SessionLookup>,
    ) -> Result<Self, EngineError> {
        Self::start_with(config, sessions, EngineOptions::default()).await
    }

    /// Starts an engine with explicit options.
    pub async fn start_with(
        config: &Config,
        sessions: Arc<dyn SessionLookup>,
        options: EngineOptions,
    ) -> Result<Self, EngineError> {
        if options.ephemeral {
            let storage: Arc<dyn Storage> = Arc::new(MemoryStorage::new());
            return Self::with_storage(config, sessions, storage, None).await;
        }

        let dir = options
            .data_dir
            .unwrap_or_else(|| config.storage.data_dir_path());
        let open_dir = dir.clone();
        let storage = tokio::task::spawn_blocking(move || JsonFileStorage::open(open_dir))
            .await
            .map_err(|e| StorageError::Task(e.to_string()))??;
        Self::with_storage(config, sessions, Arc::new(storage), Some(dir)).await
    }

    /// Starts an engine on a caller-supplied storage.
    pub async fn with_storage(
        config: &Config,
        sessions: Arc<dyn SessionLookup>,
        storage: Arc<dyn Storage>,
        data_dir: Option<PathBuf>,
    ) -> Result<Self, EngineError> {
        config.validate()?;
        let policy = WriterPolicy {
            retries: config.storage.write_retries,
            backoff: config.storage.retry_backoff()?,
        };
        let (writer, writer_handle) = PersistenceWriter::spawn(Arc::clone(&storage), policy);

        let cache = GroupCache::load(
            Arc::clone(&storage),
            Arc::clone(&sessions),
            writer.clone(),
            config.events.channel_capacity,
        )
        .await?;
        let lru = LruQueue::load(Arc::clone(&storage), Some(writer.clone())).await?;
        let expansion = GroupExpansionStore::load(storage, Some(writer.clone())).await?;
        let live = cache.all_groups().into_iter().map(|g| g.id);
        expansion.prune(live);

        let grouper = Arc::new(AutoGrouper::new(
            cache.clone(),
            sessions,
            config.heuristic.enabled,
        ));
        let (adapter, middleware) = LifecycleAdapter::new(
            cache.clone(),
            lru.clone(),
            expansion.clone(),
            Arc::clone(&grouper),
        );
        let (shutdown_tx, shutdown_rx) = broadcast::channel(1);
        let adapter_handle = tokio::spawn(adapter.run(shutdown_rx));

        info!(
            groups = cache.group_count(),
            lru_entries = lru.len().await,
            data_dir = ?data_dir,
            "engine started"
        );

        Ok(Self {
            cache,
            lru,
            expansion,
            grouper,
            middleware,
            writer,
            shutdown_tx,
            adapter_handle,
            writer_handle,
            data_dir,
        })
    }

    pub fn groups(&self) -> &GroupCache {
        &self.cache
    }

    pub fn lru(&self) -> &LruQueue {
        &self.lru
    }

    pub fn expansion(&self) -> &GroupExpansionStore {
        &self.expansion
    }

    pub fn auto_grouper(&self) -> &AutoGrouper {
        &self.grouper
    }

    /// Observer to register with the session store's dispatch pipeline.
    pub fn middleware(&self) -> LifecycleMiddleware {
        self.middleware.clone()
    }

    pub fn writer_stats(&self) -> &WriterStats {
        self.writer.stats()
    }

    /// Directory backing this engine; `None` when ephemeral.
    pub fn data_dir(&self) -> Option<&PathBuf> {
        self.data_dir.as_ref()
    }

    /// Stops the adapter after it applies queued actions, then drains the
    /// writer so every accepted change reaches storage.
    pub async fn shutdown(self) -> Result<(), EngineError> {
        let _ = self.shutdown_tx.send(());
        if let Err(e) = self.adapter_handle.await {
            warn!(error = %e, "lifecycle adapter task failed");
        }
        self.writer.shutdown().await?;
        if let Err(e) = self.writer_handle.await {
            warn!(error = %e, "persistence writer task failed");
        }
        info!("engine stopped");
        Ok(())
    }
}
