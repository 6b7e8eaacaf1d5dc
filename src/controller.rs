use crate::errors::{AppError, AppResult};
use crate::models::{CloseAction, CloseOutcome, Record, ReloadOutcome, SaveOutcome, SearchField, WorkspaceKey};
use crate::scheduler::{reload_store, ReloadScheduler, TickCallback};
use crate::settings::AppSettings;
use crate::source::{DataSource, HttpDataSource};
use crate::store::RecordStore;
use crate::workspace::{SharedStore, WorkspaceRegistry};
use std::path::{Path, PathBuf};
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

/// Callbacks through which the desktop shell learns about results. Every
/// method defaults to doing nothing.
pub trait CoreListener: Send + Sync {
    fn on_workspace_created(&self, _id: usize) {}
    fn on_reload_result(&self, _id: usize, _outcome: &ReloadOutcome) {}
    fn on_search_result(&self, _records: &[Record]) {}
    fn on_error(&self, _message: &str) {}
}

#[derive(Debug, Default, Clone, Copy)]
pub struct NoopListener;

impl CoreListener for NoopListener {}

pub struct AtlasCore {
    settings: AppSettings,
    registry: Arc<RwLock<WorkspaceRegistry>>,
    scheduler: ReloadScheduler,
    source: Arc<dyn DataSource>,
    listener: Arc<dyn CoreListener>,
}

impl AtlasCore {
    pub fn new(settings: AppSettings, listener: Arc<dyn CoreListener>) -> AppResult<Arc<Self>> {
        settings.validate()?;
        let source = HttpDataSource::new(settings.endpoint_url.clone(), settings.request_timeout())?;
        Ok(Self::with_source(settings, Arc::new(source), listener))
    }

    pub fn with_source(
        settings: AppSettings,
        source: Arc<dyn DataSource>,
        listener: Arc<dyn CoreListener>,
    ) -> Arc<Self> {
        let scheduler = ReloadScheduler::new(source.clone(), settings.timer_capacity, settings.reload_interval());
        Arc::new(Self {
            settings,
            registry: Arc::new(RwLock::new(WorkspaceRegistry::new())),
            scheduler,
            source,
            listener,
        })
    }

    pub fn settings(&self) -> &AppSettings {
        &self.settings
    }

    pub fn workspace_count(&self) -> AppResult<usize> {
        Ok(self.read_registry()?.len())
    }

    pub fn create_workspace(&self) -> AppResult<usize> {
        let id = self.write_registry()?.create();
        tracing::info!(workspace_id = id, "workspace created");
        self.listener.on_workspace_created(id);
        Ok(id)
    }

    /// Removes the workspace, then stops its auto reload. Later ids shift
    /// down by one.
    pub async fn remove_workspace(&self, id: usize) -> AppResult<()> {
        // Out of the registry before the stop is awaited, so a concurrent
        // start can no longer resolve this workspace.
        let key = self.write_registry()?.remove(id)?.key;
        self.scheduler.stop(key).await;
        tracing::info!(workspace_id = id, workspace = %key, "workspace removed");
        Ok(())
    }

    /// One manual fetch-and-replace cycle.
    pub async fn reload(&self, id: usize) -> AppResult<ReloadOutcome> {
        let store = self.store(id)?;
        let result = reload_store(self.source.as_ref(), &store).await;
        match &result {
            Ok(outcome) => {
                tracing::info!(workspace_id = id, records = outcome.records().len(), "manual reload");
                self.listener.on_reload_result(id, outcome);
            }
            Err(error) => {
                tracing::warn!(workspace_id = id, error = %error, "manual reload failed");
                self.listener.on_error(&error.to_string());
            }
        }
        result
    }

    pub async fn start_auto_reload(&self, id: usize) -> AppResult<()> {
        let (key, store) = {
            let registry = self.read_registry()?;
            let entry = registry.entry(id)?;
            (entry.key, entry.store.clone())
        };
        let result = self.scheduler.start(key, store, self.tick_callback()).await;
        self.report(result)?;

        // A remove that raced this start has already stopped the key; undo
        // the task it could not see.
        let removed = self.read_registry()?.position_of(key).is_none();
        if removed {
            self.scheduler.stop(key).await;
            let len = self.read_registry()?.len();
            return self.report(Err(AppError::OutOfRange { id, len }));
        }
        Ok(())
    }

    pub async fn stop_auto_reload(&self, id: usize) -> AppResult<bool> {
        let key = self.read_registry()?.key_of(id)?;
        Ok(self.scheduler.stop(key).await)
    }

    pub async fn is_auto_reloading(&self, id: usize) -> AppResult<bool> {
        let key = self.read_registry()?.key_of(id)?;
        Ok(self.scheduler.is_running(key).await)
    }

    pub async fn active_reload_count(&self) -> usize {
        self.scheduler.active_count().await
    }

    pub async fn search(&self, id: usize, field: SearchField, query: &str) -> AppResult<Vec<Record>> {
        if query.is_empty() {
            return self.report(Err(AppError::InvalidQuery(
                "Invalid search, try again".to_string(),
            )));
        }
        let store = self.store(id)?;
        let result = store.lock().await.find(field, query);
        let hits = self.report(result)?;
        tracing::debug!(workspace_id = id, ?field, hits = hits.len(), "search");
        self.listener.on_search_result(&hits);
        Ok(hits)
    }

    /// Full contents of the workspace, used to restore the view after a
    /// search.
    pub async fn restore_view(&self, id: usize) -> AppResult<Vec<Record>> {
        let store = self.store(id)?;
        let records = store.lock().await.records();
        Ok(records)
    }

    pub async fn workspace_size(&self, id: usize) -> AppResult<usize> {
        let store = self.store(id)?;
        let size = store.lock().await.size();
        Ok(size)
    }

    /// `path == None` means the user dismissed the save dialog.
    pub async fn save_workspace(&self, id: usize, path: Option<&Path>) -> AppResult<SaveOutcome> {
        let store = self.store(id)?;
        let Some(path) = path else {
            tracing::info!(workspace_id = id, "save canceled");
            return Ok(SaveOutcome::Cancelled);
        };

        self.write_store(store, path).await?;
        tracing::info!(workspace_id = id, path = %path.to_string_lossy(), "workspace saved");
        Ok(SaveOutcome::Saved)
    }

    /// Saves every workspace that holds points, asking `choose_path` for a
    /// destination each time. The first `None` cancels the remaining saves.
    pub async fn save_all<F>(&self, mut choose_path: F) -> AppResult<SaveOutcome>
    where
        F: FnMut(usize) -> Option<PathBuf>,
    {
        let stores = {
            let registry = self.read_registry()?;
            registry
                .entries()
                .iter()
                .map(|entry| entry.store.clone())
                .collect::<Vec<_>>()
        };
        // Ids are positions in the snapshot; each path is written from the
        // captured store even if the registry shifts meanwhile.
        for (id, store) in stores.into_iter().enumerate() {
            if store.lock().await.size() == 0 {
                continue;
            }
            let Some(path) = choose_path(id) else {
                tracing::info!(workspace_id = id, "save all canceled");
                return Ok(SaveOutcome::Cancelled);
            };
            self.write_store(store, &path).await?;
            tracing::info!(workspace_id = id, path = %path.to_string_lossy(), "workspace saved");
        }
        Ok(SaveOutcome::Saved)
    }

    /// Opens a saved file as a new workspace. The file is decoded before
    /// the workspace exists, so a bad file leaves no empty tab behind.
    /// `path == None` means the open dialog was dismissed.
    pub async fn load_workspace(&self, path: Option<&Path>) -> AppResult<Option<usize>> {
        let Some(path) = path else {
            tracing::info!("file load canceled");
            return Ok(None);
        };
        let source_path = path.to_path_buf();
        let result = tokio::task::spawn_blocking(move || RecordStore::load_from_file(&source_path))
            .await
            .map_err(|error| AppError::Internal(error.to_string()))
            .and_then(|result| result);
        let store = self.report(result)?;

        let records = store.size();
        let id = self.write_registry()?.insert(store);
        tracing::info!(workspace_id = id, records, path = %path.to_string_lossy(), "workspace loaded");
        self.listener.on_workspace_created(id);
        Ok(Some(id))
    }

    /// Replaces an existing workspace's contents with a saved file. The
    /// store stays untouched unless the whole file decodes.
    pub async fn restore_workspace(&self, id: usize, path: &Path) -> AppResult<usize> {
        let store = self.store(id)?;
        let mut guard = store.lock_owned().await;
        let source_path = path.to_path_buf();
        let result = tokio::task::spawn_blocking(move || {
            let loaded = RecordStore::load_from_file(&source_path)?;
            *guard = loaded;
            Ok::<usize, AppError>(guard.size())
        })
        .await
        .map_err(|error| AppError::Internal(error.to_string()))
        .and_then(|result| result);
        let records = self.report(result)?;
        tracing::info!(workspace_id = id, records, path = %path.to_string_lossy(), "workspace restored");
        Ok(records)
    }

    pub async fn close_workspace(&self, id: usize, action: CloseAction) -> AppResult<CloseOutcome> {
        self.read_registry()?.key_of(id)?;
        match action {
            CloseAction::Cancel => Ok(CloseOutcome::Kept),
            CloseAction::Discard => {
                self.remove_workspace(id).await?;
                Ok(CloseOutcome::Closed)
            }
            CloseAction::Save(path) => match self.save_workspace(id, path.as_deref()).await? {
                SaveOutcome::Saved => {
                    self.remove_workspace(id).await?;
                    Ok(CloseOutcome::Closed)
                }
                SaveOutcome::Cancelled => Ok(CloseOutcome::Kept),
            },
        }
    }

    /// Stops every auto reload task. Returns how many were running.
    pub async fn shutdown(&self) -> usize {
        let stopped = self.scheduler.stop_all().await;
        tracing::info!(stopped, "atlas core shut down");
        stopped
    }

    fn tick_callback(&self) -> TickCallback {
        let registry = self.registry.clone();
        let listener = self.listener.clone();
        Arc::new(move |key: WorkspaceKey, result: AppResult<ReloadOutcome>| {
            // Resolved per tick: the id may have shifted since the task started.
            let position = match registry.read() {
                Ok(registry) => registry.position_of(key),
                Err(_) => {
                    tracing::warn!(workspace = %key, "workspace registry lock poisoned, dropping tick");
                    return;
                }
            };
            let Some(id) = position else {
                tracing::debug!(workspace = %key, "tick for a removed workspace");
                return;
            };
            match result {
                Ok(outcome) => listener.on_reload_result(id, &outcome),
                Err(error) => listener.on_error(&error.to_string()),
            }
        })
    }

    async fn write_store(&self, store: SharedStore, path: &Path) -> AppResult<()> {
        // Held for the whole write so no reload tick lands mid-save.
        let guard = store.lock_owned().await;
        let target = path.to_path_buf();
        let result = tokio::task::spawn_blocking(move || guard.save_to_file(&target))
            .await
            .map_err(|error| AppError::Internal(error.to_string()))
            .and_then(|result| result);
        self.report(result)
    }

    fn store(&self, id: usize) -> AppResult<SharedStore> {
        self.read_registry()?.get(id)
    }

    fn report<T>(&self, result: AppResult<T>) -> AppResult<T> {
        if let Err(error) = &result {
            self.listener.on_error(&error.to_string());
        }
        result
    }

    fn read_registry(&self) -> AppResult<RwLockReadGuard<'_, WorkspaceRegistry>> {
        self.registry
            .read()
            .map_err(|_| AppError::Internal("workspace registry lock poisoned".to_string()))
    }

    fn write_registry(&self) -> AppResult<RwLockWriteGuard<'_, WorkspaceRegistry>> {
        self.registry
            .write()
            .map_err(|_| AppError::Internal("workspace registry lock poisoned".to_string()))
    }
}
