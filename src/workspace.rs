use crate::errors::{AppError, AppResult};
use crate::models::WorkspaceKey;
use crate::store::RecordStore;
use std::sync::Arc;
use tokio::sync::Mutex;

pub type SharedStore = Arc<Mutex<RecordStore>>;

#[derive(Debug, Clone)]
pub struct WorkspaceEntry {
    pub key: WorkspaceKey,
    pub store: SharedStore,
}

/// Open workspaces in tab order. A workspace id is its position, so
/// removing one shifts every later id down by one.
#[derive(Debug, Default)]
pub struct WorkspaceRegistry {
    entries: Vec<WorkspaceEntry>,
}

impl WorkspaceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn create(&mut self) -> usize {
        self.insert(RecordStore::new())
    }

    pub fn insert(&mut self, store: RecordStore) -> usize {
        self.entries.push(WorkspaceEntry {
            key: WorkspaceKey::new(),
            store: Arc::new(Mutex::new(store)),
        });
        self.entries.len() - 1
    }

    pub fn remove(&mut self, id: usize) -> AppResult<WorkspaceEntry> {
        self.check(id)?;
        Ok(self.entries.remove(id))
    }

    pub fn get(&self, id: usize) -> AppResult<SharedStore> {
        self.entry(id).map(|entry| entry.store.clone())
    }

    pub fn entry(&self, id: usize) -> AppResult<&WorkspaceEntry> {
        self.check(id)?;
        Ok(&self.entries[id])
    }

    pub fn key_of(&self, id: usize) -> AppResult<WorkspaceKey> {
        self.entry(id).map(|entry| entry.key)
    }

    pub fn position_of(&self, key: WorkspaceKey) -> Option<usize> {
        self.entries.iter().position(|entry| entry.key == key)
    }

    pub fn entries(&self) -> &[WorkspaceEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn check(&self, id: usize) -> AppResult<()> {
        if id >= self.entries.len() {
            return Err(AppError::OutOfRange {
                id,
                len: self.entries.len(),
            });
        }
        Ok(())
    }
}
