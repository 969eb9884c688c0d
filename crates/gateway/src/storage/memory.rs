//! In-memory repository used by tests and standalone runs.

use std::collections::HashMap;
use std::sync::RwLock;

use async_trait::async_trait;

use crate::catalog::{Binding, ChatLogRecord, Model, Provider, Settings};

use super::{Repository, StoreError};

#[derive(Default)]
struct Tables {
    providers: HashMap<i64, Provider>,
    models: HashMap<i64, Model>,
    bindings: HashMap<i64, Binding>,
    logs: Vec<(i64, ChatLogRecord)>,
    ios: HashMap<i64, (String, String)>,
    settings: Settings,
    next_log_id: i64,
}

/// A repository backed by process memory.
///
/// Writes take the table lock briefly; nothing is held across await points.
pub struct MemoryRepository {
    tables: RwLock<Tables>,
}

impl MemoryRepository {
    pub fn new(settings: Settings) -> Self {
        Self {
            tables: RwLock::new(Tables {
                settings,
                next_log_id: 1,
                ..Default::default()
            }),
        }
    }

    pub fn insert_provider(&self, provider: Provider) {
        self.write().providers.insert(provider.id, provider);
    }

    pub fn insert_model(&self, model: Model) {
        self.write().models.insert(model.id, model);
    }

    pub fn insert_binding(&self, binding: Binding) {
        self.write().bindings.insert(binding.id, binding);
    }

    /// Current weight of a binding, for tests and admin introspection.
    pub fn binding_weight(&self, id: i64) -> Option<i64> {
        self.read().bindings.get(&id).map(|b| b.weight)
    }

    /// Snapshot of all recorded attempt logs, oldest first.
    pub fn chat_logs(&self) -> Vec<(i64, ChatLogRecord)> {
        self.read().logs.clone()
    }

    /// Captured I/O blob for a log id.
    pub fn chat_io(&self, log_id: i64) -> Option<(String, String)> {
        self.read().ios.get(&log_id).cloned()
    }

    pub fn set_settings(&self, settings: Settings) {
        self.write().settings = settings;
    }

    fn read(&self) -> std::sync::RwLockReadGuard<'_, Tables> {
        self.tables.read().unwrap_or_else(|e| e.into_inner())
    }

    fn write(&self) -> std::sync::RwLockWriteGuard<'_, Tables> {
        self.tables.write().unwrap_or_else(|e| e.into_inner())
    }
}

#[async_trait]
impl Repository for MemoryRepository {
    async fn model_by_name(&self, name: &str) -> Result<Option<Model>, StoreError> {
        Ok(self.read().models.values().find(|m| m.name == name).cloned())
    }

    async fn models(&self) -> Result<Vec<Model>, StoreError> {
        let mut models: Vec<_> = self.read().models.values().cloned().collect();
        models.sort_by_key(|m| m.id);
        Ok(models)
    }

    async fn bindings_for_model(&self, model_id: i64) -> Result<Vec<Binding>, StoreError> {
        let mut bindings: Vec<_> = self
            .read()
            .bindings
            .values()
            .filter(|b| b.model_id == model_id)
            .cloned()
            .collect();
        bindings.sort_by_key(|b| b.id);
        Ok(bindings)
    }

    async fn provider(&self, id: i64) -> Result<Option<Provider>, StoreError> {
        Ok(self.read().providers.get(&id).cloned())
    }

    async fn decay_binding_weight(&self, id: i64, step: i64) -> Result<(), StoreError> {
        let mut tables = self.write();
        let binding = tables.bindings.get_mut(&id).ok_or(StoreError::BindingNotFound(id))?;
        binding.weight = (binding.weight - step).max(1);
        Ok(())
    }

    async fn update_binding_weight(&self, id: i64, weight: i64) -> Result<(), StoreError> {
        let mut tables = self.write();
        let binding = tables.bindings.get_mut(&id).ok_or(StoreError::BindingNotFound(id))?;
        binding.weight = weight.max(0);
        Ok(())
    }

    async fn reset_weights(&self, model_id: Option<i64>, weight: i64) -> Result<u64, StoreError> {
        let mut tables = self.write();
        let mut updated = 0;

        for binding in tables.bindings.values_mut() {
            if model_id.is_none_or(|id| binding.model_id == id) {
                binding.weight = weight.max(0);
                updated += 1;
            }
        }

        Ok(updated)
    }

    async fn insert_chat_log(&self, record: ChatLogRecord) -> Result<i64, StoreError> {
        let mut tables = self.write();
        let id = tables.next_log_id;
        tables.next_log_id += 1;
        tables.logs.push((id, record));
        Ok(id)
    }

    async fn insert_chat_io(&self, log_id: i64, input: String, output: String) -> Result<(), StoreError> {
        self.write().ios.insert(log_id, (input, output));
        Ok(())
    }

    async fn settings(&self) -> Result<Settings, StoreError> {
        Ok(self.read().settings.clone())
    }
}
