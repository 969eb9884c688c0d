//! Repository interface over the persistent store.
//!
//! The store itself lives outside this crate; the gateway only depends on
//! the queries below. [`MemoryRepository`] backs tests and standalone runs.

mod memory;

pub use memory::MemoryRepository;

use async_trait::async_trait;
use thiserror::Error;

use crate::catalog::{Binding, ChatLogRecord, Model, Provider, Settings};

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("store query failed: {0}")]
    Query(String),

    #[error("binding {0} not found")]
    BindingNotFound(i64),
}

/// The queries the dispatch pipeline needs.
///
/// Every operation is transactional on the store side. Weight decay is a
/// single row-level update so concurrent failures on the same binding never
/// race past the floor.
#[async_trait]
pub trait Repository: Send + Sync {
    /// Resolve a public model name. `None` when unknown.
    async fn model_by_name(&self, name: &str) -> Result<Option<Model>, StoreError>;

    /// All models, for the aggregate listing endpoint.
    async fn models(&self) -> Result<Vec<Model>, StoreError>;

    /// All bindings of a model, enabled or not.
    async fn bindings_for_model(&self, model_id: i64) -> Result<Vec<Binding>, StoreError>;

    async fn provider(&self, id: i64) -> Result<Option<Provider>, StoreError>;

    /// `UPDATE bindings SET weight = MAX(weight - step, 1) WHERE id = ?`.
    async fn decay_binding_weight(&self, id: i64, step: i64) -> Result<(), StoreError>;

    /// Operator override; unlike decay this may set any non-negative value.
    async fn update_binding_weight(&self, id: i64, weight: i64) -> Result<(), StoreError>;

    /// Set the weight of every binding (of one model, or all models) to
    /// `weight`. Returns the number of rows updated.
    async fn reset_weights(&self, model_id: Option<i64>, weight: i64) -> Result<u64, StoreError>;

    /// Append one attempt record. Returns the log id.
    async fn insert_chat_log(&self, record: ChatLogRecord) -> Result<i64, StoreError>;

    /// Attach captured request/response text to a log row.
    async fn insert_chat_io(&self, log_id: i64, input: String, output: String) -> Result<(), StoreError>;

    async fn settings(&self) -> Result<Settings, StoreError>;
}
