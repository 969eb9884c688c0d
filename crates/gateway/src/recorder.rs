//! Attempt log persistence.

use std::sync::Arc;

use crate::catalog::{AttemptStatus, ChatLogRecord};
use crate::storage::Repository;

/// Writes one record per attempt, with optional captured I/O for successes.
///
/// Logging is observability, not control flow: a failed write never fails
/// the dispatch.
#[derive(Clone)]
pub struct LogRecorder {
    repo: Arc<dyn Repository>,
}

impl LogRecorder {
    pub fn new(repo: Arc<dyn Repository>) -> Self {
        Self { repo }
    }

    pub async fn record(&self, record: ChatLogRecord) -> Option<i64> {
        match self.repo.insert_chat_log(record).await {
            Ok(id) => Some(id),
            Err(e) => {
                log::error!("failed to persist chat log: {e}");
                None
            }
        }
    }

    /// Record an attempt and, for successful attempts of models with I/O
    /// logging enabled, the captured request/response text.
    pub async fn record_with_io(&self, record: ChatLogRecord, io_log: bool, input: &str, output: &str) {
        let capture = io_log && record.status == AttemptStatus::Success;

        let Some(log_id) = self.record(record).await else {
            return;
        };

        if !capture {
            return;
        }

        if let Err(e) = self
            .repo
            .insert_chat_io(log_id, input.to_string(), output.to_string())
            .await
        {
            log::error!("failed to persist chat I/O for log {log_id}: {e}");
        }
    }
}
