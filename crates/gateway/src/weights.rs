//! Automatic weight decay and operator resets.

use std::sync::Arc;

use crate::catalog::{Binding, Settings};
use crate::error::GatewayError;
use crate::storage::Repository;

/// Applies weight decay after failed attempts and handles operator resets.
///
/// There is no automatic restoration: weights only go back up through
/// [`WeightController::reset`] or a direct binding edit.
#[derive(Clone)]
pub struct WeightController {
    repo: Arc<dyn Repository>,
}

impl WeightController {
    pub fn new(repo: Arc<dyn Repository>) -> Self {
        Self { repo }
    }

    /// Called by the dispatcher after every failed attempt.
    ///
    /// A failed decay never fails the request; it only loses one step of
    /// balancing feedback.
    pub async fn on_failure(&self, binding: &Binding, settings: &Settings) {
        if !settings.auto_weight_decay {
            return;
        }

        let step = settings.auto_weight_decay_step.max(0);

        if let Err(e) = self.repo.decay_binding_weight(binding.id, step).await {
            log::error!("failed to decay weight of binding {}: {e}", binding.id);
        }
    }

    /// Operator command: restore weights to the configured default.
    ///
    /// `model_id = None` resets every binding. Returns the number updated.
    pub async fn reset(&self, model_id: Option<i64>) -> Result<u64, GatewayError> {
        let settings = self.repo.settings().await?;

        let updated = self
            .repo
            .reset_weights(model_id, settings.auto_weight_decay_default)
            .await?;

        log::info!(
            "reset weights of {updated} bindings to {}",
            settings.auto_weight_decay_default
        );

        Ok(updated)
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use crate::catalog::Capabilities;
    use crate::storage::MemoryRepository;

    use super::*;

    fn binding(id: i64, model_id: i64, weight: i64) -> Binding {
        Binding {
            id,
            model_id,
            provider_id: 1,
            provider_model: "m".to_string(),
            capabilities: Capabilities::default(),
            with_header: false,
            custom_headers: BTreeMap::new(),
            weight,
            enabled: None,
        }
    }

    fn repo_with(bindings: Vec<Binding>, settings: Settings) -> Arc<MemoryRepository> {
        let repo = Arc::new(MemoryRepository::new(settings));
        for b in bindings {
            repo.insert_binding(b);
        }
        repo
    }

    #[tokio::test]
    async fn decay_floors_at_one() {
        let settings = Settings {
            auto_weight_decay: true,
            auto_weight_decay_step: 4,
            ..Default::default()
        };

        let repo = repo_with(vec![binding(1, 1, 6)], settings.clone());
        let controller = WeightController::new(repo.clone());
        let target = binding(1, 1, 6);

        controller.on_failure(&target, &settings).await;
        assert_eq!(repo.binding_weight(1), Some(2));

        controller.on_failure(&target, &settings).await;
        assert_eq!(repo.binding_weight(1), Some(1));

        controller.on_failure(&target, &settings).await;
        assert_eq!(repo.binding_weight(1), Some(1));
    }

    #[tokio::test]
    async fn decay_disabled_leaves_weight_untouched() {
        let settings = Settings {
            auto_weight_decay: false,
            ..Default::default()
        };

        let repo = repo_with(vec![binding(1, 1, 6)], settings.clone());
        let controller = WeightController::new(repo.clone());

        controller.on_failure(&binding(1, 1, 6), &settings).await;
        assert_eq!(repo.binding_weight(1), Some(6));
    }

    #[tokio::test]
    async fn reset_restores_default_and_counts() {
        let settings = Settings {
            auto_weight_decay_default: 10,
            ..Default::default()
        };

        let repo = repo_with(
            vec![binding(1, 1, 2), binding(2, 1, 3), binding(3, 2, 4)],
            settings,
        );
        let controller = WeightController::new(repo.clone());

        let updated = controller.reset(Some(1)).await.unwrap();
        assert_eq!(updated, 2);
        assert_eq!(repo.binding_weight(1), Some(10));
        assert_eq!(repo.binding_weight(2), Some(10));
        assert_eq!(repo.binding_weight(3), Some(4));

        let updated = controller.reset(None).await.unwrap();
        assert_eq!(updated, 3);
        assert_eq!(repo.binding_weight(3), Some(10));
    }
}
