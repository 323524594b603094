// Notification manager: eligibility gating, per-key dedupe and cooldown,
// and the timed show -> fade -> remove dismissal sequence.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;

use super::EngineShared;
use crate::core::model::{
    EntityData, Notification, NotificationKey, TrackedEntity, TransitionDetail,
};

/// Pause between the fade signal and removal, so the presentation layer can
/// render the fade.
pub(crate) const FADE_GRACE: Duration = Duration::from_millis(250);

impl<D: EntityData> EngineShared<D> {
    /// Propose a notification for a detected transition. No-ops when the
    /// eligibility policy denies it, when one is already live for the same
    /// `(entity, kind)` key, or when the key is still inside the re-notify
    /// cooldown window.
    pub(crate) fn try_notify(shared: &Arc<Self>, entity: &TrackedEntity<D>, detail: TransitionDetail) {
        let settings = shared.settings.read().unwrap().clone();
        if !shared.policy.allows(&settings, entity, &detail) {
            return;
        }

        let key: NotificationKey = (entity.id, detail.kind);
        let cooldown = settings.reset_cooldown();
        {
            let mut view = shared.view.lock().unwrap();
            if view.has_live_notification(key) {
                return;
            }
            if let Some(shown_at) = view.shown_at(key) {
                if shown_at.elapsed() < cooldown {
                    log::debug!(
                        "{}: notification for {:?} suppressed by cooldown",
                        shared.label,
                        key
                    );
                    return;
                }
            }
            view.push_notification(Notification {
                entity_id: entity.id,
                kind: detail.kind,
                previous: detail.previous,
                value: detail.new,
                created_at: Utc::now(),
                dismissing: false,
            });
        }
        log::info!(
            "{}: notification raised for entity {} ({:?})",
            shared.label,
            entity.id,
            key.1
        );

        let task = shared.clone();
        tokio::spawn(async move {
            task.run_dismissal(key).await;
        });
    }

    /// Show -> fade -> remove. A zero duration means sticky: the
    /// notification only clears when a settings change turns its
    /// eligibility false.
    async fn run_dismissal(self: Arc<Self>, key: NotificationKey) {
        let duration = { self.settings.read().unwrap().notification_duration() };
        let mut versions = self.settings_version.subscribe();
        versions.borrow_and_update();

        if duration.is_zero() {
            loop {
                if versions.changed().await.is_err() {
                    return;
                }
                versions.borrow_and_update();
                if !self.still_eligible(key) {
                    break;
                }
            }
        } else {
            let deadline = tokio::time::Instant::now() + duration;
            loop {
                tokio::select! {
                    _ = tokio::time::sleep_until(deadline) => break,
                    changed = versions.changed() => {
                        if changed.is_err() {
                            break;
                        }
                        versions.borrow_and_update();
                        if !self.still_eligible(key) {
                            break;
                        }
                    }
                }
            }
        }

        // Gone already (context reset); nothing to fade.
        let marked = { self.view.lock().unwrap().mark_dismissing(key) };
        if !marked {
            return;
        }
        tokio::time::sleep(FADE_GRACE).await;
        self.view.lock().unwrap().remove_notification(key);
    }

    /// Re-evaluate eligibility for a live notification against the current
    /// settings snapshot.
    fn still_eligible(&self, key: NotificationKey) -> bool {
        let settings = self.settings.read().unwrap().clone();
        let view = self.view.lock().unwrap();
        let Some(notification) = view.notification(key) else {
            return false;
        };
        let Some(entity) = view.entity(notification.entity_id) else {
            return false;
        };
        self.policy.allows(&settings, entity, &notification.detail())
    }
}
