// View-state projection: the engine-owned state the presentation layer
// observes. Mutations happen only on the engine's own tasks; consumers see
// them as broadcast events plus clone-on-read snapshot accessors.

use std::collections::{HashMap, HashSet};
use std::time::{Duration, Instant};

use chrono::Utc;
use serde::Serialize;
use tokio::sync::broadcast;

use super::model::{
    EntityData, EntityId, Notification, NotificationKey, TrackedEntity, TransitionDetail,
};
use super::source::Snapshot;

/// Externally visible change to the projection.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum ViewEvent {
    EntityAdded(EntityId),
    EntityUpdated(EntityId),
    NotificationAdded(Notification),
    NotificationDismissing(NotificationKey),
    NotificationRemoved(NotificationKey),
}

pub(crate) struct ViewState<D> {
    context: Option<String>,
    /// Insertion order of `entities`, stable across passes.
    order: Vec<EntityId>,
    entities: HashMap<EntityId, TrackedEntity<D>>,
    notifications: Vec<Notification>,
    /// When a notification for this key was last shown, for the re-notify
    /// cooldown window.
    shown: HashMap<NotificationKey, Instant>,
    events: broadcast::Sender<ViewEvent>,
}

impl<D: EntityData> ViewState<D> {
    pub(crate) fn new(events: broadcast::Sender<ViewEvent>) -> Self {
        Self {
            context: None,
            order: Vec::new(),
            entities: HashMap::new(),
            notifications: Vec::new(),
            shown: HashMap::new(),
            events,
        }
    }

    fn emit(&self, event: ViewEvent) {
        // No receivers is fine; the engine runs headless in tests.
        let _ = self.events.send(event);
    }

    pub(crate) fn entity(&self, id: EntityId) -> Option<&TrackedEntity<D>> {
        self.entities.get(&id)
    }

    /// Tracked entities in insertion order.
    pub(crate) fn entities(&self) -> Vec<TrackedEntity<D>> {
        self.order
            .iter()
            .filter_map(|id| self.entities.get(id))
            .cloned()
            .collect()
    }

    pub(crate) fn notifications(&self) -> Vec<Notification> {
        self.notifications.clone()
    }

    /// Run cheap per-tick recomputes on every held entity.
    pub(crate) fn advance_all(&mut self, elapsed: Duration) {
        let mut changed = Vec::new();
        for id in &self.order {
            if let Some(entity) = self.entities.get_mut(id) {
                if entity.data.advance(elapsed) {
                    changed.push(*id);
                }
            }
        }
        for id in changed {
            self.emit(ViewEvent::EntityUpdated(id));
        }
    }

    /// Diff a fetched snapshot against held state and replace it wholesale.
    /// Returns the transitions to hand to the notification manager, paired
    /// with the post-update entity they belong to.
    pub(crate) fn apply_snapshot(
        &mut self,
        snapshot: Snapshot<D>,
    ) -> Vec<(TrackedEntity<D>, TransitionDetail)> {
        let context_reset = matches!(
            (&self.context, &snapshot.context),
            (Some(held), Some(new)) if held != new
        );
        if context_reset {
            log::info!(
                "Context changed ({:?} -> {:?}); resetting tracked state",
                self.context,
                snapshot.context
            );
            self.reset_for_context_change();
        }
        self.context = snapshot.context;

        let mut transitions = Vec::new();
        let mut seen = HashSet::new();

        for remote in snapshot.entities {
            seen.insert(remote.id);
            match self.entities.get_mut(&remote.id) {
                None => {
                    let entity = TrackedEntity::new(remote.id, remote.kind, remote.data);
                    self.order.push(remote.id);
                    self.entities.insert(remote.id, entity);
                    self.emit(ViewEvent::EntityAdded(remote.id));
                }
                Some(held) => {
                    if context_reset {
                        // Adopt the post-reset values silently.
                        held.data = remote.data;
                        held.stale = false;
                        self.emit(ViewEvent::EntityUpdated(remote.id));
                        continue;
                    }
                    let outcome = held.data.reconcile(&remote.data);
                    let resurrected = held.stale;
                    if outcome.changed || resurrected {
                        held.data = remote.data;
                        held.stale = false;
                        if !outcome.transitions.is_empty() {
                            held.last_transition = Some(Utc::now());
                        }
                        let entity = held.clone();
                        for detail in outcome.transitions {
                            transitions.push((entity.clone(), detail));
                        }
                        self.emit(ViewEvent::EntityUpdated(remote.id));
                    }
                }
            }
        }

        // Held entities missing from the snapshot go stale: transition-
        // relevant fields reset to the neutral baseline, but the entity is
        // kept so a later snapshot can resurrect it (e.g. a map reset).
        let stale_ids: Vec<EntityId> = self
            .order
            .iter()
            .filter(|id| !seen.contains(id))
            .copied()
            .collect();
        for id in stale_ids {
            if let Some(held) = self.entities.get_mut(&id) {
                if !held.stale {
                    held.data = held.data.neutral();
                    held.stale = true;
                    self.emit(ViewEvent::EntityUpdated(id));
                }
            }
        }

        transitions
    }

    /// Context change: every entity back to the neutral baseline, cooldowns
    /// cleared, live notifications dropped. No notifications fire.
    fn reset_for_context_change(&mut self) {
        for id in &self.order {
            if let Some(entity) = self.entities.get_mut(id) {
                entity.data = entity.data.neutral();
                entity.last_transition = None;
                entity.stale = false;
            }
        }
        self.shown.clear();
        let dropped: Vec<NotificationKey> =
            self.notifications.iter().map(Notification::key).collect();
        self.notifications.clear();
        for key in dropped {
            self.emit(ViewEvent::NotificationRemoved(key));
        }
    }

    pub(crate) fn has_live_notification(&self, key: NotificationKey) -> bool {
        self.notifications.iter().any(|n| n.key() == key)
    }

    pub(crate) fn shown_at(&self, key: NotificationKey) -> Option<Instant> {
        self.shown.get(&key).copied()
    }

    pub(crate) fn notification(&self, key: NotificationKey) -> Option<&Notification> {
        self.notifications.iter().find(|n| n.key() == key)
    }

    pub(crate) fn push_notification(&mut self, notification: Notification) {
        self.shown.insert(notification.key(), Instant::now());
        self.emit(ViewEvent::NotificationAdded(notification.clone()));
        self.notifications.push(notification);
    }

    /// Returns false if the notification is already gone (e.g. dropped by a
    /// context reset) so the dismissal task can bail out.
    pub(crate) fn mark_dismissing(&mut self, key: NotificationKey) -> bool {
        let Some(notification) = self.notifications.iter_mut().find(|n| n.key() == key) else {
            return false;
        };
        notification.dismissing = true;
        self.emit(ViewEvent::NotificationDismissing(key));
        true
    }

    pub(crate) fn remove_notification(&mut self, key: NotificationKey) {
        let before = self.notifications.len();
        self.notifications.retain(|n| n.key() != key);
        if self.notifications.len() != before {
            self.emit(ViewEvent::NotificationRemoved(key));
        }
    }
}
