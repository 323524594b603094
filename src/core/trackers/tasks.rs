// Player-task tracker: completion flips, proximity triggers, and a
// per-tick distance recompute against the local player position.

use std::sync::{Arc, RwLock};
use std::time::Duration;

use crate::core::config::Settings;
use crate::core::engine::policy::EligibilityPolicy;
use crate::core::engine::Engine;
use crate::core::model::{
    EntityData, Reconciliation, TrackedEntity, TransitionDetail, TransitionKind, TriggerValue,
};
use crate::core::source::SnapshotSource;

/// Shared handle to the player's most recent map position, written by
/// the local game-state reader and read by per-tick distance recomputes.
#[derive(Debug, Clone, Default)]
pub struct PlayerPosition {
    inner: Arc<RwLock<Option<[f64; 2]>>>,
}

impl PlayerPosition {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&self, position: [f64; 2]) {
        *self.inner.write().unwrap() = Some(position);
    }

    pub fn get(&self) -> Option<[f64; 2]> {
        *self.inner.read().unwrap()
    }
}

#[derive(Debug, Clone)]
pub struct TaskState {
    pub completed: bool,
    /// Task marker position, in game units.
    pub location: [f64; 2],
    /// Distance from the player. Seeded by the snapshot, then refreshed
    /// every tick from `player` while a position is known.
    pub distance: f64,
    /// Proximity trigger radius; 0 disables the trigger.
    pub trigger_radius: f64,
    pub player: PlayerPosition,
}

// The position handle is plumbing, not state; two tasks are equal when
// their observable fields are.
impl PartialEq for TaskState {
    fn eq(&self, other: &Self) -> bool {
        self.completed == other.completed
            && self.location == other.location
            && self.distance == other.distance
            && self.trigger_radius == other.trigger_radius
    }
}

impl TaskState {
    fn within_radius(&self) -> bool {
        self.trigger_radius > 0.0 && self.distance <= self.trigger_radius
    }
}

impl EntityData for TaskState {
    fn reconcile(&self, incoming: &Self) -> Reconciliation {
        let mut outcome = if self == incoming {
            Reconciliation::unchanged()
        } else {
            Reconciliation::updated()
        };
        if !self.completed && incoming.completed {
            outcome.push(
                TransitionKind::Completed,
                TriggerValue::Flag(false),
                TriggerValue::Flag(true),
            );
        }
        if !self.within_radius() && incoming.within_radius() {
            outcome.push(
                TransitionKind::ThresholdEntered,
                TriggerValue::Amount(self.distance.round() as i64),
                TriggerValue::Amount(incoming.distance.round() as i64),
            );
        }
        outcome
    }

    fn neutral(&self) -> Self {
        Self {
            completed: false,
            ..self.clone()
        }
    }

    fn advance(&mut self, _elapsed: Duration) -> bool {
        let Some([px, py]) = self.player.get() else {
            return false;
        };
        let distance =
            ((px - self.location[0]).powi(2) + (py - self.location[1]).powi(2)).sqrt();
        if (distance - self.distance).abs() < f64::EPSILON {
            return false;
        }
        self.distance = distance;
        true
    }
}

pub struct TaskPolicy;

impl EligibilityPolicy<TaskState> for TaskPolicy {
    fn allows(
        &self,
        settings: &Settings,
        _entity: &TrackedEntity<TaskState>,
        detail: &TransitionDetail,
    ) -> bool {
        match detail.kind {
            TransitionKind::Completed => settings.notify_task_completion,
            TransitionKind::ThresholdEntered => settings.notify_task_proximity,
            _ => false,
        }
    }
}

pub fn task_tracker(
    source: Arc<dyn SnapshotSource<TaskState>>,
    settings: Settings,
) -> Engine<TaskState> {
    Engine::new("tasks", source, Arc::new(TaskPolicy), settings)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn task(completed: bool, distance: f64, radius: f64) -> TaskState {
        TaskState {
            completed,
            location: [0.0, 0.0],
            distance,
            trigger_radius: radius,
            player: PlayerPosition::new(),
        }
    }

    #[test]
    fn test_completion_is_a_transition() {
        let outcome = task(false, 500.0, 0.0).reconcile(&task(true, 500.0, 0.0));
        assert_eq!(outcome.transitions.len(), 1);
        assert_eq!(outcome.transitions[0].kind, TransitionKind::Completed);
    }

    #[test]
    fn test_uncompletion_is_silent() {
        // Daily reset: completed tasks come back unfinished without fanfare.
        let outcome = task(true, 500.0, 0.0).reconcile(&task(false, 500.0, 0.0));
        assert!(outcome.changed);
        assert!(outcome.transitions.is_empty());
    }

    #[test]
    fn test_proximity_entry_is_a_transition() {
        let outcome = task(false, 900.0, 300.0).reconcile(&task(false, 250.0, 300.0));
        assert_eq!(outcome.transitions.len(), 1);
        let detail = &outcome.transitions[0];
        assert_eq!(detail.kind, TransitionKind::ThresholdEntered);
        assert_eq!(detail.previous, TriggerValue::Amount(900));
        assert_eq!(detail.new, TriggerValue::Amount(250));
    }

    #[test]
    fn test_trigger_values_round_instead_of_truncate() {
        let outcome = task(false, 899.6, 300.0).reconcile(&task(false, 249.5, 300.0));
        assert_eq!(outcome.transitions.len(), 1);
        let detail = &outcome.transitions[0];
        assert_eq!(detail.previous, TriggerValue::Amount(900));
        assert_eq!(detail.new, TriggerValue::Amount(250));
    }

    #[test]
    fn test_moving_inside_radius_is_silent() {
        let outcome = task(false, 250.0, 300.0).reconcile(&task(false, 100.0, 300.0));
        assert!(outcome.changed);
        assert!(outcome.transitions.is_empty());
    }

    #[test]
    fn test_zero_radius_disables_proximity() {
        let outcome = task(false, 900.0, 0.0).reconcile(&task(false, 1.0, 0.0));
        assert!(outcome.changed);
        assert!(outcome.transitions.is_empty());
    }

    #[test]
    fn test_completion_and_proximity_can_coincide() {
        let outcome = task(false, 900.0, 300.0).reconcile(&task(true, 250.0, 300.0));
        assert_eq!(outcome.transitions.len(), 2);
    }

    #[test]
    fn test_distance_recomputes_from_player_position() {
        let player = PlayerPosition::new();
        let mut held = TaskState {
            completed: false,
            location: [300.0, 400.0],
            distance: 900.0,
            trigger_radius: 0.0,
            player: player.clone(),
        };

        // No position yet: the snapshot's distance stands.
        assert!(!held.advance(Duration::from_secs(2)));
        assert_eq!(held.distance, 900.0);

        player.set([0.0, 0.0]);
        assert!(held.advance(Duration::from_secs(2)));
        assert_eq!(held.distance, 500.0);

        // Stationary player: nothing to report.
        assert!(!held.advance(Duration::from_secs(2)));
        assert_eq!(held.distance, 500.0);
    }

    #[test]
    fn test_policy_flags() {
        let policy = TaskPolicy;
        let entity = TrackedEntity::new(
            1,
            crate::core::model::EntityKind::Task,
            task(false, 500.0, 300.0),
        );
        let completed = TransitionDetail {
            kind: TransitionKind::Completed,
            previous: TriggerValue::Flag(false),
            new: TriggerValue::Flag(true),
        };
        let nearby = TransitionDetail {
            kind: TransitionKind::ThresholdEntered,
            previous: TriggerValue::Amount(900),
            new: TriggerValue::Amount(250),
        };

        let mut settings = Settings::default();
        assert!(policy.allows(&settings, &entity, &completed));
        assert!(policy.allows(&settings, &entity, &nearby));

        settings.notify_task_completion = false;
        assert!(!policy.allows(&settings, &entity, &completed));
        assert!(policy.allows(&settings, &entity, &nearby));

        settings.notify_task_proximity = false;
        assert!(!policy.allows(&settings, &entity, &nearby));
    }
}
