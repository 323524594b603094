// World-event tracker: world bosses and meta events moving through their
// warmup/active cycle, with a locally ticking countdown to the next
// occurrence.

use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::core::config::Settings;
use crate::core::engine::policy::EligibilityPolicy;
use crate::core::engine::Engine;
use crate::core::model::{
    EntityData, EntityKind, Reconciliation, TrackedEntity, TransitionDetail, TransitionKind,
    TriggerValue,
};
use crate::core::source::SnapshotSource;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EventPhase {
    Inactive,
    Warmup,
    Active,
}

#[derive(Debug, Clone, PartialEq)]
pub struct WorldEventState {
    pub phase: EventPhase,
    /// Countdown to the next occurrence; ticks down locally between
    /// snapshots.
    pub time_until_next: Duration,
}

impl EntityData for WorldEventState {
    fn reconcile(&self, incoming: &Self) -> Reconciliation {
        let mut outcome = if self == incoming {
            Reconciliation::unchanged()
        } else {
            Reconciliation::updated()
        };
        if self.phase != incoming.phase {
            if incoming.phase == EventPhase::Active {
                outcome.push(
                    TransitionKind::Activated,
                    TriggerValue::Flag(false),
                    TriggerValue::Flag(true),
                );
            } else if self.phase == EventPhase::Active {
                outcome.push(
                    TransitionKind::Deactivated,
                    TriggerValue::Flag(true),
                    TriggerValue::Flag(false),
                );
            }
        }
        outcome
    }

    fn neutral(&self) -> Self {
        Self {
            phase: EventPhase::Inactive,
            time_until_next: Duration::ZERO,
        }
    }

    fn advance(&mut self, elapsed: Duration) -> bool {
        if self.time_until_next.is_zero() {
            return false;
        }
        self.time_until_next = self.time_until_next.saturating_sub(elapsed);
        true
    }
}

/// Per-event-kind enable flags; only activations notify.
pub struct WorldEventPolicy;

impl EligibilityPolicy<WorldEventState> for WorldEventPolicy {
    fn allows(
        &self,
        settings: &Settings,
        entity: &TrackedEntity<WorldEventState>,
        detail: &TransitionDetail,
    ) -> bool {
        if detail.kind != TransitionKind::Activated {
            return false;
        }
        match entity.kind {
            EntityKind::WorldBoss => settings.notify_world_bosses,
            EntityKind::MetaEvent => settings.notify_meta_events,
            _ => false,
        }
    }
}

pub fn world_event_tracker(
    source: Arc<dyn SnapshotSource<WorldEventState>>,
    settings: Settings,
) -> Engine<WorldEventState> {
    Engine::new("events", source, Arc::new(WorldEventPolicy), settings)
}
