// WvW objective tracker: ownership flips with home-affinity notification
// rules, a post-capture hold timer, and match-change context resets.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use lazy_static::lazy_static;

use crate::core::config::Settings;
use crate::core::engine::policy::EligibilityPolicy;
use crate::core::engine::Engine;
use crate::core::model::{
    EntityData, EntityKind, Reconciliation, TeamColor, TrackedEntity, TransitionDetail,
    TransitionKind, TriggerValue, WvwMap,
};
use crate::core::source::SnapshotSource;

/// How long a freshly captured objective holds its defense bonus.
pub const HOLD_TIMER: Duration = Duration::from_secs(300);

lazy_static! {
    /// Objective kinds exempt from the hold timer. Bloodlust-style
    /// objectives flip freely; callers that disagree can construct
    /// `ObjectiveState` directly instead of via `for_kind`.
    pub static ref DEFAULT_HOLD_EXEMPT: HashSet<EntityKind> =
        [EntityKind::Bloodlust].into_iter().collect();
}

#[derive(Debug, Clone, PartialEq)]
pub struct ObjectiveState {
    pub map: WvwMap,
    pub owner: TeamColor,
    /// When the current owner captured it, as reported by the snapshot.
    pub flipped_at: Option<DateTime<Utc>>,
    /// Derived hold-timer countdown, recomputed each tick.
    pub hold_remaining: Duration,
    pub hold_exempt: bool,
}

impl ObjectiveState {
    pub fn for_kind(
        kind: EntityKind,
        map: WvwMap,
        owner: TeamColor,
        flipped_at: Option<DateTime<Utc>>,
    ) -> Self {
        Self {
            map,
            owner,
            flipped_at,
            hold_remaining: Duration::ZERO,
            hold_exempt: DEFAULT_HOLD_EXEMPT.contains(&kind),
        }
    }

    fn compute_hold_remaining(&self) -> Duration {
        if self.hold_exempt {
            return Duration::ZERO;
        }
        let Some(flipped_at) = self.flipped_at else {
            return Duration::ZERO;
        };
        let held_for = Utc::now()
            .signed_duration_since(flipped_at)
            .to_std()
            .unwrap_or(Duration::ZERO);
        HOLD_TIMER.saturating_sub(held_for)
    }
}

impl EntityData for ObjectiveState {
    fn reconcile(&self, incoming: &Self) -> Reconciliation {
        let mut outcome = if self == incoming {
            Reconciliation::unchanged()
        } else {
            Reconciliation::updated()
        };
        if self.owner != incoming.owner {
            outcome.push(
                TransitionKind::OwnerChanged,
                TriggerValue::Owner(self.owner),
                TriggerValue::Owner(incoming.owner),
            );
        }
        outcome
    }

    fn neutral(&self) -> Self {
        Self {
            owner: TeamColor::Neutral,
            flipped_at: None,
            hold_remaining: Duration::ZERO,
            ..self.clone()
        }
    }

    fn advance(&mut self, _elapsed: Duration) -> bool {
        let remaining = self.compute_hold_remaining();
        if remaining == self.hold_remaining {
            return false;
        }
        self.hold_remaining = remaining;
        true
    }
}

/// Home-affinity rules plus the per-map opt-out. "Takes" fires when the new
/// owner is the home team; "loses" when the previous owner was.
pub struct WvwPolicy;

impl EligibilityPolicy<ObjectiveState> for WvwPolicy {
    fn allows(
        &self,
        settings: &Settings,
        entity: &TrackedEntity<ObjectiveState>,
        detail: &TransitionDetail,
    ) -> bool {
        if detail.kind != TransitionKind::OwnerChanged {
            return false;
        }
        if !settings.wvw_map_enabled(entity.data.map) {
            return false;
        }
        let (TriggerValue::Owner(previous), TriggerValue::Owner(new)) =
            (&detail.previous, &detail.new)
        else {
            return false;
        };
        (settings.notify_when_home_takes_objective && *new == settings.home_team)
            || (settings.notify_when_home_loses_objective
                && *previous == settings.home_team
                && *new != settings.home_team)
    }
}

pub fn wvw_tracker(
    source: Arc<dyn SnapshotSource<ObjectiveState>>,
    settings: Settings,
) -> Engine<ObjectiveState> {
    Engine::new("wvw", source, Arc::new(WvwPolicy), settings)
}
