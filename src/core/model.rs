// Shared vocabulary for tracked entities, transitions and notifications.

use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Stable identity of a remote-observable thing.
pub type EntityId = u64;

/// Team colors used by WvW objectives and home-affinity rules.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum TeamColor {
    #[default]
    Neutral,
    Red,
    Blue,
    Green,
}

/// The four WvW maps, used by per-map notification flags.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum WvwMap {
    EternalBattlegrounds,
    RedBorderlands,
    BlueBorderlands,
    GreenBorderlands,
}

/// Classification of a tracked entity, carried for display and policy checks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EntityKind {
    // World events
    WorldBoss,
    MetaEvent,
    // WvW objectives
    Camp,
    Tower,
    Keep,
    Castle,
    Bloodlust,
    // Commerce
    PriceWatch,
    // Player tasks
    Task,
}

/// A watched-boundary crossing detected during reconciliation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TransitionKind {
    OwnerChanged,
    Activated,
    Deactivated,
    ThresholdEntered,
    Completed,
}

/// Value that crossed the watched boundary.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum TriggerValue {
    Owner(TeamColor),
    Flag(bool),
    Amount(i64),
    Text(String),
}

/// One detected transition: what changed, from what, to what.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransitionDetail {
    pub kind: TransitionKind,
    pub previous: TriggerValue,
    pub new: TriggerValue,
}

/// Outcome of diffing held entity data against an incoming snapshot entry.
#[derive(Debug, Clone, Default)]
pub struct Reconciliation {
    /// Any view-relevant field changed (including transition fields).
    pub changed: bool,
    /// Watched-boundary crossings, in detection order.
    pub transitions: Vec<TransitionDetail>,
}

impl Reconciliation {
    pub fn unchanged() -> Self {
        Self::default()
    }

    pub fn updated() -> Self {
        Self {
            changed: true,
            transitions: Vec::new(),
        }
    }

    pub fn push(&mut self, kind: TransitionKind, previous: TriggerValue, new: TriggerValue) {
        self.changed = true;
        self.transitions.push(TransitionDetail {
            kind,
            previous,
            new,
        });
    }
}

/// Per-domain diff semantics the generic engine is parameterized over.
pub trait EntityData: Clone + Send + Sync + 'static {
    /// Classify incoming remote fields against held fields.
    fn reconcile(&self, incoming: &Self) -> Reconciliation;

    /// Baseline the entity falls back to when stale or on a context reset.
    fn neutral(&self) -> Self;

    /// Per-tick local recompute (countdowns, distances). Returns true if the
    /// view changed. Never produces transitions.
    fn advance(&mut self, _elapsed: Duration) -> bool {
        false
    }
}

/// A remote-observable thing held by the engine. Identity is immutable;
/// `data` is replaced wholesale on each reconciliation pass.
#[derive(Debug, Clone)]
pub struct TrackedEntity<D> {
    pub id: EntityId,
    pub kind: EntityKind,
    pub data: D,
    /// Stamp of the most recent watched-boundary crossing.
    pub last_transition: Option<DateTime<Utc>>,
    /// Missing from the last snapshot; data held at the neutral baseline
    /// until a later snapshot resurrects it.
    pub stale: bool,
}

impl<D> TrackedEntity<D> {
    pub fn new(id: EntityId, kind: EntityKind, data: D) -> Self {
        Self {
            id,
            kind,
            data,
            last_transition: None,
            stale: false,
        }
    }
}

/// Dedupe key: at most one live notification per entity and transition kind.
pub type NotificationKey = (EntityId, TransitionKind);

/// A time-boxed user notification.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Notification {
    pub entity_id: EntityId,
    pub kind: TransitionKind,
    pub previous: TriggerValue,
    pub value: TriggerValue,
    pub created_at: DateTime<Utc>,
    /// Set once when the dismissal sequence starts its fade phase.
    pub dismissing: bool,
}

impl Notification {
    pub fn key(&self) -> NotificationKey {
        (self.entity_id, self.kind)
    }

    pub(crate) fn detail(&self) -> TransitionDetail {
        TransitionDetail {
            kind: self.kind,
            previous: self.previous.clone(),
            new: self.value.clone(),
        }
    }
}
