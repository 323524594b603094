// Trading-post price watches: notify when a price enters the configured
// band. With both bounds enabled the band is their conjunction; with one
// bound enabled only that edge is tested.

use std::sync::Arc;

use crate::core::config::Settings;
use crate::core::engine::policy::EligibilityPolicy;
use crate::core::engine::Engine;
use crate::core::model::{
    EntityData, Reconciliation, TrackedEntity, TransitionDetail, TransitionKind, TriggerValue,
};
use crate::core::source::SnapshotSource;

#[derive(Debug, Clone, PartialEq)]
pub struct PriceWatchState {
    /// Current unit price, in copper.
    pub unit_price: i64,
    /// Price must be at or below this to satisfy the band.
    pub upper_limit: Option<i64>,
    /// Price must be at or above this to satisfy the band.
    pub lower_limit: Option<i64>,
}

impl PriceWatchState {
    pub fn in_band(&self) -> bool {
        if self.upper_limit.is_none() && self.lower_limit.is_none() {
            return false;
        }
        self.upper_limit.map_or(true, |upper| self.unit_price <= upper)
            && self.lower_limit.map_or(true, |lower| self.unit_price >= lower)
    }
}

impl EntityData for PriceWatchState {
    fn reconcile(&self, incoming: &Self) -> Reconciliation {
        let mut outcome = if self == incoming {
            Reconciliation::unchanged()
        } else {
            Reconciliation::updated()
        };
        // Only entering the band counts; lingering inside it re-notifies
        // nothing, and leaving it is a silent update.
        if !self.in_band() && incoming.in_band() {
            outcome.push(
                TransitionKind::ThresholdEntered,
                TriggerValue::Amount(self.unit_price),
                TriggerValue::Amount(incoming.unit_price),
            );
        }
        outcome
    }

    fn neutral(&self) -> Self {
        Self {
            unit_price: 0,
            ..self.clone()
        }
    }
}

pub struct CommercePolicy;

impl EligibilityPolicy<PriceWatchState> for CommercePolicy {
    fn allows(
        &self,
        settings: &Settings,
        _entity: &TrackedEntity<PriceWatchState>,
        detail: &TransitionDetail,
    ) -> bool {
        detail.kind == TransitionKind::ThresholdEntered && settings.notify_price_watches
    }
}

pub fn commerce_tracker(
    source: Arc<dyn SnapshotSource<PriceWatchState>>,
    settings: Settings,
) -> Engine<PriceWatchState> {
    Engine::new("commerce", source, Arc::new(CommercePolicy), settings)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn watch(price: i64, upper: Option<i64>, lower: Option<i64>) -> PriceWatchState {
        PriceWatchState {
            unit_price: price,
            upper_limit: upper,
            lower_limit: lower,
        }
    }

    #[test]
    fn test_band_requires_both_enabled_bounds() {
        // Upper-only: buy-cheap watch.
        assert!(watch(90, Some(100), None).in_band());
        assert!(!watch(150, Some(100), None).in_band());

        // Lower-only: sell-high watch.
        assert!(watch(250, None, Some(200)).in_band());
        assert!(!watch(150, None, Some(200)).in_band());

        // Both: the conjunction, not either edge.
        assert!(watch(150, Some(200), Some(100)).in_band());
        assert!(!watch(90, Some(200), Some(100)).in_band());
        assert!(!watch(250, Some(200), Some(100)).in_band());

        // No bounds enabled: never in band.
        assert!(!watch(150, None, None).in_band());
    }

    #[test]
    fn test_entering_band_is_a_transition() {
        let held = watch(250, Some(200), Some(100));
        let incoming = watch(150, Some(200), Some(100));

        let outcome = held.reconcile(&incoming);
        assert_eq!(outcome.transitions.len(), 1);
        let detail = &outcome.transitions[0];
        assert_eq!(detail.kind, TransitionKind::ThresholdEntered);
        assert_eq!(detail.previous, TriggerValue::Amount(250));
        assert_eq!(detail.new, TriggerValue::Amount(150));
    }

    #[test]
    fn test_lingering_in_band_is_not_a_transition() {
        let held = watch(150, Some(200), Some(100));
        let incoming = watch(160, Some(200), Some(100));

        let outcome = held.reconcile(&incoming);
        assert!(outcome.changed);
        assert!(outcome.transitions.is_empty());
    }

    #[test]
    fn test_crossing_one_edge_without_entering_is_silent() {
        // Price drops below the upper bound but overshoots the lower one:
        // both bounds enabled, so no band entry.
        let held = watch(250, Some(200), Some(100));
        let incoming = watch(50, Some(200), Some(100));

        let outcome = held.reconcile(&incoming);
        assert!(outcome.changed);
        assert!(outcome.transitions.is_empty());
    }

    #[test]
    fn test_leaving_band_is_silent() {
        let held = watch(150, Some(200), Some(100));
        let incoming = watch(250, Some(200), Some(100));

        let outcome = held.reconcile(&incoming);
        assert!(outcome.changed);
        assert!(outcome.transitions.is_empty());
    }

    #[test]
    fn test_policy_flag() {
        let policy = CommercePolicy;
        let entity = TrackedEntity::new(
            1,
            crate::core::model::EntityKind::PriceWatch,
            watch(150, Some(200), None),
        );
        let detail = TransitionDetail {
            kind: TransitionKind::ThresholdEntered,
            previous: TriggerValue::Amount(250),
            new: TriggerValue::Amount(150),
        };

        let mut settings = Settings::default();
        assert!(policy.allows(&settings, &entity, &detail));

        settings.notify_price_watches = false;
        assert!(!policy.allows(&settings, &entity, &detail));
    }
}
