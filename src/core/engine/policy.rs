// Notification eligibility: a pure predicate over the settings snapshot and
// a proposed notification.

use crate::core::config::Settings;
use crate::core::model::{TrackedEntity, TransitionDetail};

/// Decides whether current user configuration permits a notification for a
/// given transition. Stateless and read-only; evaluated at trigger time and
/// re-evaluated while a notification is live (a flip to deny dismisses it
/// early).
pub trait EligibilityPolicy<D>: Send + Sync + 'static {
    fn allows(
        &self,
        settings: &Settings,
        entity: &TrackedEntity<D>,
        detail: &TransitionDetail,
    ) -> bool;
}

/// Plain functions and closures work as policies.
impl<D, F> EligibilityPolicy<D> for F
where
    F: Fn(&Settings, &TrackedEntity<D>, &TransitionDetail) -> bool + Send + Sync + 'static,
{
    fn allows(
        &self,
        settings: &Settings,
        entity: &TrackedEntity<D>,
        detail: &TransitionDetail,
    ) -> bool {
        self(settings, entity, detail)
    }
}
