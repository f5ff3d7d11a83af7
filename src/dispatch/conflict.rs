//! Conflict resolution over one vehicle's committed schedules.

use crate::domain::{DispatchSchedule, DispatchWindow};

/// First schedule whose committed (scheduled or active) window overlaps the
/// candidate, in insertion order. Terminal schedules never conflict.
///
/// Must be evaluated under the same per-vehicle lock as the subsequent
/// insert, otherwise two concurrent creates can both pass.
pub fn find_conflict<'a>(
    existing: &'a [DispatchSchedule],
    candidate: &DispatchWindow,
) -> Option<&'a DispatchSchedule> {
    existing
        .iter()
        .find(|s| s.status.is_committed() && s.window.overlaps(candidate))
}
