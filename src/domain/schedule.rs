use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use strum::Display;
use uuid::Uuid;

/// Half-open dispatch window `[start, end)`. End must be strictly after start.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DispatchWindow {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl DispatchWindow {
    pub fn new(start: DateTime<Utc>, end: DateTime<Utc>) -> Option<Self> {
        if end > start {
            Some(Self { start, end })
        } else {
            None
        }
    }

    pub fn duration_hours(&self) -> f64 {
        (self.end - self.start).num_seconds() as f64 / 3600.0
    }

    /// Two half-open windows overlap iff `s1 < e2 && s2 < e1`.
    /// Abutting windows (end == start) do not overlap.
    pub fn overlaps(&self, other: &DispatchWindow) -> bool {
        self.start < other.end && other.start < self.end
    }

    pub fn contains(&self, t: DateTime<Utc>) -> bool {
        t >= self.start && t < self.end
    }
}

/// Dispatch schedule lifecycle status. The transition table is closed:
/// Scheduled -> Active -> Completed, with Cancelled reachable from either
/// non-terminal state. Completed and Cancelled accept no further moves.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum DispatchStatus {
    Scheduled,
    Active,
    Completed,
    Cancelled,
}

impl DispatchStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Cancelled)
    }

    /// Whether this status counts toward the per-vehicle non-overlap invariant.
    pub fn is_committed(&self) -> bool {
        matches!(self, Self::Scheduled | Self::Active)
    }

    pub fn can_transition_to(&self, next: DispatchStatus) -> bool {
        matches!(
            (self, next),
            (Self::Scheduled, Self::Active)
                | (Self::Scheduled, Self::Cancelled)
                | (Self::Active, Self::Completed)
                | (Self::Active, Self::Cancelled)
        )
    }
}

/// Relative dispatch priority within a grid-service program.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum DispatchPriority {
    Low,
    #[default]
    Normal,
    High,
}

/// A committed discharge window for one vehicle. Created only through the
/// dispatch service after the conflict check passes; never deleted, only
/// moved to a terminal status.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DispatchSchedule {
    pub id: Uuid,
    pub vehicle_id: String,
    pub window: DispatchWindow,
    pub discharge_power_kw: f64,
    pub grid_service_program_id: Option<String>,
    pub priority: DispatchPriority,
    pub status: DispatchStatus,
    /// Planned energy over the window, fixed at creation.
    pub estimated_energy_kwh: f64,
    /// Planned revenue at the resolved program rate, fixed at creation.
    pub estimated_revenue: f64,
    /// Cumulative discharged energy, monotonically non-decreasing while active.
    pub energy_discharged_kwh: f64,
    pub actual_revenue: f64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl DispatchSchedule {
    /// Effective per-kWh rate the schedule was committed at.
    pub fn effective_rate(&self) -> f64 {
        if self.estimated_energy_kwh > 0.0 {
            self.estimated_revenue / self.estimated_energy_kwh
        } else {
            0.0
        }
    }
}
