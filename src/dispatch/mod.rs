pub mod conflict;
pub mod feasibility;
pub mod reconciler;

use chrono::{Timelike, Utc};
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;
use thiserror::Error;
use tracing::{info, warn};
use uuid::Uuid;

use crate::config::DispatchConfig;
use crate::domain::{
    DischargeCommandChannel, DispatchPriority, DispatchSchedule, DispatchStatus, DispatchWindow,
};
use crate::rates::RateRegistry;
use crate::repo::{ScheduleFilter, ScheduleRepository};

pub use feasibility::{FeasibilityAssessment, FeasibilityEvaluator, FeasibilityRequest};
pub use reconciler::{DischargeProgressEvent, RevenueReconciler};

/// Dispatch core error taxonomy. The API layer maps these onto HTTP statuses;
/// no retries happen inside the core.
#[derive(Debug, Error)]
pub enum DispatchError {
    #[error("validation error: {0}")]
    Validation(String),

    #[error("window overlaps schedule {conflicting_id} for vehicle {vehicle_id}")]
    SchedulingConflict {
        conflicting_id: Uuid,
        vehicle_id: String,
    },

    #[error("illegal transition {from} -> {to}")]
    InvalidTransition {
        from: DispatchStatus,
        to: DispatchStatus,
    },

    #[error("schedule {id} is {status}, progress updates require an active schedule")]
    NotActive { id: Uuid, status: DispatchStatus },

    #[error("schedule {id} not found")]
    NotFound { id: Uuid },

    #[error("telemetry unavailable: {0}")]
    TelemetryUnavailable(String),

    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

#[derive(Debug, Clone)]
pub struct CreateDispatchRequest {
    pub vehicle_id: String,
    pub window: DispatchWindow,
    pub discharge_power_kw: f64,
    pub grid_service_program_id: Option<String>,
    pub priority: DispatchPriority,
}

/// Aggregates over a filtered schedule set.
#[derive(Debug, Clone, Serialize)]
pub struct DispatchSummary {
    pub total: usize,
    pub scheduled: usize,
    pub active: usize,
    pub completed: usize,
    pub cancelled: usize,
    pub total_estimated_energy_kwh: f64,
    pub total_estimated_revenue: f64,
    pub total_energy_discharged_kwh: f64,
    pub total_actual_revenue: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct DispatchOverview {
    pub summary: DispatchSummary,
    pub schedules: Vec<DispatchSchedule>,
}

/// Dispatch scheduler: the only writer of dispatch schedules. All mutations
/// for one vehicle are serialized through a per-vehicle mutex so the
/// conflict check and the write form one atomic unit; different vehicles
/// proceed in parallel.
pub struct DispatchService {
    repo: Arc<dyn ScheduleRepository>,
    rates: Arc<RateRegistry>,
    commands: Arc<dyn DischargeCommandChannel>,
    cfg: DispatchConfig,
    vehicle_locks: parking_lot::Mutex<HashMap<String, Arc<tokio::sync::Mutex<()>>>>,
}

impl DispatchService {
    pub fn new(
        repo: Arc<dyn ScheduleRepository>,
        rates: Arc<RateRegistry>,
        commands: Arc<dyn DischargeCommandChannel>,
        cfg: DispatchConfig,
    ) -> Self {
        Self {
            repo,
            rates,
            commands,
            cfg,
            vehicle_locks: parking_lot::Mutex::new(HashMap::new()),
        }
    }

    fn vehicle_lock(&self, vehicle_id: &str) -> Arc<tokio::sync::Mutex<()>> {
        self.vehicle_locks
            .lock()
            .entry(vehicle_id.to_string())
            .or_default()
            .clone()
    }

    /// Drop a vehicle's lock entry once no task holds a clone of it. A later
    /// mutation for the same vehicle simply allocates a fresh mutex.
    fn release_idle_lock(&self, vehicle_id: &str) {
        let mut locks = self.vehicle_locks.lock();
        let idle = locks
            .get(vehicle_id)
            .map_or(false, |lock| Arc::strong_count(lock) == 1);
        if idle {
            locks.remove(vehicle_id);
        }
    }

    pub async fn create(
        &self,
        request: CreateDispatchRequest,
    ) -> Result<DispatchSchedule, DispatchError> {
        if request.vehicle_id.trim().is_empty() {
            return Err(DispatchError::Validation("vehicle_id is required".into()));
        }
        if request.discharge_power_kw <= 0.0 {
            return Err(DispatchError::Validation(format!(
                "discharge_power_kw must be positive, got {}",
                request.discharge_power_kw
            )));
        }

        let resolved = self
            .rates
            .rate_for(request.grid_service_program_id.as_deref());

        let duration_hours = request.window.duration_hours();
        if let Some(min_hours) = resolved.constraints.min_duration_hours {
            if duration_hours < min_hours {
                return Err(DispatchError::Validation(format!(
                    "program requires at least {min_hours} h, window is {duration_hours} h"
                )));
            }
        }
        if let Some((from_hour, to_hour)) = resolved.constraints.available_hours {
            // The whole window must sit inside the band, not just its start.
            let start = request.window.start;
            let start_hour = start.hour() as u8;
            let secs_until_band_close =
                i64::from(to_hour) * 3600 - i64::from(start.time().num_seconds_from_midnight());
            let fits = start_hour >= from_hour
                && start_hour < to_hour
                && request.window.end - start <= chrono::Duration::seconds(secs_until_band_close);
            if !fits {
                return Err(DispatchError::Validation(format!(
                    "program is only available between {from_hour}:00 and {to_hour}:00 UTC"
                )));
            }
        }

        let estimated_energy_kwh = request.discharge_power_kw * duration_hours;
        let estimated_revenue = estimated_energy_kwh * resolved.rate_per_kwh;

        // Conflict check and insert as one atomic unit per vehicle.
        let lock = self.vehicle_lock(&request.vehicle_id);
        let _guard = lock.lock().await;

        let existing = self.repo.find_by_vehicle(&request.vehicle_id).await?;
        if let Some(conflicting) = conflict::find_conflict(&existing, &request.window) {
            return Err(DispatchError::SchedulingConflict {
                conflicting_id: conflicting.id,
                vehicle_id: request.vehicle_id,
            });
        }

        let now = Utc::now();
        let schedule = DispatchSchedule {
            id: Uuid::new_v4(),
            vehicle_id: request.vehicle_id,
            window: request.window,
            discharge_power_kw: request.discharge_power_kw,
            grid_service_program_id: request.grid_service_program_id,
            priority: request.priority,
            status: DispatchStatus::Scheduled,
            estimated_energy_kwh,
            estimated_revenue,
            energy_discharged_kwh: 0.0,
            actual_revenue: 0.0,
            created_at: now,
            updated_at: now,
        };
        self.repo.insert(schedule.clone()).await?;

        info!(
            schedule_id = %schedule.id,
            vehicle_id = %schedule.vehicle_id,
            power_kw = schedule.discharge_power_kw,
            estimated_revenue = schedule.estimated_revenue,
            "dispatch schedule created"
        );
        Ok(schedule)
    }

    pub async fn get(&self, id: Uuid) -> Result<DispatchSchedule, DispatchError> {
        self.repo
            .find_by_id(id)
            .await?
            .ok_or(DispatchError::NotFound { id })
    }

    pub async fn transition(
        &self,
        id: Uuid,
        new_status: DispatchStatus,
    ) -> Result<DispatchSchedule, DispatchError> {
        let current = self.get(id).await?;
        let lock = self.vehicle_lock(&current.vehicle_id);
        let guard = lock.lock().await;

        // Re-read under the lock; a concurrent transition may have landed.
        let mut schedule = self.get(id).await?;
        if !schedule.status.can_transition_to(new_status) {
            return Err(DispatchError::InvalidTransition {
                from: schedule.status,
                to: new_status,
            });
        }

        let previous = schedule.status;
        schedule.status = new_status;
        schedule.updated_at = Utc::now();
        self.repo.update(schedule.clone()).await?;

        info!(
            schedule_id = %id,
            vehicle_id = %schedule.vehicle_id,
            from = %previous,
            to = %new_status,
            "dispatch status transition"
        );

        // Vehicle commands are best-effort; the persisted status above is
        // authoritative even if delivery is unconfirmed.
        match new_status {
            DispatchStatus::Active => {
                if let Err(e) = self
                    .commands
                    .start_discharge(&schedule.vehicle_id, schedule.discharge_power_kw)
                    .await
                {
                    warn!(schedule_id = %id, error = %e, "start-discharge command failed");
                }
            }
            DispatchStatus::Completed | DispatchStatus::Cancelled
                if previous == DispatchStatus::Active =>
            {
                if let Err(e) = self.commands.stop_discharge(&schedule.vehicle_id).await {
                    warn!(schedule_id = %id, error = %e, "stop-discharge command failed");
                }
            }
            _ => {}
        }

        // Once the vehicle has no committed schedules left, its lock entry
        // can go; the map would otherwise grow with every vehicle ever seen.
        if new_status.is_terminal() {
            let remaining = self.repo.find_by_vehicle(&schedule.vehicle_id).await?;
            let vehicle_idle = !remaining.iter().any(|s| s.status.is_committed());
            drop(guard);
            drop(lock);
            if vehicle_idle {
                self.release_idle_lock(&schedule.vehicle_id);
            }
        }

        Ok(schedule)
    }

    /// Record discharge progress for an active schedule. Energy is cumulative
    /// and must not decrease; exceeding plan beyond the configured tolerance
    /// is rejected pending a correction event. Missing revenue is derived
    /// from the rate the schedule was committed at.
    pub async fn record_progress(
        &self,
        id: Uuid,
        energy_discharged_kwh: f64,
        actual_revenue: Option<f64>,
    ) -> Result<DispatchSchedule, DispatchError> {
        if energy_discharged_kwh < 0.0 {
            return Err(DispatchError::Validation(
                "energy_discharged_kwh must be non-negative".into(),
            ));
        }
        if actual_revenue.map_or(false, |r| r < 0.0) {
            return Err(DispatchError::Validation(
                "actual_revenue must be non-negative".into(),
            ));
        }

        let current = self.get(id).await?;
        let lock = self.vehicle_lock(&current.vehicle_id);
        let _guard = lock.lock().await;

        let mut schedule = self.get(id).await?;
        if schedule.status != DispatchStatus::Active {
            return Err(DispatchError::NotActive {
                id,
                status: schedule.status,
            });
        }
        if energy_discharged_kwh < schedule.energy_discharged_kwh {
            return Err(DispatchError::Validation(format!(
                "energy_discharged_kwh may not decrease ({} -> {})",
                schedule.energy_discharged_kwh, energy_discharged_kwh
            )));
        }
        let ceiling =
            schedule.estimated_energy_kwh * (1.0 + self.cfg.over_delivery_tolerance_ratio);
        if energy_discharged_kwh > ceiling {
            return Err(DispatchError::Validation(format!(
                "energy_discharged_kwh {energy_discharged_kwh} exceeds plan {} beyond tolerance",
                schedule.estimated_energy_kwh
            )));
        }

        schedule.energy_discharged_kwh = energy_discharged_kwh;
        schedule.actual_revenue = actual_revenue
            .unwrap_or_else(|| energy_discharged_kwh * schedule.effective_rate());
        schedule.updated_at = Utc::now();
        self.repo.update(schedule.clone()).await?;

        Ok(schedule)
    }

    pub async fn list(&self, filter: &ScheduleFilter) -> Result<DispatchOverview, DispatchError> {
        let schedules = self.repo.list(filter).await?;

        let mut summary = DispatchSummary {
            total: schedules.len(),
            scheduled: 0,
            active: 0,
            completed: 0,
            cancelled: 0,
            total_estimated_energy_kwh: 0.0,
            total_estimated_revenue: 0.0,
            total_energy_discharged_kwh: 0.0,
            total_actual_revenue: 0.0,
        };
        for s in &schedules {
            match s.status {
                DispatchStatus::Scheduled => summary.scheduled += 1,
                DispatchStatus::Active => summary.active += 1,
                DispatchStatus::Completed => summary.completed += 1,
                DispatchStatus::Cancelled => summary.cancelled += 1,
            }
            summary.total_estimated_energy_kwh += s.estimated_energy_kwh;
            summary.total_estimated_revenue += s.estimated_revenue;
            summary.total_energy_discharged_kwh += s.energy_discharged_kwh;
            summary.total_actual_revenue += s.actual_revenue;
        }

        Ok(DispatchOverview { summary, schedules })
    }

    /// Schedules currently counting toward the non-overlap invariant.
    pub async fn committed_schedules(&self) -> Result<Vec<DispatchSchedule>, DispatchError> {
        Ok(self.repo.list_committed().await?)
    }

    pub fn config(&self) -> &DispatchConfig {
        &self.cfg
    }
}
