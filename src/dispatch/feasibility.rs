//! Feasibility evaluation: can this vehicle safely discharge in this window,
//! and what is it worth. Pure with respect to persisted state - evaluation
//! never creates or mutates a dispatch schedule.

use serde::Serialize;
use std::sync::Arc;
use tokio::time::timeout;

use crate::config::DispatchConfig;
use crate::dispatch::DispatchError;
use crate::domain::{DispatchWindow, GridDemandLevel, GridDemandOracle, VehicleTelemetry};
use crate::rates::RateRegistry;

pub const CONSTRAINT_SOC_TOO_LOW: &str = "Battery SoC too low for safe discharge";
pub const CONSTRAINT_WINDOW_TOO_SHORT: &str = "Discharge window too short";
pub const CONSTRAINT_POWER_EXCEEDED: &str = "Requested power exceeds vehicle capability";

#[derive(Debug, Clone)]
pub struct FeasibilityRequest {
    pub vehicle_id: String,
    pub window: DispatchWindow,
    pub max_discharge_power_kw: Option<f64>,
    /// SoC reserve to leave in the battery after discharge (%). Defaults to
    /// the configured reserve when absent.
    pub min_soc_after_discharge_percent: Option<f64>,
    pub target_energy_to_discharge_kwh: Option<f64>,
}

/// Ephemeral assessment result; never persisted.
#[derive(Debug, Clone, Serialize)]
pub struct FeasibilityAssessment {
    pub vehicle_id: String,
    pub is_feasible: bool,
    pub estimated_dischargeable_energy_kwh: f64,
    pub potential_revenue_estimate: f64,
    /// Violated constraints in evaluation order; all checks always run.
    pub constraints_hit: Vec<String>,
    pub grid_demand_level: GridDemandLevel,
    pub current_soc_percent: f64,
    pub applied_rate: f64,
}

/// Energy actually dispatchable in a window: bounded by what the battery can
/// give up, what the power level can move in the time, and the caller's
/// target when one is set.
pub fn discharge_budget_kwh(
    available_energy_kwh: f64,
    power_kw: f64,
    duration_hours: f64,
    target_energy_kwh: Option<f64>,
) -> f64 {
    let available = available_energy_kwh.max(0.0);
    let by_power = (power_kw * duration_hours).max(0.0);
    let target = target_energy_kwh.unwrap_or(available).max(0.0);
    available.min(by_power).min(target)
}

pub struct FeasibilityEvaluator {
    telemetry: Arc<dyn VehicleTelemetry>,
    grid_demand: Arc<dyn GridDemandOracle>,
    rates: Arc<RateRegistry>,
    cfg: DispatchConfig,
}

impl FeasibilityEvaluator {
    pub fn new(
        telemetry: Arc<dyn VehicleTelemetry>,
        grid_demand: Arc<dyn GridDemandOracle>,
        rates: Arc<RateRegistry>,
        cfg: DispatchConfig,
    ) -> Self {
        Self {
            telemetry,
            grid_demand,
            rates,
            cfg,
        }
    }

    pub async fn evaluate(
        &self,
        request: &FeasibilityRequest,
    ) -> Result<FeasibilityAssessment, DispatchError> {
        if request.vehicle_id.trim().is_empty() {
            return Err(DispatchError::Validation("vehicle_id is required".into()));
        }
        let min_soc_after = request
            .min_soc_after_discharge_percent
            .unwrap_or(self.cfg.default_min_soc_after_discharge_percent);
        if !(0.0..=100.0).contains(&min_soc_after) {
            return Err(DispatchError::Validation(format!(
                "min_soc_after_discharge_percent must be within [0, 100], got {min_soc_after}"
            )));
        }
        if let Some(power) = request.max_discharge_power_kw {
            if power <= 0.0 {
                return Err(DispatchError::Validation(format!(
                    "max_discharge_power_kw must be positive, got {power}"
                )));
            }
        }

        let state = timeout(
            self.cfg.telemetry_timeout(),
            self.telemetry.read_state(&request.vehicle_id),
        )
        .await
        .map_err(|_| DispatchError::TelemetryUnavailable("vehicle telemetry timed out".into()))?
        .map_err(|e| DispatchError::TelemetryUnavailable(e.to_string()))?;

        let demand = timeout(self.cfg.telemetry_timeout(), self.grid_demand.current_demand())
            .await
            .map_err(|_| DispatchError::TelemetryUnavailable("grid demand oracle timed out".into()))?
            .map_err(|e| DispatchError::TelemetryUnavailable(e.to_string()))?;

        let duration_hours = request.window.duration_hours();
        let available_energy_kwh =
            ((state.soc_percent - min_soc_after) / 100.0 * state.battery_capacity_kwh).max(0.0);

        let vehicle_max_kw = state
            .max_discharge_power_kw
            .unwrap_or(self.cfg.default_max_vehicle_power_kw);
        let power_kw = request.max_discharge_power_kw.unwrap_or(vehicle_max_kw);

        let max_possible_kwh = discharge_budget_kwh(
            available_energy_kwh,
            power_kw,
            duration_hours,
            request.target_energy_to_discharge_kwh,
        );

        // All constraint checks run; every violation is reported, in order.
        let mut constraints_hit = Vec::new();
        if state.soc_percent < self.cfg.soc_safety_floor_percent {
            constraints_hit.push(CONSTRAINT_SOC_TOO_LOW.to_string());
        }
        if duration_hours < self.cfg.min_window_hours {
            constraints_hit.push(CONSTRAINT_WINDOW_TOO_SHORT.to_string());
        }
        if request
            .max_discharge_power_kw
            .map_or(false, |p| p > vehicle_max_kw)
        {
            constraints_hit.push(CONSTRAINT_POWER_EXCEEDED.to_string());
        }

        let applied_rate = self.rates.rate_for(None).rate_per_kwh * demand.rate_multiplier();
        let potential_revenue_estimate = max_possible_kwh * applied_rate;
        let is_feasible =
            max_possible_kwh > self.cfg.min_feasible_energy_kwh && constraints_hit.is_empty();

        tracing::debug!(
            vehicle_id = %request.vehicle_id,
            soc_percent = state.soc_percent,
            available_energy_kwh,
            max_possible_kwh,
            is_feasible,
            "feasibility evaluated"
        );

        Ok(FeasibilityAssessment {
            vehicle_id: request.vehicle_id.clone(),
            is_feasible,
            estimated_dischargeable_energy_kwh: max_possible_kwh,
            potential_revenue_estimate,
            constraints_hit,
            grid_demand_level: demand,
            current_soc_percent: state.soc_percent,
            applied_rate,
        })
    }
}
