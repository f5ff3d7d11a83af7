use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use strum::Display;
use thiserror::Error;
use tokio::sync::RwLock;

/// Errors from the vehicle-facing collaborators.
#[derive(Debug, Error)]
pub enum TelemetryError {
    #[error("no telemetry available for vehicle {0}")]
    UnknownVehicle(String),
    #[error("telemetry request timed out")]
    Timeout,
    #[error("communication error: {0}")]
    Communication(String),
}

/// Point-in-time vehicle state relevant to discharge decisions.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VehicleState {
    pub soc_percent: f64,
    pub battery_capacity_kwh: f64,
    /// Maximum discharge power the vehicle/charger pair supports, when known.
    pub max_discharge_power_kw: Option<f64>,
}

/// Vehicle telemetry source - current SoC, battery capacity, discharge
/// capability. Injected so feasibility evaluation is deterministic under test.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait VehicleTelemetry: Send + Sync {
    async fn read_state(&self, vehicle_id: &str) -> Result<VehicleState, TelemetryError>;
}

/// Grid demand level reported by the grid operator. The multiplier scales the
/// base program rate: discharging into a stressed grid pays more.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum GridDemandLevel {
    Low,
    Moderate,
    High,
    Peak,
}

impl GridDemandLevel {
    pub fn rate_multiplier(&self) -> f64 {
        match self {
            Self::Low => 0.8,
            Self::Moderate => 1.0,
            Self::High => 1.3,
            Self::Peak => 1.6,
        }
    }
}

/// Grid demand oracle collaborator.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait GridDemandOracle: Send + Sync {
    async fn current_demand(&self) -> Result<GridDemandLevel, TelemetryError>;
}

/// Command channel toward a vehicle. Delivery is best-effort; the schedule's
/// own status remains authoritative even if a command is not confirmed.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait DischargeCommandChannel: Send + Sync {
    async fn start_discharge(&self, vehicle_id: &str, power_kw: f64) -> anyhow::Result<()>;
    async fn stop_discharge(&self, vehicle_id: &str) -> anyhow::Result<()>;
}

/// Deterministic in-memory telemetry source for development and testing.
#[derive(Debug, Default)]
pub struct SimulatedVehicleTelemetry {
    vehicles: RwLock<HashMap<String, VehicleState>>,
}

impl SimulatedVehicleTelemetry {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn set_vehicle(&self, vehicle_id: impl Into<String>, state: VehicleState) {
        self.vehicles.write().await.insert(vehicle_id.into(), state);
    }

    pub async fn remove_vehicle(&self, vehicle_id: &str) {
        self.vehicles.write().await.remove(vehicle_id);
    }
}

#[async_trait]
impl VehicleTelemetry for SimulatedVehicleTelemetry {
    async fn read_state(&self, vehicle_id: &str) -> Result<VehicleState, TelemetryError> {
        self.vehicles
            .read()
            .await
            .get(vehicle_id)
            .cloned()
            .ok_or_else(|| TelemetryError::UnknownVehicle(vehicle_id.to_string()))
    }
}

/// Fixed-level demand oracle for development and testing.
#[derive(Debug)]
pub struct SimulatedGridDemand {
    level: RwLock<GridDemandLevel>,
}

impl SimulatedGridDemand {
    pub fn new(level: GridDemandLevel) -> Self {
        Self {
            level: RwLock::new(level),
        }
    }

    pub async fn set_level(&self, level: GridDemandLevel) {
        *self.level.write().await = level;
    }
}

impl Default for SimulatedGridDemand {
    fn default() -> Self {
        Self::new(GridDemandLevel::Moderate)
    }
}

#[async_trait]
impl GridDemandOracle for SimulatedGridDemand {
    async fn current_demand(&self) -> Result<GridDemandLevel, TelemetryError> {
        Ok(*self.level.read().await)
    }
}

/// Command channel that only records intent in the log. Stands in for the
/// OCPP/ISO 15118 integration owned by the charging infrastructure layer.
#[derive(Debug, Default)]
pub struct LoggingCommandChannel;

#[async_trait]
impl DischargeCommandChannel for LoggingCommandChannel {
    async fn start_discharge(&self, vehicle_id: &str, power_kw: f64) -> anyhow::Result<()> {
        tracing::info!(vehicle_id, power_kw, "start discharge command issued");
        Ok(())
    }

    async fn stop_discharge(&self, vehicle_id: &str) -> anyhow::Result<()> {
        tracing::info!(vehicle_id, "stop discharge command issued");
        Ok(())
    }
}
