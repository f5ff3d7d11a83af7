use anyhow::Result;
use figment::{
    providers::{Env, Format, Toml},
    Figment,
};
use serde::Deserialize;
use std::net::SocketAddr;

use crate::domain::GridServiceProgram;

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub server: ServerConfig,
    pub auth: AuthConfig,
    pub dispatch: DispatchConfig,
    pub rates: RatesConfig,
    #[serde(default)]
    pub sim: SimConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub enable_cors: bool,
    pub request_timeout_secs: u64,
}

impl ServerConfig {
    pub fn socket_addr(&self) -> Result<SocketAddr> {
        Ok(format!("{}:{}", self.host, self.port).parse()?)
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct AuthConfig {
    pub token: String,
}

/// Tunables for feasibility evaluation and dispatch bookkeeping.
#[derive(Debug, Clone, Deserialize)]
pub struct DispatchConfig {
    /// SoC floor below which discharge is never considered safe (%).
    pub soc_safety_floor_percent: f64,
    /// Default post-discharge SoC reserve when the caller does not set one (%).
    pub default_min_soc_after_discharge_percent: f64,
    /// Shortest window worth dispatching (hours).
    pub min_window_hours: f64,
    /// Dispatches below this energy are not worth the wear (kWh).
    pub min_feasible_energy_kwh: f64,
    /// Capability ceiling assumed when a vehicle does not report one (kW).
    pub default_max_vehicle_power_kw: f64,
    /// Progress updates may exceed plan by this fraction before rejection.
    pub over_delivery_tolerance_ratio: f64,
    /// Below this fraction of plan at window close, flag under-delivery.
    pub under_delivery_ratio: f64,
    /// Timeout for telemetry and grid-demand collaborator calls (ms).
    pub telemetry_timeout_ms: u64,
    /// Reconciler sweep interval for closing expired windows (seconds).
    pub reconciler_sweep_secs: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RatesConfig {
    pub default_rate_per_kwh: f64,
    #[serde(default)]
    pub programs: Vec<GridServiceProgram>,
}

/// Seed vehicles for the simulated telemetry source.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct SimConfig {
    #[serde(default)]
    pub vehicles: Vec<SimVehicleConfig>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SimVehicleConfig {
    pub id: String,
    pub soc_percent: f64,
    pub battery_capacity_kwh: f64,
    pub max_discharge_power_kw: Option<f64>,
}

impl Config {
    pub fn load() -> Result<Self> {
        let figment = Figment::new()
            .merge(Toml::file("config/default.toml"))
            .merge(Env::prefixed("V2G__").split("__"));
        Ok(figment.extract()?)
    }
}

impl DispatchConfig {
    pub fn telemetry_timeout(&self) -> std::time::Duration {
        std::time::Duration::from_millis(self.telemetry_timeout_ms)
    }
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            soc_safety_floor_percent: 40.0,
            default_min_soc_after_discharge_percent: 30.0,
            min_window_hours: 2.0,
            min_feasible_energy_kwh: 5.0,
            default_max_vehicle_power_kw: 100.0,
            over_delivery_tolerance_ratio: 0.1,
            under_delivery_ratio: 0.9,
            telemetry_timeout_ms: 2000,
            reconciler_sweep_secs: 30,
        }
    }
}
