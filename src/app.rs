use anyhow::Result;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::warn;

use crate::config::Config;
use crate::dispatch::{
    reconciler::progress_channel, DischargeProgressEvent, DispatchService, FeasibilityEvaluator,
    RevenueReconciler,
};
use crate::domain::{
    DischargeCommandChannel, GridDemandOracle, LoggingCommandChannel, SimulatedGridDemand,
    SimulatedVehicleTelemetry, VehicleState, VehicleTelemetry,
};
use crate::rates::RateRegistry;
use crate::repo::{InMemoryScheduleRepository, ScheduleRepository};

#[derive(Clone)]
pub struct AppState {
    pub cfg: Config,
    pub dispatch: Arc<DispatchService>,
    pub feasibility: Arc<FeasibilityEvaluator>,
    pub rates: Arc<RateRegistry>,
    /// Ingestion point for discharge-progress telemetry; consumed by the
    /// revenue reconciler.
    pub progress_tx: mpsc::Sender<DischargeProgressEvent>,
}

impl AppState {
    /// Wire the default stack: in-memory repository and the simulated
    /// collaborators. Vehicles are seeded from `[sim]` config when the
    /// `sim` feature is enabled.
    pub async fn new(cfg: Config) -> Result<(Self, mpsc::Receiver<DischargeProgressEvent>)> {
        let telemetry = Arc::new(SimulatedVehicleTelemetry::new());

        #[cfg(feature = "sim")]
        for vehicle in &cfg.sim.vehicles {
            telemetry
                .set_vehicle(
                    vehicle.id.clone(),
                    VehicleState {
                        soc_percent: vehicle.soc_percent,
                        battery_capacity_kwh: vehicle.battery_capacity_kwh,
                        max_discharge_power_kw: vehicle.max_discharge_power_kw,
                    },
                )
                .await;
        }

        Self::with_collaborators(
            cfg,
            Arc::new(InMemoryScheduleRepository::new()),
            telemetry,
            Arc::new(SimulatedGridDemand::default()),
            Arc::new(LoggingCommandChannel),
        )
    }

    /// Wire explicit collaborators; the integration seam for real telemetry,
    /// demand and command-channel implementations.
    pub fn with_collaborators(
        cfg: Config,
        repo: Arc<dyn ScheduleRepository>,
        telemetry: Arc<dyn VehicleTelemetry>,
        grid_demand: Arc<dyn GridDemandOracle>,
        commands: Arc<dyn DischargeCommandChannel>,
    ) -> Result<(Self, mpsc::Receiver<DischargeProgressEvent>)> {
        let rates = Arc::new(RateRegistry::with_programs(
            cfg.rates.default_rate_per_kwh,
            cfg.rates.programs.clone(),
        ));

        let dispatch = Arc::new(DispatchService::new(
            repo,
            rates.clone(),
            commands,
            cfg.dispatch.clone(),
        ));
        let feasibility = Arc::new(FeasibilityEvaluator::new(
            telemetry,
            grid_demand,
            rates.clone(),
            cfg.dispatch.clone(),
        ));

        let (progress_tx, progress_rx) = progress_channel(256);

        Ok((
            Self {
                cfg,
                dispatch,
                feasibility,
                rates,
                progress_tx,
            },
            progress_rx,
        ))
    }
}

pub fn spawn_background_tasks(
    state: &AppState,
    progress_rx: mpsc::Receiver<DischargeProgressEvent>,
) {
    let reconciler = RevenueReconciler::new(state.dispatch.clone(), progress_rx);
    tokio::spawn(async move {
        reconciler.run().await;
        warn!("revenue reconciler stopped");
    });
}
