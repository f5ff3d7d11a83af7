pub mod program;
pub mod schedule;
pub mod vehicle;

pub use program::{GridServiceProgram, ProgramConstraints};
pub use schedule::{
    DispatchPriority, DispatchSchedule, DispatchStatus, DispatchWindow,
};
pub use vehicle::{
    DischargeCommandChannel, GridDemandLevel, GridDemandOracle, LoggingCommandChannel,
    SimulatedGridDemand, SimulatedVehicleTelemetry, TelemetryError, VehicleState,
    VehicleTelemetry,
};
