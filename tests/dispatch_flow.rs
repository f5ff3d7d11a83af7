//! End-to-end dispatch scenarios through the wired application state:
//! feasibility assessment, conflict-checked scheduling, the status state
//! machine and progress reconciliation.

use chrono::{DateTime, Duration, TimeZone, Utc};
use std::sync::Arc;
use tokio::sync::mpsc;

use v2g_dispatch_controller::app::{self, AppState};
use v2g_dispatch_controller::config::{
    AuthConfig, Config, DispatchConfig, RatesConfig, ServerConfig, SimConfig,
};
use v2g_dispatch_controller::dispatch::{
    CreateDispatchRequest, DischargeProgressEvent, DispatchError, FeasibilityRequest,
};
use v2g_dispatch_controller::domain::{
    DispatchPriority, DispatchStatus, DispatchWindow, LoggingCommandChannel, SimulatedGridDemand,
    SimulatedVehicleTelemetry, VehicleState,
};
use v2g_dispatch_controller::repo::{InMemoryScheduleRepository, ScheduleFilter};

fn test_config() -> Config {
    Config {
        server: ServerConfig {
            host: "127.0.0.1".into(),
            port: 0,
            enable_cors: false,
            request_timeout_secs: 5,
        },
        auth: AuthConfig {
            token: "test-token".into(),
        },
        dispatch: DispatchConfig::default(),
        rates: RatesConfig {
            default_rate_per_kwh: 0.40,
            programs: Vec::new(),
        },
        sim: SimConfig::default(),
    }
}

async fn wired_state() -> (AppState, mpsc::Receiver<DischargeProgressEvent>) {
    let telemetry = Arc::new(SimulatedVehicleTelemetry::new());
    telemetry
        .set_vehicle(
            "EV-010",
            VehicleState {
                soc_percent: 80.0,
                battery_capacity_kwh: 100.0,
                max_discharge_power_kw: Some(50.0),
            },
        )
        .await;
    telemetry
        .set_vehicle(
            "EV-003",
            VehicleState {
                soc_percent: 70.0,
                battery_capacity_kwh: 100.0,
                max_discharge_power_kw: Some(60.0),
            },
        )
        .await;

    AppState::with_collaborators(
        test_config(),
        Arc::new(InMemoryScheduleRepository::new()),
        telemetry,
        Arc::new(SimulatedGridDemand::default()),
        Arc::new(LoggingCommandChannel),
    )
    .unwrap()
}

fn t(hour: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2025, 6, 1, hour, 0, 0).unwrap()
}

fn window(start_h: u32, end_h: u32) -> DispatchWindow {
    DispatchWindow::new(t(start_h), t(end_h)).unwrap()
}

fn create_request(vehicle: &str, start_h: u32, end_h: u32) -> CreateDispatchRequest {
    CreateDispatchRequest {
        vehicle_id: vehicle.into(),
        window: window(start_h, end_h),
        discharge_power_kw: 30.0,
        grid_service_program_id: None,
        priority: DispatchPriority::Normal,
    }
}

#[tokio::test]
async fn feasibility_for_healthy_vehicle() {
    let (state, _rx) = wired_state().await;

    // EV-010: 80% SoC, 100 kWh pack, 30% reserve, 30 kW over 2 h.
    let assessment = state
        .feasibility
        .evaluate(&FeasibilityRequest {
            vehicle_id: "EV-010".into(),
            window: window(10, 12),
            max_discharge_power_kw: Some(30.0),
            min_soc_after_discharge_percent: Some(30.0),
            target_energy_to_discharge_kwh: None,
        })
        .await
        .unwrap();

    assert!(assessment.is_feasible);
    assert!(assessment.constraints_hit.is_empty());
    // min(50 available, 60 by power, 50 target default) = 50
    assert_eq!(assessment.estimated_dischargeable_energy_kwh, 50.0);
}

#[tokio::test]
async fn feasibility_blocked_by_low_soc() {
    // Same vehicle as the healthy case but sitting at 35% SoC.
    let telemetry = Arc::new(SimulatedVehicleTelemetry::new());
    telemetry
        .set_vehicle(
            "EV-010",
            VehicleState {
                soc_percent: 35.0,
                battery_capacity_kwh: 100.0,
                max_discharge_power_kw: Some(50.0),
            },
        )
        .await;
    let (state, _rx) = AppState::with_collaborators(
        test_config(),
        Arc::new(InMemoryScheduleRepository::new()),
        telemetry,
        Arc::new(SimulatedGridDemand::default()),
        Arc::new(LoggingCommandChannel),
    )
    .unwrap();

    let assessment = state
        .feasibility
        .evaluate(&FeasibilityRequest {
            vehicle_id: "EV-010".into(),
            window: window(10, 12),
            max_discharge_power_kw: Some(30.0),
            min_soc_after_discharge_percent: Some(30.0),
            target_energy_to_discharge_kwh: None,
        })
        .await
        .unwrap();

    assert!(!assessment.is_feasible);
    assert!(assessment
        .constraints_hit
        .iter()
        .any(|c| c == "Battery SoC too low for safe discharge"));
}

#[tokio::test]
async fn overlapping_schedules_rejected_abutting_accepted() {
    let (state, _rx) = wired_state().await;

    // A: 10:00-12:00 commits.
    let a = state
        .dispatch
        .create(create_request("EV-003", 10, 12))
        .await
        .unwrap();

    // B: 11:00-13:00 conflicts with A.
    let err = state
        .dispatch
        .create(create_request("EV-003", 11, 13))
        .await
        .unwrap_err();
    match err {
        DispatchError::SchedulingConflict { conflicting_id, .. } => {
            assert_eq!(conflicting_id, a.id)
        }
        other => panic!("expected SchedulingConflict, got {other:?}"),
    }

    // C: 12:00-13:00 abuts A and commits.
    state
        .dispatch
        .create(create_request("EV-003", 12, 13))
        .await
        .unwrap();

    let overview = state
        .dispatch
        .list(&ScheduleFilter {
            vehicle_id: Some("EV-003".into()),
            status: None,
        })
        .await
        .unwrap();
    assert_eq!(overview.summary.total, 2);
    assert_eq!(overview.summary.scheduled, 2);
}

#[tokio::test]
async fn estimated_revenue_matches_energy_times_rate() {
    let (state, _rx) = wired_state().await;

    let schedule = state
        .dispatch
        .create(create_request("EV-010", 10, 12))
        .await
        .unwrap();

    // 30 kW * 2 h = 60 kWh at the 0.40 default rate.
    assert_eq!(schedule.estimated_energy_kwh, 60.0);
    assert!((schedule.estimated_revenue - 60.0 * 0.40).abs() < 0.01);
}

#[tokio::test]
async fn status_machine_round_trip() {
    let (state, _rx) = wired_state().await;
    let schedule = state
        .dispatch
        .create(create_request("EV-010", 10, 12))
        .await
        .unwrap();

    state
        .dispatch
        .transition(schedule.id, DispatchStatus::Active)
        .await
        .unwrap();
    state
        .dispatch
        .transition(schedule.id, DispatchStatus::Completed)
        .await
        .unwrap();

    // Terminal: completed accepts no further moves.
    let err = state
        .dispatch
        .transition(schedule.id, DispatchStatus::Active)
        .await
        .unwrap_err();
    assert!(matches!(err, DispatchError::InvalidTransition { .. }));
}

#[tokio::test]
async fn cancelled_accepts_no_further_transitions() {
    let (state, _rx) = wired_state().await;
    let schedule = state
        .dispatch
        .create(create_request("EV-010", 10, 12))
        .await
        .unwrap();

    state
        .dispatch
        .transition(schedule.id, DispatchStatus::Cancelled)
        .await
        .unwrap();

    for next in [
        DispatchStatus::Scheduled,
        DispatchStatus::Active,
        DispatchStatus::Completed,
    ] {
        let err = state
            .dispatch
            .transition(schedule.id, next)
            .await
            .unwrap_err();
        assert!(matches!(err, DispatchError::InvalidTransition { .. }));
    }
}

#[tokio::test]
async fn progress_events_flow_through_reconciler() {
    let (state, progress_rx) = wired_state().await;
    app::spawn_background_tasks(&state, progress_rx);

    let now = Utc::now();
    let schedule = state
        .dispatch
        .create(CreateDispatchRequest {
            vehicle_id: "EV-010".into(),
            window: DispatchWindow::new(now - Duration::hours(1), now + Duration::hours(1))
                .unwrap(),
            discharge_power_kw: 30.0,
            grid_service_program_id: None,
            priority: DispatchPriority::Normal,
        })
        .await
        .unwrap();
    state
        .dispatch
        .transition(schedule.id, DispatchStatus::Active)
        .await
        .unwrap();

    state
        .progress_tx
        .send(DischargeProgressEvent {
            schedule_id: schedule.id,
            energy_discharged_kwh: 25.0,
            actual_revenue: None,
        })
        .await
        .unwrap();
    // Plan is 60 kWh; reaching it completes the schedule.
    state
        .progress_tx
        .send(DischargeProgressEvent {
            schedule_id: schedule.id,
            energy_discharged_kwh: 60.0,
            actual_revenue: None,
        })
        .await
        .unwrap();

    // Give the reconciler task a moment to drain the channel.
    let mut latest = state.dispatch.get(schedule.id).await.unwrap();
    for _ in 0..50 {
        if latest.status == DispatchStatus::Completed {
            break;
        }
        tokio::time::sleep(std::time::Duration::from_millis(10)).await;
        latest = state.dispatch.get(schedule.id).await.unwrap();
    }

    assert_eq!(latest.status, DispatchStatus::Completed);
    assert_eq!(latest.energy_discharged_kwh, 60.0);
    assert!((latest.actual_revenue - 60.0 * 0.40).abs() < 0.01);
}

#[tokio::test]
async fn feasibility_never_creates_schedules() {
    let (state, _rx) = wired_state().await;

    state
        .feasibility
        .evaluate(&FeasibilityRequest {
            vehicle_id: "EV-010".into(),
            window: window(10, 12),
            max_discharge_power_kw: Some(30.0),
            min_soc_after_discharge_percent: None,
            target_energy_to_discharge_kwh: None,
        })
        .await
        .unwrap();

    let overview = state.dispatch.list(&ScheduleFilter::default()).await.unwrap();
    assert_eq!(overview.summary.total, 0);
}
