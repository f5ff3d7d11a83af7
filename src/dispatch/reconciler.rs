//! Revenue reconciliation: folds discharge-progress telemetry into active
//! schedules and signals the scheduler toward completion. Never decides
//! feasibility and never creates schedules.

use chrono::Utc;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::dispatch::{DispatchError, DispatchService};
use crate::domain::DispatchStatus;

/// Progress report for one schedule, as delivered by the metering pipeline.
#[derive(Debug, Clone)]
pub struct DischargeProgressEvent {
    pub schedule_id: Uuid,
    /// Cumulative energy discharged so far.
    pub energy_discharged_kwh: f64,
    /// Settled revenue when the meter reports it; derived from the committed
    /// rate otherwise.
    pub actual_revenue: Option<f64>,
}

pub struct RevenueReconciler {
    dispatch: Arc<DispatchService>,
    events: mpsc::Receiver<DischargeProgressEvent>,
}

pub fn progress_channel(buffer: usize) -> (
    mpsc::Sender<DischargeProgressEvent>,
    mpsc::Receiver<DischargeProgressEvent>,
) {
    mpsc::channel(buffer)
}

impl RevenueReconciler {
    pub fn new(
        dispatch: Arc<DispatchService>,
        events: mpsc::Receiver<DischargeProgressEvent>,
    ) -> Self {
        Self { dispatch, events }
    }

    /// Event loop: apply progress as it arrives and periodically close
    /// windows that have expired. Returns when the event channel closes.
    pub async fn run(mut self) {
        let sweep_every =
            std::time::Duration::from_secs(self.dispatch.config().reconciler_sweep_secs.max(1));
        let mut sweep = tokio::time::interval(sweep_every);

        loop {
            tokio::select! {
                event = self.events.recv() => {
                    match event {
                        Some(event) => self.apply(event).await,
                        None => {
                            debug!("progress channel closed, reconciler stopping");
                            return;
                        }
                    }
                }
                _ = sweep.tick() => {
                    self.close_expired().await;
                }
            }
        }
    }

    async fn apply(&self, event: DischargeProgressEvent) {
        match self
            .dispatch
            .record_progress(
                event.schedule_id,
                event.energy_discharged_kwh,
                event.actual_revenue,
            )
            .await
        {
            Ok(schedule) => {
                if schedule.energy_discharged_kwh >= schedule.estimated_energy_kwh {
                    self.complete(schedule.id).await;
                }
            }
            Err(DispatchError::NotActive { id, status }) => {
                debug!(schedule_id = %id, %status, "dropping progress for non-active schedule");
            }
            Err(e) => {
                warn!(schedule_id = %event.schedule_id, error = %e, "progress event rejected");
            }
        }
    }

    /// Close every active schedule whose window has ended, flagging
    /// under-delivery for downstream reporting.
    pub async fn close_expired(&self) {
        let now = Utc::now();
        let committed = match self.dispatch.committed_schedules().await {
            Ok(committed) => committed,
            Err(e) => {
                warn!(error = %e, "reconciler sweep failed to list schedules");
                return;
            }
        };

        for schedule in committed {
            if schedule.status != DispatchStatus::Active || now < schedule.window.end {
                continue;
            }
            let planned = schedule.estimated_energy_kwh;
            let delivered = schedule.energy_discharged_kwh;
            if planned > 0.0 && delivered < planned * self.dispatch.config().under_delivery_ratio {
                warn!(
                    schedule_id = %schedule.id,
                    vehicle_id = %schedule.vehicle_id,
                    planned_kwh = planned,
                    delivered_kwh = delivered,
                    "under-delivery at window close"
                );
            }
            self.complete(schedule.id).await;
        }
    }

    async fn complete(&self, id: Uuid) {
        match self.dispatch.transition(id, DispatchStatus::Completed).await {
            Ok(_) => debug!(schedule_id = %id, "schedule completed by reconciler"),
            // A caller may have cancelled between our read and the transition.
            Err(DispatchError::InvalidTransition { .. }) => {}
            Err(e) => warn!(schedule_id = %id, error = %e, "failed to complete schedule"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DispatchConfig;
    use crate::dispatch::CreateDispatchRequest;
    use crate::domain::{DispatchPriority, DispatchWindow, LoggingCommandChannel};
    use crate::rates::RateRegistry;
    use crate::repo::InMemoryScheduleRepository;
    use chrono::{Duration, Utc};

    fn service() -> Arc<DispatchService> {
        Arc::new(DispatchService::new(
            Arc::new(InMemoryScheduleRepository::new()),
            Arc::new(RateRegistry::new(0.40)),
            Arc::new(LoggingCommandChannel),
            DispatchConfig::default(),
        ))
    }

    async fn active_schedule(
        svc: &DispatchService,
        start_offset_h: i64,
        end_offset_h: i64,
    ) -> Uuid {
        let now = Utc::now();
        let schedule = svc
            .create(CreateDispatchRequest {
                vehicle_id: "EV-001".into(),
                window: DispatchWindow::new(
                    now + Duration::hours(start_offset_h),
                    now + Duration::hours(end_offset_h),
                )
                .unwrap(),
                discharge_power_kw: 30.0,
                grid_service_program_id: None,
                priority: DispatchPriority::Normal,
            })
            .await
            .unwrap();
        svc.transition(schedule.id, DispatchStatus::Active)
            .await
            .unwrap();
        schedule.id
    }

    #[tokio::test]
    async fn test_progress_event_applied_and_completes_at_plan() {
        let svc = service();
        let id = active_schedule(&svc, -1, 1).await;

        let (tx, rx) = progress_channel(16);
        let reconciler = RevenueReconciler::new(svc.clone(), rx);

        // Plan is 30 kW * 2 h = 60 kWh; reaching it should complete.
        tx.send(DischargeProgressEvent {
            schedule_id: id,
            energy_discharged_kwh: 25.0,
            actual_revenue: None,
        })
        .await
        .unwrap();
        tx.send(DischargeProgressEvent {
            schedule_id: id,
            energy_discharged_kwh: 60.0,
            actual_revenue: None,
        })
        .await
        .unwrap();
        drop(tx);
        reconciler.run().await;

        let schedule = svc.get(id).await.unwrap();
        assert_eq!(schedule.status, DispatchStatus::Completed);
        assert_eq!(schedule.energy_discharged_kwh, 60.0);
        assert!((schedule.actual_revenue - 60.0 * 0.40).abs() < 0.01);
    }

    #[tokio::test]
    async fn test_sweep_closes_expired_window() {
        let svc = service();
        let id = active_schedule(&svc, -3, -1).await;
        svc.record_progress(id, 10.0, None).await.unwrap();

        let (_tx, rx) = progress_channel(1);
        let reconciler = RevenueReconciler::new(svc.clone(), rx);
        reconciler.close_expired().await;

        let schedule = svc.get(id).await.unwrap();
        assert_eq!(schedule.status, DispatchStatus::Completed);
    }

    #[tokio::test]
    async fn test_sweep_leaves_open_windows_running() {
        let svc = service();
        let id = active_schedule(&svc, -1, 2).await;

        let (_tx, rx) = progress_channel(1);
        let reconciler = RevenueReconciler::new(svc.clone(), rx);
        reconciler.close_expired().await;

        let schedule = svc.get(id).await.unwrap();
        assert_eq!(schedule.status, DispatchStatus::Active);
    }

    #[tokio::test]
    async fn test_bad_progress_event_does_not_stop_loop() {
        let svc = service();
        let id = active_schedule(&svc, -1, 1).await;

        let (tx, rx) = progress_channel(16);
        let reconciler = RevenueReconciler::new(svc.clone(), rx);

        // Unknown id, then a valid event; the loop must survive the first.
        tx.send(DischargeProgressEvent {
            schedule_id: Uuid::new_v4(),
            energy_discharged_kwh: 5.0,
            actual_revenue: None,
        })
        .await
        .unwrap();
        tx.send(DischargeProgressEvent {
            schedule_id: id,
            energy_discharged_kwh: 12.0,
            actual_revenue: Some(5.0),
        })
        .await
        .unwrap();
        drop(tx);
        reconciler.run().await;

        let schedule = svc.get(id).await.unwrap();
        assert_eq!(schedule.energy_discharged_kwh, 12.0);
        assert_eq!(schedule.actual_revenue, 5.0);
        assert_eq!(schedule.status, DispatchStatus::Active);
    }
}
