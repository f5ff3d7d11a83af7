use axum::{
    extract::{Path, Query, State},
    Json,
};
use chrono::{DateTime, Utc};
use serde::Deserialize;
use uuid::Uuid;
use validator::Validate;

use crate::{
    api::{error::ApiError, response::ApiResponse},
    app::AppState,
    auth::AuthBearer,
    dispatch::{CreateDispatchRequest, DispatchOverview},
    domain::{DispatchPriority, DispatchSchedule, DispatchStatus, DispatchWindow},
    repo::ScheduleFilter,
};

#[derive(Debug, Deserialize)]
pub struct DispatchQuery {
    pub vehicle_id: Option<String>,
    pub status: Option<DispatchStatus>,
}

/// GET /api/v1/dispatch - filtered schedules plus per-status summary.
pub async fn list_dispatches(
    State(state): State<AppState>,
    _auth: AuthBearer,
    Query(query): Query<DispatchQuery>,
) -> Result<Json<ApiResponse<DispatchOverview>>, ApiError> {
    let filter = ScheduleFilter {
        vehicle_id: query.vehicle_id,
        status: query.status,
    };
    let overview = state.dispatch.list(&filter).await?;
    Ok(Json(ApiResponse::success(overview)))
}

/// Request to commit a discharge window.
#[derive(Debug, Deserialize, Validate)]
pub struct CreateDispatchPayload {
    #[validate(length(min = 1, message = "vehicle_id is required"))]
    pub vehicle_id: String,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    #[validate(range(min = 0.001, message = "discharge_power_kw must be positive"))]
    pub discharge_power_kw: f64,
    pub grid_service_program_id: Option<String>,
    #[serde(default)]
    pub priority: DispatchPriority,
}

/// POST /api/v1/dispatch - create a schedule (conflict-checked).
pub async fn create_dispatch(
    State(state): State<AppState>,
    _auth: AuthBearer,
    Json(payload): Json<CreateDispatchPayload>,
) -> Result<Json<ApiResponse<DispatchSchedule>>, ApiError> {
    payload.validate()?;

    let window = DispatchWindow::new(payload.start_time, payload.end_time).ok_or_else(|| {
        ApiError::ValidationError("end_time must be after start_time".into())
    })?;

    let schedule = state
        .dispatch
        .create(CreateDispatchRequest {
            vehicle_id: payload.vehicle_id,
            window,
            discharge_power_kw: payload.discharge_power_kw,
            grid_service_program_id: payload.grid_service_program_id,
            priority: payload.priority,
        })
        .await?;

    Ok(Json(ApiResponse::success(schedule)))
}

/// Status transition and/or progress update in one request. When both are
/// present the progress lands first, so a final meter reading can accompany
/// the move to completed.
#[derive(Debug, Deserialize, Validate)]
pub struct UpdateDispatchPayload {
    pub status: Option<DispatchStatus>,
    #[validate(range(min = 0.0))]
    pub energy_discharged_kwh: Option<f64>,
    #[validate(range(min = 0.0))]
    pub actual_revenue: Option<f64>,
}

/// PUT /api/v1/dispatch/{id} - transition and/or record progress.
pub async fn update_dispatch(
    State(state): State<AppState>,
    _auth: AuthBearer,
    Path(id): Path<Uuid>,
    Json(payload): Json<UpdateDispatchPayload>,
) -> Result<Json<ApiResponse<DispatchSchedule>>, ApiError> {
    payload.validate()?;

    if payload.status.is_none() && payload.energy_discharged_kwh.is_none() {
        return Err(ApiError::ValidationError(
            "nothing to update: provide status and/or energy_discharged_kwh".into(),
        ));
    }

    let mut schedule = state.dispatch.get(id).await?;
    if let Some(energy) = payload.energy_discharged_kwh {
        schedule = state
            .dispatch
            .record_progress(id, energy, payload.actual_revenue)
            .await?;
    }
    if let Some(status) = payload.status {
        schedule = state.dispatch.transition(id, status).await?;
    }

    Ok(Json(ApiResponse::success(schedule)))
}
