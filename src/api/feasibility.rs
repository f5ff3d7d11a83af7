use axum::{extract::State, Json};
use chrono::{DateTime, Utc};
use serde::Deserialize;
use validator::Validate;

use crate::{
    api::{error::ApiError, response::ApiResponse},
    app::AppState,
    auth::AuthBearer,
    dispatch::{FeasibilityAssessment, FeasibilityRequest},
    domain::DispatchWindow,
};

/// Request to assess dischargeability of a window before any commitment.
#[derive(Debug, Deserialize, Validate)]
pub struct FeasibilityPayload {
    #[validate(length(min = 1, message = "vehicle_id is required"))]
    pub vehicle_id: String,
    pub start_datetime: DateTime<Utc>,
    pub end_datetime: DateTime<Utc>,
    #[validate(range(min = 0.001, message = "max_discharge_power_kw must be positive"))]
    pub max_discharge_power_kw: Option<f64>,
    #[validate(range(min = 0.0, max = 100.0))]
    pub min_soc_after_discharge_percent: Option<f64>,
    #[validate(range(min = 0.0))]
    pub target_energy_to_discharge_kwh: Option<f64>,
}

/// POST /api/v1/feasibility - evaluate a candidate discharge window.
/// Read-only: never creates or mutates a schedule.
pub async fn assess_feasibility(
    State(state): State<AppState>,
    _auth: AuthBearer,
    Json(payload): Json<FeasibilityPayload>,
) -> Result<Json<ApiResponse<FeasibilityAssessment>>, ApiError> {
    payload.validate()?;

    let window = DispatchWindow::new(payload.start_datetime, payload.end_datetime)
        .ok_or_else(|| {
            ApiError::ValidationError("end_datetime must be after start_datetime".into())
        })?;

    let request = FeasibilityRequest {
        vehicle_id: payload.vehicle_id,
        window,
        max_discharge_power_kw: payload.max_discharge_power_kw,
        min_soc_after_discharge_percent: payload.min_soc_after_discharge_percent,
        target_energy_to_discharge_kwh: payload.target_energy_to_discharge_kwh,
    };
    let assessment = state.feasibility.evaluate(&request).await?;

    Ok(Json(ApiResponse::success(assessment)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_payload_validation() {
        let payload = FeasibilityPayload {
            vehicle_id: "".into(),
            start_datetime: Utc::now(),
            end_datetime: Utc::now(),
            max_discharge_power_kw: Some(-5.0),
            min_soc_after_discharge_percent: Some(150.0),
            target_energy_to_discharge_kwh: None,
        };
        let errors = payload.validate().unwrap_err();
        assert!(errors.field_errors().contains_key("vehicle_id"));
        assert!(errors.field_errors().contains_key("max_discharge_power_kw"));
        assert!(errors
            .field_errors()
            .contains_key("min_soc_after_discharge_percent"));
    }

    #[test]
    fn test_payload_deserializes_with_optionals_absent() {
        let payload: FeasibilityPayload = serde_json::from_str(
            r#"{
                "vehicle_id": "EV-010",
                "start_datetime": "2025-06-01T10:00:00Z",
                "end_datetime": "2025-06-01T12:00:00Z"
            }"#,
        )
        .unwrap();
        assert!(payload.validate().is_ok());
        assert!(payload.max_discharge_power_kw.is_none());
    }
}
