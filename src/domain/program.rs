use serde::{Deserialize, Serialize};

/// A grid-operator offering (frequency regulation, peak shaving, ...) with
/// its own compensation rate. Owned by the rate registry; read-only from the
/// scheduler's perspective.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GridServiceProgram {
    pub id: String,
    pub name: String,
    pub rate_per_kwh: f64,
    #[serde(default)]
    pub constraints: ProgramConstraints,
}

/// Operating constraints a program may impose on dispatch windows.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProgramConstraints {
    /// Minimum dispatch window duration in hours, if the program requires one.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub min_duration_hours: Option<f64>,
    /// Time-of-day availability as `[start_hour, end_hour)` in UTC.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub available_hours: Option<(u8, u8)>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_program_deserializes_without_constraints() {
        let program: GridServiceProgram = serde_json::from_str(
            r#"{"id":"freq-reg","name":"Frequency Regulation","rate_per_kwh":0.42}"#,
        )
        .unwrap();
        assert_eq!(program.id, "freq-reg");
        assert!(program.constraints.min_duration_hours.is_none());
        assert!(program.constraints.available_hours.is_none());
    }
}
