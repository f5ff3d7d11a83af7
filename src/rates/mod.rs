use parking_lot::RwLock;
use serde::Serialize;
use std::collections::HashMap;

use crate::domain::{GridServiceProgram, ProgramConstraints};

/// Rate resolved for a dispatch. `program_id` is `None` when the lookup
/// degraded to the default rate.
#[derive(Debug, Clone, Serialize)]
pub struct ResolvedRate {
    pub program_id: Option<String>,
    pub rate_per_kwh: f64,
    pub constraints: ProgramConstraints,
}

/// Read-mostly mapping from grid-service-program id to its per-kWh rate and
/// operating constraints. Lookup never fails: unknown or absent program ids
/// resolve to the configured default rate.
#[derive(Debug)]
pub struct RateRegistry {
    default_rate_per_kwh: f64,
    programs: RwLock<HashMap<String, GridServiceProgram>>,
}

impl RateRegistry {
    pub fn new(default_rate_per_kwh: f64) -> Self {
        Self {
            default_rate_per_kwh,
            programs: RwLock::new(HashMap::new()),
        }
    }

    pub fn with_programs(
        default_rate_per_kwh: f64,
        programs: impl IntoIterator<Item = GridServiceProgram>,
    ) -> Self {
        let registry = Self::new(default_rate_per_kwh);
        for program in programs {
            registry.upsert(program);
        }
        registry
    }

    pub fn default_rate(&self) -> f64 {
        self.default_rate_per_kwh
    }

    /// Externally maintained: the partnerships layer pushes program updates.
    pub fn upsert(&self, program: GridServiceProgram) {
        self.programs.write().insert(program.id.clone(), program);
    }

    pub fn rate_for(&self, program_id: Option<&str>) -> ResolvedRate {
        if let Some(id) = program_id {
            if let Some(program) = self.programs.read().get(id) {
                return ResolvedRate {
                    program_id: Some(program.id.clone()),
                    rate_per_kwh: program.rate_per_kwh,
                    constraints: program.constraints.clone(),
                };
            }
            tracing::debug!(program_id = id, "unknown grid service program, using default rate");
        }
        ResolvedRate {
            program_id: None,
            rate_per_kwh: self.default_rate_per_kwh,
            constraints: ProgramConstraints::default(),
        }
    }
}
