pub mod memory;

use async_trait::async_trait;
use uuid::Uuid;

use crate::domain::{DispatchSchedule, DispatchStatus};

pub use memory::InMemoryScheduleRepository;

/// Listing filter for dispatch schedules.
#[derive(Debug, Clone, Default)]
pub struct ScheduleFilter {
    pub vehicle_id: Option<String>,
    pub status: Option<DispatchStatus>,
}

/// Persistence boundary for dispatch schedules. Implementations must make
/// single-record insert/update atomic; cross-record atomicity (the
/// conflict-check-then-insert unit) is provided by the dispatch service's
/// per-vehicle serialization on top of this trait.
#[async_trait]
pub trait ScheduleRepository: Send + Sync {
    async fn insert(&self, schedule: DispatchSchedule) -> anyhow::Result<()>;
    async fn update(&self, schedule: DispatchSchedule) -> anyhow::Result<()>;
    async fn find_by_id(&self, id: Uuid) -> anyhow::Result<Option<DispatchSchedule>>;
    /// All schedules for one vehicle, any status.
    async fn find_by_vehicle(&self, vehicle_id: &str) -> anyhow::Result<Vec<DispatchSchedule>>;
    async fn list(&self, filter: &ScheduleFilter) -> anyhow::Result<Vec<DispatchSchedule>>;
    /// Schedules in a committed status (scheduled or active), across vehicles.
    async fn list_committed(&self) -> anyhow::Result<Vec<DispatchSchedule>>;
}
