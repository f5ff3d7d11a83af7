use async_trait::async_trait;
use std::collections::HashMap;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::domain::DispatchSchedule;
use crate::repo::{ScheduleFilter, ScheduleRepository};

/// In-memory schedule store. Insertion order is preserved so listings and
/// conflict reports are stable.
#[derive(Debug, Default)]
pub struct InMemoryScheduleRepository {
    inner: RwLock<Store>,
}

#[derive(Debug, Default)]
struct Store {
    schedules: HashMap<Uuid, DispatchSchedule>,
    order: Vec<Uuid>,
}

impl InMemoryScheduleRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Store {
    fn ordered(&self) -> impl Iterator<Item = &DispatchSchedule> {
        self.order.iter().filter_map(|id| self.schedules.get(id))
    }
}

#[async_trait]
impl ScheduleRepository for InMemoryScheduleRepository {
    async fn insert(&self, schedule: DispatchSchedule) -> anyhow::Result<()> {
        let mut store = self.inner.write().await;
        if store.schedules.contains_key(&schedule.id) {
            anyhow::bail!("schedule {} already exists", schedule.id);
        }
        store.order.push(schedule.id);
        store.schedules.insert(schedule.id, schedule);
        Ok(())
    }

    async fn update(&self, schedule: DispatchSchedule) -> anyhow::Result<()> {
        let mut store = self.inner.write().await;
        if !store.schedules.contains_key(&schedule.id) {
            anyhow::bail!("schedule {} does not exist", schedule.id);
        }
        store.schedules.insert(schedule.id, schedule);
        Ok(())
    }

    async fn find_by_id(&self, id: Uuid) -> anyhow::Result<Option<DispatchSchedule>> {
        Ok(self.inner.read().await.schedules.get(&id).cloned())
    }

    async fn find_by_vehicle(&self, vehicle_id: &str) -> anyhow::Result<Vec<DispatchSchedule>> {
        let store = self.inner.read().await;
        Ok(store
            .ordered()
            .filter(|s| s.vehicle_id == vehicle_id)
            .cloned()
            .collect())
    }

    async fn list(&self, filter: &ScheduleFilter) -> anyhow::Result<Vec<DispatchSchedule>> {
        let store = self.inner.read().await;
        Ok(store
            .ordered()
            .filter(|s| {
                filter
                    .vehicle_id
                    .as_deref()
                    .map_or(true, |v| s.vehicle_id == v)
                    && filter.status.map_or(true, |st| s.status == st)
            })
            .cloned()
            .collect())
    }

    async fn list_committed(&self) -> anyhow::Result<Vec<DispatchSchedule>> {
        let store = self.inner.read().await;
        Ok(store
            .ordered()
            .filter(|s| s.status.is_committed())
            .cloned()
            .collect())
    }
}
