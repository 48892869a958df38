use std::sync::Arc;

use shared::domain::{
    EquipmentId, RequestId, StaffId, StaffMember, TransportEquipment, TransportRequest,
};
use tokio::sync::RwLock;
use tracing::debug;

pub mod seed;

/// The three dispatch collections. Mutated only through [`Storage::transact`].
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DispatchState {
    pub requests: Vec<TransportRequest>,
    pub staff: Vec<StaffMember>,
    pub equipment: Vec<TransportEquipment>,
}

impl DispatchState {
    pub fn request_index(&self, id: &RequestId) -> Option<usize> {
        self.requests.iter().position(|r| &r.id == id)
    }

    pub fn staff_index(&self, id: &StaffId) -> Option<usize> {
        self.staff.iter().position(|s| &s.id == id)
    }

    pub fn equipment_index(&self, id: &EquipmentId) -> Option<usize> {
        self.equipment.iter().position(|e| &e.id == id)
    }

    pub fn request(&self, id: &RequestId) -> Option<&TransportRequest> {
        self.requests.iter().find(|r| &r.id == id)
    }

    pub fn staff_member(&self, id: &StaffId) -> Option<&StaffMember> {
        self.staff.iter().find(|s| &s.id == id)
    }

    pub fn staff_member_mut(&mut self, id: &StaffId) -> Option<&mut StaffMember> {
        self.staff.iter_mut().find(|s| &s.id == id)
    }

    pub fn equipment_unit(&self, id: &EquipmentId) -> Option<&TransportEquipment> {
        self.equipment.iter().find(|e| &e.id == id)
    }

    pub fn equipment_unit_mut(&mut self, id: &EquipmentId) -> Option<&mut TransportEquipment> {
        self.equipment.iter_mut().find(|e| &e.id == id)
    }

    pub fn next_request_id(&self) -> RequestId {
        loop {
            let id = RequestId::generate();
            if self.request(&id).is_none() {
                return id;
            }
        }
    }

    pub fn next_staff_id(&self) -> StaffId {
        loop {
            let id = StaffId::generate();
            if self.staff_member(&id).is_none() {
                return id;
            }
        }
    }

    pub fn next_equipment_id(&self) -> EquipmentId {
        loop {
            let id = EquipmentId::generate();
            if self.equipment_unit(&id).is_none() {
                return id;
            }
        }
    }
}

#[derive(Debug, Clone)]
pub struct Snapshot {
    pub revision: u64,
    pub state: DispatchState,
}

#[derive(Debug, Default)]
struct Versioned {
    revision: u64,
    state: DispatchState,
}

/// Shared handle to the dispatch state. Every writer goes through the same
/// lock, so a transaction never interleaves with another one.
#[derive(Clone, Default)]
pub struct Storage {
    inner: Arc<RwLock<Versioned>>,
}

impl Storage {
    pub fn new(state: DispatchState) -> Self {
        Self {
            inner: Arc::new(RwLock::new(Versioned { revision: 0, state })),
        }
    }

    pub fn with_demo_data() -> Self {
        Self::new(seed::demo_state())
    }

    pub async fn snapshot(&self) -> Snapshot {
        let guard = self.inner.read().await;
        Snapshot {
            revision: guard.revision,
            state: guard.state.clone(),
        }
    }

    pub async fn read<R>(&self, f: impl FnOnce(&DispatchState) -> R) -> R {
        let guard = self.inner.read().await;
        f(&guard.state)
    }

    pub async fn revision(&self) -> u64 {
        self.inner.read().await.revision
    }

    /// Applies `f` to a copy of the current state and commits the copy only
    /// when `f` succeeds. On error the stored state is left untouched. The
    /// revision advances only when the committed state differs.
    pub async fn transact<T, E>(
        &self,
        f: impl FnOnce(&mut DispatchState) -> Result<T, E>,
    ) -> Result<T, E> {
        let mut guard = self.inner.write().await;
        let mut working = guard.state.clone();
        let value = f(&mut working)?;
        if working != guard.state {
            guard.state = working;
            guard.revision += 1;
            debug!(revision = guard.revision, "dispatch state committed");
        }
        Ok(value)
    }
}

#[cfg(test)]
#[path = "tests/lib_tests.rs"]
mod tests;
