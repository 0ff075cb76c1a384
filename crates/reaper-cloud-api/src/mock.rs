//! Mock cloud gateway for testing

use async_trait::async_trait;
use reaper_util::MachineId;
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};

use crate::{CloudGateway, GatewayError, GatewayResult, Machine, MachineState, TagSet};

/// A recorded gateway call
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GatewayCall {
    ListMachines,
    GetMachine(MachineId),
    ListMachineTags(MachineId),
    StopMachine(MachineId),
    DeleteMachine(MachineId),
    RequestDeletion {
        machines: Vec<MachineId>,
        notify_address: String,
    },
}

/// In-memory gateway for unit/integration testing
pub struct MockGateway {
    machines: Arc<Mutex<Vec<Machine>>>,
    tags: Arc<Mutex<HashMap<MachineId, TagSet>>>,
    calls: Arc<Mutex<Vec<GatewayCall>>>,
    deletion_requests: Arc<Mutex<Vec<(Vec<Machine>, String)>>>,

    /// Configure tag lookups to fail
    pub fail_list_tags: Arc<Mutex<bool>>,

    /// Configure stop to fail
    pub fail_stop: Arc<Mutex<bool>>,

    /// Configure delete to fail
    pub fail_delete: Arc<Mutex<bool>>,

    /// Configure delete to fail for specific machines only
    pub fail_delete_of: Arc<Mutex<HashSet<MachineId>>>,

    /// Configure the deferred-deletion request to fail
    pub fail_request_deletion: Arc<Mutex<bool>>,

    /// Machines never finish stopping (state stays `stopping`)
    pub stuck_stopping: Arc<Mutex<bool>>,
}

impl MockGateway {
    pub fn new() -> Self {
        Self {
            machines: Arc::new(Mutex::new(Vec::new())),
            tags: Arc::new(Mutex::new(HashMap::new())),
            calls: Arc::new(Mutex::new(Vec::new())),
            deletion_requests: Arc::new(Mutex::new(Vec::new())),
            fail_list_tags: Arc::new(Mutex::new(false)),
            fail_stop: Arc::new(Mutex::new(false)),
            fail_delete: Arc::new(Mutex::new(false)),
            fail_delete_of: Arc::new(Mutex::new(HashSet::new())),
            fail_request_deletion: Arc::new(Mutex::new(false)),
            stuck_stopping: Arc::new(Mutex::new(false)),
        }
    }

    pub fn with_machine(self, machine: Machine) -> Self {
        self.machines.lock().unwrap().push(machine);
        self
    }

    pub fn with_tags(self, id: impl Into<MachineId>, tags: TagSet) -> Self {
        self.tags.lock().unwrap().insert(id.into(), tags);
        self
    }

    /// Machines still present (not deleted)
    pub fn machines(&self) -> Vec<Machine> {
        self.machines.lock().unwrap().clone()
    }

    /// Every call made so far, in order
    pub fn calls(&self) -> Vec<GatewayCall> {
        self.calls.lock().unwrap().clone()
    }

    /// Ids passed to `delete_machine`, in order
    pub fn deleted_ids(&self) -> Vec<MachineId> {
        self.calls()
            .into_iter()
            .filter_map(|c| match c {
                GatewayCall::DeleteMachine(id) => Some(id),
                _ => None,
            })
            .collect()
    }

    /// Ids passed to `stop_machine`, in order
    pub fn stopped_ids(&self) -> Vec<MachineId> {
        self.calls()
            .into_iter()
            .filter_map(|c| match c {
                GatewayCall::StopMachine(id) => Some(id),
                _ => None,
            })
            .collect()
    }

    /// Ids passed to `list_machine_tags`, in order
    pub fn tag_lookups(&self) -> Vec<MachineId> {
        self.calls()
            .into_iter()
            .filter_map(|c| match c {
                GatewayCall::ListMachineTags(id) => Some(id),
                _ => None,
            })
            .collect()
    }

    /// Every deferred-deletion request with its full batch
    pub fn deletion_requests(&self) -> Vec<(Vec<Machine>, String)> {
        self.deletion_requests.lock().unwrap().clone()
    }

    fn record(&self, call: GatewayCall) {
        self.calls.lock().unwrap().push(call);
    }

    fn find(&self, id: &MachineId) -> GatewayResult<Machine> {
        self.machines
            .lock()
            .unwrap()
            .iter()
            .find(|m| &m.id == id)
            .cloned()
            .ok_or_else(|| GatewayError::NotFound(format!("machine {}", id)))
    }
}

impl Default for MockGateway {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl CloudGateway for MockGateway {
    async fn list_machines(&self) -> GatewayResult<Vec<Machine>> {
        self.record(GatewayCall::ListMachines);
        Ok(self.machines())
    }

    async fn get_machine(&self, id: &MachineId) -> GatewayResult<Machine> {
        self.record(GatewayCall::GetMachine(id.clone()));
        self.find(id)
    }

    async fn list_machine_tags(&self, id: &MachineId) -> GatewayResult<TagSet> {
        self.record(GatewayCall::ListMachineTags(id.clone()));
        if *self.fail_list_tags.lock().unwrap() {
            return Err(GatewayError::Transport("Mock tag lookup failure".into()));
        }
        self.find(id)?;
        Ok(self.tags.lock().unwrap().get(id).cloned().unwrap_or_default())
    }

    async fn stop_machine(&self, id: &MachineId) -> GatewayResult<()> {
        self.record(GatewayCall::StopMachine(id.clone()));
        if *self.fail_stop.lock().unwrap() {
            return Err(GatewayError::Api {
                status: 409,
                message: "Mock stop failure".into(),
            });
        }

        let next_state = if *self.stuck_stopping.lock().unwrap() {
            MachineState::Stopping
        } else {
            MachineState::Stopped
        };

        let mut machines = self.machines.lock().unwrap();
        match machines.iter_mut().find(|m| &m.id == id) {
            Some(machine) => {
                machine.state = next_state;
                Ok(())
            }
            None => Err(GatewayError::NotFound(format!("machine {}", id))),
        }
    }

    async fn delete_machine(&self, id: &MachineId) -> GatewayResult<()> {
        self.record(GatewayCall::DeleteMachine(id.clone()));
        if *self.fail_delete.lock().unwrap() || self.fail_delete_of.lock().unwrap().contains(id) {
            return Err(GatewayError::Api {
                status: 409,
                message: "Mock delete failure".into(),
            });
        }

        let mut machines = self.machines.lock().unwrap();
        let before = machines.len();
        machines.retain(|m| &m.id != id);
        if machines.len() == before {
            return Err(GatewayError::NotFound(format!("machine {}", id)));
        }
        Ok(())
    }

    async fn request_deletion(
        &self,
        batch: &[Machine],
        notify_address: &str,
    ) -> GatewayResult<()> {
        self.record(GatewayCall::RequestDeletion {
            machines: batch.iter().map(|m| m.id.clone()).collect(),
            notify_address: notify_address.to_string(),
        });
        if *self.fail_request_deletion.lock().unwrap() {
            return Err(GatewayError::Transport("Mock notification failure".into()));
        }
        self.deletion_requests
            .lock()
            .unwrap()
            .push((batch.to_vec(), notify_address.to_string()));
        Ok(())
    }
}
