//! Deferred deletion request body

use chrono::{DateTime, Utc};
use reaper_cloud_api::{Machine, MachineState};
use reaper_util::{MachineId, format_created};
use serde::Serialize;

/// JSON body POSTed to the notification webhook
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DeletionRequest {
    pub account: String,
    pub notify_address: String,
    pub requested_at: String,
    pub machines: Vec<DeletionEntry>,
}

/// One machine awaiting manual deletion
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DeletionEntry {
    pub id: MachineId,
    pub name: Option<String>,
    pub state: MachineState,
    pub created: String,
}

impl DeletionRequest {
    pub fn new(
        account: &str,
        notify_address: &str,
        batch: &[Machine],
        requested_at: DateTime<Utc>,
    ) -> Self {
        Self {
            account: account.to_string(),
            notify_address: notify_address.to_string(),
            requested_at: format_created(&requested_at),
            machines: batch.iter().map(DeletionEntry::from).collect(),
        }
    }
}

impl From<&Machine> for DeletionEntry {
    fn from(machine: &Machine) -> Self {
        Self {
            id: machine.id.clone(),
            name: machine.name.clone(),
            state: machine.state.clone(),
            created: machine.created.clone(),
        }
    }
}
