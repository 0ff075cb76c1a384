//! What a retirement pass did to each machine

use reaper_cloud_api::MachineState;
use reaper_util::{MachineId, RunId};
use std::time::Duration;

/// Per-machine outcome of a pass, in listing order
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RetirementEvent {
    /// Younger than the threshold; tags never looked up
    Retained { machine_id: MachineId, age: Duration },

    /// Old enough but tagged `permanent=true`
    Protected { machine_id: MachineId, age: Duration },

    /// Deleted through the API (or would have been, in a dry run)
    Deleted {
        machine_id: MachineId,
        age: Duration,
        dry_run: bool,
    },

    /// Stuck mid-transition; included in the deferred deletion request
    Deferred {
        machine_id: MachineId,
        age: Duration,
        state: MachineState,
    },
}

impl RetirementEvent {
    pub fn machine_id(&self) -> &MachineId {
        match self {
            RetirementEvent::Retained { machine_id, .. }
            | RetirementEvent::Protected { machine_id, .. }
            | RetirementEvent::Deleted { machine_id, .. }
            | RetirementEvent::Deferred { machine_id, .. } => machine_id,
        }
    }
}

/// Summary of a completed pass
#[derive(Debug, Clone)]
pub struct RetirementReport {
    pub run_id: RunId,
    pub dry_run: bool,
    pub events: Vec<RetirementEvent>,

    /// Whether the deferred deletion request was actually sent
    pub deletion_requested: bool,
}

impl RetirementReport {
    pub fn deleted(&self) -> Vec<&MachineId> {
        self.ids_where(|e| matches!(e, RetirementEvent::Deleted { .. }))
    }

    pub fn deferred(&self) -> Vec<&MachineId> {
        self.ids_where(|e| matches!(e, RetirementEvent::Deferred { .. }))
    }

    pub fn protected(&self) -> Vec<&MachineId> {
        self.ids_where(|e| matches!(e, RetirementEvent::Protected { .. }))
    }

    pub fn retained(&self) -> Vec<&MachineId> {
        self.ids_where(|e| matches!(e, RetirementEvent::Retained { .. }))
    }

    fn ids_where(&self, pred: impl Fn(&RetirementEvent) -> bool) -> Vec<&MachineId> {
        self.events
            .iter()
            .filter(|e| pred(e))
            .map(RetirementEvent::machine_id)
            .collect()
    }
}
