//! Errors that end a retirement pass

use reaper_cloud_api::{GatewayError, MachineState};
use reaper_util::{MachineId, TimestampError};
use std::time::Duration;
use thiserror::Error;

/// Any of these aborts the pass. Machines already deleted stay deleted and
/// the deferred batch collected so far is dropped.
#[derive(Debug, Error)]
pub enum ReapError {
    #[error("Gateway error: {0}")]
    Gateway(#[from] GatewayError),

    #[error("Machine {machine_id} has an unreadable creation time: {source}")]
    InvalidTimestamp {
        machine_id: MachineId,
        #[source]
        source: TimestampError,
    },

    #[error("Machine {machine_id} did not stop within {waited:?} (last state: {last_state})")]
    StopTimeout {
        machine_id: MachineId,
        waited: Duration,
        last_state: MachineState,
    },

    #[error("Machine {machine_id} cannot be deleted directly while {state}")]
    NotDirectlyDeletable {
        machine_id: MachineId,
        state: MachineState,
    },

    #[error("No notification address for the deferred deletion request")]
    MissingNotifyAddress,
}

pub type ReapResult<T> = Result<T, ReapError>;
