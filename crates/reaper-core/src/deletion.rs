//! Direct deletion state machine

use reaper_cloud_api::{CloudGateway, Machine, MachineState};
use reaper_util::{MachineId, Pacer};
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::{ReapError, ReapResult};

/// Where a machine is on its way to deletion
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeletionState {
    Running,
    Stopping,
    Stopped,
    Deleting,
    Deleted,
    Failed { reason: String },
}

impl DeletionState {
    /// Entry state for a machine, or None if the provider state is not settled
    pub fn initial(state: &MachineState) -> Option<Self> {
        match state {
            MachineState::Running => Some(DeletionState::Running),
            MachineState::Stopped => Some(DeletionState::Stopped),
            _ => None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, DeletionState::Deleted | DeletionState::Failed { .. })
    }
}

/// Options for one direct deletion
#[derive(Debug, Clone, Copy)]
pub struct DeletionOptions {
    /// Log instead of calling the gateway
    pub dry_run: bool,

    /// Interval between state polls while stopping
    pub poll: Pacer,

    /// Give up if the machine has not stopped after this long
    pub stop_timeout: Duration,
}

/// Drives a single machine from its settled state to deleted
#[derive(Debug)]
pub struct DirectDeletion {
    machine_id: MachineId,
    state: DeletionState,
    history: Vec<DeletionState>,
}

impl DirectDeletion {
    /// Start a deletion; fails for machines that are mid-transition
    pub fn new(machine: &Machine) -> ReapResult<Self> {
        let state = DeletionState::initial(&machine.state).ok_or_else(|| {
            ReapError::NotDirectlyDeletable {
                machine_id: machine.id.clone(),
                state: machine.state.clone(),
            }
        })?;

        Ok(Self {
            machine_id: machine.id.clone(),
            history: vec![state.clone()],
            state,
        })
    }

    pub fn machine_id(&self) -> &MachineId {
        &self.machine_id
    }

    pub fn state(&self) -> &DeletionState {
        &self.state
    }

    /// Every state visited, in order, starting with the initial one
    pub fn history(&self) -> &[DeletionState] {
        &self.history
    }

    /// Run to a terminal state. The first gateway failure moves the machine to
    /// `Failed` and is returned; nothing is retried.
    pub async fn run(
        &mut self,
        gateway: &dyn CloudGateway,
        options: &DeletionOptions,
    ) -> ReapResult<()> {
        if options.dry_run {
            info!(machine_id = %self.machine_id, "Dry run: would delete machine");
            self.transition(DeletionState::Deleted);
            return Ok(());
        }

        while !self.state.is_terminal() {
            if let Err(e) = self.step(gateway, options).await {
                warn!(machine_id = %self.machine_id, error = %e, "Direct deletion failed");
                self.transition(DeletionState::Failed {
                    reason: e.to_string(),
                });
                return Err(e);
            }
        }

        info!(machine_id = %self.machine_id, "Machine deleted");
        Ok(())
    }

    async fn step(
        &mut self,
        gateway: &dyn CloudGateway,
        options: &DeletionOptions,
    ) -> ReapResult<()> {
        match self.state {
            DeletionState::Running => {
                gateway.stop_machine(&self.machine_id).await?;
                self.transition(DeletionState::Stopping);
            }
            DeletionState::Stopping => {
                self.wait_until_stopped(gateway, options).await?;
                self.transition(DeletionState::Stopped);
            }
            DeletionState::Stopped => {
                self.transition(DeletionState::Deleting);
            }
            DeletionState::Deleting => {
                gateway.delete_machine(&self.machine_id).await?;
                self.transition(DeletionState::Deleted);
            }
            DeletionState::Deleted | DeletionState::Failed { .. } => {}
        }
        Ok(())
    }

    async fn wait_until_stopped(
        &self,
        gateway: &dyn CloudGateway,
        options: &DeletionOptions,
    ) -> ReapResult<()> {
        let started = Instant::now();
        let deadline = started + options.stop_timeout;

        loop {
            let machine = gateway.get_machine(&self.machine_id).await?;
            if machine.state == MachineState::Stopped {
                return Ok(());
            }

            if Instant::now() >= deadline {
                return Err(ReapError::StopTimeout {
                    machine_id: self.machine_id.clone(),
                    waited: started.elapsed(),
                    last_state: machine.state,
                });
            }

            debug!(
                machine_id = %self.machine_id,
                state = %machine.state,
                "Waiting for machine to stop"
            );
            options.poll.wait().await;
        }
    }

    fn transition(&mut self, next: DeletionState) {
        debug!(
            machine_id = %self.machine_id,
            from = ?self.state,
            to = ?next,
            "Deletion state change"
        );
        self.state = next.clone();
        self.history.push(next);
    }
}
