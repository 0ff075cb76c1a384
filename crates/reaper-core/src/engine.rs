//! Retirement engine

use chrono::{DateTime, Utc};
use reaper_cloud_api::{CloudGateway, Machine};
use reaper_config::{DEFAULT_PAUSE, DEFAULT_STOP_TIMEOUT, ReaperConfig};
use reaper_util::{Pacer, RunId, age_at, format_duration, now_utc};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::{
    DeletionOptions, DirectDeletion, ReapError, ReapResult, RetirementEvent, RetirementReport,
};

/// Lower bound on the interval between stop polls
pub const MIN_STOP_POLL: Duration = Duration::from_secs(1);

/// Engine settings, fixed for the engine's lifetime
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EngineSettings {
    /// Delay after each direct deletion, also the stop poll interval (at least [`MIN_STOP_POLL`])
    pub pause: Duration,

    /// Log mutating actions instead of performing them
    pub dry_run: bool,

    /// How long a machine may take to reach `stopped`
    pub stop_timeout: Duration,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            pause: DEFAULT_PAUSE,
            dry_run: false,
            stop_timeout: DEFAULT_STOP_TIMEOUT,
        }
    }
}

impl From<&ReaperConfig> for EngineSettings {
    fn from(config: &ReaperConfig) -> Self {
        Self {
            pause: config.pause,
            dry_run: config.dry_run,
            stop_timeout: config.stop_timeout,
        }
    }
}

/// The retirement engine
pub struct RetirementEngine {
    gateway: Arc<dyn CloudGateway>,
    settings: EngineSettings,
    pacer: Pacer,
}

impl RetirementEngine {
    pub fn new(gateway: Arc<dyn CloudGateway>, settings: EngineSettings) -> Self {
        info!(
            pause_secs = settings.pause.as_secs(),
            dry_run = settings.dry_run,
            "Retirement engine initialized"
        );

        Self {
            gateway,
            pacer: Pacer::new(settings.pause),
            settings,
        }
    }

    /// All machines in the account, in provider order
    pub async fn list_machines(&self) -> ReapResult<Vec<Machine>> {
        Ok(self.gateway.list_machines().await?)
    }

    /// Delete or queue for deletion every unprotected machine older than `age_hours`
    pub async fn delete_old_machines(
        &self,
        age_hours: u64,
        notify_address: &str,
    ) -> ReapResult<RetirementReport> {
        self.delete_old_machines_at(now_utc(), age_hours, notify_address)
            .await
    }

    /// Same as [`delete_old_machines`](Self::delete_old_machines) with an explicit clock
    pub async fn delete_old_machines_at(
        &self,
        now: DateTime<Utc>,
        age_hours: u64,
        notify_address: &str,
    ) -> ReapResult<RetirementReport> {
        let run_id = RunId::new();
        let threshold = Duration::from_secs(age_hours.saturating_mul(3600));

        info!(
            run_id = %run_id,
            age_hours,
            dry_run = self.settings.dry_run,
            "Retirement pass starting"
        );

        let machines = self.gateway.list_machines().await?;
        debug!(run_id = %run_id, count = machines.len(), "Machines listed");

        let mut events = Vec::with_capacity(machines.len());
        let mut batch: Vec<Machine> = Vec::new();

        for machine in machines {
            let created = machine
                .created_at()
                .map_err(|source| ReapError::InvalidTimestamp {
                    machine_id: machine.id.clone(),
                    source,
                })?;
            let age = age_at(created, now);

            if age <= threshold {
                debug!(machine_id = %machine.id, age = %format_duration(age), "Retained");
                events.push(RetirementEvent::Retained {
                    machine_id: machine.id,
                    age,
                });
                continue;
            }

            let tags = self.gateway.list_machine_tags(&machine.id).await?;
            if tags.is_permanent() {
                info!(machine_id = %machine.id, age = %format_duration(age), "Permanent, skipping");
                events.push(RetirementEvent::Protected {
                    machine_id: machine.id,
                    age,
                });
                continue;
            }

            if machine.state.is_settled() {
                info!(
                    machine_id = %machine.id,
                    state = %machine.state,
                    age = %format_duration(age),
                    "Deleting old machine"
                );
                self.delete_directly(&machine).await?;
                events.push(RetirementEvent::Deleted {
                    machine_id: machine.id,
                    age,
                    dry_run: self.settings.dry_run,
                });
            } else {
                info!(
                    machine_id = %machine.id,
                    state = %machine.state,
                    age = %format_duration(age),
                    "Machine stuck, deferring deletion"
                );
                events.push(RetirementEvent::Deferred {
                    machine_id: machine.id.clone(),
                    age,
                    state: machine.state.clone(),
                });
                batch.push(machine);
            }
        }

        let deletion_requested = self.submit_batch(&batch, notify_address).await?;

        let report = RetirementReport {
            run_id,
            dry_run: self.settings.dry_run,
            events,
            deletion_requested,
        };

        info!(
            run_id = %run_id,
            deleted = report.deleted().len(),
            deferred = report.deferred().len(),
            protected = report.protected().len(),
            retained = report.retained().len(),
            "Retirement pass complete"
        );

        Ok(report)
    }

    async fn delete_directly(&self, machine: &Machine) -> ReapResult<()> {
        let options = DeletionOptions {
            dry_run: self.settings.dry_run,
            poll: Pacer::new(self.settings.pause.max(MIN_STOP_POLL)),
            stop_timeout: self.settings.stop_timeout,
        };

        let mut deletion = DirectDeletion::new(machine)?;
        deletion.run(self.gateway.as_ref(), &options).await?;

        if !self.settings.dry_run {
            self.pacer.wait().await;
        }
        Ok(())
    }

    /// Send the deferred batch, if any. Returns whether a request went out.
    async fn submit_batch(&self, batch: &[Machine], notify_address: &str) -> ReapResult<bool> {
        if batch.is_empty() {
            return Ok(false);
        }

        if notify_address.trim().is_empty() {
            return Err(ReapError::MissingNotifyAddress);
        }

        if self.settings.dry_run {
            warn!(
                count = batch.len(),
                notify_address,
                "Dry run: would request deletion of stuck machines"
            );
            return Ok(false);
        }

        info!(count = batch.len(), notify_address, "Requesting deletion of stuck machines");
        self.gateway.request_deletion(batch, notify_address).await?;
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use reaper_cloud_api::{GatewayCall, GatewayError, MachineState, MockGateway, TagSet};
    use reaper_util::{MachineId, format_created};

    const NOTIFY: &str = "foo@bar";

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 6, 1, 12, 0, 0).unwrap()
    }

    fn make_machine(id: &str, state: MachineState, minutes_old: i64) -> Machine {
        let created = now() - chrono::Duration::minutes(minutes_old);
        Machine::new(id, state, format_created(&created))
    }

    fn test_settings() -> EngineSettings {
        EngineSettings {
            pause: Duration::ZERO,
            ..Default::default()
        }
    }

    fn engine(gateway: &Arc<MockGateway>, settings: EngineSettings) -> RetirementEngine {
        RetirementEngine::new(gateway.clone(), settings)
    }

    #[test]
    fn default_settings() {
        let settings = EngineSettings::default();
        assert_eq!(settings.pause, Duration::from_secs(3));
        assert!(!settings.dry_run);
    }

    #[tokio::test]
    async fn old_stopped_machine_is_deleted_directly() {
        let machine = make_machine("id", MachineState::Stopped, 120);
        let gateway = Arc::new(MockGateway::new().with_machine(machine));

        let report = engine(&gateway, test_settings())
            .delete_old_machines_at(now(), 1, NOTIFY)
            .await
            .unwrap();

        assert_eq!(gateway.tag_lookups(), vec![MachineId::new("id")]);
        assert_eq!(gateway.deleted_ids(), vec![MachineId::new("id")]);
        assert!(gateway.deletion_requests().is_empty());
        assert!(!report.deletion_requested);
    }

    #[tokio::test]
    async fn stuck_provisioning_machine_is_deferred() {
        let machine = make_machine("id", MachineState::Provisioning, 120);
        let gateway = Arc::new(MockGateway::new().with_machine(machine.clone()));

        let report = engine(&gateway, test_settings())
            .delete_old_machines_at(now(), 1, NOTIFY)
            .await
            .unwrap();

        assert!(gateway.deleted_ids().is_empty());
        assert!(gateway.stopped_ids().is_empty());
        assert_eq!(
            gateway.deletion_requests(),
            vec![(vec![machine], NOTIFY.to_string())]
        );
        assert!(report.deletion_requested);
        assert_eq!(report.deferred(), vec![&MachineId::new("id")]);
    }

    #[tokio::test]
    async fn permanent_machine_is_left_alone() {
        let machine = make_machine("id", MachineState::Provisioning, 120);
        let gateway = Arc::new(
            MockGateway::new()
                .with_machine(machine)
                .with_tags("id", TagSet::new().with("permanent", "true")),
        );

        let report = engine(&gateway, test_settings())
            .delete_old_machines_at(now(), 1, NOTIFY)
            .await
            .unwrap();

        assert_eq!(gateway.tag_lookups(), vec![MachineId::new("id")]);
        assert!(gateway.deleted_ids().is_empty());
        assert!(gateway.deletion_requests().is_empty());
        assert_eq!(report.protected(), vec![&MachineId::new("id")]);
    }

    #[tokio::test]
    async fn young_machine_is_filtered_before_tag_lookup() {
        let machine = make_machine("id", MachineState::Running, 30);
        let gateway = Arc::new(MockGateway::new().with_machine(machine));

        let report = engine(&gateway, test_settings())
            .delete_old_machines_at(now(), 1, NOTIFY)
            .await
            .unwrap();

        assert_eq!(gateway.calls(), vec![GatewayCall::ListMachines]);
        assert_eq!(report.retained(), vec![&MachineId::new("id")]);
    }

    #[tokio::test]
    async fn age_equal_to_threshold_is_retained() {
        let machine = make_machine("id", MachineState::Running, 60);
        let gateway = Arc::new(MockGateway::new().with_machine(machine));

        engine(&gateway, test_settings())
            .delete_old_machines_at(now(), 1, NOTIFY)
            .await
            .unwrap();

        assert!(gateway.tag_lookups().is_empty());
        assert!(gateway.deleted_ids().is_empty());
    }

    #[tokio::test]
    async fn running_machine_is_stopped_before_delete() {
        let machine = make_machine("id", MachineState::Running, 120);
        let gateway = Arc::new(MockGateway::new().with_machine(machine));

        engine(&gateway, test_settings())
            .delete_old_machines_at(now(), 1, NOTIFY)
            .await
            .unwrap();

        assert_eq!(
            gateway.calls(),
            vec![
                GatewayCall::ListMachines,
                GatewayCall::ListMachineTags("id".into()),
                GatewayCall::StopMachine("id".into()),
                GatewayCall::GetMachine("id".into()),
                GatewayCall::DeleteMachine("id".into()),
            ]
        );
    }

    #[tokio::test]
    async fn mixed_fleet_is_partitioned_in_listing_order() {
        let gateway = Arc::new(
            MockGateway::new()
                .with_machine(make_machine("old-running", MachineState::Running, 300))
                .with_machine(make_machine("stuck-1", MachineState::Provisioning, 300))
                .with_machine(make_machine("young", MachineState::Running, 10))
                .with_machine(make_machine("keeper", MachineState::Running, 300))
                .with_machine(make_machine("old-stopped", MachineState::Stopped, 300))
                .with_machine(make_machine("stuck-2", MachineState::Failed, 300))
                .with_tags("keeper", TagSet::new().with("permanent", "true"))
                .with_tags("old-stopped", TagSet::new().with("permanent", "false")),
        );

        let report = engine(&gateway, test_settings())
            .delete_old_machines_at(now(), 2, NOTIFY)
            .await
            .unwrap();

        assert_eq!(
            gateway.deleted_ids(),
            vec![MachineId::new("old-running"), MachineId::new("old-stopped")]
        );

        let requests = gateway.deletion_requests();
        assert_eq!(requests.len(), 1);
        let batch: Vec<_> = requests[0].0.iter().map(|m| m.id.as_str()).collect();
        assert_eq!(batch, vec!["stuck-1", "stuck-2"]);

        let order: Vec<_> = report.events.iter().map(|e| e.machine_id().as_str()).collect();
        assert_eq!(
            order,
            vec!["old-running", "stuck-1", "young", "keeper", "old-stopped", "stuck-2"]
        );
        assert_eq!(gateway.machines().len(), 4);
    }

    #[tokio::test]
    async fn empty_batch_sends_no_request() {
        let gateway = Arc::new(MockGateway::new());

        let report = engine(&gateway, test_settings())
            .delete_old_machines_at(now(), 1, NOTIFY)
            .await
            .unwrap();

        assert!(report.events.is_empty());
        assert!(!report.deletion_requested);
        assert_eq!(gateway.calls(), vec![GatewayCall::ListMachines]);
    }

    #[tokio::test]
    async fn tag_failure_aborts_pass_and_drops_batch() {
        let gateway = Arc::new(
            MockGateway::new()
                .with_machine(make_machine("stuck", MachineState::Provisioning, 120))
                .with_machine(make_machine("old", MachineState::Running, 120)),
        );
        *gateway.fail_list_tags.lock().unwrap() = true;

        let err = engine(&gateway, test_settings())
            .delete_old_machines_at(now(), 1, NOTIFY)
            .await
            .unwrap_err();

        assert!(matches!(err, ReapError::Gateway(_)));
        assert_eq!(gateway.tag_lookups().len(), 1);
        assert!(gateway.deleted_ids().is_empty());
        assert!(gateway.deletion_requests().is_empty());
    }

    #[tokio::test]
    async fn delete_failure_keeps_earlier_deletions_and_drops_batch() {
        let gateway = Arc::new(
            MockGateway::new()
                .with_machine(make_machine("first", MachineState::Stopped, 120))
                .with_machine(make_machine("stuck", MachineState::Provisioning, 120))
                .with_machine(make_machine("second", MachineState::Stopped, 120))
                .with_machine(make_machine("third", MachineState::Stopped, 120)),
        );
        gateway
            .fail_delete_of
            .lock()
            .unwrap()
            .insert(MachineId::new("second"));

        let err = engine(&gateway, test_settings())
            .delete_old_machines_at(now(), 1, NOTIFY)
            .await
            .unwrap_err();

        assert!(matches!(err, ReapError::Gateway(_)));
        assert_eq!(
            gateway.deleted_ids(),
            vec![MachineId::new("first"), MachineId::new("second")]
        );

        // No rollback of "first", no partial batch with "stuck", "third" never reached
        let remaining: Vec<_> = gateway.machines().into_iter().map(|m| m.id).collect();
        assert_eq!(
            remaining,
            vec![
                MachineId::new("stuck"),
                MachineId::new("second"),
                MachineId::new("third")
            ]
        );
        assert!(gateway.deletion_requests().is_empty());
        assert!(!gateway.tag_lookups().contains(&MachineId::new("third")));
    }

    #[tokio::test]
    async fn stop_failure_aborts_pass() {
        let gateway = Arc::new(
            MockGateway::new()
                .with_machine(make_machine("stuck", MachineState::Provisioning, 120))
                .with_machine(make_machine("old", MachineState::Running, 120))
                .with_machine(make_machine("later", MachineState::Stopped, 120)),
        );
        *gateway.fail_stop.lock().unwrap() = true;

        let err = engine(&gateway, test_settings())
            .delete_old_machines_at(now(), 1, NOTIFY)
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            ReapError::Gateway(GatewayError::Api { status: 409, .. })
        ));
        assert_eq!(gateway.stopped_ids(), vec![MachineId::new("old")]);
        assert!(gateway.deleted_ids().is_empty());
        assert!(gateway.deletion_requests().is_empty());
        assert_eq!(
            gateway.tag_lookups(),
            vec![MachineId::new("stuck"), MachineId::new("old")]
        );
    }

    #[tokio::test]
    async fn machine_that_never_stops_aborts_pass() {
        let gateway = Arc::new(
            MockGateway::new()
                .with_machine(make_machine("stuck", MachineState::Provisioning, 120))
                .with_machine(make_machine("old", MachineState::Running, 120))
                .with_machine(make_machine("later", MachineState::Stopped, 120)),
        );
        *gateway.stuck_stopping.lock().unwrap() = true;
        let settings = EngineSettings {
            stop_timeout: Duration::ZERO,
            ..test_settings()
        };

        let err = engine(&gateway, settings)
            .delete_old_machines_at(now(), 1, NOTIFY)
            .await
            .unwrap_err();

        match err {
            ReapError::StopTimeout {
                machine_id,
                last_state,
                ..
            } => {
                assert_eq!(machine_id, MachineId::new("old"));
                assert_eq!(last_state, MachineState::Stopping);
            }
            other => panic!("expected stop timeout, got {:?}", other),
        }
        assert!(gateway.deleted_ids().is_empty());
        assert!(gateway.deletion_requests().is_empty());
        assert!(!gateway.tag_lookups().contains(&MachineId::new("later")));
    }

    fn paced_fleet() -> Arc<MockGateway> {
        Arc::new(
            MockGateway::new()
                .with_machine(make_machine("first", MachineState::Stopped, 120))
                .with_machine(make_machine("stuck", MachineState::Provisioning, 120))
                .with_machine(make_machine("second", MachineState::Stopped, 120)),
        )
    }

    #[tokio::test(start_paused = true)]
    async fn pause_follows_each_direct_deletion() {
        let gateway = paced_fleet();
        let settings = EngineSettings {
            pause: Duration::from_secs(3),
            ..Default::default()
        };

        let start = tokio::time::Instant::now();
        let report = engine(&gateway, settings)
            .delete_old_machines_at(now(), 1, NOTIFY)
            .await
            .unwrap();

        // Two deletions pause; the deferred machine does not
        assert_eq!(start.elapsed(), Duration::from_secs(6));
        assert_eq!(report.deleted().len(), 2);
        assert!(report.deletion_requested);
    }

    #[tokio::test(start_paused = true)]
    async fn dry_run_does_not_pause() {
        let gateway = paced_fleet();
        let settings = EngineSettings {
            pause: Duration::from_secs(3),
            dry_run: true,
            ..Default::default()
        };

        let start = tokio::time::Instant::now();
        engine(&gateway, settings)
            .delete_old_machines_at(now(), 1, NOTIFY)
            .await
            .unwrap();

        assert_eq!(start.elapsed(), Duration::ZERO);
    }

    #[tokio::test]
    async fn dry_run_makes_no_mutating_calls() {
        let gateway = Arc::new(
            MockGateway::new()
                .with_machine(make_machine("old", MachineState::Running, 120))
                .with_machine(make_machine("stuck", MachineState::Provisioning, 120)),
        );
        let settings = EngineSettings {
            dry_run: true,
            ..test_settings()
        };

        let report = engine(&gateway, settings)
            .delete_old_machines_at(now(), 1, NOTIFY)
            .await
            .unwrap();

        assert!(gateway.stopped_ids().is_empty());
        assert!(gateway.deleted_ids().is_empty());
        assert!(gateway.deletion_requests().is_empty());
        assert!(report.dry_run);
        assert!(!report.deletion_requested);
        assert_eq!(report.deleted(), vec![&MachineId::new("old")]);
        assert_eq!(report.deferred(), vec![&MachineId::new("stuck")]);
    }

    #[tokio::test]
    async fn unreadable_timestamp_aborts_pass() {
        let gateway = Arc::new(
            MockGateway::new()
                .with_machine(Machine::new("bad", MachineState::Running, "last tuesday")),
        );

        let err = engine(&gateway, test_settings())
            .delete_old_machines_at(now(), 1, NOTIFY)
            .await
            .unwrap_err();

        assert!(matches!(err, ReapError::InvalidTimestamp { .. }));
        assert!(gateway.tag_lookups().is_empty());
    }

    #[tokio::test]
    async fn deferred_request_needs_an_address() {
        let gateway = Arc::new(
            MockGateway::new()
                .with_machine(make_machine("stuck", MachineState::Provisioning, 120)),
        );

        let err = engine(&gateway, test_settings())
            .delete_old_machines_at(now(), 1, "")
            .await
            .unwrap_err();

        assert!(matches!(err, ReapError::MissingNotifyAddress));
    }

    #[tokio::test]
    async fn notification_failure_propagates() {
        let gateway = Arc::new(
            MockGateway::new()
                .with_machine(make_machine("stuck", MachineState::Provisioning, 120)),
        );
        *gateway.fail_request_deletion.lock().unwrap() = true;

        let err = engine(&gateway, test_settings())
            .delete_old_machines_at(now(), 1, NOTIFY)
            .await
            .unwrap_err();

        assert!(matches!(err, ReapError::Gateway(_)));
    }

    #[tokio::test]
    async fn zero_threshold_targets_everything_older_than_now() {
        let gateway = Arc::new(
            MockGateway::new().with_machine(make_machine("id", MachineState::Stopped, 1)),
        );

        engine(&gateway, test_settings())
            .delete_old_machines_at(now(), 0, NOTIFY)
            .await
            .unwrap();

        assert_eq!(gateway.deleted_ids(), vec![MachineId::new("id")]);
    }
}
