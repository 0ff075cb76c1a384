//! Machine model as reported by the provider

use reaper_util::{MachineId, TimestampError, parse_created};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Tag name that protects a machine from retirement
pub const PERMANENT_TAG: &str = "permanent";

/// Lifecycle state of a machine
///
/// Provider states this crate does not know about are kept verbatim in
/// `Other` so they survive a round trip.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum MachineState {
    Running,
    Stopped,
    Stopping,
    Provisioning,
    Deleted,
    Failed,
    Other(String),
}

impl MachineState {
    pub fn as_str(&self) -> &str {
        match self {
            MachineState::Running => "running",
            MachineState::Stopped => "stopped",
            MachineState::Stopping => "stopping",
            MachineState::Provisioning => "provisioning",
            MachineState::Deleted => "deleted",
            MachineState::Failed => "failed",
            MachineState::Other(s) => s,
        }
    }

    /// Whether the machine is at rest and can be stopped/deleted through the API.
    ///
    /// Anything else is mid-transition and only eligible for deferred deletion.
    pub fn is_settled(&self) -> bool {
        matches!(self, MachineState::Running | MachineState::Stopped)
    }
}

impl From<&str> for MachineState {
    fn from(s: &str) -> Self {
        match s {
            "running" => MachineState::Running,
            "stopped" => MachineState::Stopped,
            "stopping" => MachineState::Stopping,
            "provisioning" => MachineState::Provisioning,
            "deleted" => MachineState::Deleted,
            "failed" => MachineState::Failed,
            other => MachineState::Other(other.to_string()),
        }
    }
}

impl From<String> for MachineState {
    fn from(s: String) -> Self {
        MachineState::from(s.as_str())
    }
}

impl From<MachineState> for String {
    fn from(state: MachineState) -> Self {
        state.as_str().to_string()
    }
}

impl fmt::Display for MachineState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A provider-managed virtual machine
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Machine {
    pub id: MachineId,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,

    pub state: MachineState,

    /// Creation time, verbatim from the provider
    pub created: String,
}

impl Machine {
    pub fn new(id: impl Into<MachineId>, state: MachineState, created: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: None,
            state,
            created: created.into(),
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Parse the `created` field
    pub fn created_at(&self) -> Result<chrono::DateTime<chrono::Utc>, TimestampError> {
        parse_created(&self.created)
    }
}

/// Tags attached to a single machine
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TagSet(BTreeMap<String, String>);

impl TagSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.0.insert(name.into(), value.into());
        self
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.0.get(name).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// `permanent=true` exempts the machine from retirement
    pub fn is_permanent(&self) -> bool {
        self.get(PERMANENT_TAG) == Some("true")
    }
}

impl FromIterator<(String, String)> for TagSet {
    fn from_iter<I: IntoIterator<Item = (String, String)>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}
