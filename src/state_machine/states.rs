use serde::{Deserialize, Serialize};
use std::fmt;

/// Receiver lifecycle states
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
#[repr(u8)]
pub enum LifecycleState {
    /// Built but not yet bound to the endpoint
    NotStarted = 0,
    /// Provisioning, pre-bind subscriptions and flow creation in progress
    Starting = 1,
    /// Flow is live; all operations are legal
    Started = 2,
    /// Draining in-flight work; only acknowledgment and draining receives remain legal
    Terminating = 3,
    /// Flow released; nothing is legal any more
    Terminated = 4,
}

impl LifecycleState {
    /// Check if this is the terminal state
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Terminated)
    }

    /// Check if messages from the transport should be enqueued
    pub fn accepts_messages(&self) -> bool {
        matches!(self, Self::Starting | Self::Started)
    }

    /// Check if acknowledgments may be sent
    pub fn allows_ack(&self) -> bool {
        matches!(self, Self::Started | Self::Terminating)
    }

    /// Check if a shutdown has been requested or completed
    pub fn is_shutting_down(&self) -> bool {
        matches!(self, Self::Terminating | Self::Terminated)
    }
}

impl From<u8> for LifecycleState {
    fn from(value: u8) -> Self {
        match value {
            0 => Self::NotStarted,
            1 => Self::Starting,
            2 => Self::Started,
            3 => Self::Terminating,
            _ => Self::Terminated,
        }
    }
}

impl fmt::Display for LifecycleState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NotStarted => write!(f, "not_started"),
            Self::Starting => write!(f, "starting"),
            Self::Started => write!(f, "started"),
            Self::Terminating => write!(f, "terminating"),
            Self::Terminated => write!(f, "terminated"),
        }
    }
}

impl std::str::FromStr for LifecycleState {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "not_started" => Ok(Self::NotStarted),
            "starting" => Ok(Self::Starting),
            "started" => Ok(Self::Started),
            "terminating" => Ok(Self::Terminating),
            "terminated" => Ok(Self::Terminated),
            _ => Err(format!("Invalid lifecycle state: {s}")),
        }
    }
}

impl Default for LifecycleState {
    fn default() -> Self {
        Self::NotStarted
    }
}

/// Flow activity reported to state change listeners
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReceiverState {
    /// The flow is the active consumer of the endpoint
    Active,
    /// The flow is a standby consumer
    Passive,
}

impl fmt::Display for ReceiverState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Active => write!(f, "active"),
            Self::Passive => write!(f, "passive"),
        }
    }
}
