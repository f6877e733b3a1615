//! Fleet events delivered to observers

use chrono::{DateTime, Utc};

use super::error::FleetError;
use super::instance::InstanceName;

/// Something observers should know about
#[derive(Debug, Clone)]
pub enum FleetEvent {
    /// Informational: an instance was added, removed or changed state
    InstanceChanged {
        subject: InstanceName,
        message: String,
        at: DateTime<Utc>,
    },
    /// Non-fatal failure scoped to one operation or instance
    Issue { error: FleetError, at: DateTime<Utc> },
}

impl FleetEvent {
    pub fn changed(subject: &InstanceName, message: impl Into<String>) -> Self {
        Self::InstanceChanged {
            subject: subject.clone(),
            message: message.into(),
            at: Utc::now(),
        }
    }

    pub fn issue(error: FleetError) -> Self {
        Self::Issue {
            error,
            at: Utc::now(),
        }
    }

    pub fn is_issue(&self) -> bool {
        matches!(self, Self::Issue { .. })
    }

    /// Operator-facing text, as shown in a notification toast
    pub fn message(&self) -> String {
        match self {
            Self::InstanceChanged { message, .. } => message.clone(),
            Self::Issue { error, .. } => error.to_string(),
        }
    }

    pub fn timestamp(&self) -> DateTime<Utc> {
        match self {
            Self::InstanceChanged { at, .. } | Self::Issue { at, .. } => *at,
        }
    }
}
