//! Fleet error types

use thiserror::Error;

use super::instance::{InstanceName, InstanceOperation};

/// Errors surfaced by the fleet controller.
///
/// None of these are fatal: the controller reports them as
/// [`FleetEvent::Issue`](super::FleetEvent::Issue) and keeps going.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FleetError {
    /// One instance rejected a requested transition
    #[error("Failed to {operation} {instance}: {message}")]
    InstanceOperation {
        instance: InstanceName,
        operation: InstanceOperation,
        message: String,
    },

    /// The external instance listing could not be read
    #[error("Failed to synchronize instances: {0}")]
    RegistrySync(String),

    /// The OS process listing could not be read
    #[error("Failed to enumerate worker processes: {0}")]
    ProcessDiscovery(String),

    /// A worker process refused an affinity mask
    #[error("Failed to set CPU affinity for process {pid}: {message}")]
    AffinityAssignment { pid: u32, message: String },

    #[error("Instance not found: {0}")]
    InstanceNotFound(InstanceName),

    #[error("Instance already registered: {0}")]
    DuplicateInstance(InstanceName),

    #[error("Settings error: {0}")]
    Settings(String),
}

impl FleetError {
    pub fn instance_operation(
        instance: &InstanceName,
        operation: InstanceOperation,
        source: &anyhow::Error,
    ) -> Self {
        Self::InstanceOperation {
            instance: instance.clone(),
            operation,
            message: format!("{:#}", source),
        }
    }

    /// The instance this error is scoped to, if any
    pub fn instance(&self) -> Option<&InstanceName> {
        match self {
            Self::InstanceOperation { instance, .. } => Some(instance),
            Self::InstanceNotFound(name) | Self::DuplicateInstance(name) => Some(name),
            _ => None,
        }
    }
}

pub type FleetResult<T> = Result<T, FleetError>;
