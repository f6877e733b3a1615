//! Instance handles - A single simulated PLC runtime session

use std::fmt;
use std::sync::Arc;

use anyhow::Result;
use serde::{Deserialize, Serialize};

/// Unique, immutable identity of an instance.
///
/// The engine names every instance on creation and never renames it, so the
/// name is the key for the registry and the affinity map.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct InstanceName(String);

impl InstanceName {
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for InstanceName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for InstanceName {
    fn from(name: &str) -> Self {
        Self::new(name)
    }
}

impl From<String> for InstanceName {
    fn from(name: String) -> Self {
        Self(name)
    }
}

impl AsRef<str> for InstanceName {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Lifecycle state reported by the simulation engine
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum OperatingState {
    /// Instance is powered off
    Off,
    /// Instance is powered on, PLC program halted
    Stop,
    /// Instance is powered on and executing its program
    Run,
}

impl OperatingState {
    pub fn is_powered_on(&self) -> bool {
        !matches!(self, Self::Off)
    }

    pub fn label(&self) -> &'static str {
        match self {
            Self::Off => "Off",
            Self::Stop => "Stop",
            Self::Run => "Run",
        }
    }
}

impl fmt::Display for OperatingState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Capability surface of one engine-side instance.
///
/// Every transition is a request: success means the engine accepted it, not
/// that `operating_state` already reflects the new state.
pub trait SimulationInstance: Send + Sync {
    /// Engine-assigned instance name
    fn name(&self) -> String;

    /// Last state observed by the engine
    fn operating_state(&self) -> OperatingState;

    fn power_on(&self) -> Result<()>;

    fn power_off(&self) -> Result<()>;

    fn run(&self) -> Result<()>;

    fn stop(&self) -> Result<()>;
}

/// A transition the controller can request from an instance
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum InstanceOperation {
    PowerOn,
    PowerOff,
    Run,
    Stop,
}

impl InstanceOperation {
    /// Verb used in operator-facing messages ("Failed to power on PLC_1: ...")
    pub fn verb(&self) -> &'static str {
        match self {
            Self::PowerOn => "power on",
            Self::PowerOff => "power off",
            Self::Run => "run",
            Self::Stop => "stop",
        }
    }

    fn invoke(&self, handle: &dyn SimulationInstance) -> Result<()> {
        match self {
            Self::PowerOn => handle.power_on(),
            Self::PowerOff => handle.power_off(),
            Self::Run => handle.run(),
            Self::Stop => handle.stop(),
        }
    }
}

impl fmt::Display for InstanceOperation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.verb())
    }
}

/// A tracked instance: frozen identity plus the engine handle
#[derive(Clone)]
pub struct Instance {
    name: InstanceName,
    handle: Arc<dyn SimulationInstance>,
}

impl Instance {
    /// Wrap an engine handle, capturing its name as the permanent identity
    pub fn new(handle: Arc<dyn SimulationInstance>) -> Self {
        Self {
            name: InstanceName::new(handle.name()),
            handle,
        }
    }

    pub fn name(&self) -> &InstanceName {
        &self.name
    }

    /// Current state as reported by the engine
    pub fn state(&self) -> OperatingState {
        self.handle.operating_state()
    }

    /// Request a transition from the engine
    pub fn request(&self, operation: InstanceOperation) -> Result<()> {
        operation.invoke(self.handle.as_ref())
    }
}

impl fmt::Debug for Instance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Instance")
            .field("name", &self.name)
            .field("state", &self.state())
            .finish()
    }
}
