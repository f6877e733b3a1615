//! Core module - Instance registry, bulk operations, events and CPU affinity

mod affinity;
mod confirm;
mod controller;
mod error;
mod event;
pub mod executor;
mod instance;
mod notifier;
mod process;
mod registry;
pub mod settings;

#[cfg(test)]
pub(crate) mod testing;

pub use affinity::{
    AffinityBalancer, AffinityMask, AffinityOutcome, CorePin, ProcessInspector, WorkerProcess,
};
pub use confirm::{AlwaysConfirm, ConfirmationGate, Decision};
pub use controller::{CommandOutcome, FleetCommand, FleetController, SharedFleetController};
pub use error::{FleetError, FleetResult};
pub use event::FleetEvent;
pub use executor::{BulkOperation, BulkReport};
pub use instance::{Instance, InstanceName, InstanceOperation, OperatingState, SimulationInstance};
pub use notifier::{FleetObserver, PendingEvents, StateChangeNotifier, SubscriptionId};
pub use process::{OsWorkerProcess, SystemProcessInspector};
pub use registry::{InstanceRegistry, InstanceSource, RefreshSummary};
pub use settings::FleetSettings;
