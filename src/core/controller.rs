//! Fleet controller - Entry points for the presentation layer

use std::collections::BTreeMap;
use std::fmt;
use std::sync::{Arc, RwLock};

use anyhow::Result;
use tracing::{info, warn};

use super::affinity::{AffinityBalancer, AffinityOutcome, ProcessInspector};
use super::confirm::{ConfirmationGate, Decision};
use super::error::{FleetError, FleetResult};
use super::event::FleetEvent;
use super::executor::{self, BulkOperation, BulkReport};
use super::instance::{Instance, InstanceName, OperatingState, SimulationInstance};
use super::notifier::{StateChangeNotifier, SubscriptionId};
use super::registry::{InstanceRegistry, InstanceSource, RefreshSummary};
use super::settings::FleetSettings;

/// Every entry point the presentation layer can trigger
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FleetCommand {
    PowerOnAll,
    PowerOffAll,
    RunAll,
    StopAll,
    ToggleRunStop,
    AssignAffinity,
    RemoveInstance(InstanceName),
    Refresh,
}

impl FleetCommand {
    /// Whether the operator is asked before this command runs
    pub fn requires_confirmation(&self) -> bool {
        !matches!(self, Self::Refresh)
    }

    /// Prompt shown by the confirmation gate
    pub fn confirmation_message(&self) -> String {
        match self {
            Self::PowerOnAll => "Power on all PLC instances?".to_string(),
            Self::PowerOffAll => "Power off all PLC instances?".to_string(),
            Self::RunAll => "Switch all stopped PLC instances to RUN?".to_string(),
            Self::StopAll => "Switch all running PLC instances to STOP?".to_string(),
            Self::ToggleRunStop => "Toggle RUN/STOP for all PLC instances?".to_string(),
            Self::AssignAffinity => {
                "Assign CPU affinity to all running PLC instances?".to_string()
            }
            Self::RemoveInstance(name) => format!("Delete PLC instance {}?", name),
            Self::Refresh => "Reload the PLC instance list?".to_string(),
        }
    }
}

impl fmt::Display for FleetCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::PowerOnAll => f.write_str("power on all"),
            Self::PowerOffAll => f.write_str("power off all"),
            Self::RunAll => f.write_str("run all"),
            Self::StopAll => f.write_str("stop all"),
            Self::ToggleRunStop => f.write_str("toggle run/stop"),
            Self::AssignAffinity => f.write_str("assign affinity"),
            Self::RemoveInstance(name) => write!(f, "remove {}", name),
            Self::Refresh => f.write_str("refresh"),
        }
    }
}

/// Result of dispatching a [`FleetCommand`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CommandOutcome {
    Bulk(BulkReport),
    Affinity(AffinityOutcome),
    Removed(InstanceName),
    Refreshed(RefreshSummary),
    /// The confirmation gate declined; nothing ran
    Cancelled,
    /// The command failed; the error was also emitted as an issue
    Failed(FleetError),
}

/// Owns the registry, the notifier and the affinity record.
///
/// All mutation goes through `&mut self`, so a single owner serializes every
/// entry point. Use [`SharedFleetController`] to reach it from several threads.
pub struct FleetController {
    settings: FleetSettings,
    registry: InstanceRegistry,
    notifier: StateChangeNotifier,
    balancer: AffinityBalancer,
    source: Box<dyn InstanceSource>,
    inspector: Box<dyn ProcessInspector>,
}

impl FleetController {
    pub fn new(
        settings: FleetSettings,
        source: Box<dyn InstanceSource>,
        inspector: Box<dyn ProcessInspector>,
    ) -> Self {
        let balancer = AffinityBalancer::new(&settings);
        Self {
            settings,
            registry: InstanceRegistry::new(),
            notifier: StateChangeNotifier::new(),
            balancer,
            source,
            inspector,
        }
    }

    pub fn settings(&self) -> &FleetSettings {
        &self.settings
    }

    pub fn subscribe<F>(&mut self, observer: F) -> SubscriptionId
    where
        F: Fn(&FleetEvent) + Send + Sync + 'static,
    {
        self.notifier.subscribe(observer)
    }

    pub fn unsubscribe(&mut self, id: SubscriptionId) -> bool {
        self.notifier.unsubscribe(id)
    }

    /// Tracked instances in registry order
    pub fn instances(&self) -> &[Instance] {
        self.registry.enumerate()
    }

    /// Register a freshly created instance
    pub fn add_instance(&mut self, handle: Arc<dyn SimulationInstance>) -> FleetResult<()> {
        let result = self.registry.add(Instance::new(handle), &self.notifier);
        match &result {
            Ok(()) => self.balancer.invalidate(),
            Err(e) => self.notifier.emit(FleetEvent::issue(e.clone())),
        }
        result
    }

    /// Stop tracking an instance and forget its affinity
    pub fn remove_instance(&mut self, name: &InstanceName) -> FleetResult<()> {
        match self.registry.remove(name, &self.notifier) {
            Ok(_) => {
                self.balancer.invalidate();
                Ok(())
            }
            Err(e) => {
                self.notifier.emit(FleetEvent::issue(e.clone()));
                Err(e)
            }
        }
    }

    /// Reconcile the registry with the engine's instance listing
    pub fn refresh(&mut self) -> FleetResult<RefreshSummary> {
        let summary = self.registry.refresh(self.source.as_ref(), &self.notifier)?;
        if !summary.is_unchanged() {
            self.balancer.invalidate();
        }
        Ok(summary)
    }

    pub fn power_on_all(&mut self) -> BulkReport {
        self.bulk(BulkOperation::PowerOnAll)
    }

    pub fn power_off_all(&mut self) -> BulkReport {
        self.bulk(BulkOperation::PowerOffAll)
    }

    pub fn run_all(&mut self) -> BulkReport {
        self.bulk(BulkOperation::RunAll)
    }

    pub fn stop_all(&mut self) -> BulkReport {
        self.bulk(BulkOperation::StopAll)
    }

    pub fn toggle_run_stop(&mut self) -> BulkReport {
        info!("Toggling run/stop for {} instances", self.registry.len());
        executor::toggle_run_stop(self.registry.enumerate(), &self.notifier)
    }

    /// Pin the worker processes of running instances to CPU cores
    pub fn assign_affinity(&mut self) -> FleetResult<AffinityOutcome> {
        self.balancer.balance(
            self.registry.enumerate(),
            self.inspector.as_ref(),
            &self.notifier,
        )
    }

    /// Relay a state change observed by the engine to subscribers
    pub fn report_state_change(&self, name: &InstanceName, state: OperatingState) {
        if self.registry.contains(name) {
            self.notifier.emit(FleetEvent::changed(
                name,
                format!("Instance {} is now {}", name, state),
            ));
        } else {
            warn!("State change for untracked instance {}", name);
        }
    }

    pub fn any_registered(&self) -> bool {
        !self.registry.is_empty()
    }

    pub fn any_powered_off(&self) -> bool {
        self.any_in(|s| s == OperatingState::Off)
    }

    pub fn any_powered_on(&self) -> bool {
        self.any_in(|s| s.is_powered_on())
    }

    pub fn any_running(&self) -> bool {
        self.any_in(|s| s == OperatingState::Run)
    }

    pub fn assigned_core(&self, name: &InstanceName) -> Option<usize> {
        self.balancer.assigned_core(name)
    }

    pub fn affinity_assignments(&self) -> &BTreeMap<InstanceName, usize> {
        self.balancer.assignments()
    }

    /// Run a command unconditionally
    pub fn dispatch(&mut self, command: &FleetCommand) -> CommandOutcome {
        info!("Dispatching {}", command);
        match command {
            FleetCommand::PowerOnAll => CommandOutcome::Bulk(self.power_on_all()),
            FleetCommand::PowerOffAll => CommandOutcome::Bulk(self.power_off_all()),
            FleetCommand::RunAll => CommandOutcome::Bulk(self.run_all()),
            FleetCommand::StopAll => CommandOutcome::Bulk(self.stop_all()),
            FleetCommand::ToggleRunStop => CommandOutcome::Bulk(self.toggle_run_stop()),
            FleetCommand::AssignAffinity => match self.assign_affinity() {
                Ok(outcome) => CommandOutcome::Affinity(outcome),
                Err(e) => CommandOutcome::Failed(e),
            },
            FleetCommand::RemoveInstance(name) => match self.remove_instance(name) {
                Ok(()) => CommandOutcome::Removed(name.clone()),
                Err(e) => CommandOutcome::Failed(e),
            },
            FleetCommand::Refresh => match self.refresh() {
                Ok(summary) => CommandOutcome::Refreshed(summary),
                Err(e) => CommandOutcome::Failed(e),
            },
        }
    }

    /// Run a command after the gate approves it.
    ///
    /// When confirmation is disabled in settings, or the command does not
    /// need it, the gate is not consulted.
    pub fn dispatch_confirmed(
        &mut self,
        gate: &dyn ConfirmationGate,
        command: &FleetCommand,
    ) -> CommandOutcome {
        if self.needs_confirmation(command)
            && gate.request_confirmation(&command.confirmation_message()) == Decision::Cancelled
        {
            info!("{} cancelled by operator", command);
            return CommandOutcome::Cancelled;
        }
        self.dispatch(command)
    }

    fn needs_confirmation(&self, command: &FleetCommand) -> bool {
        self.settings.confirm_bulk_actions && command.requires_confirmation()
    }

    fn bulk(&mut self, operation: BulkOperation) -> BulkReport {
        executor::execute(operation, self.registry.enumerate(), &self.notifier)
    }

    fn any_in<P>(&self, predicate: P) -> bool
    where
        P: Fn(OperatingState) -> bool,
    {
        self.registry.enumerate().iter().any(|i| predicate(i.state()))
    }
}

/// Thread-safe wrapper for FleetController
#[derive(Clone)]
pub struct SharedFleetController {
    inner: Arc<RwLock<FleetController>>,
}

impl SharedFleetController {
    pub fn new(controller: FleetController) -> Self {
        Self {
            inner: Arc::new(RwLock::new(controller)),
        }
    }

    /// Run a command under the write lock.
    ///
    /// Events raised by the command are delivered after the lock is released,
    /// so observers may read the controller from their callback.
    pub fn dispatch(&self, command: &FleetCommand) -> Result<CommandOutcome> {
        self.with_held_events(|c| c.dispatch(command))
    }

    /// Like [`FleetController::dispatch_confirmed`], but the gate is consulted
    /// without holding the controller lock.
    pub fn dispatch_confirmed(
        &self,
        gate: &dyn ConfirmationGate,
        command: &FleetCommand,
    ) -> Result<CommandOutcome> {
        let needs_confirmation = self
            .inner
            .read()
            .map_err(|e| anyhow::anyhow!("Controller lock poisoned: {}", e))?
            .needs_confirmation(command);

        if needs_confirmation
            && gate.request_confirmation(&command.confirmation_message()) == Decision::Cancelled
        {
            info!("{} cancelled by operator", command);
            return Ok(CommandOutcome::Cancelled);
        }
        self.dispatch(command)
    }

    pub fn subscribe<F>(&self, observer: F) -> Result<SubscriptionId>
    where
        F: Fn(&FleetEvent) + Send + Sync + 'static,
    {
        Ok(self
            .inner
            .write()
            .map_err(|e| anyhow::anyhow!("Controller lock poisoned: {}", e))?
            .subscribe(observer))
    }

    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        self.inner
            .write()
            .map(|mut c| c.unsubscribe(id))
            .unwrap_or(false)
    }

    pub fn add_instance(&self, handle: Arc<dyn SimulationInstance>) -> Result<()> {
        self.with_held_events(|c| c.add_instance(handle))??;
        Ok(())
    }

    pub fn instance_names(&self) -> Vec<InstanceName> {
        self.inner
            .read()
            .map(|c| c.instances().iter().map(|i| i.name().clone()).collect())
            .unwrap_or_default()
    }

    pub fn assigned_core(&self, name: &InstanceName) -> Option<usize> {
        self.inner.read().ok()?.assigned_core(name)
    }

    pub fn any_running(&self) -> bool {
        self.inner.read().map(|c| c.any_running()).unwrap_or(false)
    }

    fn with_held_events<T, F>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&mut FleetController) -> T,
    {
        let (result, pending) = {
            let mut controller = self
                .inner
                .write()
                .map_err(|e| anyhow::anyhow!("Controller lock poisoned: {}", e))?;
            controller.notifier.hold();
            let result = f(&mut *controller);
            (result, controller.notifier.release())
        };
        pending.deliver();
        Ok(result)
    }
}
