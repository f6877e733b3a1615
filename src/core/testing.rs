//! In-memory fakes for the engine and the OS, used by unit tests

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};

use anyhow::{bail, Result};

use super::affinity::{AffinityMask, ProcessInspector, WorkerProcess};
use super::error::FleetError;
use super::event::FleetEvent;
use super::instance::{InstanceOperation, OperatingState, SimulationInstance};
use super::notifier::StateChangeNotifier;
use super::registry::InstanceSource;

/// Engine instance that records every requested transition
pub struct FakeInstance {
    name: String,
    state: Mutex<OperatingState>,
    calls: Mutex<Vec<InstanceOperation>>,
    failures: Mutex<HashMap<InstanceOperation, String>>,
}

impl FakeInstance {
    pub fn new(name: impl Into<String>, state: OperatingState) -> Arc<Self> {
        Arc::new(Self {
            name: name.into(),
            state: Mutex::new(state),
            calls: Mutex::new(Vec::new()),
            failures: Mutex::new(HashMap::new()),
        })
    }

    pub fn calls(&self) -> Vec<InstanceOperation> {
        self.calls.lock().unwrap().clone()
    }

    pub fn fail_on(&self, operation: InstanceOperation, message: &str) {
        self.failures
            .lock()
            .unwrap()
            .insert(operation, message.to_string());
    }

    pub fn set_state(&self, state: OperatingState) {
        *self.state.lock().unwrap() = state;
    }

    fn record(&self, operation: InstanceOperation) -> Result<()> {
        self.calls.lock().unwrap().push(operation);
        if let Some(message) = self.failures.lock().unwrap().get(&operation) {
            bail!("{}", message);
        }
        Ok(())
    }
}

impl SimulationInstance for FakeInstance {
    fn name(&self) -> String {
        self.name.clone()
    }

    fn operating_state(&self) -> OperatingState {
        *self.state.lock().unwrap()
    }

    fn power_on(&self) -> Result<()> {
        self.record(InstanceOperation::PowerOn)
    }

    fn power_off(&self) -> Result<()> {
        self.record(InstanceOperation::PowerOff)
    }

    fn run(&self) -> Result<()> {
        self.record(InstanceOperation::Run)
    }

    fn stop(&self) -> Result<()> {
        self.record(InstanceOperation::Stop)
    }
}

/// Instance listing whose contents the test controls
#[derive(Clone)]
pub struct ScriptedSource {
    listing: Arc<Mutex<Result<Vec<Arc<FakeInstance>>, String>>>,
}

impl ScriptedSource {
    pub fn new(instances: Vec<Arc<FakeInstance>>) -> Self {
        Self {
            listing: Arc::new(Mutex::new(Ok(instances))),
        }
    }

    pub fn set(&self, instances: Vec<Arc<FakeInstance>>) {
        *self.listing.lock().unwrap() = Ok(instances);
    }

    pub fn fail_with(&self, message: &str) {
        *self.listing.lock().unwrap() = Err(message.to_string());
    }
}

impl Default for ScriptedSource {
    fn default() -> Self {
        Self::new(Vec::new())
    }
}

impl InstanceSource for ScriptedSource {
    fn list_instances(&self) -> Result<Vec<Arc<dyn SimulationInstance>>> {
        match &*self.listing.lock().unwrap() {
            Ok(instances) => Ok(instances
                .iter()
                .map(|i| Arc::clone(i) as Arc<dyn SimulationInstance>)
                .collect()),
            Err(message) => bail!("{}", message),
        }
    }
}

#[derive(Default)]
struct InspectorState {
    applied: Vec<(u32, AffinityMask)>,
    refused: HashSet<u32>,
    listing_error: Option<String>,
    list_calls: usize,
}

/// Process table with `process_count` workers (PIDs from 1000) on
/// `core_count` cores
#[derive(Clone)]
pub struct FakeInspector {
    process_count: usize,
    core_count: usize,
    state: Arc<Mutex<InspectorState>>,
}

impl FakeInspector {
    pub fn new(process_count: usize, core_count: usize) -> Self {
        Self {
            process_count,
            core_count,
            state: Arc::new(Mutex::new(InspectorState::default())),
        }
    }

    /// Masks applied so far, in application order
    pub fn applied_masks(&self) -> Vec<AffinityMask> {
        self.state
            .lock()
            .unwrap()
            .applied
            .iter()
            .map(|(_, mask)| *mask)
            .collect()
    }

    pub fn refuse_pid(&self, pid: u32) {
        self.state.lock().unwrap().refused.insert(pid);
    }

    pub fn fail_listing(&self, message: &str) {
        self.state.lock().unwrap().listing_error = Some(message.to_string());
    }

    pub fn list_calls(&self) -> usize {
        self.state.lock().unwrap().list_calls
    }
}

struct FakeWorker {
    pid: u32,
    state: Arc<Mutex<InspectorState>>,
}

impl WorkerProcess for FakeWorker {
    fn pid(&self) -> u32 {
        self.pid
    }

    fn set_affinity_mask(&self, mask: AffinityMask) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        if state.refused.contains(&self.pid) {
            bail!("access denied");
        }
        state.applied.push((self.pid, mask));
        Ok(())
    }
}

impl ProcessInspector for FakeInspector {
    fn list_processes_by_name(&self, _name: &str) -> Result<Vec<Box<dyn WorkerProcess>>> {
        let mut state = self.state.lock().unwrap();
        state.list_calls += 1;
        if let Some(message) = &state.listing_error {
            bail!("{}", message);
        }

        Ok((0..self.process_count)
            .map(|i| {
                Box::new(FakeWorker {
                    pid: 1000 + i as u32,
                    state: Arc::clone(&self.state),
                }) as Box<dyn WorkerProcess>
            })
            .collect())
    }

    fn processor_count(&self) -> usize {
        self.core_count
    }
}

/// Collects every event emitted to it
#[derive(Clone, Default)]
pub struct EventLog {
    events: Arc<Mutex<Vec<FleetEvent>>>,
}

impl EventLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// A fresh notifier with a log already subscribed
    pub fn attached() -> (StateChangeNotifier, Self) {
        let log = Self::new();
        let mut notifier = StateChangeNotifier::new();
        notifier.subscribe(log.observer());
        (notifier, log)
    }

    pub fn observer(&self) -> impl Fn(&FleetEvent) + Send + Sync + 'static {
        let events = Arc::clone(&self.events);
        move |event: &FleetEvent| events.lock().unwrap().push(event.clone())
    }

    pub fn events(&self) -> Vec<FleetEvent> {
        self.events.lock().unwrap().clone()
    }

    pub fn issues(&self) -> Vec<FleetError> {
        self.events()
            .into_iter()
            .filter_map(|e| match e {
                FleetEvent::Issue { error, .. } => Some(error),
                FleetEvent::InstanceChanged { .. } => None,
            })
            .collect()
    }

    pub fn issue_count(&self) -> usize {
        self.events().iter().filter(|e| e.is_issue()).count()
    }

    pub fn changed_count(&self) -> usize {
        self.events().iter().filter(|e| !e.is_issue()).count()
    }
}
