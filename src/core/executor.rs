//! Bulk operations - Apply one transition across a filtered set of instances

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use super::error::FleetError;
use super::event::FleetEvent;
use super::instance::{Instance, InstanceName, InstanceOperation, OperatingState};
use super::notifier::StateChangeNotifier;

/// Fleet-wide operations with a fixed eligibility rule
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BulkOperation {
    PowerOnAll,
    PowerOffAll,
    RunAll,
    StopAll,
}

impl BulkOperation {
    /// Transition requested from each eligible instance
    pub fn operation(&self) -> InstanceOperation {
        match self {
            Self::PowerOnAll => InstanceOperation::PowerOn,
            Self::PowerOffAll => InstanceOperation::PowerOff,
            Self::RunAll => InstanceOperation::Run,
            Self::StopAll => InstanceOperation::Stop,
        }
    }

    /// Whether an instance in `state` takes part
    pub fn applies_to(&self, state: OperatingState) -> bool {
        match self {
            Self::PowerOnAll | Self::PowerOffAll => true,
            Self::RunAll => state == OperatingState::Stop,
            Self::StopAll => state == OperatingState::Run,
        }
    }
}

/// Outcome of one bulk invocation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BulkReport {
    pub operation: Option<InstanceOperation>,
    /// Every instance the action was invoked on, in registry order
    pub attempted: Vec<InstanceName>,
    /// Subset of `attempted` whose action failed
    pub failed: Vec<InstanceName>,
}

impl BulkReport {
    fn empty(operation: Option<InstanceOperation>) -> Self {
        Self {
            operation,
            attempted: Vec::new(),
            failed: Vec::new(),
        }
    }

    pub fn succeeded(&self) -> usize {
        self.attempted.len() - self.failed.len()
    }

    pub fn all_succeeded(&self) -> bool {
        self.failed.is_empty()
    }
}

/// Invoke `operation` on every instance whose current state satisfies
/// `condition`, strictly one at a time in registry order.
///
/// A failing instance is reported as an issue and never stops the batch.
pub fn execute_for_instances<P>(
    instances: &[Instance],
    condition: P,
    operation: InstanceOperation,
    notifier: &StateChangeNotifier,
) -> BulkReport
where
    P: Fn(OperatingState) -> bool,
{
    let mut report = BulkReport::empty(Some(operation));

    for instance in instances {
        if !condition(instance.state()) {
            continue;
        }

        report.attempted.push(instance.name().clone());
        match instance.request(operation) {
            Ok(()) => debug!("Requested {} for {}", operation, instance.name()),
            Err(e) => {
                report.failed.push(instance.name().clone());
                notifier.emit(FleetEvent::issue(FleetError::instance_operation(
                    instance.name(),
                    operation,
                    &e,
                )));
            }
        }
    }

    info!(
        "Bulk {}: {} attempted, {} failed",
        operation,
        report.attempted.len(),
        report.failed.len()
    );
    report
}

/// Run a predefined bulk operation
pub fn execute(
    bulk: BulkOperation,
    instances: &[Instance],
    notifier: &StateChangeNotifier,
) -> BulkReport {
    execute_for_instances(instances, |state| bulk.applies_to(state), bulk.operation(), notifier)
}

/// Fleet-wide run/stop toggle.
///
/// If any instance is running, stop every running instance; otherwise run
/// every stopped one. The choice is made once, before the batch starts, and
/// powered-off instances are never touched.
pub fn toggle_run_stop(instances: &[Instance], notifier: &StateChangeNotifier) -> BulkReport {
    if instances.is_empty() {
        return BulkReport::empty(None);
    }

    let any_running = instances
        .iter()
        .any(|i| i.state() == OperatingState::Run);

    if any_running {
        execute(BulkOperation::StopAll, instances, notifier)
    } else {
        execute(BulkOperation::RunAll, instances, notifier)
    }
}
