//! CPU affinity balancing - Pin simulation worker processes to cores
//!
//! The simulation engine runs every instance in its own worker process. The
//! balancer spreads those workers round-robin over the available cores,
//! starting at a configurable core (1 by default, leaving core 0 to the OS and
//! the engine's manager process).
//!
//! Known limitation: the engine does not expose which worker process backs
//! which instance, so the i-th running instance is paired with the i-th
//! discovered worker. Nothing guarantees the two orders agree; the recorded
//! per-instance cores are only as accurate as that assumption.

use std::collections::BTreeMap;
use std::fmt;

use anyhow::Result;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use super::error::{FleetError, FleetResult};
use super::event::FleetEvent;
use super::instance::{Instance, InstanceName, OperatingState};
use super::notifier::StateChangeNotifier;
use super::settings::FleetSettings;

/// Bit set of CPU cores a process may run on
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AffinityMask(u64);

impl AffinityMask {
    /// Number of cores a mask can address
    pub const MAX_CORES: usize = u64::BITS as usize;

    pub fn from_bits(bits: u64) -> Self {
        Self(bits)
    }

    /// Mask allowing exactly one core
    pub fn single(core: usize) -> Self {
        if core < Self::MAX_CORES {
            Self(1u64 << core)
        } else {
            Self(0)
        }
    }

    /// Unrestricted mask covering every available core
    pub fn all(core_count: usize) -> Self {
        if core_count >= Self::MAX_CORES {
            Self(u64::MAX)
        } else {
            Self((1u64 << core_count) - 1)
        }
    }

    pub fn bits(&self) -> u64 {
        self.0
    }

    pub fn contains(&self, core: usize) -> bool {
        core < Self::MAX_CORES && self.0 & (1u64 << core) != 0
    }

    /// Core indices present in the mask, ascending
    pub fn cores(&self) -> Vec<usize> {
        (0..Self::MAX_CORES).filter(|c| self.contains(*c)).collect()
    }
}

impl fmt::Display for AffinityMask {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#x}", self.0)
    }
}

/// An OS process backing one simulation instance
pub trait WorkerProcess: Send + Sync {
    fn pid(&self) -> u32;

    fn set_affinity_mask(&self, mask: AffinityMask) -> Result<()>;
}

/// OS-level process enumeration
pub trait ProcessInspector: Send + Sync {
    /// Processes whose executable name matches, in enumeration order
    fn list_processes_by_name(&self, name: &str) -> Result<Vec<Box<dyn WorkerProcess>>>;

    /// Number of logical CPUs available
    fn processor_count(&self) -> usize;
}

/// What a balancing run did
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AffinityOutcome {
    /// No running instances or no worker processes
    Skipped,
    /// More workers than cores: every worker got the unrestricted mask
    Unrestricted { processes: usize, core_count: usize },
    /// Workers were pinned one core each
    Pinned(Vec<CorePin>),
}

/// One instance/worker pairing from a pinned run
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CorePin {
    pub instance: InstanceName,
    pub pid: u32,
    pub core: usize,
}

/// Assigns CPU affinity to worker processes and remembers the per-instance
/// core from the last run.
#[derive(Debug, Clone)]
pub struct AffinityBalancer {
    process_name: String,
    first_core: usize,
    core_count_override: Option<usize>,
    assignments: BTreeMap<InstanceName, usize>,
}

impl AffinityBalancer {
    pub fn new(settings: &FleetSettings) -> Self {
        Self {
            process_name: settings.worker_process_name.clone(),
            first_core: settings.first_affinity_core,
            core_count_override: settings.core_count_override,
            assignments: BTreeMap::new(),
        }
    }

    /// Balance the running subset of `instances` over the discovered workers.
    ///
    /// Empty inputs are a silent no-op. A failed process listing is reported
    /// as an issue and leaves the previous assignment intact.
    pub fn balance(
        &mut self,
        instances: &[Instance],
        inspector: &dyn ProcessInspector,
        notifier: &StateChangeNotifier,
    ) -> FleetResult<AffinityOutcome> {
        let running: Vec<&Instance> = instances
            .iter()
            .filter(|i| i.state() == OperatingState::Run)
            .collect();
        if running.is_empty() {
            debug!("No running instances, skipping affinity assignment");
            return Ok(AffinityOutcome::Skipped);
        }

        let processes = match inspector.list_processes_by_name(&self.process_name) {
            Ok(processes) => processes,
            Err(e) => {
                let error = FleetError::ProcessDiscovery(format!("{:#}", e));
                notifier.emit(FleetEvent::issue(error.clone()));
                return Err(error);
            }
        };
        if processes.is_empty() {
            debug!(
                "No '{}' processes found, skipping affinity assignment",
                self.process_name
            );
            return Ok(AffinityOutcome::Skipped);
        }

        let mut core_count = self
            .core_count_override
            .unwrap_or_else(|| inspector.processor_count());
        if core_count == 0 {
            warn!("Processor count reported as zero, skipping affinity assignment");
            return Ok(AffinityOutcome::Skipped);
        }
        if core_count > AffinityMask::MAX_CORES {
            warn!(
                "{} cores reported, only the first {} can be addressed by an affinity mask",
                core_count,
                AffinityMask::MAX_CORES
            );
            core_count = AffinityMask::MAX_CORES;
        }

        self.assignments.clear();

        if processes.len() > core_count {
            let mask = AffinityMask::all(core_count);
            info!(
                "{} worker processes exceed {} cores, applying unrestricted mask {}",
                processes.len(),
                core_count,
                mask
            );
            for process in &processes {
                apply_mask(process.as_ref(), mask, notifier);
            }
            return Ok(AffinityOutcome::Unrestricted {
                processes: processes.len(),
                core_count,
            });
        }

        if processes.len() != running.len() {
            warn!(
                "{} running instances but {} worker processes, pairing the first {}",
                running.len(),
                processes.len(),
                running.len().min(processes.len())
            );
        }

        let mut pins = Vec::with_capacity(running.len().min(processes.len()));
        for (i, (instance, process)) in running.iter().zip(&processes).enumerate() {
            let core = (self.first_core + i) % core_count;
            if apply_mask(process.as_ref(), AffinityMask::single(core), notifier) {
                info!(
                    "Pinned {} (pid {}) to core {}",
                    instance.name(),
                    process.pid(),
                    core
                );
                self.assignments.insert(instance.name().clone(), core);
                pins.push(CorePin {
                    instance: instance.name().clone(),
                    pid: process.pid(),
                    core,
                });
            }
        }

        Ok(AffinityOutcome::Pinned(pins))
    }

    /// Core recorded for an instance by the last pinned run
    pub fn assigned_core(&self, name: &InstanceName) -> Option<usize> {
        self.assignments.get(name).copied()
    }

    pub fn assignments(&self) -> &BTreeMap<InstanceName, usize> {
        &self.assignments
    }

    /// Drop the recorded assignment; the fleet it described no longer exists
    pub fn invalidate(&mut self) {
        if !self.assignments.is_empty() {
            debug!("Affinity assignment invalidated");
            self.assignments.clear();
        }
    }
}

fn apply_mask(
    process: &dyn WorkerProcess,
    mask: AffinityMask,
    notifier: &StateChangeNotifier,
) -> bool {
    match process.set_affinity_mask(mask) {
        Ok(()) => true,
        Err(e) => {
            notifier.emit(FleetEvent::issue(FleetError::AffinityAssignment {
                pid: process.pid(),
                message: format!("{:#}", e),
            }));
            false
        }
    }
}
