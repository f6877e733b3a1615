//! OS process inspection - Finds the engine's worker processes

use std::path::Path;
use std::sync::Mutex;

use anyhow::Result;
use sysinfo::{CpuRefreshKind, ProcessRefreshKind, ProcessesToUpdate, RefreshKind, System};
use tracing::trace;

use super::affinity::{AffinityMask, ProcessInspector, WorkerProcess};
use crate::platform;

/// A live OS process addressed by PID
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OsWorkerProcess {
    pid: u32,
}

impl OsWorkerProcess {
    pub fn new(pid: u32) -> Self {
        Self { pid }
    }
}

impl WorkerProcess for OsWorkerProcess {
    fn pid(&self) -> u32 {
        self.pid
    }

    fn set_affinity_mask(&self, mask: AffinityMask) -> Result<()> {
        platform::set_cpu_affinity(self.pid, &mask.cores())
    }
}

/// Process inspector backed by the system process table
pub struct SystemProcessInspector {
    system: Mutex<System>,
}

impl SystemProcessInspector {
    pub fn new() -> Self {
        Self {
            system: Mutex::new(System::new_with_specifics(
                RefreshKind::new().with_cpu(CpuRefreshKind::new()),
            )),
        }
    }

    /// PIDs of processes named `name`, lowest PID first.
    ///
    /// Matching ignores ASCII case and a trailing `.exe`, like the Windows
    /// process-by-name lookup.
    pub fn find_pids_by_name(&self, name: &str) -> Result<Vec<u32>> {
        let mut system = self
            .system
            .lock()
            .map_err(|e| anyhow::anyhow!("Process table lock poisoned: {}", e))?;
        system.refresh_processes_specifics(
            ProcessesToUpdate::All,
            true,
            ProcessRefreshKind::new().with_exe(sysinfo::UpdateKind::OnlyIfNotSet),
        );

        let wanted = normalize_process_name(name);
        let mut pids: Vec<u32> = system
            .processes()
            .iter()
            .filter(|(_, proc)| proc.thread_kind().is_none())
            .filter(|(_, proc)| {
                normalize_process_name(&proc.name().to_string_lossy()) == wanted
                    || proc
                        .exe()
                        .and_then(Path::file_name)
                        .map(|f| normalize_process_name(&f.to_string_lossy()) == wanted)
                        .unwrap_or(false)
            })
            .map(|(pid, _)| pid.as_u32())
            .collect();
        pids.sort_unstable();

        trace!("Found {} processes named '{}'", pids.len(), name);
        Ok(pids)
    }
}

impl Default for SystemProcessInspector {
    fn default() -> Self {
        Self::new()
    }
}

impl ProcessInspector for SystemProcessInspector {
    fn list_processes_by_name(&self, name: &str) -> Result<Vec<Box<dyn WorkerProcess>>> {
        Ok(self
            .find_pids_by_name(name)?
            .into_iter()
            .map(|pid| Box::new(OsWorkerProcess::new(pid)) as Box<dyn WorkerProcess>)
            .collect())
    }

    fn processor_count(&self) -> usize {
        let count = self.system.lock().map(|s| s.cpus().len()).unwrap_or(0);
        if count > 0 {
            count
        } else {
            std::thread::available_parallelism()
                .map(|n| n.get())
                .unwrap_or(1)
        }
    }
}

fn normalize_process_name(name: &str) -> String {
    let lower = name.to_ascii_lowercase();
    match lower.strip_suffix(".exe") {
        Some(stem) => stem.to_string(),
        None => lower,
    }
}
