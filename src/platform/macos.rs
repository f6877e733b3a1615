//! macOS process affinity

use anyhow::{bail, Result};
use tracing::warn;

/// Set CPU affinity for a process
/// Note: macOS doesn't have direct CPU affinity APIs like Linux/Windows
pub fn set_cpu_affinity(pid: u32, cores: &[usize]) -> Result<()> {
    // Thread affinity tags are only scheduler hints and need the thread port,
    // not the process ID, so nothing can be pinned here.
    warn!(
        "CPU affinity is not supported on macOS. Cores {:?} requested for PID {}",
        cores, pid
    );
    bail!("CPU affinity is not supported on macOS")
}
