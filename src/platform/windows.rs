//! Windows process affinity via SetProcessAffinityMask

use anyhow::{Context, Result};
use tracing::debug;

use windows::Win32::Foundation::{CloseHandle, FALSE};
use windows::Win32::System::Threading::*;

/// Set CPU affinity for a process
pub fn set_cpu_affinity(pid: u32, cores: &[usize]) -> Result<()> {
    if cores.is_empty() {
        anyhow::bail!("Refusing to apply an empty affinity mask");
    }

    let mut mask: usize = 0;
    for &core in cores {
        if core < usize::BITS as usize {
            mask |= 1 << core;
        }
    }

    unsafe {
        let handle = OpenProcess(
            PROCESS_SET_INFORMATION | PROCESS_QUERY_INFORMATION,
            FALSE,
            pid,
        )
        .context("Failed to open process")?;

        let result = SetProcessAffinityMask(handle, mask);
        CloseHandle(handle)?;

        if result.is_ok() {
            debug!("Set affinity mask {:#x} on process {}", mask, pid);
            Ok(())
        } else {
            anyhow::bail!("Failed to set CPU affinity")
        }
    }
}
