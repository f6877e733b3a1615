//! Platform-specific process affinity control

#[cfg(windows)]
pub mod windows;

#[cfg(target_os = "linux")]
pub mod linux;

#[cfg(target_os = "macos")]
pub mod macos;

use anyhow::Result;

/// Restrict a process to the given CPU cores
pub fn set_cpu_affinity(pid: u32, cores: &[usize]) -> Result<()> {
    #[cfg(windows)]
    {
        windows::set_cpu_affinity(pid, cores)
    }
    #[cfg(target_os = "linux")]
    {
        linux::set_cpu_affinity(pid, cores)
    }
    #[cfg(target_os = "macos")]
    {
        macos::set_cpu_affinity(pid, cores)
    }
    #[cfg(not(any(windows, target_os = "linux", target_os = "macos")))]
    {
        let _ = (pid, cores);
        anyhow::bail!("Unsupported platform")
    }
}
