//! Linux process affinity via sched_setaffinity

use anyhow::{Context, Result};
use tracing::debug;

/// Set CPU affinity for every thread of a process.
///
/// `sched_setaffinity` only affects a single thread, so the mask is applied to
/// each entry under `/proc/<pid>/task`.
pub fn set_cpu_affinity(pid: u32, cores: &[usize]) -> Result<()> {
    if cores.is_empty() {
        anyhow::bail!("Refusing to apply an empty affinity mask");
    }

    // SAFETY: cpu_set_t is plain data; CPU_ZERO/CPU_SET only write inside it.
    let set = unsafe {
        let mut set: libc::cpu_set_t = std::mem::zeroed();
        libc::CPU_ZERO(&mut set);
        for &core in cores {
            if core < libc::CPU_SETSIZE as usize {
                libc::CPU_SET(core, &mut set);
            }
        }
        set
    };

    let task_dir = format!("/proc/{}/task", pid);
    let tids: Vec<i32> = std::fs::read_dir(&task_dir)
        .with_context(|| format!("Failed to list threads of process {}", pid))?
        .filter_map(|entry| entry.ok())
        .filter_map(|entry| entry.file_name().to_str().and_then(|s| s.parse().ok()))
        .collect();

    for tid in tids {
        // SAFETY: `set` is a fully initialised cpu_set_t of the size passed.
        let result = unsafe {
            libc::sched_setaffinity(tid, std::mem::size_of::<libc::cpu_set_t>(), &set)
        };
        if result != 0 {
            let error = std::io::Error::last_os_error();
            // The thread exited after the task listing
            if error.raw_os_error() == Some(libc::ESRCH) {
                continue;
            }
            anyhow::bail!("Failed to set CPU affinity for thread {}: {}", tid, error);
        }
    }

    debug!("Set affinity {:?} on process {}", cores, pid);
    Ok(())
}
