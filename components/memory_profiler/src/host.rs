//! Process memory accounting backed by `sysinfo`

use parking_lot::Mutex;
use sysinfo::{Pid, ProcessesToUpdate, System};
use tracing::debug;

use crate::errors::HostError;
use crate::source::MemoryAccounting;
use crate::types::ProcessMemory;

/// Reads RSS and VMS of the current process
///
/// Keeps one `System` alive between calls; building it is the expensive
/// part, refreshing a single process is cheap.
pub struct SysinfoAccounting {
    system: Mutex<System>,
    pid: Result<Pid, &'static str>,
}

impl SysinfoAccounting {
    pub fn new() -> Self {
        Self {
            system: Mutex::new(System::new()),
            pid: sysinfo::get_current_pid(),
        }
    }
}

impl Default for SysinfoAccounting {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryAccounting for SysinfoAccounting {
    fn process_memory(&self) -> Result<ProcessMemory, HostError> {
        let pid = self
            .pid
            .map_err(|e| HostError::ProcessUnavailable(format!("current pid: {}", e)))?;

        let mut system = self.system.lock();
        system.refresh_memory();
        system.refresh_processes(ProcessesToUpdate::Some(&[pid]), false);

        let process = system.process(pid).ok_or_else(|| {
            HostError::ProcessUnavailable(format!("no process information for pid {}", pid))
        })?;

        let rss = process.memory();
        let vms = process.virtual_memory();
        let total = system.total_memory();
        let percent = if total > 0 {
            rss as f64 / total as f64 * 100.0
        } else {
            0.0
        };

        debug!("Process memory: rss={} vms={} percent={:.2}", rss, vms, percent);

        Ok(ProcessMemory { rss, vms, percent })
    }
}
