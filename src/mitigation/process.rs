//! Process termination mitigator.
//!
//! Targets the process named by the observation's `pid` attribute. Dry-run
//! unless enforcement is switched on; never touches itself, pid 0/1 or a
//! protected process name.

use std::sync::{Mutex, MutexGuard};
use sysinfo::{Pid, System};
use tracing::{info, warn};

use super::{MitigationFault, MitigationOutcome, MitigationTrigger};
use crate::config::MitigationConfig;
use crate::types::FeatureObservation;

pub struct ProcessMitigator {
    dry_run: bool,
    /// Lower-cased protected names.
    protected: Vec<String>,
    own_pid: u32,
    system: Mutex<System>,
}

impl ProcessMitigator {
    pub fn new(dry_run: bool, protected: impl IntoIterator<Item = String>) -> Self {
        Self {
            dry_run,
            protected: protected.into_iter().map(|p| p.to_lowercase()).collect(),
            own_pid: std::process::id(),
            system: Mutex::new(System::new()),
        }
    }

    pub fn from_config(config: &MitigationConfig) -> Self {
        Self::new(config.dry_run, config.protected.iter().cloned())
    }

    pub fn is_dry_run(&self) -> bool {
        self.dry_run
    }

    fn system(&self) -> MutexGuard<'_, System> {
        self.system.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn is_protected(&self, name: &str) -> bool {
        let name = name.to_lowercase();
        self.protected.iter().any(|p| *p == name)
    }

    fn target_pid(observation: &FeatureObservation) -> Result<Option<u32>, MitigationFault> {
        let Some(raw) = observation.number("pid") else {
            return Ok(None);
        };
        if !raw.is_finite() || raw < 0.0 || raw.fract() != 0.0 || raw > f64::from(u32::MAX) {
            return Err(MitigationFault::Failed(format!("invalid pid {}", raw)));
        }
        Ok(Some(raw as u32))
    }
}

impl std::fmt::Debug for ProcessMitigator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProcessMitigator")
            .field("dry_run", &self.dry_run)
            .field("protected", &self.protected)
            .finish_non_exhaustive()
    }
}

impl MitigationTrigger for ProcessMitigator {
    fn apply(&self, observation: &FeatureObservation) -> Result<MitigationOutcome, MitigationFault> {
        let Some(pid) = Self::target_pid(observation)? else {
            return Ok(MitigationOutcome::NoAction);
        };

        if pid <= 1 || pid == self.own_pid {
            return Ok(MitigationOutcome::Skipped {
                reason: format!("pid {} is not a valid target", pid),
            });
        }

        // The observed name is a hint; the live name decides protection.
        let observed_name = observation.text("name").unwrap_or("unknown").to_string();
        if self.is_protected(&observed_name) {
            return Ok(MitigationOutcome::Skipped {
                reason: format!("{} is protected", observed_name),
            });
        }

        if self.dry_run {
            info!(pid, name = %observed_name, "[Mitigation] Dry-run, would terminate process");
            return Ok(MitigationOutcome::WouldTerminate { pid, name: observed_name });
        }

        let mut system = self.system();
        let sys_pid = Pid::from_u32(pid);
        if !system.refresh_process(sys_pid) {
            return Ok(MitigationOutcome::Skipped {
                reason: format!("pid {} has already exited", pid),
            });
        }
        let Some(process) = system.process(sys_pid) else {
            return Ok(MitigationOutcome::Skipped {
                reason: format!("pid {} has already exited", pid),
            });
        };

        let live_name = process.name().to_string();
        if self.is_protected(&live_name) {
            return Ok(MitigationOutcome::Skipped {
                reason: format!("{} is protected", live_name),
            });
        }

        if process.kill() {
            warn!(pid, name = %live_name, "[Mitigation] Process terminated");
            Ok(MitigationOutcome::Terminated { pid, name: live_name })
        } else {
            Err(MitigationFault::Failed(format!(
                "failed to terminate {} (pid {})",
                live_name, pid
            )))
        }
    }
}
