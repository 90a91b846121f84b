//! Simulation mode.
//!
//! When simulation is enabled every `create` call is redirected to the
//! simulated driver of the requested category (`"Node" + hint`), after making
//! sure the simulator process is up. The flag and the launcher are shared by
//! all registries of one [`crate::hardware::hal::Hal`] through a cheap-to-clone
//! [`Simulation`] handle.

use crate::config::SimulationConfig;
use crate::error::{HalError, HalResult};
use parking_lot::Mutex;
use std::fmt;
use std::process::{Child, Command, Stdio};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Environment variable that turns simulation mode on when set.
pub const SIM_ENV_VAR: &str = "SIM";

/// Starts (or checks on) the simulation backend.
pub trait SimLauncher: Send + Sync {
    /// Make sure the simulator is running. `false` means it could not be started.
    fn ensure_running(&self) -> bool;

    /// Name used in logs and errors.
    fn name(&self) -> &str {
        "simulator"
    }
}

/// Launcher for a simulator managed outside this process. Always reports
/// the backend as running.
#[derive(Debug, Default, Clone, Copy)]
pub struct ExternalSimLauncher;

impl SimLauncher for ExternalSimLauncher {
    fn ensure_running(&self) -> bool {
        true
    }

    fn name(&self) -> &str {
        "external simulator"
    }
}

/// Spawns the simulator as a child process on first use and restarts it if
/// it has exited.
pub struct CommandSimLauncher {
    program: String,
    args: Vec<String>,
    child: Mutex<Option<Child>>,
}

impl CommandSimLauncher {
    /// Launcher for `program args...`.
    pub fn new(program: impl Into<String>, args: Vec<String>) -> Self {
        Self {
            program: program.into(),
            args,
            child: Mutex::new(None),
        }
    }

    /// Launcher for an argv vector; `None` when the vector is empty.
    pub fn from_argv(argv: &[String]) -> Option<Self> {
        let (program, args) = argv.split_first()?;
        Some(Self::new(program.clone(), args.to_vec()))
    }
}

impl SimLauncher for CommandSimLauncher {
    fn ensure_running(&self) -> bool {
        let mut child = self.child.lock();

        if let Some(running) = child.as_mut() {
            match running.try_wait() {
                Ok(None) => return true,
                Ok(Some(status)) => {
                    warn!(program = %self.program, %status, "Simulator exited, restarting");
                }
                Err(e) => {
                    warn!(program = %self.program, error = %e, "Could not poll simulator");
                }
            }
        }

        match Command::new(&self.program)
            .args(&self.args)
            .stdin(Stdio::null())
            .spawn()
        {
            Ok(spawned) => {
                info!(program = %self.program, pid = spawned.id(), "Started simulator");
                *child = Some(spawned);
                true
            }
            Err(e) => {
                warn!(program = %self.program, error = %e, "Failed to start simulator");
                *child = None;
                false
            }
        }
    }

    fn name(&self) -> &str {
        &self.program
    }
}

impl Drop for CommandSimLauncher {
    fn drop(&mut self) {
        if let Some(mut child) = self.child.get_mut().take() {
            debug!(program = %self.program, "Stopping simulator");
            let _ = child.kill();
            let _ = child.wait();
        }
    }
}

impl fmt::Debug for CommandSimLauncher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CommandSimLauncher")
            .field("program", &self.program)
            .field("args", &self.args)
            .finish_non_exhaustive()
    }
}

struct SimulationState {
    enabled: AtomicBool,
    launcher: Arc<dyn SimLauncher>,
}

/// Shared simulation flag plus the launcher used when it is set.
#[derive(Clone)]
pub struct Simulation {
    inner: Arc<SimulationState>,
}

impl Simulation {
    /// Simulation with an explicit flag and launcher.
    pub fn new(enabled: bool, launcher: Arc<dyn SimLauncher>) -> Self {
        Self {
            inner: Arc::new(SimulationState {
                enabled: AtomicBool::new(enabled),
                launcher,
            }),
        }
    }

    /// Simulation switched off, with an external launcher should it be enabled later.
    pub fn disabled() -> Self {
        Self::new(false, Arc::new(ExternalSimLauncher))
    }

    /// Enabled when the `SIM` environment variable is set.
    pub fn from_env() -> Self {
        Self::new(sim_env_set(), Arc::new(ExternalSimLauncher))
    }

    /// Build from configuration. The `SIM` environment variable enables
    /// simulation even when the configuration does not.
    pub fn from_config(config: &SimulationConfig) -> Self {
        let launcher: Arc<dyn SimLauncher> = match config
            .command
            .as_deref()
            .and_then(CommandSimLauncher::from_argv)
        {
            Some(command) => Arc::new(command),
            None => Arc::new(ExternalSimLauncher),
        };
        Self::new(config.enabled || sim_env_set(), launcher)
    }

    /// Whether `create` calls are redirected to simulated drivers.
    pub fn is_enabled(&self) -> bool {
        self.inner.enabled.load(Ordering::Acquire)
    }

    /// Switch simulation mode on or off for every registry sharing this handle.
    pub fn set_enabled(&self, enabled: bool) {
        self.inner.enabled.store(enabled, Ordering::Release);
        info!(enabled, "Simulation mode changed");
    }

    /// Make sure the simulator is running.
    ///
    /// # Errors
    /// Returns [`HalError::BackendUnavailable`] if the launcher reports failure.
    pub fn ensure_running(&self) -> HalResult<()> {
        if self.inner.launcher.ensure_running() {
            Ok(())
        } else {
            Err(HalError::BackendUnavailable {
                backend: "simulation".to_string(),
                message: format!("{} could not be started", self.inner.launcher.name()),
            })
        }
    }
}

impl Default for Simulation {
    fn default() -> Self {
        Self::disabled()
    }
}

impl fmt::Debug for Simulation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Simulation")
            .field("enabled", &self.is_enabled())
            .field("launcher", &self.inner.launcher.name())
            .finish()
    }
}

fn sim_env_set() -> bool {
    std::env::var_os(SIM_ENV_VAR).is_some()
}
