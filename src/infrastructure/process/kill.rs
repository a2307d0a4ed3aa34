//! Termination of target algorithm processes.
//!
//! Every run is spawned as the leader of its own process group, so the whole
//! tree the wrapper started can be signalled at once. Escalation goes
//! graceful (group, then process), a bounded wait for exit, forceful (group,
//! then process), and finally the runtime's own kill-and-reap.

use std::time::Duration;

use backoff::backoff::Backoff;
use backoff::ExponentialBackoffBuilder;
use nix::sys::signal::{self, Signal};
use nix::unistd::Pid;
use tokio::process::{Child, Command};
use tracing::{debug, warn};

use crate::domain::models::KillCommands;
use crate::infrastructure::process::command::split_command_line;

const GRACE_INITIAL_INTERVAL: Duration = Duration::from_millis(25);
const GRACE_MULTIPLIER: f64 = 1.5;
const GRACE_TOTAL: Duration = Duration::from_secs(3);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Scope {
    Group,
    Process,
}

/// Kills processes, preferring operator supplied commands over direct signals.
#[derive(Debug, Clone, Default)]
pub struct ProcessKiller {
    commands: KillCommands,
}

impl ProcessKiller {
    /// Use `commands` where configured, direct signals otherwise.
    pub const fn new(commands: KillCommands) -> Self {
        Self { commands }
    }

    /// Terminate `child` and reap it. Does nothing if it has already exited.
    pub async fn terminate(&self, child: &mut Child) {
        if matches!(child.try_wait(), Ok(Some(_))) {
            return;
        }
        let Some(pid) = child.id() else {
            return;
        };

        debug!(pid, "Terminating target algorithm process group");
        if !self.signal(pid, Scope::Group, Signal::SIGTERM).await {
            self.signal(pid, Scope::Process, Signal::SIGTERM).await;
        }

        if wait_for_exit(child).await {
            return;
        }

        warn!(pid, "Target algorithm ignored SIGTERM, sending SIGKILL");
        if !self.signal(pid, Scope::Group, Signal::SIGKILL).await {
            self.signal(pid, Scope::Process, Signal::SIGKILL).await;
        }

        if let Err(err) = child.start_kill() {
            debug!(pid, error = %err, "Direct kill failed, process probably already gone");
        }
        if let Err(err) = child.wait().await {
            warn!(pid, error = %err, "Failed to reap target algorithm process");
        }
    }

    async fn signal(&self, pid: u32, scope: Scope, sig: Signal) -> bool {
        let template = match (scope, sig) {
            (Scope::Group, Signal::SIGKILL) => &self.commands.process_group_force,
            (Scope::Process, Signal::SIGKILL) => &self.commands.process_force,
            (Scope::Group, _) => &self.commands.process_group_graceful,
            (Scope::Process, _) => &self.commands.process_graceful,
        };

        match template {
            Some(template) => run_kill_command(template, pid).await,
            None => send_signal(pid, scope, sig),
        }
    }
}

fn send_signal(pid: u32, scope: Scope, sig: Signal) -> bool {
    let Ok(raw) = i32::try_from(pid) else {
        return false;
    };
    let target = Pid::from_raw(raw);
    let result = match scope {
        Scope::Group => signal::killpg(target, sig),
        Scope::Process => signal::kill(target, sig),
    };
    match result {
        Ok(()) => true,
        Err(err) => {
            debug!(pid, ?scope, signal = sig.as_str(), error = %err, "Signal delivery failed");
            false
        }
    }
}

async fn run_kill_command(template: &str, pid: u32) -> bool {
    let argv = split_command_line(&template.replace("%pid", &pid.to_string()));
    let Some((program, args)) = argv.split_first() else {
        return false;
    };

    match Command::new(program).args(args).status().await {
        Ok(status) if status.success() => true,
        Ok(status) => {
            debug!(pid, command = %template, ?status, "Kill command reported failure");
            false
        }
        Err(err) => {
            warn!(pid, command = %template, error = %err, "Kill command could not be executed");
            false
        }
    }
}

/// Poll for exit with exponential backoff. Returns whether the child exited.
async fn wait_for_exit(child: &mut Child) -> bool {
    let mut backoff = ExponentialBackoffBuilder::new()
        .with_initial_interval(GRACE_INITIAL_INTERVAL)
        .with_multiplier(GRACE_MULTIPLIER)
        .with_randomization_factor(0.0)
        .with_max_interval(GRACE_TOTAL)
        .with_max_elapsed_time(Some(GRACE_TOTAL))
        .build();

    while let Some(delay) = backoff.next_backoff() {
        tokio::time::sleep(delay).await;
        if matches!(child.try_wait(), Ok(Some(_))) {
            return true;
        }
    }
    false
}
