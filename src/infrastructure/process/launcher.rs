//! Drives one target algorithm process from spawn to terminal outcome.

use std::collections::VecDeque;
use std::process::Stdio;
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::{ChildStderr, Command};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::domain::models::{
    CommandLineOptions, ExecutionConfig, KillCommands, KillToken, LiveRun, OutcomeLatch,
    RunOutcome, RunRequest, RunResult,
};
use crate::infrastructure::process::command::{build_argv, call_string};
use crate::infrastructure::process::kill::ProcessKiller;
use crate::infrastructure::process::result_line::{
    parse_result_line, ResultLineError, WrapperResult, RESULT_PATTERN,
};
use crate::infrastructure::process::side_channel::{RuntimeReading, RuntimeSideChannel};
use crate::infrastructure::process::slot_pool::SlotPool;

/// Environment variable carrying the concurrency slot id.
pub const ENV_TASK_ID: &str = "ACLIB_CONCURRENT_TASK_ID";
/// Environment variable carrying the side channel UDP port.
pub const ENV_PORT: &str = "ACLIB_PORT";
/// Environment variable carrying the suggested CPU time reporting interval in seconds.
pub const ENV_CPU_TIME_FREQUENCY: &str = "ACLIB_CPU_TIME_FREQUENCY";

/// Smallest observer interval the launcher accepts, in milliseconds.
pub const MIN_OBSERVER_FREQUENCY_MS: u64 = 25;

const INTERRUPTED_MESSAGE: &str = "Target CLI Thread was Interrupted";
const DUPLICATE_MESSAGE: &str = "duplicate lines matched";
const STDERR_DRAIN_GRACE: Duration = Duration::from_millis(200);
const STDOUT_DRAIN_GRACE: Duration = Duration::from_millis(500);

/// Receives every status change of one run.
pub type StatusSink = Arc<dyn Fn(LiveRun) + Send + Sync>;

fn no_output_hint() -> String {
    format!(
        "Wrapper did not output anything that matched the expected result line. \
         Please try executing the wrapper directly and ensure that some line starts with: \
         \"Result for SMAC: <solved>, <runtime>, <runlength>, <quality>, <seed>\" \
         (Regular Expression: {RESULT_PATTERN})"
    )
}

/// Launches runs of one target algorithm.
#[derive(Debug)]
pub struct Launcher {
    execution: ExecutionConfig,
    options: CommandLineOptions,
    slots: SlotPool,
    killer: ProcessKiller,
    interrupt: KillToken,
}

/// What the output scan saw.
#[derive(Default)]
struct ScanState {
    result: Option<Result<WrapperResult, ResultLineError>>,
    duplicate: bool,
    killed: bool,
    interrupted: bool,
    tail: VecDeque<String>,
}

impl Launcher {
    /// `interrupt` aborts every run of this launcher when triggered.
    pub fn new(
        execution: ExecutionConfig,
        options: CommandLineOptions,
        kill_commands: KillCommands,
        slots: SlotPool,
        interrupt: KillToken,
    ) -> Self {
        Self {
            execution,
            options,
            slots,
            killer: ProcessKiller::new(kill_commands),
            interrupt,
        }
    }

    /// Run one request to a terminal outcome.
    ///
    /// The request's kill token may be triggered at any time. Once a valid
    /// result line has been read it is kept even if a kill follows.
    pub async fn run(&self, request: RunRequest, kill: KillToken, sink: StatusSink) -> RunOutcome {
        let latch = OutcomeLatch::new();

        if request.cutoff() <= 0.0 {
            latch.publish(RunOutcome::not_run(request.clone()));
        } else if kill.is_killed() {
            latch.publish(RunOutcome::killed(request.clone(), 0.0));
        } else {
            sink(LiveRun::running(request.clone(), 0.0, 0.0, kill.clone()));
            self.launch(&request, &kill, &sink, &latch).await;
        }

        let outcome = match latch.into_outcome() {
            Ok(outcome) => outcome,
            Err(pending) => RunOutcome::aborted(request, pending.to_string()),
        };

        if matches!(outcome.kind(), RunResult::Abort | RunResult::Crashed) {
            debug!(outcome = %outcome, "Run did not complete successfully");
        }
        sink(LiveRun::completed(outcome.clone(), kill));
        outcome
    }

    async fn launch(
        &self,
        request: &RunRequest,
        kill: &KillToken,
        sink: &StatusSink,
        latch: &OutcomeLatch,
    ) {
        if kill.is_killed() {
            latch.publish(RunOutcome::killed(request.clone(), 0.0));
            return;
        }

        let slot = tokio::select! {
            slot = self.slots.acquire() => slot.ok(),
            () = self.interrupt.killed() => None,
        };
        let Some(slot) = slot else {
            latch.publish(RunOutcome::aborted(request.clone(), INTERRUPTED_MESSAGE));
            return;
        };

        if kill.is_killed() {
            latch.publish(RunOutcome::killed(request.clone(), 0.0));
            return;
        }

        if let Err(err) = self.execute(request, kill, sink, slot.id(), latch).await {
            error!(run = %request, error = %err, "Failed to launch target algorithm");
            latch.publish(RunOutcome::aborted(
                request.clone(),
                format!("Failed to launch target algorithm: {err}"),
            ));
        }
    }

    #[allow(clippy::too_many_lines)]
    async fn execute(
        &self,
        request: &RunRequest,
        kill: &KillToken,
        sink: &StatusSink,
        slot_id: usize,
        latch: &OutcomeLatch,
    ) -> std::io::Result<()> {
        let side_channel = if self.options.listen_for_updates {
            Some(RuntimeSideChannel::bind().await?)
        } else {
            None
        };
        let reading = side_channel
            .as_ref()
            .map(RuntimeSideChannel::reading)
            .unwrap_or_default();

        let argv = build_argv(&self.execution.executable, request);
        let call = call_string(&self.execution.exec_dir, &argv);
        if self.options.log_all_call_strings {
            info!(call = %call, "Running target algorithm");
        }
        let Some((program, args)) = argv.split_first() else {
            return Err(std::io::Error::new(
                std::io::ErrorKind::InvalidInput,
                "empty executable",
            ));
        };

        let frequency_ms = self.options.observer_frequency_ms.max(MIN_OBSERVER_FREQUENCY_MS);
        let mut command = Command::new(program);
        command
            .args(args)
            .current_dir(&self.execution.exec_dir)
            .env(ENV_TASK_ID, slot_id.to_string())
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .process_group(0)
            .kill_on_drop(true);
        if let Some(channel) = &side_channel {
            #[allow(clippy::cast_precision_loss)]
            let cpu_time_frequency = frequency_ms as f64 / 2000.0;
            command
                .env(ENV_PORT, channel.port().to_string())
                .env(ENV_CPU_TIME_FREQUENCY, cpu_time_frequency.to_string());
        }

        let started = Instant::now();
        let mut child = command.spawn()?;
        let pid = child.id();
        debug!(?pid, slot = slot_id, run = %request, "Target algorithm started");

        let stderr_task = child
            .stderr
            .take()
            .map(|stderr| tokio::spawn(drain_stderr(stderr)));
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| std::io::Error::other("stdout was not captured"))?;
        let pusher = spawn_status_pusher(
            request.clone(),
            kill.clone(),
            Arc::clone(sink),
            reading.clone(),
            started,
            Duration::from_millis(frequency_ms),
        );

        let mut lines = BufReader::new(stdout).lines();
        let mut state = ScanState::default();
        let mut terminated = false;
        let mut exited = false;
        let mut stdout_done = false;
        let drain_deadline = tokio::time::sleep(Duration::from_secs(86_400));
        tokio::pin!(drain_deadline);

        while !(exited && stdout_done) {
            tokio::select! {
                line = lines.next_line(), if !stdout_done => match line {
                    Ok(Some(line)) => self.process_line(line, &mut state),
                    Ok(None) => stdout_done = true,
                    Err(err) => {
                        warn!(?pid, error = %err, "Failed to read target algorithm output");
                        stdout_done = true;
                    }
                },
                () = kill.killed(), if !state.killed => {
                    state.killed = true;
                    if state.result.is_none() {
                        latch.publish(
                            RunOutcome::killed(request.clone(), reading.get().unwrap_or(0.0))
                                .with_wallclock(started.elapsed().as_secs_f64()),
                        );
                    }
                }
                () = self.interrupt.killed(), if !state.interrupted => {
                    state.interrupted = true;
                    state.killed = true;
                }
                status = child.wait(), if !exited => {
                    exited = true;
                    debug!(?pid, ?status, "Target algorithm exited");
                    drain_deadline.as_mut().reset(tokio::time::Instant::now() + STDOUT_DRAIN_GRACE);
                }
                () = &mut drain_deadline, if exited && !stdout_done => {
                    debug!(?pid, "Output still open after exit, closing it");
                    stdout_done = true;
                }
            }

            if state.killed && !terminated {
                terminated = true;
                self.killer.terminate(&mut child).await;
            }
        }

        self.killer.terminate(&mut child).await;
        pusher.abort();
        if let Some(task) = stderr_task {
            if tokio::time::timeout(STDERR_DRAIN_GRACE, task).await.is_err() {
                debug!(?pid, "Error stream still open after exit");
            }
        }
        drop(side_channel);

        let wallclock = started.elapsed().as_secs_f64();
        let runtime_seen = reading.get().unwrap_or(0.0);
        let result = state.result.take();
        let outcome = Self::decide(request, result, &state, runtime_seen);
        let latched = latch.publish(outcome.with_wallclock(wallclock));

        let outcome = latched.outcome();
        if matches!(outcome.kind(), RunResult::Abort | RunResult::Crashed) {
            error!(
                run = %request,
                result = %outcome.result_line(),
                call = %call,
                "Target algorithm run failed, reproduce with the call string"
            );
            let tail: Vec<&str> = state.tail.iter().map(String::as_str).collect();
            error!(output = %tail.join("\n"), "Output of failed run");
        }
        Ok(())
    }

    fn process_line(&self, line: String, state: &mut ScanState) {
        if self.options.log_all_process_output {
            debug!("[PROCESS] {line}");
        }

        if !state.killed {
            if let Some(parsed) = parse_result_line(&line) {
                if state.result.is_some() {
                    error!(
                        line = %line,
                        "Wrapper printed more than one result line, this is a bug in the wrapper"
                    );
                    state.duplicate = true;
                } else {
                    if let Err(err) = &parsed {
                        warn!(line = %line, error = %err, "Wrapper printed an unusable result line");
                    }
                    state.result = Some(parsed);
                }
            }
        }

        if self.options.output_tail_lines > 0 {
            if state.tail.len() == self.options.output_tail_lines {
                state.tail.pop_front();
            }
            state.tail.push_back(line);
        }
    }

    fn decide(
        request: &RunRequest,
        result: Option<Result<WrapperResult, ResultLineError>>,
        state: &ScanState,
        runtime_seen: f64,
    ) -> RunOutcome {
        if state.duplicate {
            return RunOutcome::aborted(request.clone(), DUPLICATE_MESSAGE);
        }

        match result {
            Some(Ok(result)) => {
                let raw_line = result.raw_line.clone();
                result.into_outcome(request.clone()).unwrap_or_else(|err| {
                    warn!(run = %request, error = %err, "Wrapper reported an invalid result");
                    RunOutcome::crashed(request.clone(), format!("Output:{raw_line} {err}"))
                })
            }
            Some(Err(err)) => RunOutcome::crashed(request.clone(), err.to_string()),
            None if state.interrupted => RunOutcome::aborted(request.clone(), INTERRUPTED_MESSAGE),
            None if state.killed => RunOutcome::killed(request.clone(), runtime_seen),
            None => RunOutcome::crashed(request.clone(), no_output_hint()),
        }
    }
}

async fn drain_stderr(stderr: ChildStderr) {
    let mut lines = BufReader::new(stderr).lines();
    while let Ok(Some(line)) = lines.next_line().await {
        warn!("[PROCESS-ERR] {line}");
    }
}

fn spawn_status_pusher(
    request: RunRequest,
    kill: KillToken,
    sink: StatusSink,
    reading: RuntimeReading,
    started: Instant,
    frequency: Duration,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            sink(LiveRun::running(
                request.clone(),
                reading.get().unwrap_or(0.0),
                started.elapsed().as_secs_f64(),
                kill.clone(),
            ));
            tokio::select! {
                () = kill.killed() => return,
                () = tokio::time::sleep(frequency) => {}
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::Path;
    use std::sync::Mutex;

    use tempfile::TempDir;
    use tokio::net::UdpSocket;

    use crate::domain::models::{ParamConfiguration, ProblemInstance};
    use crate::services::decorators::test_support::request;

    fn wrapper(dir: &Path, body: &str) -> String {
        let path = dir.join("wrapper.sh");
        std::fs::write(&path, format!("#!/bin/sh\n{body}\n")).unwrap();
        format!("sh {}", path.display())
    }

    fn launcher(dir: &Path, body: &str, listen_for_updates: bool) -> Launcher {
        let options = CommandLineOptions {
            observer_frequency_ms: MIN_OBSERVER_FREQUENCY_MS,
            listen_for_updates,
            ..CommandLineOptions::default()
        };
        Launcher::new(
            ExecutionConfig::new(wrapper(dir, body), dir),
            options,
            KillCommands::default(),
            SlotPool::new(1),
            KillToken::new(),
        )
    }

    fn collecting_sink() -> (StatusSink, Arc<Mutex<Vec<LiveRun>>>) {
        let seen: Arc<Mutex<Vec<LiveRun>>> = Arc::new(Mutex::new(Vec::new()));
        let sink: StatusSink = {
            let seen = Arc::clone(&seen);
            Arc::new(move |live: LiveRun| seen.lock().unwrap().push(live))
        };
        (sink, seen)
    }

    async fn wait_for_file(path: &Path) -> String {
        for _ in 0..500 {
            if let Ok(contents) = std::fs::read_to_string(path) {
                if contents.ends_with('\n') {
                    return contents;
                }
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("{} was never written", path.display());
    }

    async fn run_once(dir: &Path, body: &str) -> RunOutcome {
        let (sink, _) = collecting_sink();
        launcher(dir, body, false)
            .run(request("inst", 1), KillToken::new(), sink)
            .await
    }

    #[tokio::test]
    async fn test_two_result_lines_abort() {
        let dir = TempDir::new().unwrap();
        let outcome = run_once(
            dir.path(),
            "echo \"Result for SMAC: SAT, 1, -1, 0, $5\"\necho \"Result for SMAC: UNSAT, 2, -1, 0, $5\"",
        )
        .await;

        assert_eq!(outcome.kind(), RunResult::Abort);
        assert!(outcome.raw_line().contains(DUPLICATE_MESSAGE));
    }

    #[tokio::test]
    async fn test_unusable_result_lines_crash() {
        let dir = TempDir::new().unwrap();

        let outcome = run_once(dir.path(), "echo 'Result for SMAC: SAT, fast, -1, 0, 1'").await;
        assert_eq!(outcome.kind(), RunResult::Crashed);
        assert!(outcome.raw_line().contains("runtime"));

        let outcome = run_once(dir.path(), "echo 'Result for SMAC: SAT, 1, -1, 0, 1, extra, more'").await;
        assert_eq!(outcome.kind(), RunResult::Crashed);
        assert!(outcome.raw_line().contains("got 7"));
    }

    #[tokio::test]
    async fn test_missing_result_line_crashes_with_hint() {
        let dir = TempDir::new().unwrap();
        let outcome = run_once(dir.path(), "echo 'nothing to see'").await;

        assert_eq!(outcome.kind(), RunResult::Crashed);
        assert!(outcome.raw_line().starts_with("Wrapper did not output anything"));
    }

    #[tokio::test]
    async fn test_side_channel_runtime_reaches_status_snapshots() {
        let dir = TempDir::new().unwrap();
        let port_file = dir.path().join("port");
        let body = format!(
            "echo \"${ENV_PORT}\" > {}\nsleep 1\necho \"Result for SMAC: SAT, 1, -1, 0, $5\"",
            port_file.display()
        );
        let launcher = launcher(dir.path(), &body, true);
        let (sink, seen) = collecting_sink();

        let report = async {
            let port: u16 = wait_for_file(&port_file).await.trim().parse().unwrap();
            let socket = UdpSocket::bind("127.0.0.1:0").await.unwrap();
            socket.send_to(b"3.5", ("127.0.0.1", port)).await.unwrap();
        };
        let (outcome, ()) = tokio::join!(launcher.run(request("inst", 1), KillToken::new(), sink), report);

        assert_eq!(outcome.kind(), RunResult::Sat);
        let seen = seen.lock().unwrap();
        assert!(seen
            .iter()
            .any(|live| live.is_running() && (live.runtime() - 3.5).abs() < 1e-9));
        assert!(!seen.last().unwrap().is_running());
    }

    #[tokio::test]
    async fn test_stderr_flood_does_not_stall_run() {
        let dir = TempDir::new().unwrap();
        let body = "yes 'stderr noise' | head -n 200000 >&2\necho \"Result for SMAC: SAT, 1, -1, 0, $5\"";

        let outcome = tokio::time::timeout(Duration::from_secs(30), run_once(dir.path(), body))
            .await
            .expect("run finished");
        assert_eq!(outcome.kind(), RunResult::Sat);
    }

    #[tokio::test]
    async fn test_result_read_before_kill_is_kept() {
        let dir = TempDir::new().unwrap();
        let marker = dir.path().join("reported");
        let body = format!(
            "echo \"Result for SMAC: SAT, 0.5, -1, 0, $5\"\necho done > {}\nexec sleep 30",
            marker.display()
        );
        let launcher = launcher(dir.path(), &body, false);
        let (sink, _) = collecting_sink();
        let kill = KillToken::new();

        let killer = async {
            wait_for_file(&marker).await;
            tokio::time::sleep(Duration::from_millis(300)).await;
            kill.kill();
        };
        let run = tokio::time::timeout(
            Duration::from_secs(20),
            launcher.run(request("inst", 1), kill.clone(), sink),
        );
        let (outcome, ()) = tokio::join!(run, killer);
        let outcome = outcome.expect("kill terminated the wrapper");

        assert_eq!(outcome.kind(), RunResult::Sat);
        assert!((outcome.runtime() - 0.5).abs() < 1e-9);
    }

    #[tokio::test]
    async fn test_killed_run_releases_its_slot() {
        let dir = TempDir::new().unwrap();
        let marker = dir.path().join("started");
        let body = format!(
            "if [ \"$5\" = \"1\" ]; then\n  echo started > {}\n  exec sleep 30\nfi\n\
             echo \"Result for SMAC: SAT, 0.1, -1, 0, $5\"",
            marker.display()
        );
        let launcher = launcher(dir.path(), &body, false);
        let kill = KillToken::new();

        let (sink, _) = collecting_sink();
        let killer = async {
            wait_for_file(&marker).await;
            kill.kill();
        };
        let (first, ()) = tokio::join!(launcher.run(request("inst", 1), kill.clone(), sink), killer);
        assert_eq!(first.kind(), RunResult::Killed);
        assert_eq!(launcher.slots.available(), 1);

        let (sink, _) = collecting_sink();
        let second = tokio::time::timeout(
            Duration::from_secs(10),
            launcher.run(request("inst", 2), KillToken::new(), sink),
        )
        .await
        .expect("slot was free for the next run");
        assert_eq!(second.kind(), RunResult::Sat);
    }

    #[tokio::test]
    async fn test_zero_cutoff_never_spawns() {
        let dir = TempDir::new().unwrap();
        let marker = dir.path().join("ran");
        let launcher = launcher(dir.path(), &format!("touch {}", marker.display()), false);
        let zero = RunRequest::new(ProblemInstance::new("inst"), 1, 0.0, ParamConfiguration::new()).unwrap();

        let (sink, seen) = collecting_sink();
        let outcome = launcher.run(zero, KillToken::new(), sink).await;

        assert_eq!(outcome.kind(), RunResult::Timeout);
        assert!(!marker.exists());
        assert_eq!(seen.lock().unwrap().len(), 1);
    }
}
