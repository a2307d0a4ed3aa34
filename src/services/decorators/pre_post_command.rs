//! Decorator running shell commands around the session.

use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::process::Command;
use tracing::{debug, error, info};

use crate::domain::errors::{EvalResult, EvaluatorError};
use crate::domain::models::{RunOutcome, RunRequest};
use crate::domain::ports::{Evaluator, ObserverHandle};

/// Runs an operator supplied shell command when the chain is built and
/// another one at shutdown.
pub struct PrePostCommandEvaluator {
    inner: Arc<dyn Evaluator>,
    post_command: Option<String>,
    exec_dir: PathBuf,
    fail_on_error: bool,
}

/// Run `command` through `sh -c` in `exec_dir`, logging its output.
async fn run_shell(command: &str, exec_dir: &Path, phase: &str) -> EvalResult<()> {
    info!(phase, command, dir = %exec_dir.display(), "Running command");
    let output = Command::new("sh")
        .arg("-c")
        .arg(command)
        .current_dir(exec_dir)
        .stdin(Stdio::null())
        .output()
        .await?;

    for line in String::from_utf8_lossy(&output.stdout).lines() {
        info!(phase, "{line}");
    }
    for line in String::from_utf8_lossy(&output.stderr).lines() {
        info!(phase, stream = "stderr", "{line}");
    }

    if output.status.success() {
        debug!(phase, "Command completed");
        Ok(())
    } else {
        Err(EvaluatorError::CommandFailed(format!(
            "{phase} command `{command}` exited with {}",
            output.status
        )))
    }
}

impl PrePostCommandEvaluator {
    /// Wrap `inner`, running `pre_command` before returning.
    pub async fn new(
        inner: Arc<dyn Evaluator>,
        pre_command: Option<&str>,
        post_command: Option<String>,
        exec_dir: PathBuf,
        fail_on_error: bool,
    ) -> EvalResult<Self> {
        if let Some(command) = pre_command.filter(|c| !c.trim().is_empty()) {
            match run_shell(command, &exec_dir, "pre").await {
                Ok(()) => {}
                Err(err) if fail_on_error => return Err(err),
                Err(err) => error!(error = %err, "Pre command failed"),
            }
        }
        Ok(Self {
            inner,
            post_command: post_command.filter(|c| !c.trim().is_empty()),
            exec_dir,
            fail_on_error,
        })
    }
}

#[async_trait]
impl Evaluator for PrePostCommandEvaluator {
    async fn evaluate(
        &self,
        requests: Vec<RunRequest>,
        observer: Option<ObserverHandle>,
    ) -> EvalResult<Vec<RunOutcome>> {
        self.inner.evaluate(requests, observer).await
    }

    fn inner(&self) -> Option<&Arc<dyn Evaluator>> {
        Some(&self.inner)
    }

    async fn shutdown(&self) {
        self.inner.shutdown().await;
        if let Some(command) = &self.post_command {
            if let Err(err) = run_shell(command, &self.exec_dir, "post").await {
                if self.fail_on_error {
                    error!(error = %err, "Post command failed");
                } else {
                    info!(error = %err, "Post command failed, ignoring");
                }
            }
        }
    }
}
