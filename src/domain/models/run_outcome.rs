//! Run outcomes and the latch-once cell that publishes them.
//!
//! A [`RunOutcome`] is always terminal: it can only be constructed through a
//! validating constructor that rejects `RUNNING` and malformed measurements.
//! The pending state of a run lives in [`OutcomeLatch`], which moves from
//! empty to terminal exactly once.

use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::OnceLock;

use serde::Serialize;

use crate::domain::errors::{MalformedResult, OutcomePending};
use crate::domain::models::{RunRequest, RunResult};

/// Raw line recorded for runs that were never started because of their cutoff.
pub const NOT_RUN_RAW_LINE: &str =
    "[DIDN'T BOTHER TO RUN ALGORITHM AS THE CAPTIME IS NOT POSITIVE]";

/// Raw line recorded for runs terminated through their kill token.
pub const KILLED_RAW_LINE: &str = "Killed Manually";

/// The measured result of one evaluation attempt.
#[derive(Debug, Clone, Serialize)]
pub struct RunOutcome {
    request: RunRequest,
    kind: RunResult,
    runtime: f64,
    run_length: f64,
    quality: f64,
    seed: i64,
    wallclock: f64,
    additional_data: String,
    raw_line: String,
    well_formed: bool,
}

impl RunOutcome {
    /// Build a terminal outcome from measured values.
    ///
    /// Infinite runtimes are clamped to `f64::MAX`.
    pub fn new(
        request: RunRequest,
        kind: RunResult,
        runtime: f64,
        run_length: f64,
        quality: f64,
        seed: i64,
    ) -> Result<Self, MalformedResult> {
        if !kind.is_terminal() {
            return Err(MalformedResult::RunningNotTerminal);
        }
        if runtime.is_nan() || runtime < 0.0 {
            return Err(MalformedResult::InvalidRuntime(runtime));
        }
        if run_length.is_nan() || (run_length < 0.0 && (run_length - -1.0).abs() > f64::EPSILON) {
            return Err(MalformedResult::InvalidRunLength(run_length));
        }
        if quality.is_nan() {
            return Err(MalformedResult::InvalidQuality);
        }

        Ok(Self {
            request,
            kind,
            runtime: runtime.min(f64::MAX),
            run_length: run_length.min(f64::MAX),
            quality: quality.clamp(f64::MIN, f64::MAX),
            seed,
            wallclock: 0.0,
            additional_data: String::new(),
            raw_line: String::new(),
            well_formed: true,
        })
    }

    /// Outcome synthesized by the engine rather than reported by the algorithm.
    fn synthesized(request: RunRequest, kind: RunResult, runtime: f64, raw_line: String) -> Self {
        let seed = request.seed();
        Self {
            request,
            kind,
            runtime: if runtime.is_finite() { runtime.max(0.0) } else { 0.0 },
            run_length: 0.0,
            quality: 0.0,
            seed,
            wallclock: 0.0,
            additional_data: String::new(),
            raw_line,
            well_formed: false,
        }
    }

    /// `CRASHED` charged with the full cutoff.
    pub fn crashed(request: RunRequest, message: impl Into<String>) -> Self {
        let cutoff = request.cutoff();
        Self::synthesized(request, RunResult::Crashed, cutoff, message.into())
    }

    /// `ABORT` charged with the full cutoff.
    pub fn aborted(request: RunRequest, message: impl Into<String>) -> Self {
        let cutoff = request.cutoff();
        let message = message.into();
        Self::synthesized(request, RunResult::Abort, cutoff, message.clone())
            .with_additional_data(message)
    }

    /// `KILLED` with the best known runtime at the time of the kill.
    pub fn killed(request: RunRequest, runtime: f64) -> Self {
        Self::synthesized(request, RunResult::Killed, runtime, KILLED_RAW_LINE.to_string())
    }

    /// `TIMEOUT` for a request that was never launched because its cutoff is not positive.
    pub fn not_run(request: RunRequest) -> Self {
        Self::synthesized(request, RunResult::Timeout, 0.0, NOT_RUN_RAW_LINE.to_string())
    }

    /// Record the measured wallclock time; invalid values become 0.
    #[must_use]
    pub fn with_wallclock(mut self, wallclock: f64) -> Self {
        self.wallclock = if wallclock.is_finite() { wallclock.max(0.0) } else { 0.0 };
        self
    }

    /// Attach free-form trailing data.
    #[must_use]
    pub fn with_additional_data(mut self, data: impl Into<String>) -> Self {
        self.additional_data = data.into();
        self
    }

    /// Attach the line the outcome was parsed from.
    #[must_use]
    pub fn with_raw_line(mut self, raw_line: impl Into<String>) -> Self {
        self.raw_line = raw_line.into();
        self
    }

    /// Replace the measured values, keeping request and provenance.
    pub fn with_values(
        &self,
        kind: RunResult,
        runtime: f64,
        quality: f64,
    ) -> Result<Self, MalformedResult> {
        let mut replaced = Self::new(
            self.request.clone(),
            kind,
            runtime,
            self.run_length,
            quality,
            self.seed,
        )?;
        replaced.wallclock = self.wallclock;
        replaced.additional_data.clone_from(&self.additional_data);
        replaced.raw_line.clone_from(&self.raw_line);
        replaced.well_formed = self.well_formed;
        Ok(replaced)
    }

    /// The request this outcome answers.
    pub const fn request(&self) -> &RunRequest {
        &self.request
    }

    /// Terminal result kind.
    pub const fn kind(&self) -> RunResult {
        self.kind
    }

    /// Runtime in seconds.
    pub const fn runtime(&self) -> f64 {
        self.runtime
    }

    /// Run length, or `-1` when not reported.
    pub const fn run_length(&self) -> f64 {
        self.run_length
    }

    /// Solution quality.
    pub const fn quality(&self) -> f64 {
        self.quality
    }

    /// Seed reported back by the wrapper.
    pub const fn seed(&self) -> i64 {
        self.seed
    }

    /// Wallclock seconds the run took.
    pub const fn wallclock(&self) -> f64 {
        self.wallclock
    }

    /// Free-form trailing data.
    pub fn additional_data(&self) -> &str {
        &self.additional_data
    }

    /// Line the outcome was parsed from, or a synthesized description.
    pub fn raw_line(&self) -> &str {
        &self.raw_line
    }

    /// Whether the values came from a valid measurement rather than being synthesized.
    pub const fn is_well_formed(&self) -> bool {
        self.well_formed
    }

    /// Canonical text form: `<OUTCOME>, <runtime>, <runlength>, <quality>, <seed>[, <additionalData>]`.
    ///
    /// Commas and line breaks in the additional data are replaced so the line
    /// always parses back into the same number of fields.
    pub fn result_line(&self) -> String {
        let mut line = format!(
            "{}, {:?}, {:?}, {:?}, {}",
            self.kind, self.runtime, self.run_length, self.quality, self.seed
        );
        let extra = self.additional_data.trim();
        if !extra.is_empty() {
            let sanitized: String = extra
                .chars()
                .map(|c| match c {
                    ',' => ';',
                    '\n' | '\r' => ' ',
                    other => other,
                })
                .collect();
            line.push_str(", ");
            line.push_str(&sanitized);
        }
        line
    }
}

impl PartialEq for RunOutcome {
    fn eq(&self, other: &Self) -> bool {
        self.request == other.request
    }
}

impl Eq for RunOutcome {}

impl Hash for RunOutcome {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.request.hash(state);
    }
}

impl fmt::Display for RunOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} ==> <{}> W:({:.3})",
            self.request,
            self.result_line(),
            self.wallclock
        )
    }
}

/// Result of a publish attempt on an [`OutcomeLatch`].
#[derive(Debug)]
pub enum Latched<'a> {
    /// This publish set the outcome.
    Won(&'a RunOutcome),
    /// Another publish got there first; this is the outcome it set.
    Lost(&'a RunOutcome),
}

impl<'a> Latched<'a> {
    /// The outcome held by the latch.
    pub const fn outcome(&self) -> &'a RunOutcome {
        match self {
            Self::Won(outcome) | Self::Lost(outcome) => outcome,
        }
    }

    /// Whether this publish set the outcome.
    pub const fn won(&self) -> bool {
        matches!(self, Self::Won(_))
    }
}

/// Write-once cell holding the terminal outcome of a run.
#[derive(Debug, Default)]
pub struct OutcomeLatch {
    cell: OnceLock<RunOutcome>,
}

impl OutcomeLatch {
    /// An empty latch.
    pub fn new() -> Self {
        Self::default()
    }

    /// Atomically move from pending to terminal. Only the first call wins.
    pub fn publish(&self, outcome: RunOutcome) -> Latched<'_> {
        let mut won = false;
        let latched = self.cell.get_or_init(|| {
            won = true;
            outcome
        });
        if won {
            Latched::Won(latched)
        } else {
            Latched::Lost(latched)
        }
    }

    /// Whether an outcome has been published.
    pub fn is_latched(&self) -> bool {
        self.cell.get().is_some()
    }

    /// The terminal outcome, or an error while the run is still pending.
    pub fn outcome(&self) -> Result<&RunOutcome, OutcomePending> {
        self.cell
            .get()
            .ok_or_else(|| OutcomePending("outcome not latched yet".to_string()))
    }

    /// Consume the latch, yielding its outcome if one was published.
    pub fn into_outcome(self) -> Result<RunOutcome, OutcomePending> {
        self.cell
            .into_inner()
            .ok_or_else(|| OutcomePending("outcome not latched yet".to_string()))
    }
}
