//! Parsing of the result announcement a wrapper prints on stdout.
//!
//! A result line looks like
//! `Result for SMAC: SAT, 0.9, -1, 0, 12345[, additional data]` and is
//! matched case-insensitively at the start of the line.

use std::sync::LazyLock;

use regex::Regex;
use thiserror::Error;

use crate::domain::errors::MalformedResult;
use crate::domain::models::{RunOutcome, RunRequest, RunResult};

/// Pattern a line must match to be treated as a result announcement.
pub const RESULT_PATTERN: &str =
    r"(?i)^\s*(?:final)?\s*results?\s+(?:for|of)\s+(?:HAL|ParamILS|SMAC|this\s+wrapper)\s*:";

static RESULT_REGEX: LazyLock<Result<Regex, regex::Error>> =
    LazyLock::new(|| Regex::new(RESULT_PATTERN));

/// Why a matched result line could not be used.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ResultLineError {
    #[error(
        "Expected 5 or 6 comma separated fields \
         (<solved>, <runtime>, <runlength>, <quality>, <seed>[, <additional data>]) but got {0}"
    )]
    /// Wrong number of comma separated fields
    FieldCount(usize),

    /// Result keyword not recognized
    #[error("Unknown result keyword '{keyword}', valid keywords are: {}", .valid.join(", "))]
    UnknownKeyword { keyword: String, valid: Vec<&'static str> },

    /// Keyword a wrapper may not report
    #[error("Result '{0}' may not be reported by a wrapper")]
    KeywordNotPermitted(RunResult),

    /// Numeric field failed to parse
    #[error("Could not parse {field} from '{value}'")]
    InvalidNumber { field: &'static str, value: String },

    /// The announcement pattern failed to compile
    #[error("Result line pattern failed to compile: {0}")]
    Pattern(String),
}

/// Values announced by a wrapper, before validation.
#[derive(Debug, Clone, PartialEq)]
pub struct WrapperResult {
    /// Announced result kind
    pub kind: RunResult,
    /// Runtime in seconds
    pub runtime: f64,
    /// Run length, `-1` when unknown
    pub run_length: f64,
    /// Solution quality
    pub quality: f64,
    /// Seed echoed by the wrapper
    pub seed: i64,
    /// Trailing free-form field
    pub additional_data: String,
    /// Text after the announcement prefix
    pub raw_line: String,
}

impl WrapperResult {
    /// Validate and attach to the request that produced it.
    pub fn into_outcome(self, request: RunRequest) -> Result<RunOutcome, MalformedResult> {
        Ok(RunOutcome::new(
            request,
            self.kind,
            self.runtime,
            self.run_length,
            self.quality,
            self.seed,
        )?
        .with_additional_data(self.additional_data)
        .with_raw_line(self.raw_line))
    }
}

/// Parse one line of wrapper output.
///
/// Returns `None` if the line is not a result announcement.
pub fn parse_result_line(line: &str) -> Option<Result<WrapperResult, ResultLineError>> {
    let regex = match RESULT_REGEX.as_ref() {
        Ok(regex) => regex,
        Err(e) => return Some(Err(ResultLineError::Pattern(e.to_string()))),
    };
    let found = regex.find(line)?;
    Some(parse_fields(line[found.end()..].trim()))
}

fn parse_fields(remainder: &str) -> Result<WrapperResult, ResultLineError> {
    let fields: Vec<&str> = remainder.split(',').map(str::trim).collect();
    if !(5..=6).contains(&fields.len()) {
        return Err(ResultLineError::FieldCount(fields.len()));
    }

    let kind = RunResult::from_keyword(fields[0]).ok_or_else(|| ResultLineError::UnknownKeyword {
        keyword: fields[0].to_string(),
        valid: RunResult::wrapper_keywords(),
    })?;
    if !kind.is_permitted_by_wrappers() {
        return Err(ResultLineError::KeywordNotPermitted(kind));
    }

    Ok(WrapperResult {
        kind,
        runtime: parse_number("runtime", fields[1])?,
        run_length: parse_number("runlength", fields[2])?,
        quality: parse_number("quality", fields[3])?,
        seed: fields[4]
            .parse()
            .map_err(|_| ResultLineError::InvalidNumber {
                field: "seed",
                value: fields[4].to_string(),
            })?,
        additional_data: fields.get(5).map(ToString::to_string).unwrap_or_default(),
        raw_line: remainder.to_string(),
    })
}

fn parse_number(field: &'static str, value: &str) -> Result<f64, ResultLineError> {
    value.parse().map_err(|_| ResultLineError::InvalidNumber {
        field,
        value: value.to_string(),
    })
}
