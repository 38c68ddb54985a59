//! Line parser for motion scripts.
//!
//! Parsing never fails as a whole: malformed lines are skipped and
//! reported as [`ParseWarning`]s next to whatever parsed successfully.

use super::{Operation, Script};
use std::time::Duration;
use thiserror::Error;

/// A script line that was skipped.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ParseWarning {
    #[error("line {line}: invalid wait time '{value}'")]
    InvalidWait { line: usize, value: String },
    #[error("line {line}: unknown command '{command}'")]
    UnknownCommand { line: usize, command: String },
}

impl ParseWarning {
    /// 1-based line number in the source script.
    pub fn line(&self) -> usize {
        match self {
            ParseWarning::InvalidWait { line, .. } | ParseWarning::UnknownCommand { line, .. } => *line,
        }
    }
}

/// Result of parsing a script: the operations plus every skipped line.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ParsedScript {
    pub script: Script,
    pub warnings: Vec<ParseWarning>,
}

/// Parse script lines in order.
///
/// Blank lines and lines without a `:` are ignored. The command key is
/// matched case-insensitively; the value is trimmed and otherwise kept verbatim.
pub fn parse<I, S>(lines: I) -> ParsedScript
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let mut operations = Vec::new();
    let mut warnings = Vec::new();

    for (index, line) in lines.into_iter().enumerate() {
        let line = line.as_ref().trim();
        if line.is_empty() {
            continue;
        }
        let Some((cmd, value)) = line.split_once(':') else {
            continue;
        };
        let cmd = cmd.trim().to_lowercase();
        let value = value.trim();
        let line_no = index + 1;

        match cmd.as_str() {
            "turn" => operations.push(Operation::Turn { raw_value: value.to_string() }),
            "move" => operations.push(Operation::Move { raw_value: value.to_string() }),
            "wait" => match parse_wait(value) {
                Some(seconds) => operations.push(Operation::Wait { seconds }),
                None => warnings.push(ParseWarning::InvalidWait {
                    line: line_no,
                    value: value.to_string(),
                }),
            },
            _ => warnings.push(ParseWarning::UnknownCommand {
                line: line_no,
                command: cmd,
            }),
        }
    }

    for warning in &warnings {
        tracing::warn!("Skipping script {}", warning);
    }

    ParsedScript {
        script: Script::new(operations),
        warnings,
    }
}

/// Parse a whole script held in memory.
pub fn parse_str(source: &str) -> ParsedScript {
    parse(source.lines())
}

// Waits must be representable as a `Duration`: finite and non-negative.
fn parse_wait(value: &str) -> Option<f64> {
    let seconds: f64 = value.parse().ok()?;
    if !seconds.is_finite() || seconds < 0.0 {
        return None;
    }
    Duration::try_from_secs_f64(seconds).ok()?;
    Some(seconds)
}
