//! Motion scripts: one `key:value` instruction per line.
//!
//! ```text
//! turn:90
//! wait:2
//! move:50
//! ```

pub mod parser;

pub use parser::{parse, parse_str, ParseWarning, ParsedScript};

use crate::protocol;
use std::time::Duration;

/// A single instruction of a motion script.
#[derive(Debug, Clone, PartialEq)]
pub enum Operation {
    /// Drive; the value is forwarded to the controller untouched.
    Move { raw_value: String },
    /// Rotate; the value is forwarded to the controller untouched.
    Turn { raw_value: String },
    /// Pause locally without talking to the controller.
    Wait { seconds: f64 },
}

impl Operation {
    /// Serial frame for operations the controller acknowledges.
    pub fn command_frame(&self) -> Option<String> {
        match self {
            Operation::Move { raw_value } => Some(protocol::move_frame(raw_value)),
            Operation::Turn { raw_value } => Some(protocol::turn_frame(raw_value)),
            Operation::Wait { .. } => None,
        }
    }

    pub fn wait_duration(&self) -> Option<Duration> {
        match self {
            Operation::Wait { seconds } if *seconds > 0.0 => {
                Some(Duration::try_from_secs_f64(*seconds).unwrap_or(Duration::MAX))
            }
            Operation::Wait { .. } => Some(Duration::ZERO),
            _ => None,
        }
    }
}

/// An immutable, ordered list of operations read from one script file.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Script {
    operations: Vec<Operation>,
}

impl Script {
    pub fn new(operations: Vec<Operation>) -> Self {
        Self { operations }
    }

    pub fn operations(&self) -> &[Operation] {
        &self.operations
    }

    pub fn len(&self) -> usize {
        self.operations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.operations.is_empty()
    }

    /// Number of commands that will be sent to the controller per pass.
    pub fn motion_count(&self) -> usize {
        self.operations.iter().filter(|op| op.command_frame().is_some()).count()
    }
}

impl<'a> IntoIterator for &'a Script {
    type Item = &'a Operation;
    type IntoIter = std::slice::Iter<'a, Operation>;

    fn into_iter(self) -> Self::IntoIter {
        self.operations.iter()
    }
}
