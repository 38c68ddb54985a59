//! Host for a serial-attached motion controller: runs uploaded motion
//! scripts, relays joystick input, and exposes both over HTTP.

pub mod config;
pub mod file_manager;
pub mod hardware;
pub mod joystick;
pub mod motion;
pub mod notices;
pub mod protocol;
pub mod script;
pub mod simulator;
pub mod web;

pub use motion::{ExecutionController, RunOutcome, RunState};
pub use script::{Operation, Script};
