//! Line framing for the controller's half-duplex serial protocol.
//!
//! Outbound frames are ASCII lines terminated with CRLF. The controller
//! answers a turn or move with free-form text that eventually contains
//! [`COMPLETION_MARKER`].

/// Substring the controller emits once the last motion command finished.
pub const COMPLETION_MARKER: &str = "Done";

/// Bare stop byte written by the script engine and the emergency stop path.
pub const STOP_FRAME: &[u8] = b"s";

/// Line-terminated stop used by the joystick pusher.
pub const STOP_LINE: &[u8] = b"s\r\n";

const LINE_END: &str = "\r\n";

/// Rotate by `value` (opcode `a`).
pub fn turn_frame(value: &str) -> String {
    format!("a {}{}", value, LINE_END)
}

/// Drive by `value` (opcode `d`).
pub fn move_frame(value: &str) -> String {
    format!("d {}{}", value, LINE_END)
}

/// Arbitrary command line, as sent by the joystick pusher.
pub fn command_line(command: &str) -> String {
    format!("{}{}", command, LINE_END)
}

/// True when the stop opcode is the whole frame, with or without CRLF.
pub fn is_stop(frame: &[u8]) -> bool {
    frame == STOP_FRAME || frame == STOP_LINE
}

/// True for frames the controller acknowledges with the completion marker.
pub fn is_motion(frame: &[u8]) -> bool {
    frame.starts_with(b"a ") || frame.starts_with(b"d ")
}
