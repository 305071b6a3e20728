//! Kitty graphics protocol wire format.
//!
//! - [`apc`]: pulls `ESC _ G ... ESC \` bodies out of a PTY byte stream
//! - [`command`]: parses a body into a typed [`Command`]
//! - [`response`]: encodes the replies sent back to the client

pub mod apc;
pub mod command;
pub mod response;

pub use apc::ApcScanner;
pub use command::{parse_kitty_command, Action, Command, CommandKind};
pub use response::Response;
