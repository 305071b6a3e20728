//! Reply encoder.
//!
//! ```text
//! ESC _ G [<key>=<value>,...;]<OK|error> ESC \
//! ```
//!
//! Parameters whose value is zero are left out, and the `;` is only written
//! when at least one parameter remains.

use crate::error::GraphicsError;
use crate::protocol::command::Verbosity;

/// A reply to one command, built up parameter by parameter.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Response {
    params: Vec<(char, u32)>,
    error: Option<GraphicsError>,
}

impl Response {
    pub fn ok() -> Self {
        Self::default()
    }

    pub fn from_result(result: Result<(), GraphicsError>) -> Self {
        Self {
            params: Vec::new(),
            error: result.err(),
        }
    }

    /// Append `key=value` unless `value` is zero.
    pub fn param(mut self, key: char, value: u32) -> Self {
        if value != 0 {
            self.params.push((key, value));
        }
        self
    }

    pub fn is_error(&self) -> bool {
        self.error.is_some()
    }

    /// Whether a client that asked for `verbosity` wants to see this reply.
    pub fn is_wanted(&self, verbosity: Verbosity) -> bool {
        match verbosity {
            Verbosity::Normal => true,
            Verbosity::ErrorsOnly => self.is_error(),
            Verbosity::Quiet => false,
        }
    }

    /// Render the complete escape sequence.
    pub fn encode(&self) -> String {
        let mut out = String::from("\x1b_G");
        for (n, (key, value)) in self.params.iter().enumerate() {
            if n > 0 {
                out.push(',');
            }
            out.push(*key);
            out.push('=');
            out.push_str(&value.to_string());
        }
        if !self.params.is_empty() {
            out.push(';');
        }
        match &self.error {
            Some(err) => out.push_str(&err.to_string()),
            None => out.push_str("OK"),
        }
        out.push_str("\x1b\\");
        out
    }
}
