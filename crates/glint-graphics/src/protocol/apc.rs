//! Stateful scanner for graphics APC sequences in a PTY byte stream.
//!
//! ```text
//! ESC _ G <key>=<value>,...;<base64-data> ESC \
//! 0x1b 0x5f 0x47 ...                     0x1b 0x5c
//! ```
//!
//! Graphics payloads can be tens of kilobytes and routinely span several
//! `read()` calls, so the scanner keeps its state between [`ApcScanner::feed`]
//! calls. Every delimiter may be split across reads, including `ESC _` | `G`.
//! The returned bodies are what [`Command::parse`] expects.
//!
//! [`Command::parse`]: crate::protocol::command::Command::parse

const ESC: u8 = 0x1b;

/// Default cap on one sequence body (64 MiB).
pub const DEFAULT_MAX_SEQUENCE_BYTES: usize = 64 * 1024 * 1024;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ScanState {
    /// Looking for `ESC`.
    Ground,
    /// Saw `ESC`; waiting for `_`.
    EscSeen,
    /// Saw `ESC _`; waiting for `G`.
    ApcSeen,
    /// Inside `ESC _ G`; collecting until `ESC \`.
    InBody,
    /// Inside the body and just saw `ESC`.
    BodyEscSeen,
    /// The body outgrew the cap; skipping until `ESC \`.
    Discarding,
    /// Discarding and just saw `ESC`.
    DiscardEscSeen,
}

/// Extracts graphics command bodies from raw terminal output.
///
/// Create one per PTY read loop and feed it every buffer read.
#[derive(Debug)]
pub struct ApcScanner {
    state: ScanState,
    body: Vec<u8>,
    max_sequence_bytes: usize,
}

impl ApcScanner {
    pub fn new() -> Self {
        Self::with_limit(DEFAULT_MAX_SEQUENCE_BYTES)
    }

    /// Scanner that drops any sequence whose body exceeds `max_sequence_bytes`.
    pub fn with_limit(max_sequence_bytes: usize) -> Self {
        Self {
            state: ScanState::Ground,
            body: Vec::new(),
            max_sequence_bytes,
        }
    }

    /// Scan `buf` and return the bodies of all sequences completed by it.
    pub fn feed(&mut self, buf: &[u8]) -> Vec<Vec<u8>> {
        let mut completed = Vec::new();
        let mut i = 0;
        while i < buf.len() {
            let byte = buf[i];
            match self.state {
                ScanState::Ground => {
                    if byte == ESC {
                        self.state = ScanState::EscSeen;
                    }
                }
                ScanState::EscSeen => {
                    self.state = match byte {
                        b'_' => ScanState::ApcSeen,
                        ESC => ScanState::EscSeen,
                        _ => ScanState::Ground,
                    };
                }
                ScanState::ApcSeen => {
                    if byte == b'G' {
                        self.body.clear();
                        self.state = ScanState::InBody;
                    } else {
                        // Some other APC; re-examine this byte from ground.
                        self.state = ScanState::Ground;
                        continue;
                    }
                }
                ScanState::InBody => {
                    if byte == ESC {
                        self.state = ScanState::BodyEscSeen;
                    } else {
                        self.push(byte);
                    }
                }
                ScanState::BodyEscSeen => match byte {
                    b'\\' => {
                        self.state = ScanState::Ground;
                        let body = std::mem::take(&mut self.body);
                        if body.is_empty() {
                            log::trace!("ignoring empty graphics APC");
                        } else {
                            log::trace!("graphics APC: {} bytes", body.len());
                            completed.push(body);
                        }
                    }
                    b'_' => {
                        // A new APC interrupts the unterminated one.
                        log::trace!("graphics APC interrupted after {} bytes", self.body.len());
                        self.body.clear();
                        self.state = ScanState::ApcSeen;
                    }
                    ESC => {
                        // Keep the earlier ESC; this one may start the terminator.
                        self.state = ScanState::InBody;
                        self.push(ESC);
                        if self.state == ScanState::InBody {
                            self.state = ScanState::BodyEscSeen;
                        }
                    }
                    _ => {
                        self.state = ScanState::InBody;
                        self.push(ESC);
                        self.push(byte);
                    }
                },
                ScanState::Discarding => {
                    if byte == ESC {
                        self.state = ScanState::DiscardEscSeen;
                    }
                }
                ScanState::DiscardEscSeen => {
                    self.state = match byte {
                        b'\\' => ScanState::Ground,
                        ESC => ScanState::DiscardEscSeen,
                        _ => ScanState::Discarding,
                    };
                }
            }
            i += 1;
        }
        completed
    }

    fn push(&mut self, byte: u8) {
        if self.state != ScanState::InBody {
            return;
        }
        if self.body.len() >= self.max_sequence_bytes {
            log::warn!(
                "graphics APC exceeded {} bytes, discarding sequence",
                self.max_sequence_bytes
            );
            self.body = Vec::new();
            self.state = ScanState::Discarding;
            return;
        }
        self.body.push(byte);
    }

    /// Drop any partial sequence and return to the ground state.
    pub fn reset(&mut self) {
        self.state = ScanState::Ground;
        self.body.clear();
    }

    /// `true` between `ESC _ G` and the terminating `ESC \`.
    pub fn is_accumulating(&self) -> bool {
        matches!(
            self.state,
            ScanState::InBody
                | ScanState::BodyEscSeen
                | ScanState::Discarding
                | ScanState::DiscardEscSeen
        )
    }
}

impl Default for ApcScanner {
    fn default() -> Self {
        Self::new()
    }
}
