//! Heuristic classification of streamed CLI output.
//!
//! There is no response framing on an interactive shell: the only signals
//! are the trailing `#` of the device prompt, a handful of error phrases,
//! and the occasional interactive confirmation request. Classification is
//! per line, in transcript order, and the first conclusive line wins.

use regex::Regex;

/// What a single transcript line means for a pending command.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LineClass {
    /// The device prompt — the previous command finished.
    Completion,

    /// A device-reported error ("% Invalid input", "not valid", ...).
    DeviceError,

    /// An interactive confirmation request the reader must answer.
    Confirmation,

    /// Nothing conclusive; keep waiting.
    Inconclusive,
}

/// Compiled line classifier shared by the reader and completion waiters.
#[derive(Debug)]
pub struct PromptDetector {
    error_pattern: Regex,
    confirmation_pattern: Regex,
}

impl PromptDetector {
    pub fn new() -> Self {
        Self {
            // Substring heuristics matching the device's free-form error
            // output. Case-insensitive; kept deliberately broad.
            error_pattern: Regex::new(r"(?i)invalid input|error|not valid").unwrap(),
            confirmation_pattern: Regex::new(
                r"(?i)are you sure you want to enable a non-secure interface",
            )
            .unwrap(),
        }
    }

    /// Classify one decoded line.
    ///
    /// Confirmation is checked first: a confirmation request must trigger the
    /// auto-responder and must never satisfy a completion or error check.
    pub fn classify(&self, line: &str) -> LineClass {
        if self.confirmation_pattern.is_match(line) {
            return LineClass::Confirmation;
        }
        if line.trim_end().ends_with('#') {
            return LineClass::Completion;
        }
        if self.error_pattern.is_match(line) {
            return LineClass::DeviceError;
        }
        LineClass::Inconclusive
    }

    /// Whether `line` is the shell's echo of the command just dispatched.
    ///
    /// The PTY echoes every dispatched line back, usually appended to the
    /// pending prompt (`MOXA(config)# spanning-tree errordisable ...`). Echoes
    /// must be excluded from error matching: several provisioning commands
    /// contain the substring "error" themselves.
    pub fn is_echo(&self, line: &str, command: &str) -> bool {
        let command = command.trim();
        !command.is_empty() && line.trim_end().ends_with(command)
    }
}

impl Default for PromptDetector {
    fn default() -> Self {
        Self::new()
    }
}
