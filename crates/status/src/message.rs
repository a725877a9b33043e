use std::fmt;

use chrono::{DateTime, Local};

/// `strftime` pattern for the transcript prefix, e.g. `[18/10 14:03:59] `.
pub const TIMESTAMP_FORMAT: &str = "[%d/%m %H:%M:%S] ";

/// A single transcript entry. Immutable once constructed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusMessage {
    timestamp: DateTime<Local>,
    text: String,
}

impl StatusMessage {
    /// Creates a message stamped with the current local time.
    pub fn new(text: impl Into<String>) -> Self {
        Self::at(Local::now(), text)
    }

    /// Creates a message with an explicit timestamp.
    pub fn at(timestamp: DateTime<Local>, text: impl Into<String>) -> Self {
        Self {
            timestamp,
            text: text.into(),
        }
    }

    pub fn timestamp(&self) -> DateTime<Local> {
        self.timestamp
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    /// Renders the transcript line: timestamp prefix, text, trailing newline.
    pub fn formatted(&self) -> String {
        format!("{}{}\n", self.timestamp.format(TIMESTAMP_FORMAT), self.text)
    }
}

impl fmt::Display for StatusMessage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", self.timestamp.format(TIMESTAMP_FORMAT), self.text)
    }
}
