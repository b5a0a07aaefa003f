//! Device-level diagnostic channel.
//!
//! Backends report driver-style messages here instead of failing the call
//! that triggered them. Messages below the configured level are dropped;
//! the rest are forwarded to `log` and kept in a bounded history.

use std::collections::VecDeque;
use std::fmt;

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Severity of a device diagnostic, ordered from least to most severe.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    Default,
    Serialize,
    Deserialize,
    JsonSchema,
)]
#[serde(rename_all = "snake_case")]
pub enum DebugSeverity {
    /// Informational message.
    Notification,
    /// Minor performance or portability issue.
    #[default]
    Low,
    /// Likely misuse or significant performance problem.
    Medium,
    /// Error or undefined behavior.
    High,
}

impl fmt::Display for DebugSeverity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Notification => "notification",
            Self::Low => "low",
            Self::Medium => "medium",
            Self::High => "high",
        };
        f.write_str(name)
    }
}

/// A retained diagnostic.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DebugMessage {
    /// Severity the backend assigned.
    pub severity: DebugSeverity,
    /// Message text.
    pub text: String,
}

/// Severity-filtered sink for device diagnostics.
#[derive(Debug, Clone)]
pub struct DebugOutput {
    level: DebugSeverity,
    retain: usize,
    messages: VecDeque<DebugMessage>,
}

impl Default for DebugOutput {
    fn default() -> Self {
        Self::new(DebugSeverity::Low, 64)
    }
}

impl DebugOutput {
    /// Sink that keeps at most `retain` messages at or above `level`.
    #[must_use]
    pub fn new(level: DebugSeverity, retain: usize) -> Self {
        Self {
            level,
            retain,
            messages: VecDeque::new(),
        }
    }

    /// Minimum severity that is reported.
    #[must_use]
    pub fn level(&self) -> DebugSeverity {
        self.level
    }

    /// Change the minimum reported severity.
    pub fn set_level(&mut self, level: DebugSeverity) {
        self.level = level;
    }

    /// Change how many messages are retained. Drops the oldest overflow.
    pub fn set_retain(&mut self, retain: usize) {
        self.retain = retain;
        while self.messages.len() > retain {
            let _ = self.messages.pop_front();
        }
    }

    /// Report a diagnostic. Returns `false` if it was filtered out.
    pub fn report(&mut self, severity: DebugSeverity, text: impl Into<String>) -> bool {
        if severity < self.level {
            return false;
        }
        let text = text.into();
        match severity {
            DebugSeverity::Notification => log::info!("GPU: {text}"),
            DebugSeverity::Low | DebugSeverity::Medium => {
                log::warn!("GPU ({severity}): {text}");
            }
            DebugSeverity::High => log::error!("GPU: {text}"),
        }
        if self.retain > 0 {
            if self.messages.len() == self.retain {
                let _ = self.messages.pop_front();
            }
            self.messages.push_back(DebugMessage { severity, text });
        }
        true
    }

    /// Retained messages, oldest first.
    pub fn messages(&self) -> impl Iterator<Item = &DebugMessage> {
        self.messages.iter()
    }

    /// Number of retained messages at or above `severity`.
    #[must_use]
    pub fn count_at_least(&self, severity: DebugSeverity) -> usize {
        self.messages
            .iter()
            .filter(|m| m.severity >= severity)
            .count()
    }

    /// Drain the retained history.
    pub fn take_messages(&mut self) -> Vec<DebugMessage> {
        self.messages.drain(..).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn messages_below_level_are_dropped() {
        let mut out = DebugOutput::new(DebugSeverity::Medium, 8);
        assert!(!out.report(DebugSeverity::Low, "noise"));
        assert!(out.report(DebugSeverity::High, "bad"));
        assert_eq!(out.messages().count(), 1);
        assert_eq!(out.count_at_least(DebugSeverity::High), 1);
    }

    #[test]
    fn history_is_bounded() {
        let mut out = DebugOutput::new(DebugSeverity::Notification, 2);
        for i in 0..5 {
            let _ = out.report(DebugSeverity::Low, format!("msg {i}"));
        }
        let texts: Vec<_> =
            out.take_messages().into_iter().map(|m| m.text).collect();
        assert_eq!(texts, vec!["msg 3".to_owned(), "msg 4".to_owned()]);
        assert_eq!(out.messages().count(), 0);
    }

    #[test]
    fn severity_round_trips_through_toml_names() {
        #[derive(Serialize, Deserialize)]
        struct Wrapper {
            level: DebugSeverity,
        }
        let parsed: Wrapper = toml::from_str("level = \"medium\"").unwrap();
        assert_eq!(parsed.level, DebugSeverity::Medium);
    }
}
