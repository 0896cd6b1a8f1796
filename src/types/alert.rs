//! Alert lifecycle state definitions

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::types::Tier;

/// The six phases of a per-entry crisis alert
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AlertPhase {
    /// Nothing detected, initial state for every entry
    Clear,
    /// Signal detected, waiting for the presenter to show the banner
    Flagged,
    /// Banner is on screen
    BannerShown,
    /// Crisis modal is on screen
    ModalOpen,
    /// User took a terminal action, cooldown running
    Resolved,
    /// Re-detection swallowed by cooldown
    Suppressed,
}

impl AlertPhase {
    /// Get ANSI color code for terminal display
    pub fn color_code(&self) -> &'static str {
        match self {
            AlertPhase::Clear => "\x1b[32m",       // Green
            AlertPhase::Flagged => "\x1b[33m",     // Yellow
            AlertPhase::BannerShown => "\x1b[33m", // Yellow
            AlertPhase::ModalOpen => "\x1b[31m",   // Red
            AlertPhase::Resolved => "\x1b[36m",    // Cyan
            AlertPhase::Suppressed => "\x1b[90m",  // Gray
        }
    }

    /// Reset ANSI color
    pub fn color_reset() -> &'static str {
        "\x1b[0m"
    }

    pub fn emoji(&self) -> &'static str {
        match self {
            AlertPhase::Clear => "🟢",
            AlertPhase::Flagged => "🚩",
            AlertPhase::BannerShown => "🟡",
            AlertPhase::ModalOpen => "🔴",
            AlertPhase::Resolved => "🤝",
            AlertPhase::Suppressed => "💤",
        }
    }

    /// Is an interruption currently on screen or pending?
    pub fn is_interrupting(&self) -> bool {
        matches!(self, AlertPhase::Flagged | AlertPhase::BannerShown | AlertPhase::ModalOpen)
    }
}

impl fmt::Display for AlertPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            AlertPhase::Clear => "CLEAR",
            AlertPhase::Flagged => "FLAGGED",
            AlertPhase::BannerShown => "BANNER_SHOWN",
            AlertPhase::ModalOpen => "MODAL_OPEN",
            AlertPhase::Resolved => "RESOLVED",
            AlertPhase::Suppressed => "SUPPRESSED",
        };
        write!(f, "{}", name)
    }
}

/// Terminal action that resolved an alert
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResolvedAction {
    AccessSupport,
    CallForHelp,
    Dismiss,
    Close,
}

impl fmt::Display for ResolvedAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ResolvedAction::AccessSupport => "access_support",
            ResolvedAction::CallForHelp => "call_for_help",
            ResolvedAction::Dismiss => "dismiss",
            ResolvedAction::Close => "close",
        };
        f.write_str(name)
    }
}

/// Feature that produced the text being assessed
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum TriggerSource {
    Journal,
    Voice,
    Chat,
    Other(String),
}

impl From<String> for TriggerSource {
    fn from(s: String) -> Self {
        match s.trim().to_ascii_lowercase().as_str() {
            "journal" => TriggerSource::Journal,
            "voice" => TriggerSource::Voice,
            "chat" => TriggerSource::Chat,
            _ => TriggerSource::Other(s),
        }
    }
}

impl From<&str> for TriggerSource {
    fn from(s: &str) -> Self {
        TriggerSource::from(s.to_string())
    }
}

impl From<TriggerSource> for String {
    fn from(source: TriggerSource) -> String {
        source.to_string()
    }
}

impl fmt::Display for TriggerSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TriggerSource::Journal => f.write_str("journal"),
            TriggerSource::Voice => f.write_str("voice"),
            TriggerSource::Chat => f.write_str("chat"),
            TriggerSource::Other(s) => f.write_str(s),
        }
    }
}

/// Live alert state for one journal entry.
///
/// Only the escalation state machine mutates this; presenters get clones.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AlertState {
    pub entry_id: String,
    pub state: AlertPhase,
    pub trigger_source: TriggerSource,
    pub last_severity: Option<Tier>,
    pub acknowledged_at: Option<DateTime<Utc>>,
    pub resolved_action: Option<ResolvedAction>,
    pub last_transition_at: DateTime<Utc>,
    pub cooldown_until: Option<DateTime<Utc>>,
    /// Highest revision applied so far
    pub last_revision_seq: Option<u64>,
    /// Soft "couldn't check this entry" indicator
    pub assessment_unavailable: bool,
}

impl AlertState {
    /// Fresh state for a new entry
    pub fn new(entry_id: impl Into<String>, trigger_source: TriggerSource, now: DateTime<Utc>) -> Self {
        Self {
            entry_id: entry_id.into(),
            state: AlertPhase::Clear,
            trigger_source,
            last_severity: None,
            acknowledged_at: None,
            resolved_action: None,
            last_transition_at: now,
            cooldown_until: None,
            last_revision_seq: None,
            assessment_unavailable: false,
        }
    }

    /// Is the cooldown still running at `now`?
    pub fn in_cooldown(&self, now: DateTime<Utc>) -> bool {
        self.cooldown_until.map(|until| now < until).unwrap_or(false)
    }
}
