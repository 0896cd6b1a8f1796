//! User intents and the events that drive the escalation state machine

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::types::{CrisisAssessment, ResolvedAction};

/// Intents the presenter forwards verbatim
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UserIntent {
    AccessSupport,
    CallForHelp,
    Dismiss,
    Close,
    Acknowledge,
    /// User tapped the banner to expand it
    OpenModal,
}

impl UserIntent {
    /// Map the app's button callbacks onto intents.
    ///
    /// `onCrisisSupport` → access_support, `onCallForHelp` → call_for_help, etc.
    pub fn from_ui_action(action: &str) -> Option<Self> {
        match action {
            "onCrisisSupport" => Some(UserIntent::AccessSupport),
            "onCallForHelp" => Some(UserIntent::CallForHelp),
            "onDismiss" => Some(UserIntent::Dismiss),
            "onClose" => Some(UserIntent::Close),
            "onAcknowledge" => Some(UserIntent::Acknowledge),
            "onOpenModal" => Some(UserIntent::OpenModal),
            _ => None,
        }
    }

    /// Terminal action this intent resolves to, if any
    pub fn resolved_action(&self) -> Option<ResolvedAction> {
        match self {
            UserIntent::AccessSupport => Some(ResolvedAction::AccessSupport),
            UserIntent::CallForHelp => Some(ResolvedAction::CallForHelp),
            UserIntent::Dismiss => Some(ResolvedAction::Dismiss),
            UserIntent::Close => Some(ResolvedAction::Close),
            UserIntent::Acknowledge | UserIntent::OpenModal => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            UserIntent::AccessSupport => "access_support",
            UserIntent::CallForHelp => "call_for_help",
            UserIntent::Dismiss => "dismiss",
            UserIntent::Close => "close",
            UserIntent::Acknowledge => "acknowledge",
            UserIntent::OpenModal => "open_modal",
        }
    }
}

impl fmt::Display for UserIntent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for UserIntent {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "access_support" | "support" => Ok(UserIntent::AccessSupport),
            "call_for_help" | "call" => Ok(UserIntent::CallForHelp),
            "dismiss" => Ok(UserIntent::Dismiss),
            "close" => Ok(UserIntent::Close),
            "acknowledge" | "ack" => Ok(UserIntent::Acknowledge),
            "open_modal" | "open" => Ok(UserIntent::OpenModal),
            other => Err(format!("unknown intent `{}`", other)),
        }
    }
}

/// Everything the state machine reacts to
#[derive(Debug, Clone)]
pub enum AlertEvent {
    /// A completed scan
    Assessment(CrisisAssessment),
    /// Presenter put the banner on screen
    Presented,
    Intent(UserIntent),
}

impl AlertEvent {
    /// Short name for logs
    pub fn name(&self) -> &'static str {
        match self {
            AlertEvent::Assessment(_) => "assessment",
            AlertEvent::Presented => "present",
            AlertEvent::Intent(intent) => intent.as_str(),
        }
    }
}
