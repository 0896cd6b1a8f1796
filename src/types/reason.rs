//! Reason codes for escalation decisions and state changes
//! Every transition and every rejected event carries one

use serde::{Deserialize, Serialize};

/// Reason codes for all state changes and decisions
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[allow(non_camel_case_types)]
pub enum ReasonCode {
    // =========================================================================
    // R1xx: Assessment intake
    // =========================================================================
    /// Assessment older than the last applied revision
    R101_STALE_ASSESSMENT,
    /// Scanner could not check the text
    R102_ASSESSMENT_UNAVAILABLE,
    /// Checked, nothing active found
    R103_NO_SIGNAL,
    /// Severity not higher than what is already flagged
    R104_SEVERITY_UNCHANGED,

    // =========================================================================
    // R2xx: Escalation
    // =========================================================================
    /// Clear → Flagged
    R201_SIGNAL_DETECTED,
    /// Flagged → BannerShown
    R202_BANNER_PRESENTED,
    /// Worse signal while an alert is already pending or open
    R203_SEVERITY_RAISED,
    /// BannerShown → ModalOpen by the user
    R204_MODAL_OPENED,
    /// BannerShown → ModalOpen on a worsening signal
    R205_AUTO_ESCALATED,
    /// Resolved/Suppressed → Flagged on strictly higher severity
    R206_REESCALATED,
    /// Resolved/Suppressed → Flagged after cooldown expired
    R207_COOLDOWN_EXPIRED,

    // =========================================================================
    // R3xx: Resolution
    // =========================================================================
    R301_RESOLVED_ACCESS_SUPPORT,
    R302_RESOLVED_CALL_FOR_HELP,
    R303_RESOLVED_DISMISS,
    R304_RESOLVED_CLOSE,
    /// Acknowledge recorded in ModalOpen
    R305_ACKNOWLEDGED,

    // =========================================================================
    // R4xx: Gating
    // =========================================================================
    /// Equal-or-lower re-detection inside cooldown
    R401_COOLDOWN_SUPPRESSED,
    /// Dismiss without prior acknowledge
    R402_ACKNOWLEDGE_REQUIRED,
    /// Event not defined for the current state
    R403_ILLEGAL_TRANSITION,

    // =========================================================================
    // R5xx: Entry lifecycle
    // =========================================================================
    R501_ENTRY_OPENED,
    R502_ENTRY_ARCHIVED,
}

impl ReasonCode {
    /// Get the code string (for logging)
    pub fn code(&self) -> &'static str {
        match self {
            Self::R101_STALE_ASSESSMENT => "R101_STALE_ASSESSMENT",
            Self::R102_ASSESSMENT_UNAVAILABLE => "R102_ASSESSMENT_UNAVAILABLE",
            Self::R103_NO_SIGNAL => "R103_NO_SIGNAL",
            Self::R104_SEVERITY_UNCHANGED => "R104_SEVERITY_UNCHANGED",
            Self::R201_SIGNAL_DETECTED => "R201_SIGNAL_DETECTED",
            Self::R202_BANNER_PRESENTED => "R202_BANNER_PRESENTED",
            Self::R203_SEVERITY_RAISED => "R203_SEVERITY_RAISED",
            Self::R204_MODAL_OPENED => "R204_MODAL_OPENED",
            Self::R205_AUTO_ESCALATED => "R205_AUTO_ESCALATED",
            Self::R206_REESCALATED => "R206_REESCALATED",
            Self::R207_COOLDOWN_EXPIRED => "R207_COOLDOWN_EXPIRED",
            Self::R301_RESOLVED_ACCESS_SUPPORT => "R301_RESOLVED_ACCESS_SUPPORT",
            Self::R302_RESOLVED_CALL_FOR_HELP => "R302_RESOLVED_CALL_FOR_HELP",
            Self::R303_RESOLVED_DISMISS => "R303_RESOLVED_DISMISS",
            Self::R304_RESOLVED_CLOSE => "R304_RESOLVED_CLOSE",
            Self::R305_ACKNOWLEDGED => "R305_ACKNOWLEDGED",
            Self::R401_COOLDOWN_SUPPRESSED => "R401_COOLDOWN_SUPPRESSED",
            Self::R402_ACKNOWLEDGE_REQUIRED => "R402_ACKNOWLEDGE_REQUIRED",
            Self::R403_ILLEGAL_TRANSITION => "R403_ILLEGAL_TRANSITION",
            Self::R501_ENTRY_OPENED => "R501_ENTRY_OPENED",
            Self::R502_ENTRY_ARCHIVED => "R502_ENTRY_ARCHIVED",
        }
    }

    /// Get human-readable description
    pub fn description(&self) -> &'static str {
        match self {
            Self::R101_STALE_ASSESSMENT => "Stale assessment discarded",
            Self::R102_ASSESSMENT_UNAVAILABLE => "Couldn't check this entry",
            Self::R103_NO_SIGNAL => "No crisis signal",
            Self::R104_SEVERITY_UNCHANGED => "Severity unchanged",
            Self::R201_SIGNAL_DETECTED => "Crisis signal detected",
            Self::R202_BANNER_PRESENTED => "Banner shown",
            Self::R203_SEVERITY_RAISED => "Severity raised",
            Self::R204_MODAL_OPENED => "Modal opened by user",
            Self::R205_AUTO_ESCALATED => "Worsening signal, modal opened",
            Self::R206_REESCALATED => "Higher severity, re-escalating",
            Self::R207_COOLDOWN_EXPIRED => "Cooldown expired, re-flagging",
            Self::R301_RESOLVED_ACCESS_SUPPORT => "User accessed support",
            Self::R302_RESOLVED_CALL_FOR_HELP => "User called for help",
            Self::R303_RESOLVED_DISMISS => "User dismissed alert",
            Self::R304_RESOLVED_CLOSE => "User closed alert",
            Self::R305_ACKNOWLEDGED => "User acknowledged alert",
            Self::R401_COOLDOWN_SUPPRESSED => "Suppressed during cooldown",
            Self::R402_ACKNOWLEDGE_REQUIRED => "Dismiss needs acknowledge first",
            Self::R403_ILLEGAL_TRANSITION => "Event ignored in this state",
            Self::R501_ENTRY_OPENED => "Entry opened",
            Self::R502_ENTRY_ARCHIVED => "Entry archived",
        }
    }

    /// Was the event rejected rather than applied?
    pub fn is_rejection(&self) -> bool {
        matches!(
            self,
            Self::R101_STALE_ASSESSMENT | Self::R402_ACKNOWLEDGE_REQUIRED | Self::R403_ILLEGAL_TRANSITION
        )
    }
}

impl std::fmt::Display for ReasonCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.code(), self.description())
    }
}
