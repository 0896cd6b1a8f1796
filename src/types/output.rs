//! Output of one state machine step

use serde::Serialize;

use crate::types::{AlertPhase, AlertState, AuditRecord, ReasonCode};

/// What happened when an event hit the state machine
#[derive(Debug, Clone, Serialize)]
pub struct TransitionOutput {
    pub from: AlertPhase,
    pub to: AlertPhase,
    pub reason: ReasonCode,
    /// AlertState differs from before; presenter should be told
    pub changed: bool,
    /// Snapshot after the step
    pub state: AlertState,
    /// Row for the AuditSink, if the step is auditable
    #[serde(skip_serializing_if = "Option::is_none")]
    pub audit: Option<AuditRecord>,
}

impl TransitionOutput {
    /// Did the phase move?
    pub fn is_transition(&self) -> bool {
        self.from != self.to
    }

    /// Event ignored: nothing changed, nothing audited
    pub fn is_noop(&self) -> bool {
        !self.changed && self.audit.is_none()
    }

    /// Format for terminal display (with colors)
    pub fn to_terminal_string(&self) -> String {
        let color = self.to.color_code();
        let reset = AlertPhase::color_reset();
        format!(
            "{}{} {} → {} | severity={} | {}{}",
            color,
            self.to.emoji(),
            self.from,
            self.to,
            severity_label(&self.state),
            self.reason.code(),
            reset
        )
    }

    /// Format for parseable output (no colors)
    pub fn to_parseable_string(&self) -> String {
        format!(
            "entry={} | from={} | to={} | severity={} | reason={}",
            self.state.entry_id,
            self.from,
            self.to,
            severity_label(&self.state),
            self.reason.code()
        )
    }
}

fn severity_label(state: &AlertState) -> String {
    state
        .last_severity
        .map(|t| t.to_string())
        .unwrap_or_else(|| "-".to_string())
}
