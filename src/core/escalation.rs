//! Escalation state machine: one per journal entry
//!
//! State transitions:
//! - CLEAR → FLAGGED: fresh assessment with severity
//! - FLAGGED → BANNER_SHOWN: presenter shows the banner
//! - BANNER_SHOWN → MODAL_OPEN: user opens it, or severity worsens
//! - BANNER_SHOWN | MODAL_OPEN → RESOLVED: terminal user action
//! - RESOLVED → SUPPRESSED: equal-or-lower re-detection inside cooldown
//! - RESOLVED | SUPPRESSED → FLAGGED: higher severity, or cooldown expired
//!
//! Events with no row for the current state are no-ops: logged, state kept.
//! Time is passed in so transitions stay a pure function of their inputs.

use chrono::{DateTime, Duration, Utc};
use tracing::{debug, info, warn};

use crate::types::{
    AlertEvent, AlertPhase, AlertState, AuditRecord, CrisisAssessment, ReasonCode, ResolvedAction,
    Tier, TransitionOutput, TriggerSource, UserIntent,
};
use crate::{DEFAULT_COOLDOWN_MS, DEFAULT_REQUIRE_ACKNOWLEDGE};

/// Knobs of the escalation flow
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EscalationPolicy {
    /// How long a resolved alert swallows equal-or-lower re-detections
    pub cooldown: Duration,
    /// Dismiss from the modal needs a prior acknowledge
    pub require_acknowledge: bool,
}

impl Default for EscalationPolicy {
    fn default() -> Self {
        Self {
            cooldown: Duration::milliseconds(DEFAULT_COOLDOWN_MS as i64),
            require_acknowledge: DEFAULT_REQUIRE_ACKNOWLEDGE,
        }
    }
}

/// Owns one entry's AlertState; the only place it mutates
#[derive(Debug, Clone)]
pub struct EscalationStateMachine {
    state: AlertState,
    policy: EscalationPolicy,
}

impl EscalationStateMachine {
    /// Create machine in CLEAR
    pub fn new(
        entry_id: impl Into<String>,
        trigger_source: TriggerSource,
        policy: EscalationPolicy,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            state: AlertState::new(entry_id, trigger_source, now),
            policy,
        }
    }

    /// Current state (read-only)
    pub fn state(&self) -> &AlertState {
        &self.state
    }

    pub fn phase(&self) -> AlertPhase {
        self.state.state
    }

    pub fn policy(&self) -> &EscalationPolicy {
        &self.policy
    }

    /// Apply one event
    pub fn handle(&mut self, event: AlertEvent, now: DateTime<Utc>) -> TransitionOutput {
        let event_name = event.name();
        let output = match event {
            AlertEvent::Assessment(assessment) => self.on_assessment(&assessment, now),
            AlertEvent::Presented => self.on_presented(now),
            AlertEvent::Intent(intent) => self.on_intent(intent, now),
        };

        if output.reason == ReasonCode::R403_ILLEGAL_TRANSITION
            || output.reason == ReasonCode::R402_ACKNOWLEDGE_REQUIRED
        {
            warn!(
                entry_id = %self.state.entry_id,
                state = %output.from,
                event = event_name,
                reason = output.reason.code(),
                "event rejected, state unchanged"
            );
        } else if output.is_transition() {
            info!(
                entry_id = %self.state.entry_id,
                from = %output.from,
                to = %output.to,
                severity = ?self.state.last_severity,
                reason = output.reason.code(),
                "alert transition"
            );
        } else {
            debug!(
                entry_id = %self.state.entry_id,
                state = %output.to,
                event = event_name,
                reason = output.reason.code(),
                "alert state maintained"
            );
        }

        output
    }

    /// Convenience wrappers
    pub fn apply_assessment(&mut self, assessment: CrisisAssessment, now: DateTime<Utc>) -> TransitionOutput {
        self.handle(AlertEvent::Assessment(assessment), now)
    }

    pub fn present(&mut self, now: DateTime<Utc>) -> TransitionOutput {
        self.handle(AlertEvent::Presented, now)
    }

    pub fn intent(&mut self, intent: UserIntent, now: DateTime<Utc>) -> TransitionOutput {
        self.handle(AlertEvent::Intent(intent), now)
    }

    // =========================================================================
    // ASSESSMENTS
    // =========================================================================

    fn on_assessment(&mut self, assessment: &CrisisAssessment, now: DateTime<Utc>) -> TransitionOutput {
        let phase = self.state.state;

        if let Some(last) = self.state.last_revision_seq {
            if assessment.revision_seq < last {
                debug!(
                    entry_id = %self.state.entry_id,
                    revision_seq = assessment.revision_seq,
                    last_applied = last,
                    "stale assessment discarded"
                );
                return self.unchanged(ReasonCode::R101_STALE_ASSESSMENT);
            }
        }
        let before = self.state.clone();
        self.state.last_revision_seq = Some(assessment.revision_seq);

        if assessment.is_unavailable() {
            self.state.assessment_unavailable = true;
            return self.maintained(&before, ReasonCode::R102_ASSESSMENT_UNAVAILABLE);
        }
        self.state.assessment_unavailable = false;

        let severity = assessment.severity;
        let revision = Some(assessment.revision_seq);
        if severity.is_none() {
            return self.maintained(&before, ReasonCode::R103_NO_SIGNAL);
        }
        let worse = severity > self.state.last_severity;

        match phase {
            AlertPhase::Clear => {
                self.flag(severity, now);
                self.moved(phase, ReasonCode::R201_SIGNAL_DETECTED, revision)
            }
            AlertPhase::Flagged | AlertPhase::ModalOpen if worse => {
                self.state.last_severity = severity;
                self.state.last_transition_at = now;
                self.moved(phase, ReasonCode::R203_SEVERITY_RAISED, revision)
            }
            AlertPhase::BannerShown if worse => {
                self.state.last_severity = severity;
                self.enter(AlertPhase::ModalOpen, now);
                self.moved(phase, ReasonCode::R205_AUTO_ESCALATED, revision)
            }
            AlertPhase::Flagged | AlertPhase::BannerShown | AlertPhase::ModalOpen => {
                self.maintained(&before, ReasonCode::R104_SEVERITY_UNCHANGED)
            }
            AlertPhase::Resolved | AlertPhase::Suppressed if worse => {
                self.flag(severity, now);
                self.moved(phase, ReasonCode::R206_REESCALATED, revision)
            }
            AlertPhase::Resolved | AlertPhase::Suppressed if !self.state.in_cooldown(now) => {
                self.flag(severity, now);
                self.moved(phase, ReasonCode::R207_COOLDOWN_EXPIRED, revision)
            }
            AlertPhase::Resolved => {
                // Audited, but presenters render SUPPRESSED as no interruption
                self.enter(AlertPhase::Suppressed, now);
                self.moved(phase, ReasonCode::R401_COOLDOWN_SUPPRESSED, revision)
            }
            AlertPhase::Suppressed => self.maintained(&before, ReasonCode::R401_COOLDOWN_SUPPRESSED),
        }
    }

    // =========================================================================
    // PRESENTER + USER INTENTS
    // =========================================================================

    fn on_presented(&mut self, now: DateTime<Utc>) -> TransitionOutput {
        let phase = self.state.state;
        match phase {
            AlertPhase::Flagged => {
                self.enter(AlertPhase::BannerShown, now);
                self.moved(phase, ReasonCode::R202_BANNER_PRESENTED, None)
            }
            _ => self.unchanged(ReasonCode::R403_ILLEGAL_TRANSITION),
        }
    }

    fn on_intent(&mut self, intent: UserIntent, now: DateTime<Utc>) -> TransitionOutput {
        let phase = self.state.state;
        match (phase, intent) {
            (AlertPhase::BannerShown | AlertPhase::ModalOpen, UserIntent::AccessSupport) => {
                self.resolve(ResolvedAction::AccessSupport, now)
            }
            (AlertPhase::BannerShown | AlertPhase::ModalOpen, UserIntent::CallForHelp) => {
                self.resolve(ResolvedAction::CallForHelp, now)
            }
            (AlertPhase::BannerShown, UserIntent::OpenModal) => {
                self.enter(AlertPhase::ModalOpen, now);
                self.moved(phase, ReasonCode::R204_MODAL_OPENED, None)
            }
            (AlertPhase::ModalOpen, UserIntent::Acknowledge) if self.state.acknowledged_at.is_none() => {
                self.state.acknowledged_at = Some(now);
                self.state.last_transition_at = now;
                self.moved(phase, ReasonCode::R305_ACKNOWLEDGED, None)
            }
            (AlertPhase::ModalOpen, UserIntent::Dismiss) => {
                if self.policy.require_acknowledge && self.state.acknowledged_at.is_none() {
                    self.unchanged(ReasonCode::R402_ACKNOWLEDGE_REQUIRED)
                } else {
                    self.resolve(ResolvedAction::Dismiss, now)
                }
            }
            (AlertPhase::ModalOpen, UserIntent::Close) => self.resolve(ResolvedAction::Close, now),
            _ => self.unchanged(ReasonCode::R403_ILLEGAL_TRANSITION),
        }
    }

    // =========================================================================
    // HELPERS
    // =========================================================================

    fn flag(&mut self, severity: Option<Tier>, now: DateTime<Utc>) {
        self.state.last_severity = severity;
        self.state.acknowledged_at = None;
        self.state.resolved_action = None;
        self.state.cooldown_until = None;
        self.enter(AlertPhase::Flagged, now);
    }

    fn resolve(&mut self, action: ResolvedAction, now: DateTime<Utc>) -> TransitionOutput {
        let from = self.state.state;
        self.state.resolved_action = Some(action);
        let until = now.checked_add_signed(self.policy.cooldown).unwrap_or_else(|| {
            warn!(entry_id = %self.state.entry_id, "cooldown end out of range, clamped");
            DateTime::<Utc>::MAX_UTC
        });
        self.state.cooldown_until = Some(until);
        self.enter(AlertPhase::Resolved, now);
        let reason = match action {
            ResolvedAction::AccessSupport => ReasonCode::R301_RESOLVED_ACCESS_SUPPORT,
            ResolvedAction::CallForHelp => ReasonCode::R302_RESOLVED_CALL_FOR_HELP,
            ResolvedAction::Dismiss => ReasonCode::R303_RESOLVED_DISMISS,
            ResolvedAction::Close => ReasonCode::R304_RESOLVED_CLOSE,
        };
        self.moved(from, reason, None)
    }

    fn enter(&mut self, phase: AlertPhase, now: DateTime<Utc>) {
        self.state.state = phase;
        self.state.last_transition_at = now;
    }

    /// Applied step: audited, presenter notified
    fn moved(&self, from: AlertPhase, reason: ReasonCode, revision_seq: Option<u64>) -> TransitionOutput {
        TransitionOutput {
            from,
            to: self.state.state,
            reason,
            changed: true,
            state: self.state.clone(),
            audit: Some(AuditRecord::transition(from, &self.state, reason, revision_seq)),
        }
    }

    /// Phase kept; bookkeeping fields may still have moved
    fn maintained(&self, before: &AlertState, reason: ReasonCode) -> TransitionOutput {
        TransitionOutput {
            from: self.state.state,
            to: self.state.state,
            reason,
            changed: before.assessment_unavailable != self.state.assessment_unavailable,
            state: self.state.clone(),
            audit: None,
        }
    }

    /// Rejected or discarded: nothing touched
    fn unchanged(&self, reason: ReasonCode) -> TransitionOutput {
        TransitionOutput {
            from: self.state.state,
            to: self.state.state,
            reason,
            changed: false,
            state: self.state.clone(),
            audit: None,
        }
    }
}

// =============================================================================
// TESTS
// =============================================================================
