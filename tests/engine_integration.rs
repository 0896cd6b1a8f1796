//! Integration tests for CrisisEngine
//!
//! Tests the end-to-end escalation contract:
//! - Bursts of revisions collapse into one scan of the latest text
//! - The presenter sees every state change, in order
//! - Every transition lands in the audit sink
//! - Acknowledge gating, cooldown suppression and re-escalation
//! - Stale assessments never override newer ones
//! - An unavailable scanner is surfaced, never treated as clear

use chrono::Utc;
use crisiswatch::core::{
    AlertPresenter, AuditSink, CrisisEngine, EngineConfig, MemoryAuditSink, SignalScanner,
};
use crisiswatch::types::{
    AlertPhase, AlertState, CrisisAssessment, CrisisCategory, CrisisSignal, ReasonCode, ResolvedAction, Tier,
    TriggerSource, UserIntent,
};
use pretty_assertions::assert_eq;
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Records every notification
#[derive(Default)]
struct RecordingPresenter {
    seen: Mutex<Vec<AlertState>>,
}

impl RecordingPresenter {
    fn phases(&self) -> Vec<AlertPhase> {
        self.seen.lock().unwrap().iter().map(|s| s.state).collect()
    }

    fn count(&self) -> usize {
        self.seen.lock().unwrap().len()
    }
}

impl AlertPresenter for RecordingPresenter {
    fn on_alert_state_changed(&self, _entry_id: &str, state: &AlertState) {
        self.seen.lock().unwrap().push(state.clone());
    }
}

struct Harness {
    engine: Arc<CrisisEngine>,
    presenter: Arc<RecordingPresenter>,
    audit: Arc<MemoryAuditSink>,
}

impl Harness {
    fn with_scanner(scanner: SignalScanner) -> Self {
        let presenter = Arc::new(RecordingPresenter::default());
        let audit = Arc::new(MemoryAuditSink::new());
        let engine = CrisisEngine::start(EngineConfig::default(), scanner, presenter.clone(), audit.clone());
        Self { engine, presenter, audit }
    }

    fn new() -> Self {
        Self::with_scanner(SignalScanner::bundled())
    }

    /// Submit a revision and let the debounce window and scan run
    async fn write(&self, entry_id: &str, text: &str, seq: u64) {
        self.engine.on_text_revision(entry_id, text, seq).await.unwrap();
        settle().await;
    }

    async fn phase(&self, entry_id: &str) -> AlertPhase {
        self.engine.alert_state(entry_id).await.unwrap().state
    }

    fn audit_reasons(&self, entry_id: &str) -> Vec<ReasonCode> {
        self.audit
            .records_for(entry_id)
            .unwrap_or_default()
            .into_iter()
            .filter_map(|r| r.reason)
            .collect()
    }
}

/// Long enough for any pending debounce timer and scan task under paused time
async fn settle() {
    tokio::time::sleep(Duration::from_secs(1)).await;
}

fn assessment(entry_id: &str, seq: u64, tier: Tier) -> CrisisAssessment {
    let signal = CrisisSignal {
        category: CrisisCategory::SelfHarm,
        matched_phrase: "hurt myself".to_string(),
        span: (0, 11),
        tier,
        suppressed: false,
        negated_by: None,
    };
    CrisisAssessment::assessed(entry_id, seq, vec![signal], "crisis-lexicon-v1", "test")
}

// =============================================================================
// DEBOUNCE THROUGH THE ENGINE
// =============================================================================

#[tokio::test(start_paused = true)]
async fn test_typing_burst_scans_once_with_last_text() {
    let h = Harness::new();
    h.engine.open_entry("e1", TriggerSource::Journal, None).await;

    let burst = ["I", "I want", "I want to", "I want to d", "I want to die"];
    for (i, text) in burst.iter().enumerate() {
        h.engine.on_text_revision("e1", *text, i as u64 + 1).await.unwrap();
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
    settle().await;

    assert_eq!(h.engine.scan_count(), 1);
    let state = h.engine.alert_state("e1").await.unwrap();
    assert_eq!(state.state, AlertPhase::Flagged);
    assert_eq!(state.last_revision_seq, Some(5));
    assert_eq!(state.last_severity, Some(Tier::Acute));
}

#[tokio::test(start_paused = true)]
async fn test_entries_are_debounced_independently() {
    let h = Harness::new();
    h.engine.open_entry("a", TriggerSource::Journal, None).await;
    h.engine.open_entry("b", TriggerSource::Chat, None).await;

    h.engine.on_text_revision("a", "I feel hopeless", 1).await.unwrap();
    h.engine.on_text_revision("b", "lovely day", 1).await.unwrap();
    settle().await;

    assert_eq!(h.engine.scan_count(), 2);
    assert_eq!(h.phase("a").await, AlertPhase::Flagged);
    assert_eq!(h.phase("b").await, AlertPhase::Clear);
}

#[tokio::test(start_paused = true)]
async fn test_flush_skips_the_window() {
    let h = Harness::new();
    h.engine.open_entry("e1", TriggerSource::Journal, None).await;
    h.engine.on_text_revision("e1", "I want to die", 1).await.unwrap();

    assert!(h.engine.flush("e1"));
    tokio::time::sleep(Duration::from_millis(10)).await;

    assert_eq!(h.phase("e1").await, AlertPhase::Flagged);
}

// =============================================================================
// FULL ESCALATION FLOW
// =============================================================================

#[tokio::test(start_paused = true)]
async fn test_full_flow_with_acknowledge_cooldown_and_reescalation() {
    let h = Harness::new();
    h.engine.open_entry("e1", TriggerSource::Journal, None).await;

    // Tier 2 signal flags the entry
    h.write("e1", "Some days I want to hurt myself", 1).await;
    assert_eq!(h.phase("e1").await, AlertPhase::Flagged);

    h.engine.on_presented("e1").await.unwrap();
    h.engine.on_intent("e1", UserIntent::OpenModal).await.unwrap();
    assert_eq!(h.phase("e1").await, AlertPhase::ModalOpen);

    // Dismiss needs acknowledge first
    let rejected = h.engine.on_intent("e1", UserIntent::Dismiss).await.unwrap();
    assert_eq!(rejected.reason, ReasonCode::R402_ACKNOWLEDGE_REQUIRED);
    assert_eq!(h.phase("e1").await, AlertPhase::ModalOpen);

    h.engine.on_intent("e1", UserIntent::Acknowledge).await.unwrap();
    let resolved = h.engine.on_intent("e1", UserIntent::Dismiss).await.unwrap();
    assert_eq!(resolved.to, AlertPhase::Resolved);
    assert_eq!(resolved.state.resolved_action, Some(ResolvedAction::Dismiss));

    // A second terminal action is refused
    let again = h.engine.on_intent("e1", UserIntent::AccessSupport).await.unwrap();
    assert_eq!(again.reason, ReasonCode::R403_ILLEGAL_TRANSITION);
    assert_eq!(again.state.resolved_action, Some(ResolvedAction::Dismiss));

    // Same severity inside the cooldown is swallowed
    h.write("e1", "Some days I want to hurt myself. Still.", 2).await;
    assert_eq!(h.phase("e1").await, AlertPhase::Suppressed);

    // Higher severity cuts through the cooldown
    h.write("e1", "Some days I want to hurt myself. Still. I want to die.", 3).await;
    let state = h.engine.alert_state("e1").await.unwrap();
    assert_eq!(state.state, AlertPhase::Flagged);
    assert_eq!(state.last_severity, Some(Tier::Acute));
    assert_eq!(state.acknowledged_at, None);
    assert_eq!(state.resolved_action, None);

    assert_eq!(
        h.presenter.phases(),
        vec![
            AlertPhase::Flagged,
            AlertPhase::BannerShown,
            AlertPhase::ModalOpen,
            AlertPhase::ModalOpen, // acknowledged
            AlertPhase::Resolved,
            AlertPhase::Suppressed,
            AlertPhase::Flagged,
        ]
    );
    assert_eq!(
        h.audit_reasons("e1"),
        vec![
            ReasonCode::R501_ENTRY_OPENED,
            ReasonCode::R201_SIGNAL_DETECTED,
            ReasonCode::R202_BANNER_PRESENTED,
            ReasonCode::R204_MODAL_OPENED,
            ReasonCode::R305_ACKNOWLEDGED,
            ReasonCode::R303_RESOLVED_DISMISS,
            ReasonCode::R401_COOLDOWN_SUPPRESSED,
            ReasonCode::R206_REESCALATED,
        ]
    );
}

#[tokio::test(start_paused = true)]
async fn test_entry_level_acknowledge_override() {
    let h = Harness::new();
    h.engine.open_entry("e1", TriggerSource::Voice, Some(false)).await;
    h.write("e1", "I feel worthless", 1).await;
    h.engine.on_presented("e1").await.unwrap();
    h.engine.on_intent("e1", UserIntent::OpenModal).await.unwrap();

    let out = h.engine.on_intent("e1", UserIntent::Dismiss).await.unwrap();
    assert_eq!(out.to, AlertPhase::Resolved);
}

#[tokio::test(start_paused = true)]
async fn test_negated_text_never_interrupts() {
    let h = Harness::new();
    h.engine.open_entry("e1", TriggerSource::Journal, None).await;
    h.write("e1", "I would never hurt myself, I'm doing much better", 1).await;

    assert_eq!(h.phase("e1").await, AlertPhase::Clear);
    assert_eq!(h.presenter.count(), 0);
}

// =============================================================================
// ORDERING + FAILURE MODES
// =============================================================================

#[tokio::test]
async fn test_stale_assessment_cannot_override_newer() {
    let h = Harness::new();
    h.engine.open_entry("e1", TriggerSource::Journal, None).await;

    h.engine.apply_assessment(assessment("e1", 5, Tier::Elevated)).await.unwrap();
    let stale = h.engine.apply_assessment(assessment("e1", 3, Tier::Acute)).await.unwrap();

    assert_eq!(stale.reason, ReasonCode::R101_STALE_ASSESSMENT);
    assert!(stale.is_noop());
    let state = h.engine.alert_state("e1").await.unwrap();
    assert_eq!(state.last_revision_seq, Some(5));
    assert_eq!(state.last_severity, Some(Tier::Elevated));
}

#[tokio::test]
async fn test_intent_and_assessment_are_serialised_per_entry() {
    let h = Harness::new();
    h.engine.open_entry("e1", TriggerSource::Journal, None).await;
    h.engine.apply_assessment(assessment("e1", 1, Tier::Elevated)).await.unwrap();
    h.engine.on_presented("e1").await.unwrap();

    let engine = h.engine.clone();
    let intent = tokio::spawn(async move { engine.on_intent("e1", UserIntent::AccessSupport).await });
    let engine = h.engine.clone();
    let scan = tokio::spawn(async move { engine.apply_assessment(assessment("e1", 2, Tier::Elevated)).await });
    intent.await.unwrap().unwrap();
    scan.await.unwrap().unwrap();

    // Whichever ran first, the support choice survives
    let state = h.engine.alert_state("e1").await.unwrap();
    assert_eq!(state.resolved_action, Some(ResolvedAction::AccessSupport));
    assert!(matches!(state.state, AlertPhase::Resolved | AlertPhase::Suppressed));
}

#[tokio::test(start_paused = true)]
async fn test_unavailable_scanner_sets_indicator() {
    let h = Harness::with_scanner(SignalScanner::unavailable("lexicon missing"));
    h.engine.open_entry("e1", TriggerSource::Journal, None).await;
    h.write("e1", "I want to die", 1).await;

    let state = h.engine.alert_state("e1").await.unwrap();
    assert_eq!(state.state, AlertPhase::Clear);
    assert!(state.assessment_unavailable);
    // Indicator change is still pushed to the presenter
    assert_eq!(h.presenter.count(), 1);
}

#[tokio::test]
async fn test_closed_entry_is_archived() {
    let h = Harness::new();
    h.engine.open_entry("e1", TriggerSource::Journal, None).await;
    h.engine.apply_assessment(assessment("e1", 1, Tier::Low)).await.unwrap();

    let final_state = h.engine.close_entry("e1").await.unwrap();
    assert_eq!(final_state.state, AlertPhase::Flagged);
    assert!(h.engine.alert_state("e1").await.is_none());
    assert!(h.engine.close_entry("e1").await.is_err());

    let last = h.audit.records_for("e1").unwrap().pop().unwrap();
    assert_eq!(last.reason, Some(ReasonCode::R502_ENTRY_ARCHIVED));
    assert_eq!(last.archived_state.unwrap().state, AlertPhase::Flagged);
    assert!(last.timestamp <= Utc::now());
}

#[tokio::test(start_paused = true)]
async fn test_close_inside_debounce_window_still_scans_and_notifies() {
    let h = Harness::new();
    h.engine.open_entry("e1", TriggerSource::Journal, None).await;
    h.engine.on_text_revision("e1", "I want", 1).await.unwrap();
    h.engine.on_text_revision("e1", "I want to end my life", 2).await.unwrap();

    let final_state = h.engine.close_entry("e1").await.unwrap();
    assert_eq!(final_state.state, AlertPhase::Flagged);
    assert_eq!(final_state.last_revision_seq, Some(2));
    assert_eq!(h.presenter.phases(), vec![AlertPhase::Flagged]);

    settle().await;
    assert_eq!(h.engine.scan_count(), 1);
    assert_eq!(
        h.audit_reasons("e1"),
        vec![
            ReasonCode::R501_ENTRY_OPENED,
            ReasonCode::R201_SIGNAL_DETECTED,
            ReasonCode::R502_ENTRY_ARCHIVED,
        ]
    );
}
