//! CrisisEngine: wires scanner, debounce gate, state machines, presenter and
//! audit sink together
//!
//! Every event for an entry runs under that entry's lock, so intents and
//! assessments for one entry are applied strictly one at a time. Distinct
//! entries never wait on each other. Scans run on spawned tasks, never on the
//! caller of `on_text_revision`, and a fired revision stays recoverable from
//! the debounce gate until its scan has been applied.

use chrono::Utc;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use thiserror::Error;
use tokio::sync::{mpsc, Mutex, RwLock};
use tracing::{debug, info};

use crate::core::audit::{deliver, AuditSink};
use crate::core::config::EngineConfig;
use crate::core::debounce::DebounceGate;
use crate::core::escalation::EscalationStateMachine;
use crate::core::presenter::AlertPresenter;
use crate::core::scanner::SignalScanner;
use crate::types::{
    AlertEvent, AlertPhase, AlertState, AuditRecord, CrisisAssessment, JournalRevision, ReasonCode,
    TransitionOutput, TriggerSource, UserIntent,
};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EngineError {
    #[error("unknown entry: {0}")]
    UnknownEntry(String),
}

/// Emptied when the entry is archived, so a task still holding the handle
/// sees an unknown entry instead of writing after the archive row
type Machine = Arc<Mutex<Option<EscalationStateMachine>>>;

pub struct CrisisEngine {
    config: EngineConfig,
    scanner: Arc<SignalScanner>,
    entries: RwLock<HashMap<String, Machine>>,
    gate: DebounceGate,
    presenter: Arc<dyn AlertPresenter>,
    audit: Arc<dyn AuditSink>,
    scans: AtomicU64,
}

impl std::fmt::Debug for CrisisEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CrisisEngine")
            .field("config", &self.config)
            .field("scanner_available", &self.scanner.is_available())
            .field("scans", &self.scans.load(Ordering::Relaxed))
            .finish_non_exhaustive()
    }
}

impl CrisisEngine {
    /// Build the engine and spawn its scan loop. Must be called inside a
    /// tokio runtime.
    pub fn start(
        config: EngineConfig,
        scanner: SignalScanner,
        presenter: Arc<dyn AlertPresenter>,
        audit: Arc<dyn AuditSink>,
    ) -> Arc<Self> {
        let (gate, fired) = DebounceGate::new(config.debounce_window());
        let engine = Arc::new(Self {
            config,
            scanner: Arc::new(scanner),
            entries: RwLock::new(HashMap::new()),
            gate,
            presenter,
            audit,
            scans: AtomicU64::new(0),
        });
        tokio::spawn(drain(Arc::downgrade(&engine), fired));
        engine
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn scanner(&self) -> &SignalScanner {
        &self.scanner
    }

    /// Scans completed since start
    pub fn scan_count(&self) -> u64 {
        self.scans.load(Ordering::SeqCst)
    }

    pub async fn entry_count(&self) -> usize {
        self.entries.read().await.len()
    }

    // =========================================================================
    // ENTRY LIFECYCLE
    // =========================================================================

    /// Register an entry. Reopening an existing entry returns its state.
    pub async fn open_entry(
        &self,
        entry_id: &str,
        trigger_source: TriggerSource,
        require_acknowledge: Option<bool>,
    ) -> AlertState {
        let mut entries = self.entries.write().await;
        if let Some(existing) = entries.get(entry_id) {
            if let Some(machine) = existing.lock().await.as_ref() {
                return machine.state().clone();
            }
        }

        let mut policy = self.config.escalation_policy();
        if let Some(required) = require_acknowledge {
            policy.require_acknowledge = required;
        }
        let machine = EscalationStateMachine::new(entry_id, trigger_source, policy, Utc::now());
        let state = machine.state().clone();
        entries.insert(entry_id.to_string(), Arc::new(Mutex::new(Some(machine))));
        drop(entries);

        info!(entry_id = %entry_id, trigger = %state.trigger_source, "entry opened");
        deliver(
            self.audit.as_ref(),
            &AuditRecord::transition(AlertPhase::Clear, &state, ReasonCode::R501_ENTRY_OPENED, None),
        );
        state
    }

    /// Archive an entry. A revision still waiting out its debounce window is
    /// scanned and applied first, so the archive row always follows it.
    pub async fn close_entry(&self, entry_id: &str) -> Result<AlertState, EngineError> {
        let unknown = || EngineError::UnknownEntry(entry_id.to_string());
        let slot = self.entries.write().await.remove(entry_id).ok_or_else(unknown)?;

        let mut slot = slot.lock().await;
        let mut machine = slot.take().ok_or_else(unknown)?;
        if let Some(revision) = self.gate.take(entry_id) {
            let assessment = self.assess(&revision);
            self.apply(entry_id, &mut machine, AlertEvent::Assessment(assessment));
        }

        let state = machine.state().clone();
        deliver(self.audit.as_ref(), &AuditRecord::archive(&state, Utc::now()));
        drop(slot);

        self.presenter.on_entry_closed(entry_id);
        info!(entry_id = %entry_id, state = %state.state, "entry archived");
        Ok(state)
    }

    pub async fn alert_state(&self, entry_id: &str) -> Option<AlertState> {
        let slot = self.machine(entry_id).await.ok()?;
        let state = slot.lock().await.as_ref()?.state().clone();
        Some(state)
    }

    /// Audit rows for an entry, when the sink can be queried
    pub fn audit_records(&self, entry_id: &str) -> Option<Vec<AuditRecord>> {
        self.audit.records_for(entry_id)
    }

    // =========================================================================
    // INBOUND EVENTS
    // =========================================================================

    /// Queue a text snapshot for scanning after the debounce window
    pub async fn on_text_revision(
        &self,
        entry_id: &str,
        text: impl Into<String>,
        revision_seq: u64,
    ) -> Result<(), EngineError> {
        self.machine(entry_id).await?;
        self.gate.submit(JournalRevision::new(entry_id, text, revision_seq));
        Ok(())
    }

    /// Skip the rest of the debounce window for an entry
    pub fn flush(&self, entry_id: &str) -> bool {
        self.gate.flush(entry_id)
    }

    pub async fn on_intent(&self, entry_id: &str, intent: UserIntent) -> Result<TransitionOutput, EngineError> {
        self.dispatch(entry_id, AlertEvent::Intent(intent)).await
    }

    /// Presenter has rendered the banner
    pub async fn on_presented(&self, entry_id: &str) -> Result<TransitionOutput, EngineError> {
        self.dispatch(entry_id, AlertEvent::Presented).await
    }

    /// Feed an assessment straight to the entry's state machine
    pub async fn apply_assessment(&self, assessment: CrisisAssessment) -> Result<TransitionOutput, EngineError> {
        let entry_id = assessment.entry_id.clone();
        self.dispatch(&entry_id, AlertEvent::Assessment(assessment)).await
    }

    // =========================================================================
    // INTERNALS
    // =========================================================================

    async fn machine(&self, entry_id: &str) -> Result<Machine, EngineError> {
        self.entries
            .read()
            .await
            .get(entry_id)
            .cloned()
            .ok_or_else(|| EngineError::UnknownEntry(entry_id.to_string()))
    }

    async fn dispatch(&self, entry_id: &str, event: AlertEvent) -> Result<TransitionOutput, EngineError> {
        let slot = self.machine(entry_id).await?;
        let mut slot = slot.lock().await;
        let machine = slot
            .as_mut()
            .ok_or_else(|| EngineError::UnknownEntry(entry_id.to_string()))?;
        Ok(self.apply(entry_id, machine, event))
    }

    /// Apply one event, then notify and audit. Callers hold the entry lock so
    /// observers see changes in order.
    fn apply(&self, entry_id: &str, machine: &mut EscalationStateMachine, event: AlertEvent) -> TransitionOutput {
        let output = machine.handle(event, Utc::now());

        if output.changed {
            self.presenter.on_alert_state_changed(entry_id, &output.state);
        }
        if let Some(record) = &output.audit {
            deliver(self.audit.as_ref(), record);
        }
        output
    }

    fn assess(&self, revision: &JournalRevision) -> CrisisAssessment {
        let assessment = self.scanner.assess(revision);
        self.scans.fetch_add(1, Ordering::SeqCst);
        debug!(
            entry_id = %revision.entry_id,
            revision_seq = revision.revision_seq,
            severity = %assessment.display_severity(),
            signals = assessment.signals.len(),
            "revision scanned"
        );
        assessment
    }

    /// Scan a fired revision and apply it under the entry lock. If the entry
    /// was archived first, `close_entry` already took and scanned it.
    async fn scan(&self, revision: JournalRevision) {
        let entry_id = revision.entry_id.clone();
        let Ok(slot) = self.machine(&entry_id).await else {
            debug!(entry_id = %entry_id, "entry closed before scan");
            return;
        };
        let mut slot = slot.lock().await;
        let Some(machine) = slot.as_mut() else {
            debug!(entry_id = %entry_id, "entry closed before scan");
            return;
        };

        let assessment = self.assess(&revision);
        self.apply(&entry_id, machine, AlertEvent::Assessment(assessment));
        self.gate.settle(&entry_id, revision.revision_seq);
    }
}

/// Hand each fired revision to its own scan task. Holds only a weak handle so
/// the loop ends with the engine.
async fn drain(engine: Weak<CrisisEngine>, mut fired: mpsc::UnboundedReceiver<JournalRevision>) {
    while let Some(revision) = fired.recv().await {
        let Some(engine) = engine.upgrade() else {
            break;
        };
        tokio::spawn(async move { engine.scan(revision).await });
    }
    debug!("scan loop stopped");
}
