//! Audit records handed to the AuditSink
//!
//! Field set is additive-only: new fields go at the end and are optional,
//! existing fields are never renamed or removed.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::types::{AlertPhase, AlertState, ReasonCode, ResolvedAction, Tier, TriggerSource};

/// One append-only audit row
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditRecord {
    pub entry_id: String,
    pub from: AlertPhase,
    pub to: AlertPhase,
    pub trigger_source: TriggerSource,
    pub timestamp: DateTime<Utc>,
    pub severity: Option<Tier>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub revision_seq: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<ReasonCode>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub action: Option<ResolvedAction>,
    /// Final state, only on archive rows
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub archived_state: Option<AlertState>,
}

impl AuditRecord {
    /// Row for a from → to move of `state` (already updated to `to`)
    pub fn transition(from: AlertPhase, state: &AlertState, reason: ReasonCode, revision_seq: Option<u64>) -> Self {
        Self {
            entry_id: state.entry_id.clone(),
            from,
            to: state.state,
            trigger_source: state.trigger_source.clone(),
            timestamp: state.last_transition_at,
            severity: state.last_severity,
            revision_seq,
            reason: Some(reason),
            action: state.resolved_action.filter(|_| state.state == AlertPhase::Resolved),
            archived_state: None,
        }
    }

    /// Row written when an entry is deleted or the session ends
    pub fn archive(state: &AlertState, now: DateTime<Utc>) -> Self {
        Self {
            entry_id: state.entry_id.clone(),
            from: state.state,
            to: state.state,
            trigger_source: state.trigger_source.clone(),
            timestamp: now,
            severity: state.last_severity,
            revision_seq: state.last_revision_seq,
            reason: Some(ReasonCode::R502_ENTRY_ARCHIVED),
            action: state.resolved_action,
            archived_state: Some(state.clone()),
        }
    }

    /// Single JSON line for append-only logs
    pub fn to_json_line(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_older_rows_without_new_fields_still_parse() {
        let line = r#"{"entry_id":"e1","from":"CLEAR","to":"FLAGGED","trigger_source":"journal","timestamp":"2024-01-01T00:00:00Z","severity":3}"#;
        let record: AuditRecord = serde_json::from_str(line).unwrap();
        assert_eq!(record.to, AlertPhase::Flagged);
        assert_eq!(record.severity, Some(Tier::Acute));
        assert_eq!(record.reason, None);
    }

    #[test]
    fn test_archive_row_carries_final_state() {
        let now = Utc::now();
        let state = AlertState::new("e1", TriggerSource::Chat, now);
        let record = AuditRecord::archive(&state, now);
        assert_eq!(record.reason, Some(ReasonCode::R502_ENTRY_ARCHIVED));
        assert_eq!(record.archived_state.as_ref().map(|s| s.entry_id.as_str()), Some("e1"));
        let line = record.to_json_line().unwrap();
        assert!(line.contains("\"trigger_source\":\"chat\""));
    }
}
