//! Revisions in, assessments out

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::types::{aggregate_severity, CrisisSignal, Tier};

/// One text change on a journal entry. Owned by the composer, passed by value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JournalRevision {
    pub entry_id: String,
    pub text: String,
    /// Monotonic per entry
    pub revision_seq: u64,
    pub edited_at: DateTime<Utc>,
}

impl JournalRevision {
    /// Create a revision stamped now
    pub fn new(entry_id: impl Into<String>, text: impl Into<String>, revision_seq: u64) -> Self {
        Self {
            entry_id: entry_id.into(),
            text: text.into(),
            revision_seq,
            edited_at: Utc::now(),
        }
    }
}

/// Whether the scan actually ran
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", content = "reason", rename_all = "snake_case")]
pub enum AssessmentStatus {
    /// Scanned against a valid lexicon
    Assessed,
    /// Lexicon missing or invalid; text is unchecked, not clear
    Unavailable(String),
}

/// Result of scanning one revision
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CrisisAssessment {
    pub entry_id: String,
    pub revision_seq: u64,
    /// All matches, suppressed ones included
    pub signals: Vec<CrisisSignal>,
    /// Highest active tier, None when clear (or unavailable)
    pub severity: Option<Tier>,
    pub status: AssessmentStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub lexicon_version: Option<String>,
    /// SHA-256 of the lexicon source, hex
    #[serde(skip_serializing_if = "Option::is_none")]
    pub lexicon_fingerprint: Option<String>,
    pub assessed_at: DateTime<Utc>,
}

impl CrisisAssessment {
    /// Build an assessment from scanner output, computing severity
    pub fn assessed(
        entry_id: impl Into<String>,
        revision_seq: u64,
        signals: Vec<CrisisSignal>,
        lexicon_version: impl Into<String>,
        lexicon_fingerprint: impl Into<String>,
    ) -> Self {
        let severity = aggregate_severity(&signals);
        Self {
            entry_id: entry_id.into(),
            revision_seq,
            signals,
            severity,
            status: AssessmentStatus::Assessed,
            lexicon_version: Some(lexicon_version.into()),
            lexicon_fingerprint: Some(lexicon_fingerprint.into()),
            assessed_at: Utc::now(),
        }
    }

    /// Sentinel for "could not check"
    pub fn unavailable(entry_id: impl Into<String>, revision_seq: u64, reason: impl Into<String>) -> Self {
        Self {
            entry_id: entry_id.into(),
            revision_seq,
            signals: Vec::new(),
            severity: None,
            status: AssessmentStatus::Unavailable(reason.into()),
            lexicon_version: None,
            lexicon_fingerprint: None,
            assessed_at: Utc::now(),
        }
    }

    pub fn is_unavailable(&self) -> bool {
        matches!(self.status, AssessmentStatus::Unavailable(_))
    }

    /// Checked and nothing active found
    pub fn is_clear(&self) -> bool {
        !self.is_unavailable() && self.severity.is_none()
    }

    /// Active (non-suppressed) signals
    pub fn active_signals(&self) -> impl Iterator<Item = &CrisisSignal> {
        self.signals.iter().filter(|s| s.is_active())
    }

    /// Signals suppressed by a negation cue
    pub fn suppressed_signals(&self) -> impl Iterator<Item = &CrisisSignal> {
        self.signals.iter().filter(|s| s.suppressed)
    }

    /// Short label for terminal display
    pub fn display_severity(&self) -> String {
        match (&self.status, self.severity) {
            (AssessmentStatus::Unavailable(_), _) => "UNAVAILABLE".to_string(),
            (_, Some(tier)) => tier.to_string(),
            (_, None) => "CLEAR".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unavailable_is_not_clear() {
        let a = CrisisAssessment::unavailable("e1", 1, "lexicon missing");
        assert!(a.is_unavailable());
        assert!(!a.is_clear());
        assert_eq!(a.severity, None);
        assert_eq!(a.display_severity(), "UNAVAILABLE");
    }

    #[test]
    fn test_empty_assessment_is_clear() {
        let a = CrisisAssessment::assessed("e1", 1, Vec::new(), "v1", "abc");
        assert!(a.is_clear());
        assert_eq!(a.display_severity(), "CLEAR");
    }

    #[test]
    fn test_status_serializes_with_reason() {
        let a = CrisisAssessment::unavailable("e1", 1, "bad json");
        let json = serde_json::to_value(&a).unwrap();
        assert_eq!(json["status"]["status"], "unavailable");
        assert_eq!(json["status"]["reason"], "bad json");
    }
}
