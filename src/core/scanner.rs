//! SignalScanner: finds crisis indicator phrases in a text snapshot
//!
//! Case-insensitive, boundary-aware matching against the Lexicon. A match
//! preceded by a negation cue within the negation window is kept but marked
//! suppressed. Severity is the highest active tier, never a sum.

use lazy_static::lazy_static;
use regex::Regex;
use std::cmp::Reverse;
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, error};

use crate::core::lexicon::{negation_key, Lexicon, LexiconError, LoadReport, NegationCue};
use crate::types::{aggregate_severity, CrisisAssessment, CrisisSignal, JournalRevision, Tier};
use crate::DEFAULT_NEGATION_WINDOW;

lazy_static! {
    // Word tokens for the negation window; apostrophes stay inside words
    static ref RE_TOKEN: Regex = Regex::new(r"[\p{L}\p{N}_'’]+").unwrap();
}

/// Negation never reaches across these
const CLAUSE_BREAKS: &[char] = &['.', '!', '?', ';', '\n'];

/// Sentinel: the scanner has no usable lexicon
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("assessment unavailable: {reason}")]
pub struct ScannerUnavailable {
    pub reason: String,
}

/// Signals and severity for one text
#[derive(Debug, Clone)]
pub struct ScanReport {
    pub signals: Vec<CrisisSignal>,
    pub severity: Option<Tier>,
    pub lexicon_version: String,
    pub lexicon_fingerprint: String,
}

#[derive(Debug)]
struct Token {
    start: usize,
    end: usize,
    norm: String,
}

/// Scanner bound to one lexicon version
#[derive(Debug, Clone)]
pub struct SignalScanner {
    lexicon: Result<Arc<Lexicon>, ScannerUnavailable>,
    negation_window: usize,
}

impl SignalScanner {
    /// Create scanner over a loaded lexicon
    pub fn new(lexicon: Arc<Lexicon>, negation_window: usize) -> Self {
        Self {
            lexicon: Ok(lexicon),
            negation_window,
        }
    }

    /// Scanner over the bundled lexicon with default settings
    pub fn bundled() -> Self {
        let (scanner, _) = Self::from_load(Lexicon::bundled(), DEFAULT_NEGATION_WINDOW);
        scanner
    }

    /// Scanner that can only report "unavailable"
    pub fn unavailable(reason: impl Into<String>) -> Self {
        Self {
            lexicon: Err(ScannerUnavailable { reason: reason.into() }),
            negation_window: DEFAULT_NEGATION_WINDOW,
        }
    }

    /// Build from a lexicon load result. A failed load yields an
    /// unavailable scanner, never a silently empty one.
    pub fn from_load(
        loaded: Result<(Lexicon, LoadReport), LexiconError>,
        negation_window: usize,
    ) -> (Self, Option<LoadReport>) {
        match loaded {
            Ok((lexicon, report)) => (Self::new(Arc::new(lexicon), negation_window), Some(report)),
            Err(e) => {
                error!(error = %e, "lexicon failed to load, scanner unavailable");
                let mut scanner = Self::unavailable(e.to_string());
                scanner.negation_window = negation_window;
                (scanner, None)
            }
        }
    }

    pub fn is_available(&self) -> bool {
        self.lexicon.is_ok()
    }

    pub fn lexicon(&self) -> Option<&Arc<Lexicon>> {
        self.lexicon.as_ref().ok()
    }

    pub fn negation_window(&self) -> usize {
        self.negation_window
    }

    /// Scan text. Pure: same text and lexicon give the same report.
    pub fn scan(&self, text: &str) -> Result<ScanReport, ScannerUnavailable> {
        let lexicon = self.lexicon.as_ref().map_err(Clone::clone)?;

        let mut candidates: Vec<CrisisSignal> = Vec::new();
        for entry in lexicon.entries() {
            for span in entry.find_spans(text) {
                candidates.push(CrisisSignal {
                    category: entry.category,
                    matched_phrase: entry.phrase.clone(),
                    span,
                    tier: entry.tier,
                    suppressed: false,
                    negated_by: None,
                });
            }
        }

        let mut signals = resolve_overlaps(candidates);

        if !signals.is_empty() && !lexicon.negation_cues().is_empty() {
            let tokens = tokenize(text);
            for signal in signals.iter_mut() {
                if let Some(cue) = self.find_negation(text, &tokens, lexicon.negation_cues(), signal.span.0) {
                    signal.suppressed = true;
                    signal.negated_by = Some(cue.phrase.clone());
                }
            }
        }

        signals.sort_by_key(|s| (s.span.0, s.category));
        let severity = aggregate_severity(&signals);

        debug!(
            matches = signals.len(),
            suppressed = signals.iter().filter(|s| s.suppressed).count(),
            severity = ?severity,
            "scan complete"
        );

        Ok(ScanReport {
            signals,
            severity,
            lexicon_version: lexicon.version().to_string(),
            lexicon_fingerprint: lexicon.fingerprint().to_string(),
        })
    }

    /// Scan a revision into an assessment; unavailability becomes the sentinel
    pub fn assess(&self, revision: &JournalRevision) -> CrisisAssessment {
        match self.scan(&revision.text) {
            Ok(report) => CrisisAssessment::assessed(
                revision.entry_id.clone(),
                revision.revision_seq,
                report.signals,
                report.lexicon_version,
                report.lexicon_fingerprint,
            ),
            Err(unavailable) => CrisisAssessment::unavailable(
                revision.entry_id.clone(),
                revision.revision_seq,
                unavailable.reason,
            ),
        }
    }

    /// Quick scan - just the severity, None if unavailable or clear
    pub fn quick_scan(&self, text: &str) -> Option<Tier> {
        self.scan(text).ok().and_then(|r| r.severity)
    }

    /// First cue found in the tokens right before `match_start`,
    /// within the same clause
    fn find_negation<'c>(
        &self,
        text: &str,
        tokens: &[Token],
        cues: &'c [NegationCue],
        match_start: usize,
    ) -> Option<&'c NegationCue> {
        if self.negation_window == 0 {
            return None;
        }
        let clause_start = text[..match_start]
            .rfind(CLAUSE_BREAKS)
            .map(|i| i + 1)
            .unwrap_or(0);
        let preceding = tokens.partition_point(|t| t.end <= match_start);
        let window_start = preceding.saturating_sub(self.negation_window);
        let window: Vec<&str> = tokens[window_start..preceding]
            .iter()
            .filter(|t| t.start >= clause_start)
            .map(|t| t.norm.as_str())
            .collect();

        cues.iter().find(|cue| {
            window
                .windows(cue.tokens.len())
                .any(|w| w.iter().zip(&cue.tokens).all(|(t, c)| *t == c.as_str()))
        })
    }
}

/// Within one category, overlapping matches keep the longest (then highest
/// tier). Different categories may overlap.
fn resolve_overlaps(mut candidates: Vec<CrisisSignal>) -> Vec<CrisisSignal> {
    candidates.sort_by_key(|s| (s.span.0, Reverse(s.span.1 - s.span.0), Reverse(s.tier), s.category));
    let mut kept: Vec<CrisisSignal> = Vec::with_capacity(candidates.len());
    for candidate in candidates {
        let overlaps = kept.iter().any(|k| {
            k.category == candidate.category && k.span.0 < candidate.span.1 && candidate.span.0 < k.span.1
        });
        if !overlaps {
            kept.push(candidate);
        }
    }
    kept
}

fn tokenize(text: &str) -> Vec<Token> {
    RE_TOKEN
        .find_iter(text)
        .map(|m| Token {
            start: m.start(),
            end: m.end(),
            norm: negation_key(m.as_str()),
        })
        .filter(|t| !t.norm.is_empty())
        .collect()
}

// =============================================================================
// TESTS
// =============================================================================
