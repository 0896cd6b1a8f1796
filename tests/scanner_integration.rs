//! Integration tests for SignalScanner + Lexicon
//!
//! Tests the scanning contract:
//! - Same text and lexicon version give the same assessment
//! - Negated phrases are kept but never raise severity
//! - Severity is the highest tier present, never a sum
//! - A broken lexicon entry is rejected alone; a broken lexicon makes the
//!   scanner report "unavailable", never "clear"

use crisiswatch::core::{EngineConfig, Lexicon, LexiconError, SignalScanner};
use crisiswatch::types::{CrisisCategory, JournalRevision, Tier};
use pretty_assertions::assert_eq;
use std::io::Write;
use std::sync::Arc;

const CUSTOM_LEXICON: &str = r#"{
  "version": "test-lexicon-v2",
  "negation_cues": ["not", "never", 42],
  "entries": [
    { "category": "self_harm", "tier": 2, "phrase": "hurt myself" },
    { "category": "acute_despair", "tier": 1, "phrase": "hopeless" },
    { "category": "unknown_category", "tier": 2, "phrase": "whatever" },
    { "category": "self_harm", "tier": 7, "phrase": "too severe" },
    { "category": "suicidal_ideation", "tier": 3 }
  ]
}"#;

// =============================================================================
// LEXICON LOADING
// =============================================================================

#[test]
fn test_custom_lexicon_rejects_bad_entries_individually() {
    let (lexicon, report) = Lexicon::from_json_str(CUSTOM_LEXICON, Some("test-lexicon-v2")).unwrap();

    assert_eq!(lexicon.len(), 2);
    assert_eq!(report.accepted, 2);
    assert_eq!(report.rejected_entries.len(), 3);
    assert_eq!(report.rejected_cues.len(), 1);
    assert!(!report.is_clean());

    let rejected: Vec<usize> = report.rejected_entries.iter().map(|r| r.index).collect();
    assert_eq!(rejected, vec![2, 3, 4]);

    // The surviving entries still scan
    let scanner = SignalScanner::new(Arc::new(lexicon), 3);
    let scan = scanner.scan("I feel hopeless").unwrap();
    assert_eq!(scan.severity, Some(Tier::Low));
    assert_eq!(scan.lexicon_version, "test-lexicon-v2");
}

#[test]
fn test_lexicon_file_roundtrip_through_config() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    file.write_all(CUSTOM_LEXICON.as_bytes()).unwrap();

    let config = EngineConfig {
        lexicon_path: Some(file.path().to_path_buf()),
        lexicon_version: "test-lexicon-v2".to_string(),
        ..EngineConfig::default()
    };
    let (scanner, report) = config.build_scanner();
    assert!(scanner.is_available());
    assert_eq!(report.unwrap().accepted, 2);
}

#[test]
fn test_wrong_version_is_refused() {
    let err = Lexicon::from_json_str(CUSTOM_LEXICON, Some("crisis-lexicon-v1")).unwrap_err();
    assert!(matches!(err, LexiconError::VersionMismatch { .. }));
}

#[test]
fn test_unreadable_lexicon_reports_unavailable_not_clear() {
    let (scanner, report) = SignalScanner::from_load(Lexicon::from_json_str("{ not json", None), 3);
    assert!(report.is_none());

    let assessment = scanner.assess(&JournalRevision::new("e1", "I want to die", 1));
    assert!(assessment.is_unavailable());
    assert!(!assessment.is_clear());
    assert_eq!(assessment.severity, None);
    assert_eq!(assessment.display_severity(), "UNAVAILABLE");
}

// =============================================================================
// SCANNING
// =============================================================================

#[test]
fn test_assessment_is_deterministic() {
    let scanner = SignalScanner::bundled();
    let text = "Everything feels hopeless. Sometimes I want to hurt myself, but I will never kill myself.";

    let a = scanner.assess(&JournalRevision::new("e1", text, 4));
    let b = scanner.assess(&JournalRevision::new("e1", text, 4));

    assert_eq!(a.signals, b.signals);
    assert_eq!(a.severity, b.severity);
    assert_eq!(a.lexicon_fingerprint, b.lexicon_fingerprint);
}

#[test]
fn test_mixed_entry_takes_highest_active_tier() {
    let scanner = SignalScanner::bundled();
    let text = "Everything feels hopeless. Sometimes I want to hurt myself, but I will never kill myself.";
    let assessment = scanner.assess(&JournalRevision::new("e1", text, 1));

    let active: Vec<CrisisCategory> = assessment.active_signals().map(|s| s.category).collect();
    assert!(active.contains(&CrisisCategory::AcuteDespair));
    assert!(active.contains(&CrisisCategory::SelfHarm));

    let suppressed: Vec<&str> = assessment
        .suppressed_signals()
        .map(|s| s.matched_phrase.as_str())
        .collect();
    assert_eq!(suppressed, vec!["kill myself"]);

    // Suppressed tier 3 does not count
    assert_eq!(assessment.severity, Some(Tier::Elevated));
}

#[test]
fn test_spans_point_into_original_text() {
    let scanner = SignalScanner::bundled();
    let text = "Honestly?  I feel WORTHLESS today";
    let scan = scanner.scan(text).unwrap();

    assert_eq!(scan.signals.len(), 1);
    let (start, end) = scan.signals[0].span;
    assert_eq!(&text[start..end], "WORTHLESS");
}

#[test]
fn test_benign_text_is_clear() {
    let scanner = SignalScanner::bundled();
    let assessment = scanner.assess(&JournalRevision::new(
        "e1",
        "Went for a long walk, the killer whale documentary was great.",
        1,
    ));
    assert!(assessment.is_clear());
    assert!(assessment.signals.is_empty());
}

#[test]
fn test_quick_scan_matches_full_scan() {
    let scanner = SignalScanner::bundled();
    for text in ["", "I feel hopeless", "I want to die", "I do not want to die"] {
        assert_eq!(scanner.quick_scan(text), scanner.scan(text).unwrap().severity, "text: {:?}", text);
    }
}
