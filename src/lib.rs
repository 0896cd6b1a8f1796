//! crisiswatch: crisis-signal detection and escalation for journaling apps
//!
//! Text revision → DebounceGate → SignalScanner → EscalationStateMachine → AlertPresenter

pub mod core;
pub mod types;

// =============================================================================
// TIMING DEFAULTS - overridable through EngineConfig
// =============================================================================

/// Debounce window for text revisions (milliseconds)
pub const DEFAULT_DEBOUNCE_MS: u64 = 300;

/// Cooldown after an alert is resolved (milliseconds)
/// 10 minutes - equal-or-lower re-detections inside it are suppressed
pub const DEFAULT_COOLDOWN_MS: u64 = 600_000;

/// Longest cooldown a config may ask for (one day)
pub const MAX_COOLDOWN_MS: u64 = 86_400_000;

// =============================================================================
// SCANNER DEFAULTS
// =============================================================================

/// Tokens before a match that are searched for a negation cue
pub const DEFAULT_NEGATION_WINDOW: usize = 3;

/// Upper bound accepted for the negation window
pub const MAX_NEGATION_WINDOW: usize = 10;

/// Version identifier of the bundled lexicon
pub const DEFAULT_LEXICON_VERSION: &str = "crisis-lexicon-v1";

/// Whether dismissing the modal requires an explicit acknowledge by default
pub const DEFAULT_REQUIRE_ACKNOWLEDGE: bool = true;

// =============================================================================
// AUDIT DEFAULTS
// =============================================================================

/// Rows kept by the in-memory audit sink before the oldest are evicted
pub const DEFAULT_AUDIT_MEMORY_CAPACITY: usize = 10_000;

// =============================================================================
// VERSION
// =============================================================================

pub const VERSION: &str = "1.0.0";
