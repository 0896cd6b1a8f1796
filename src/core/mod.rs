//! Core modules for crisiswatch

pub mod lexicon;
pub mod scanner;
pub mod debounce;
pub mod escalation;
pub mod audit;
pub mod presenter;
pub mod config;
pub mod engine;
pub mod api;

pub use lexicon::{Lexicon, LexiconError, LexiconEntry, LoadReport, EntryRejection, EntryValidationError};
pub use scanner::{SignalScanner, ScanReport, ScannerUnavailable};
pub use debounce::DebounceGate;
pub use escalation::{EscalationPolicy, EscalationStateMachine};
pub use audit::{AuditSink, AuditError, MemoryAuditSink, JsonlAuditSink, deliver};
pub use presenter::{AlertPresenter, BroadcastPresenter, NullPresenter};
pub use config::{EngineConfig, ConfigError};
pub use engine::{CrisisEngine, EngineError};
pub use api::{create_router, router, run_server};
