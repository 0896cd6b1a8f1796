//! Core types for crisiswatch

mod signal;
mod assessment;
mod alert;
mod intent;
mod reason;
mod audit;
mod output;

pub use signal::{CrisisCategory, CrisisSignal, Tier, aggregate_severity};
pub use assessment::{JournalRevision, CrisisAssessment, AssessmentStatus};
pub use alert::{AlertPhase, AlertState, ResolvedAction, TriggerSource};
pub use intent::{UserIntent, AlertEvent};
pub use reason::ReasonCode;
pub use audit::AuditRecord;
pub use output::TransitionOutput;
