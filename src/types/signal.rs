//! Crisis signal structures produced by the scanner

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// What kind of crisis a phrase indicates
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CrisisCategory {
    SelfHarm,
    SuicidalIdeation,
    ViolenceTowardOthers,
    AcuteDespair,
}

impl CrisisCategory {
    pub const ALL: [CrisisCategory; 4] = [
        CrisisCategory::SelfHarm,
        CrisisCategory::SuicidalIdeation,
        CrisisCategory::ViolenceTowardOthers,
        CrisisCategory::AcuteDespair,
    ];

    /// Wire name used in lexicon files and audit logs
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::SelfHarm => "self_harm",
            Self::SuicidalIdeation => "suicidal_ideation",
            Self::ViolenceTowardOthers => "violence_toward_others",
            Self::AcuteDespair => "acute_despair",
        }
    }
}

impl fmt::Display for CrisisCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for CrisisCategory {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_ascii_lowercase().replace(['-', ' '], "_");
        Self::ALL
            .into_iter()
            .find(|c| c.as_str() == normalized)
            .ok_or_else(|| format!("unknown category `{}`", s))
    }
}

/// Severity tier of a signal, 1 (lowest) to 3 (most urgent).
///
/// Serialized as the bare integer so lexicon files stay readable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub enum Tier {
    /// Distress language worth surfacing
    Low = 1,
    /// Self-harm or harm toward others
    Elevated = 2,
    /// Suicidal ideation, interrupt now
    Acute = 3,
}

impl Tier {
    pub fn level(&self) -> u8 {
        *self as u8
    }
}

impl TryFrom<u8> for Tier {
    type Error = String;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            1 => Ok(Tier::Low),
            2 => Ok(Tier::Elevated),
            3 => Ok(Tier::Acute),
            other => Err(format!("tier must be 1..=3, got {}", other)),
        }
    }
}

impl From<Tier> for u8 {
    fn from(tier: Tier) -> u8 {
        tier.level()
    }
}

impl fmt::Display for Tier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "T{}", self.level())
    }
}

/// A single matched indicator phrase
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CrisisSignal {
    pub category: CrisisCategory,
    /// Lexicon phrase that matched (not the raw user text)
    pub matched_phrase: String,
    /// Byte range of the match in the scanned text
    pub span: (usize, usize),
    pub tier: Tier,
    /// Negated matches are kept for audit but never count toward severity
    pub suppressed: bool,
    /// The negation cue that caused suppression
    #[serde(skip_serializing_if = "Option::is_none")]
    pub negated_by: Option<String>,
}

impl CrisisSignal {
    /// Does this signal contribute to aggregate severity?
    pub fn is_active(&self) -> bool {
        !self.suppressed
    }
}

/// Aggregate severity: highest tier among active signals.
///
/// Multiple matches at one tier never climb past that tier.
pub fn aggregate_severity(signals: &[CrisisSignal]) -> Option<Tier> {
    signals.iter().filter(|s| s.is_active()).map(|s| s.tier).max()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn signal(category: CrisisCategory, tier: Tier, suppressed: bool) -> CrisisSignal {
        CrisisSignal {
            category,
            matched_phrase: "x".into(),
            span: (0, 1),
            tier,
            suppressed,
            negated_by: None,
        }
    }

    #[test]
    fn test_severity_is_a_ceiling() {
        let signals = vec![
            signal(CrisisCategory::AcuteDespair, Tier::Low, false),
            signal(CrisisCategory::AcuteDespair, Tier::Low, false),
            signal(CrisisCategory::AcuteDespair, Tier::Low, false),
        ];
        assert_eq!(aggregate_severity(&signals), Some(Tier::Low));
    }

    #[test]
    fn test_suppressed_signals_do_not_count() {
        let signals = vec![
            signal(CrisisCategory::SuicidalIdeation, Tier::Acute, true),
            signal(CrisisCategory::AcuteDespair, Tier::Low, false),
        ];
        assert_eq!(aggregate_severity(&signals), Some(Tier::Low));
    }

    #[test]
    fn test_tier_rejects_out_of_range() {
        assert!(Tier::try_from(0u8).is_err());
        assert!(Tier::try_from(4u8).is_err());
        assert_eq!(Tier::try_from(2u8), Ok(Tier::Elevated));
    }

    #[test]
    fn test_category_parse_is_lenient_about_separators() {
        assert_eq!("Self-Harm".parse::<CrisisCategory>(), Ok(CrisisCategory::SelfHarm));
        assert_eq!(
            "violence toward others".parse::<CrisisCategory>(),
            Ok(CrisisCategory::ViolenceTowardOthers)
        );
        assert!("sadness".parse::<CrisisCategory>().is_err());
    }
}
