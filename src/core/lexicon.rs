//! Lexicon: versioned table of crisis indicator phrases and negation cues
//!
//! Loaded from a JSON data file. Each entry is validated on its own; a bad
//! entry lands in the LoadReport and the rest of the file still loads.

use regex::Regex;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{info, warn};

use crate::types::{CrisisCategory, Tier};

/// Lexicon shipped with the crate
pub const BUNDLED_LEXICON: &str = include_str!("../../lexicon/crisis_lexicon_v1.json");

/// Characters tolerated between the words of a phrase
const WORD_SEPARATOR: &str = r"[\s\-–—_.,;:!?…]+";

/// Whole-lexicon failures. Any of these makes the scanner unavailable.
#[derive(Debug, Error)]
pub enum LexiconError {
    #[error("failed to read lexicon {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("lexicon is not valid JSON: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("lexicon version mismatch: expected `{expected}`, found `{found}`")]
    VersionMismatch { expected: String, found: String },
    #[error("lexicon `{version}` has no valid entries ({rejected} rejected)")]
    Empty { version: String, rejected: usize },
}

/// Why a single entry or cue was rejected
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize)]
#[serde(tag = "kind", content = "detail", rename_all = "snake_case")]
pub enum EntryValidationError {
    #[error("entry has the wrong shape: {0}")]
    Shape(String),
    #[error("missing field `{0}`")]
    MissingField(&'static str),
    #[error("unknown category `{0}`")]
    UnknownCategory(String),
    #[error("tier must be 1..=3, got {0}")]
    InvalidTier(i64),
    #[error("malformed phrase `{phrase}`: {detail}")]
    MalformedPhrase { phrase: String, detail: String },
    #[error("duplicate phrase `{phrase}` in {category}")]
    Duplicate { phrase: String, category: CrisisCategory },
}

/// A rejected entry, kept for the load report
#[derive(Debug, Clone, Serialize)]
pub struct EntryRejection {
    /// Position in the source array
    pub index: usize,
    pub phrase: Option<String>,
    pub error: EntryValidationError,
}

/// Summary of one lexicon load
#[derive(Debug, Clone, Serialize)]
pub struct LoadReport {
    pub version: String,
    pub fingerprint: String,
    pub accepted: usize,
    pub negation_cues: usize,
    pub rejected_entries: Vec<EntryRejection>,
    pub rejected_cues: Vec<EntryRejection>,
}

impl LoadReport {
    /// Nothing was rejected
    pub fn is_clean(&self) -> bool {
        self.rejected_entries.is_empty() && self.rejected_cues.is_empty()
    }
}

#[derive(Debug, Deserialize)]
struct RawLexicon {
    version: String,
    #[serde(default)]
    review_status: Option<String>,
    #[serde(default)]
    negation_cues: Vec<serde_json::Value>,
    entries: Vec<serde_json::Value>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct RawEntry {
    category: Option<String>,
    tier: Option<i64>,
    phrase: Option<String>,
}

/// One indicator phrase with its compiled matcher
#[derive(Debug, Clone)]
pub struct LexiconEntry {
    /// Index in the lexicon arena
    pub id: usize,
    pub category: CrisisCategory,
    pub tier: Tier,
    /// Normalized phrase (lowercase, single spaces)
    pub phrase: String,
    pattern: Regex,
}

impl LexiconEntry {
    /// Byte ranges where this phrase occurs in `text`
    pub fn find_spans<'t>(&'t self, text: &'t str) -> impl Iterator<Item = (usize, usize)> + 't {
        self.pattern.find_iter(text).map(|m| (m.start(), m.end()))
    }
}

/// A negating phrase. `tokens` are its words with apostrophes removed, the
/// form text tokens are compared in.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NegationCue {
    pub phrase: String,
    pub tokens: Vec<String>,
}

/// Read-only, shared across all entries
#[derive(Debug)]
pub struct Lexicon {
    version: String,
    review_status: Option<String>,
    fingerprint: String,
    entries: Vec<LexiconEntry>,
    by_category: HashMap<CrisisCategory, Vec<usize>>,
    negation_cues: Vec<NegationCue>,
}

impl Lexicon {
    /// Load the lexicon bundled with the crate
    pub fn bundled() -> Result<(Self, LoadReport), LexiconError> {
        Self::from_json_str(BUNDLED_LEXICON, None)
    }

    /// Load a lexicon file, optionally pinning its version
    pub fn load(path: impl AsRef<Path>, expected_version: Option<&str>) -> Result<(Self, LoadReport), LexiconError> {
        let path = path.as_ref();
        let source = std::fs::read_to_string(path).map_err(|source| LexiconError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_json_str(&source, expected_version)
    }

    /// Parse and validate lexicon JSON
    pub fn from_json_str(source: &str, expected_version: Option<&str>) -> Result<(Self, LoadReport), LexiconError> {
        let raw: RawLexicon = serde_json::from_str(source)?;

        if let Some(expected) = expected_version {
            if raw.version != expected {
                return Err(LexiconError::VersionMismatch {
                    expected: expected.to_string(),
                    found: raw.version,
                });
            }
        }

        let fingerprint = fingerprint(source);

        let mut entries: Vec<LexiconEntry> = Vec::new();
        let mut by_category: HashMap<CrisisCategory, Vec<usize>> = HashMap::new();
        let mut seen: HashSet<(CrisisCategory, String)> = HashSet::new();
        let mut rejected_entries = Vec::new();

        for (index, value) in raw.entries.into_iter().enumerate() {
            let phrase_hint = value.get("phrase").and_then(|p| p.as_str()).map(String::from);
            match validate_entry(value, entries.len(), &mut seen) {
                Ok(entry) => {
                    by_category.entry(entry.category).or_default().push(entry.id);
                    entries.push(entry);
                }
                Err(error) => {
                    warn!(index, version = %raw.version, %error, "rejected lexicon entry");
                    rejected_entries.push(EntryRejection { index, phrase: phrase_hint, error });
                }
            }
        }

        let mut negation_cues = Vec::new();
        let mut rejected_cues = Vec::new();
        for (index, value) in raw.negation_cues.into_iter().enumerate() {
            match validate_cue(&value) {
                Ok(cue) => {
                    if !negation_cues.contains(&cue) {
                        negation_cues.push(cue);
                    }
                }
                Err(error) => {
                    warn!(index, version = %raw.version, %error, "rejected negation cue");
                    rejected_cues.push(EntryRejection {
                        index,
                        phrase: value.as_str().map(String::from),
                        error,
                    });
                }
            }
        }

        if entries.is_empty() {
            return Err(LexiconError::Empty {
                version: raw.version,
                rejected: rejected_entries.len(),
            });
        }

        let report = LoadReport {
            version: raw.version.clone(),
            fingerprint: fingerprint.clone(),
            accepted: entries.len(),
            negation_cues: negation_cues.len(),
            rejected_entries,
            rejected_cues,
        };

        info!(
            version = %report.version,
            accepted = report.accepted,
            rejected = report.rejected_entries.len(),
            negation_cues = report.negation_cues,
            "lexicon loaded"
        );

        let lexicon = Self {
            version: raw.version,
            review_status: raw.review_status,
            fingerprint,
            entries,
            by_category,
            negation_cues,
        };

        Ok((lexicon, report))
    }

    pub fn version(&self) -> &str {
        &self.version
    }

    pub fn review_status(&self) -> Option<&str> {
        self.review_status.as_deref()
    }

    /// SHA-256 of the source text, hex
    pub fn fingerprint(&self) -> &str {
        &self.fingerprint
    }

    /// All entries in arena order
    pub fn entries(&self) -> &[LexiconEntry] {
        &self.entries
    }

    /// Entries of one category
    pub fn entries_for(&self, category: CrisisCategory) -> impl Iterator<Item = &LexiconEntry> {
        self.by_category
            .get(&category)
            .into_iter()
            .flatten()
            .map(move |&id| &self.entries[id])
    }

    pub fn negation_cues(&self) -> &[NegationCue] {
        &self.negation_cues
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Hex SHA-256 of the lexicon source
fn fingerprint(source: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(source.as_bytes());
    let digest: [u8; 32] = hasher.finalize().into();
    digest.iter().map(|b| format!("{:02x}", b)).collect()
}

fn validate_entry(
    value: serde_json::Value,
    id: usize,
    seen: &mut HashSet<(CrisisCategory, String)>,
) -> Result<LexiconEntry, EntryValidationError> {
    if !value.is_object() {
        return Err(EntryValidationError::Shape(value.to_string()));
    }
    let raw: RawEntry =
        serde_json::from_value(value).map_err(|e| EntryValidationError::Shape(e.to_string()))?;

    let category_name = raw.category.ok_or(EntryValidationError::MissingField("category"))?;
    let category = category_name
        .parse::<CrisisCategory>()
        .map_err(|_| EntryValidationError::UnknownCategory(category_name.clone()))?;

    let tier_value = raw.tier.ok_or(EntryValidationError::MissingField("tier"))?;
    let tier = u8::try_from(tier_value)
        .ok()
        .and_then(|t| Tier::try_from(t).ok())
        .ok_or(EntryValidationError::InvalidTier(tier_value))?;

    let phrase = raw.phrase.ok_or(EntryValidationError::MissingField("phrase"))?;
    let words = phrase_words(&phrase)?;
    let normalized = words.join(" ");

    if !seen.insert((category, normalized.clone())) {
        return Err(EntryValidationError::Duplicate { phrase: normalized, category });
    }

    let pattern = compile_phrase(&words).map_err(|e| EntryValidationError::MalformedPhrase {
        phrase: phrase.clone(),
        detail: e.to_string(),
    })?;

    Ok(LexiconEntry {
        id,
        category,
        tier,
        phrase: normalized,
        pattern,
    })
}

fn validate_cue(value: &serde_json::Value) -> Result<NegationCue, EntryValidationError> {
    let phrase = value
        .as_str()
        .ok_or_else(|| EntryValidationError::Shape(value.to_string()))?;
    let words = phrase_words(phrase)?;
    Ok(NegationCue {
        phrase: words.join(" "),
        tokens: words.iter().map(|w| negation_key(w)).collect(),
    })
}

/// Split a phrase into normalized words, rejecting anything the
/// boundary-aware matcher can't express.
fn phrase_words(phrase: &str) -> Result<Vec<String>, EntryValidationError> {
    let malformed = |detail: &str| EntryValidationError::MalformedPhrase {
        phrase: phrase.to_string(),
        detail: detail.to_string(),
    };

    let trimmed = phrase.trim();
    if trimmed.is_empty() {
        return Err(malformed("empty phrase"));
    }
    if let Some(c) = trimmed
        .chars()
        .find(|c| !(c.is_alphanumeric() || c.is_whitespace() || is_apostrophe(*c) || *c == '-'))
    {
        return Err(malformed(&format!("unsupported character `{}`", c)));
    }
    let starts_ok = trimmed.chars().next().map(char::is_alphanumeric).unwrap_or(false);
    let ends_ok = trimmed.chars().last().map(char::is_alphanumeric).unwrap_or(false);
    if !starts_ok || !ends_ok {
        return Err(malformed("must start and end with a letter or digit"));
    }

    Ok(trimmed
        .split(|c: char| c.is_whitespace() || c == '-')
        .filter(|w| !w.is_empty())
        .map(normalize_token)
        .collect())
}

/// Lowercase and fold curly apostrophes
fn normalize_token(word: &str) -> String {
    word.trim_matches(is_apostrophe)
        .chars()
        .map(|c| if is_apostrophe(c) { '\'' } else { c })
        .flat_map(char::to_lowercase)
        .collect()
}

/// Normalized word with every apostrophe dropped, so "dont" meets "don't"
pub(crate) fn negation_key(word: &str) -> String {
    normalize_token(word).chars().filter(|c| !is_apostrophe(*c)).collect()
}

fn is_apostrophe(c: char) -> bool {
    c == '\'' || c == '’'
}

/// Case-insensitive, boundary-anchored pattern. Apostrophes are optional and
/// any run of whitespace or light punctuation may separate words.
fn compile_phrase(words: &[String]) -> Result<Regex, regex::Error> {
    let body = words
        .iter()
        .map(|word| {
            word.chars()
                .map(|c| {
                    if c == '\'' {
                        "['’]?".to_string()
                    } else {
                        regex::escape(&c.to_string())
                    }
                })
                .collect::<String>()
        })
        .collect::<Vec<_>>()
        .join(WORD_SEPARATOR);
    Regex::new(&format!(r"(?i)\b{}\b", body))
}

// =============================================================================
// TESTS
// =============================================================================
