use std::fmt;

use thiserror::Error;

/// Separator joining the two variants into the canonical pair key.
///
/// Reserved: it may never appear inside a variant, otherwise the key could
/// not be split back.
pub const PAIR_SEPARATOR: char = '←';

/// Maximum length of a single variant, in characters.
pub const VARIANT_MAX_CHARS: usize = 50;

/// Longest allowed run of identical consecutive characters in a variant
/// (whitespace ignored).
pub const MAX_CHAR_RUN: usize = 10;

//
// ─── ERRORS ────────────────────────────────────────────────────────────────────
//

#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum QuestionError {
    #[error("expected exactly two non-empty lines")]
    NotTwoLines,

    #[error("a variant cannot be empty")]
    EmptyVariant,

    #[error("variant is too long: {chars} characters (max {VARIANT_MAX_CHARS})")]
    VariantTooLong { chars: usize },

    #[error("variant contains the reserved '{PAIR_SEPARATOR}' separator")]
    ReservedSeparator,

    #[error("variant repeats the same character more than {MAX_CHAR_RUN} times in a row")]
    ExcessiveRepetition,
}

//
// ─── QUESTION ──────────────────────────────────────────────────────────────────
//

/// Unvalidated two-line input: the wrong variant on the first line, the
/// correct one on the second.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QuestionDraft {
    pub front: String,
    pub back: String,
}

impl QuestionDraft {
    /// Splits raw input into the two variants.
    ///
    /// # Errors
    ///
    /// Returns `QuestionError::NotTwoLines` unless the input holds exactly
    /// two non-empty lines.
    pub fn parse(input: &str) -> Result<Self, QuestionError> {
        let lines: Vec<&str> = input
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty())
            .collect();
        match lines.as_slice() {
            [front, back] => Ok(Self {
                front: (*front).to_owned(),
                back: (*back).to_owned(),
            }),
            _ => Err(QuestionError::NotTwoLines),
        }
    }

    /// Validates both variants and produces a `Question`.
    ///
    /// # Errors
    ///
    /// Returns `QuestionError` if a variant is empty, too long, contains the
    /// reserved separator, or repeats one character excessively.
    pub fn validate(self) -> Result<Question, QuestionError> {
        validate_variant(&self.front)?;
        validate_variant(&self.back)?;
        Ok(Question {
            front: self.front,
            back: self.back,
        })
    }
}

/// A word pair: `front` is the wrong variant, `back` the correct one.
///
/// Identity is the joined pair key (`front←back`); two questions with the
/// same key are the same question everywhere in the system.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Question {
    front: String,
    back: String,
}

impl Question {
    /// Builds a question from pre-validated variants.
    ///
    /// # Errors
    ///
    /// Same rules as `QuestionDraft::validate`.
    pub fn new(front: impl Into<String>, back: impl Into<String>) -> Result<Self, QuestionError> {
        QuestionDraft {
            front: front.into().trim().to_owned(),
            back: back.into().trim().to_owned(),
        }
        .validate()
    }

    /// Rebuilds a question from a stored pair key. Returns `None` when the
    /// key has no separator or an empty side.
    #[must_use]
    pub fn from_pair_key(key: &str) -> Option<Self> {
        let (front, back) = key.split_once(PAIR_SEPARATOR)?;
        if front.is_empty() || back.is_empty() {
            return None;
        }
        Some(Self {
            front: front.to_owned(),
            back: back.to_owned(),
        })
    }

    #[must_use]
    pub fn front(&self) -> &str {
        &self.front
    }

    /// The correct variant — the one an answer is matched against.
    #[must_use]
    pub fn back(&self) -> &str {
        &self.back
    }

    /// Canonical `front←back` identity key.
    #[must_use]
    pub fn pair_key(&self) -> String {
        format!("{}{PAIR_SEPARATOR}{}", self.front, self.back)
    }
}

impl fmt::Display for Question {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} / {}", self.front, self.back)
    }
}

fn validate_variant(text: &str) -> Result<(), QuestionError> {
    if text.trim().is_empty() {
        return Err(QuestionError::EmptyVariant);
    }
    let chars = text.chars().count();
    if chars > VARIANT_MAX_CHARS {
        return Err(QuestionError::VariantTooLong { chars });
    }
    if text.contains(PAIR_SEPARATOR) {
        return Err(QuestionError::ReservedSeparator);
    }
    if has_excessive_repetition(text) {
        return Err(QuestionError::ExcessiveRepetition);
    }
    Ok(())
}

/// True when any non-whitespace character repeats more than `MAX_CHAR_RUN`
/// times in a row. Whitespace is dropped before counting, so a run may span
/// spaces.
pub(crate) fn has_excessive_repetition(text: &str) -> bool {
    let mut run = 0usize;
    let mut last: Option<char> = None;
    for ch in text.chars().filter(|c| !c.is_whitespace()) {
        if last == Some(ch) {
            run += 1;
        } else {
            run = 1;
            last = Some(ch);
        }
        if run > MAX_CHAR_RUN {
            return true;
        }
    }
    false
}

//
// ─── TESTS ─────────────────────────────────────────────────────────────────────
//
