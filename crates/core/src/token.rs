use std::collections::HashMap;
use std::fmt;

/// Length of a short token in hex characters (8 digest bytes).
pub const SHORT_TOKEN_LEN: usize = 16;

/// Opaque, deterministic stand-in for a longer text, sized for a payload-
/// constrained interaction surface (buttons carry the token, a session-scoped
/// `TokenMap` resolves it back).
///
/// Tokens are never the source of truth: the canonical text stays in category
/// and ledger storage, and a token that no longer resolves just means the
/// session went stale.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ShortToken(String);

impl ShortToken {
    /// Derives the token for a text. Pure: the same text always yields the
    /// same token within one process run (and across runs — the digest is
    /// unkeyed).
    #[must_use]
    pub fn of(text: &str) -> Self {
        let digest = blake3::hash(text.as_bytes());
        Self(hex::encode(&digest.as_bytes()[..SHORT_TOKEN_LEN / 2]))
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    #[must_use]
    pub fn into_string(self) -> String {
        self.0
    }
}

impl fmt::Display for ShortToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Full-width fallback token used when two texts truncate to the same short
/// token within one map.
fn full_token(text: &str) -> String {
    hex::encode(blake3::hash(text.as_bytes()).as_bytes())
}

/// Session-scoped reverse map from tokens to the texts they were minted for.
///
/// Lives inside a flow session and dies with it; resolving against a newer
/// listing's tokens is exactly the stale-session case the services report.
#[derive(Debug, Clone, Default)]
pub struct TokenMap {
    entries: HashMap<String, String>,
}

impl TokenMap {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Mints a token for `text` and remembers the mapping.
    ///
    /// If the short token is already taken by a *different* text, the entry
    /// falls back to the full digest instead of silently shadowing the
    /// earlier text.
    pub fn insert(&mut self, text: &str) -> String {
        let short = ShortToken::of(text).into_string();
        let collides = self
            .entries
            .get(&short)
            .is_some_and(|existing| existing != text);
        if collides {
            let full = full_token(text);
            self.entries.insert(full.clone(), text.to_owned());
            return full;
        }
        self.entries.insert(short.clone(), text.to_owned());
        short
    }

    /// Looks a token back up. `None` means the token belongs to an older
    /// listing (or was never minted here).
    #[must_use]
    pub fn resolve(&self, token: &str) -> Option<&str> {
        self.entries.get(token).map(String::as_str)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
