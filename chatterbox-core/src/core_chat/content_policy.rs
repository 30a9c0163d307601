//! Profanity masking applied to outgoing text
//!
//! A token is a maximal run of alphanumeric characters. Tokens that match
//! the word list, ignoring case, have every character replaced by the mask
//! character. Everything else passes through untouched, so masking never
//! changes the character count of the text.

use crate::config::ContentConfig;
use std::collections::HashSet;
use tracing::{debug, warn};

/// Built-in English word list
const DEFAULT_DICTIONARY: &[&str] = &[
    "arse", "arsehole", "ass", "asshole", "bastard", "bitch", "bollocks", "bullshit", "crap",
    "cunt", "damn", "dick", "dickhead", "douche", "fag", "fuck", "fucked", "fucker", "fucking",
    "motherfucker", "piss", "prick", "pussy", "shit", "shitty", "slut", "twat", "wank", "wanker",
    "whore",
];

const FALLBACK_MASK: char = '*';

/// Word-list based text sanitizer
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContentPolicy {
    words: HashSet<String>,
    mask: char,
}

impl Default for ContentPolicy {
    fn default() -> Self {
        Self::with_default_dictionary(FALLBACK_MASK)
    }
}

impl ContentPolicy {
    /// Empty word list
    pub fn new(mask: char) -> Self {
        let mask = if mask.is_alphanumeric() {
            warn!(mask = %mask, "Mask is a word character, using '*'");
            FALLBACK_MASK
        } else {
            mask
        };

        Self {
            words: HashSet::new(),
            mask,
        }
    }

    pub fn with_default_dictionary(mask: char) -> Self {
        let mut policy = Self::new(mask);
        for word in DEFAULT_DICTIONARY {
            policy.add_word(word);
        }
        policy
    }

    pub fn from_config(config: &ContentConfig) -> Self {
        let mut policy = if config.use_default_dictionary {
            Self::with_default_dictionary(config.mask)
        } else {
            Self::new(config.mask)
        };
        for word in &config.extra_words {
            policy.add_word(word);
        }
        for word in &config.allowed_words {
            policy.remove_word(word);
        }
        debug!(words = policy.words.len(), "Content policy ready");
        policy
    }

    /// Add a word to mask. Entries that are not a single token can never match and are skipped.
    pub fn add_word(&mut self, word: &str) -> bool {
        let word = word.trim();
        if word.is_empty() || !word.chars().all(char::is_alphanumeric) {
            warn!(word = %word, "Ignoring word list entry that is not a single token");
            return false;
        }
        self.words.insert(word.to_lowercase())
    }

    pub fn remove_word(&mut self, word: &str) -> bool {
        self.words.remove(&word.trim().to_lowercase())
    }

    pub fn mask(&self) -> char {
        self.mask
    }

    pub fn len(&self) -> usize {
        self.words.len()
    }

    pub fn is_empty(&self) -> bool {
        self.words.is_empty()
    }

    fn is_listed(&self, token: &str) -> bool {
        self.words.contains(&token.to_lowercase())
    }

    /// Whether any token of `text` is on the list
    pub fn is_profane(&self, text: &str) -> bool {
        text.split(|c: char| !c.is_alphanumeric())
            .any(|token| !token.is_empty() && self.is_listed(token))
    }

    /// Mask every listed token in `text`
    pub fn clean(&self, text: &str) -> String {
        let mut out = String::with_capacity(text.len());
        let mut token_start: Option<usize> = None;

        for (idx, c) in text.char_indices() {
            match (c.is_alphanumeric(), token_start) {
                (true, None) => token_start = Some(idx),
                (false, Some(start)) => {
                    self.push_token(&mut out, &text[start..idx]);
                    token_start = None;
                    out.push(c);
                }
                (false, None) => out.push(c),
                (true, Some(_)) => {}
            }
        }
        if let Some(start) = token_start {
            self.push_token(&mut out, &text[start..]);
        }

        out
    }

    fn push_token(&self, out: &mut String, token: &str) {
        if self.is_listed(token) {
            out.extend(std::iter::repeat(self.mask).take(token.chars().count()));
        } else {
            out.push_str(token);
        }
    }
}
