//! Hashing and text utilities shared by every continuity stage.

use regex::Regex;
use sha2::{Digest, Sha256};
use std::collections::HashSet;
use std::fmt::Write as _;
use std::sync::LazyLock;

use crate::config::SearchTuning;

/// Splits prompts into candidate keywords. Path characters stay inside tokens
/// so `src/db/schema.ts` survives as a single keyword.
static TOKEN_SPLIT_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"[^a-z0-9_./\-]+").expect("TOKEN_SPLIT_RE regex should compile")
});

static WHITESPACE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\s+").expect("WHITESPACE_RE regex should compile"));

/// Lowercase hex SHA-256 of `bytes`.
pub fn sha256_hex(bytes: &[u8]) -> String {
    let digest = Sha256::digest(bytes);
    let mut out = String::with_capacity(digest.len() * 2);
    for byte in digest {
        let _ = write!(&mut out, "{:02x}", byte);
    }
    out
}

/// Trim, lowercase and collapse internal whitespace.
pub fn normalize_prompt(prompt: &str) -> String {
    WHITESPACE_RE
        .replace_all(prompt.trim(), " ")
        .to_lowercase()
}

/// Fingerprint of a prompt that ignores case and whitespace layout.
pub fn task_fingerprint(prompt: &str) -> String {
    sha256_hex(normalize_prompt(prompt).as_bytes())
}

/// Extract up to `max_keywords` search keywords in first-seen order.
///
/// Tokens shorter than `min_keyword_len` and stopwords are dropped;
/// duplicates keep their first position.
pub fn extract_keywords(prompt: &str, tuning: &SearchTuning) -> Vec<String> {
    let lowered = prompt.to_lowercase();
    let stopwords: HashSet<&str> = tuning.stopwords.iter().map(String::as_str).collect();
    let mut seen = HashSet::new();
    let mut keywords = Vec::new();

    for raw in TOKEN_SPLIT_RE.split(&lowered) {
        let token = raw.trim_matches(|c| c == '.' || c == '-' || c == '/');
        if token.chars().count() < tuning.min_keyword_len || stopwords.contains(token) {
            continue;
        }
        if seen.insert(token.to_string()) {
            keywords.push(token.to_string());
            if keywords.len() >= tuning.max_keywords {
                break;
            }
        }
    }

    keywords
}

/// Largest index `<= max` that lies on a char boundary of `text`.
fn floor_char_boundary(text: &str, max: usize) -> usize {
    if max >= text.len() {
        return text.len();
    }
    let mut idx = max;
    while idx > 0 && !text.is_char_boundary(idx) {
        idx -= 1;
    }
    idx
}

/// Cut `text` to at most `max_bytes` bytes without splitting a character.
pub fn truncate_bytes(text: &str, max_bytes: usize) -> &str {
    &text[..floor_char_boundary(text, max_bytes)]
}

/// Cut `text` to at most `max_chars` characters.
pub fn truncate_chars(text: &str, max_chars: usize) -> &str {
    match text.char_indices().nth(max_chars) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}

/// Shrink `text` to 85% of its current byte length until it fits `budget_bytes`.
///
/// The result is always `<= budget_bytes` and is a prefix of the input.
pub fn clamp_to_budget(text: &str, budget_bytes: usize) -> &str {
    let mut current = text;
    while current.len() > budget_bytes {
        let target = current.len() * 85 / 100;
        current = &current[..floor_char_boundary(current, target)];
    }
    current
}

/// First line with non-whitespace content, trimmed.
pub fn first_non_blank_line(text: &str) -> Option<&str> {
    text.lines().map(str::trim).find(|l| !l.is_empty())
}
