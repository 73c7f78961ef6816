//! Equivalence check between two generated fixes.
//!
//! Code is normalized (HTML and block comments removed, whitespace collapsed,
//! lowercased) and split into word and punctuation tokens. Similarity is the
//! LCS ratio `2 * lcs / (len_a + len_b)`, so token order matters but
//! formatting and comments do not.

use std::sync::OnceLock;

use regex::Regex;

fn comment_pattern() -> Option<&'static Regex> {
    static PATTERN: OnceLock<Option<Regex>> = OnceLock::new();
    PATTERN
        .get_or_init(|| Regex::new(r"(?s)<!--.*?-->|/\*.*?\*/").ok())
        .as_ref()
}

fn token_pattern() -> Option<&'static Regex> {
    static PATTERN: OnceLock<Option<Regex>> = OnceLock::new();
    PATTERN
        .get_or_init(|| Regex::new(r"\w+|[^\s\w]").ok())
        .as_ref()
}

pub fn normalize(code: &str) -> String {
    let stripped = match comment_pattern() {
        Some(re) => re.replace_all(code, " ").into_owned(),
        None => code.to_string(),
    };
    stripped
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}

pub fn tokenize(code: &str) -> Vec<String> {
    let normalized = normalize(code);
    match token_pattern() {
        Some(re) => re
            .find_iter(&normalized)
            .map(|m| m.as_str().to_string())
            .collect(),
        None => normalized.split(' ').map(str::to_string).collect(),
    }
}

/// Similarity in `[0, 1]`; two empty inputs are identical.
pub fn similarity(a: &str, b: &str) -> f64 {
    let ta = tokenize(a);
    let tb = tokenize(b);
    if ta.is_empty() && tb.is_empty() {
        return 1.0;
    }
    let lcs = lcs_len(&ta, &tb);
    (2 * lcs) as f64 / (ta.len() + tb.len()) as f64
}

/// Two fixes agree when their similarity reaches `threshold`.
pub fn agree(a: &str, b: &str, threshold: f64) -> bool {
    similarity(a, b) >= threshold
}

// Two-row DP: prev[j] = LCS of a[..i-1] and b[..j].
fn lcs_len(a: &[String], b: &[String]) -> usize {
    if a.is_empty() || b.is_empty() {
        return 0;
    }
    let mut prev = vec![0usize; b.len() + 1];
    let mut curr = vec![0usize; b.len() + 1];
    for x in a {
        for (j, y) in b.iter().enumerate() {
            curr[j + 1] = if x == y {
                prev[j] + 1
            } else {
                curr[j].max(prev[j + 1])
            };
        }
        std::mem::swap(&mut prev, &mut curr);
    }
    prev[b.len()]
}
