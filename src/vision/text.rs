//! Fuzzy text matching for OCR output
//!
//! OCR text is noisy: casing, punctuation and accents vary, and short
//! button captions are often read together with neighbouring glyphs. All
//! scores are in [0, 1].

use strsim::normalized_levenshtein;
use unicode_normalization::char::is_combining_mark;
use unicode_normalization::UnicodeNormalization;

/// Course qualifiers printed next to race titles that never identify a race
const DIRECTIONAL_QUALIFIERS: &[&str] = &[
    "LEFT",
    "RIGHT",
    "INNER",
    "OUTER",
    "CLOCKWISE",
    "COUNTERCLOCKWISE",
    "STRAIGHT",
];

/// Result of matching one text against a list of candidates
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TextMatch {
    /// Index of the best candidate (first one on ties)
    pub index: usize,
    pub score: f32,
}

/// Lowercase, strip accents and punctuation, collapse whitespace
pub fn normalize(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut pending_space = false;

    for ch in text.nfd() {
        if is_combining_mark(ch) {
            continue;
        }
        if ch.is_alphanumeric() {
            if pending_space && !out.is_empty() {
                out.push(' ');
            }
            pending_space = false;
            out.extend(ch.to_lowercase());
        } else {
            pending_space = true;
        }
    }

    out
}

/// Whole-string similarity of two texts after normalization
pub fn ratio(a: &str, b: &str) -> f32 {
    let a = normalize(a);
    let b = normalize(b);
    if a.is_empty() || b.is_empty() {
        return 0.0;
    }
    normalized_levenshtein(&a, &b) as f32
}

/// Best similarity of `needle` against any run of consecutive tokens of
/// `haystack` with the same token count.
pub fn partial_ratio(needle: &str, haystack: &str) -> f32 {
    let needle = normalize(needle);
    let haystack = normalize(haystack);
    if needle.is_empty() || haystack.is_empty() {
        return 0.0;
    }

    let needle_tokens = needle.split(' ').count();
    let hay_tokens: Vec<&str> = haystack.split(' ').collect();
    if needle_tokens > hay_tokens.len() {
        return normalized_levenshtein(&needle, &haystack) as f32;
    }

    hay_tokens
        .windows(needle_tokens)
        .map(|window| normalized_levenshtein(&needle, &window.join(" ")) as f32)
        .fold(0.0, f32::max)
}

/// Score OCR text against one expected string
pub fn score(text: &str, expected: &str) -> f32 {
    ratio(text, expected).max(partial_ratio(expected, text))
}

/// Score OCR text against every candidate and keep the best one
pub fn best_match<S: AsRef<str>>(text: &str, candidates: &[S]) -> Option<TextMatch> {
    let mut best: Option<TextMatch> = None;
    for (index, candidate) in candidates.iter().enumerate() {
        let s = score(text, candidate.as_ref());
        if best.map_or(true, |b| s > b.score) {
            best = Some(TextMatch { index, score: s });
        }
    }
    best
}

/// Normalize a race title as printed on a race card.
///
/// Uppercases, strips accents and punctuation, corrects digit/letter OCR
/// confusions inside words, removes course qualifiers and drops
/// single-character tokens.
pub fn normalize_title(text: &str) -> String {
    normalize(text)
        .to_uppercase()
        .split(' ')
        .map(fix_confusions)
        .filter(|token| token.chars().count() > 1)
        .filter(|token| !DIRECTIONAL_QUALIFIERS.contains(&token.as_str()))
        .collect::<Vec<_>>()
        .join(" ")
}

/// Score an OCR'd title against an expected title
pub fn title_score(ocr_text: &str, expected_title: &str) -> f32 {
    let a = normalize_title(ocr_text);
    let b = normalize_title(expected_title);
    if a.is_empty() || b.is_empty() {
        return 0.0;
    }
    score(&a, &b)
}

fn fix_confusions(token: &str) -> String {
    let has_letter = token.chars().any(|c| c.is_ascii_alphabetic());
    let fixed: String = if has_letter {
        token
            .chars()
            .map(|c| match c {
                '0' => 'O',
                '1' => 'I',
                '5' => 'S',
                '8' => 'B',
                _ => c,
            })
            .collect()
    } else {
        token.to_string()
    };
    fixed.replace("VV", "W")
}
