//! Text preparation for speech — encyclopedia markup cleanup and chunking.
//!
//! Pure functions, no I/O.

use regex::Regex;
use std::sync::LazyLock;

// Compiled once.
static RE_CITATION: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\[(?:\d+|[a-z]|citation needed|note \d+)\]").unwrap());
static RE_EMPTY_PARENS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\(\s*[;,]?\s*\)").unwrap());
static RE_SPACE_BEFORE_PUNCT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\s+([,.;:!?])").unwrap());
static RE_WHITESPACE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\s+").unwrap());

/// Default maximum synthesis request length for [`split_text`].
pub const DEFAULT_MAX_CHUNK_LEN: usize = 200;

/// Make article text read naturally: drop reference markers like `[12]`,
/// empty parentheses left behind by stripped pronunciations, and collapse
/// whitespace.
pub fn clean_text_for_speech(text: &str) -> String {
    let c = RE_CITATION.replace_all(text, "");
    let c = RE_EMPTY_PARENS.replace_all(&c, "");
    let c = RE_WHITESPACE.replace_all(&c, " ");
    let c = RE_SPACE_BEFORE_PUNCT.replace_all(&c, "$1");
    c.trim().to_string()
}

/// True when the text has something worth sending to a synthesizer.
pub fn is_speakable(text: &str) -> bool {
    text.chars().any(char::is_alphanumeric)
}

/// Split text into sentences at `.`, `!` or `?` followed by whitespace, and
/// at blank lines. Returns trimmed, non-empty sentences.
pub fn split_sentences(text: &str) -> Vec<String> {
    let mut sentences = Vec::new();
    let mut current = String::new();
    let mut chars = text.chars().peekable();

    while let Some(c) = chars.next() {
        if c == '\n' && chars.peek() == Some(&'\n') {
            push_trimmed(&mut sentences, &current);
            current.clear();
            while chars.peek() == Some(&'\n') {
                chars.next();
            }
            continue;
        }
        current.push(c);
        if matches!(c, '.' | '!' | '?') && chars.peek().is_some_and(|n| n.is_whitespace()) {
            push_trimmed(&mut sentences, &current);
            current.clear();
        }
    }
    push_trimmed(&mut sentences, &current);
    sentences
}

/// Split text into chunks of at most `max_len` bytes, preferring sentence
/// boundaries, then word boundaries, then a hard split on a char boundary.
pub fn split_text(text: &str, max_len: usize) -> Vec<String> {
    let mut chunks = Vec::new();
    for sentence in split_sentences(text) {
        let mut rest = sentence.as_str();
        while rest.len() > max_len {
            let cut = split_point(rest, max_len);
            push_trimmed(&mut chunks, &rest[..cut]);
            rest = rest[cut..].trim_start();
        }
        push_trimmed(&mut chunks, rest);
    }
    chunks
}

fn split_point(text: &str, max_len: usize) -> usize {
    let mut limit = max_len;
    while !text.is_char_boundary(limit) {
        limit -= 1;
    }
    match text[..limit].rfind(' ') {
        Some(pos) if pos >= max_len / 3 => pos,
        _ if limit == 0 => text.chars().next().map_or(text.len(), char::len_utf8),
        _ => limit,
    }
}

fn push_trimmed(out: &mut Vec<String>, chunk: &str) {
    let chunk = chunk.trim();
    if !chunk.is_empty() {
        out.push(chunk.to_string());
    }
}
