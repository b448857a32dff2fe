//! Snippet extraction and query-term highlighting.

use regex::RegexBuilder;
use std::collections::BTreeSet;

/// Maximum snippet length in characters, before ellipses and highlighting.
const MAX_SNIPPET_CHARS: usize = 300;

/// Sliding window width in whitespace-delimited words.
const WINDOW_WORDS: usize = 50;

/// Build a highlighted snippet for a chunk.
///
/// Selects the earliest 50-word window containing the most query terms,
/// bounds it to 300 characters with ellipses, then wraps each query-term
/// occurrence in `<mark>` tags (case-insensitive, word-boundary anchored).
pub fn build_snippet(content: &str, query: &str) -> String {
    let terms = query_terms(query);
    let snippet = select_window(content, &terms);
    highlight(&snippet, &terms)
}

/// Lowercased query terms, in a sorted set so highlighting is deterministic.
fn query_terms(query: &str) -> BTreeSet<String> {
    query
        .to_lowercase()
        .split_whitespace()
        .map(|t| t.to_string())
        .collect()
}

fn strip_trailing_punctuation(word: &str) -> &str {
    word.trim_end_matches(['.', ',', ';', ':'])
}

/// Pick the best window of the content and bound it to the snippet length cap.
///
/// Windows are scored by how many of their words (lowercased, trailing
/// `.,;:` stripped) are query terms; the earliest window with the maximal
/// score wins. The result never exceeds 300 characters plus one leading and
/// one trailing ellipsis.
fn select_window(content: &str, terms: &BTreeSet<String>) -> String {
    let words: Vec<&str> = content.split_whitespace().collect();
    if words.is_empty() {
        return String::new();
    }

    let mut best_start = 0;
    let mut best_score = 0;

    for start in 0..words.len() {
        let end = (start + WINDOW_WORDS).min(words.len());
        let score = words[start..end]
            .iter()
            .filter(|w| terms.contains(strip_trailing_punctuation(&w.to_lowercase())))
            .count();
        // Strictly greater keeps the earliest window on ties
        if score > best_score {
            best_score = score;
            best_start = start;
        }
    }

    let window_end = (best_start + WINDOW_WORDS).min(words.len());
    let mut snippet = words[best_start..window_end].join(" ");

    let mut truncated = false;
    if snippet.len() > MAX_SNIPPET_CHARS {
        let cut = (0..=MAX_SNIPPET_CHARS)
            .rev()
            .find(|&i| snippet.is_char_boundary(i))
            .unwrap_or(0);
        snippet.truncate(cut);
        snippet.push_str("...");
        truncated = true;
    }

    if best_start > 0 {
        snippet = format!("...{}", snippet);
    }
    if window_end < words.len() && !truncated {
        snippet.push_str("...");
    }

    snippet
}

/// Wrap every occurrence of every query term in `<mark>` tags.
///
/// Terms are escaped before being compiled into patterns, so query text
/// containing regex metacharacters cannot break matching.
fn highlight(snippet: &str, terms: &BTreeSet<String>) -> String {
    let mut highlighted = snippet.to_string();
    for term in terms {
        let pattern = format!(r"\b({})\b", regex::escape(term));
        let re = match RegexBuilder::new(&pattern).case_insensitive(true).build() {
            Ok(re) => re,
            Err(_) => continue,
        };
        highlighted = re
            .replace_all(&highlighted, "<mark>$1</mark>")
            .into_owned();
    }
    highlighted
}
