//! Query shape detection: comparison/relationship queries and programming
//! query enhancement.

/// Multi-word phrases whose presence marks a query as wanting multiple
/// sources and perspectives.
const COMPARISON_PHRASES: &[&str] = &[
    "relationship between",
    "relationship of",
    "connection between",
    "connection of",
    "difference between",
    "comparison between",
    "similarities between",
    "what is the relationship",
    "what is the connection",
    "how does",
    "how do",
    "how are",
    "how is",
    "compare",
];

/// Single tokens with the same meaning; matched on word boundaries so that
/// e.g. "investigate" does not trip the "vs" check.
const COMPARISON_TOKENS: &[&str] = &["vs", "vs.", "versus"];

/// Language names that mark a query as programming-related.  Queries about
/// these tend to drown in shopping results without extra context terms.
const PROGRAMMING_KEYWORDS: &[&str] = &[
    "kotlin",
    "python",
    "javascript",
    "java",
    "c++",
    "typescript",
    "golang",
    "rust",
    "ruby",
    "php",
    "swift",
    "scala",
];

pub fn is_comparison_query(query: &str) -> bool {
    let lower = query.to_lowercase();
    if COMPARISON_PHRASES.iter().any(|p| lower.contains(p)) {
        return true;
    }
    lower
        .split_whitespace()
        .any(|word| COMPARISON_TOKENS.contains(&word))
}

/// For "… between X and Y" queries, pull out the two topics so each can be
/// researched individually.  Returns `None` when the shape doesn't match or
/// either side is too short to be meaningful.
pub fn split_comparison_topics(query: &str) -> Option<(String, String)> {
    let lower = query.to_lowercase();
    let words: Vec<&str> = lower
        .split_whitespace()
        .map(|w| w.trim_matches(|c: char| matches!(c, ',' | '.' | '?')))
        .collect();

    let pivot = words.iter().position(|w| *w == "between" || *w == "of")?;
    let and = words[pivot + 1..]
        .iter()
        .position(|w| *w == "and")
        .map(|i| pivot + 1 + i)?;

    let first = words[pivot + 1..and].join(" ");
    let second = words[and + 1..].join(" ");
    if first.len() > 3 && second.len() > 3 {
        Some((first, second))
    } else {
        None
    }
}

/// Append context terms to bare programming-language queries so general
/// engines return documentation instead of merchandise.
pub fn enhance_programming_query(query: &str) -> String {
    let lower = query.to_lowercase();
    if lower.contains("programming") || lower.contains("tutorial") {
        return query.to_string();
    }

    let is_programming = lower
        .split(|ch: char| ch.is_whitespace())
        .any(|word| PROGRAMMING_KEYWORDS.contains(&word));
    if is_programming {
        format!("{query} programming tutorial")
    } else {
        query.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn detects_comparison_phrases() {
        assert!(is_comparison_query("difference between tcp and udp"));
        assert!(is_comparison_query("graphql vs rest"));
        assert!(is_comparison_query("how does photosynthesis work"));
        assert!(!is_comparison_query("rust ownership model"));
    }

    #[test]
    fn vs_requires_word_boundary() {
        assert!(!is_comparison_query("investigate the incident"));
        assert!(is_comparison_query("s3 versus gcs pricing"));
    }

    #[test]
    fn splits_between_pairs() {
        let (a, b) = split_comparison_topics("difference between quantum computing and classical computing").unwrap();
        assert_eq!(a, "quantum computing");
        assert_eq!(b, "classical computing");
    }

    #[test]
    fn split_rejects_short_sides() {
        assert!(split_comparison_topics("difference between a and b").is_none());
        assert!(split_comparison_topics("no pivot words here").is_none());
    }

    #[test]
    fn enhances_bare_language_queries() {
        assert_eq!(
            enhance_programming_query("kotlin coroutines"),
            "kotlin coroutines programming tutorial"
        );
        // Already qualified queries pass through.
        assert_eq!(
            enhance_programming_query("python tutorial for beginners"),
            "python tutorial for beginners"
        );
        // Substrings of other words do not count.
        assert_eq!(enhance_programming_query("go to the store"), "go to the store");
    }
}
