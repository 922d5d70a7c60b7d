//! Snippet cleaning for crawled content.
//!
//! Everything here is a pure function over `&str`.  Adapters run their raw
//! candidates through [`normalize`] and [`acceptable`] before anything is
//! merged or stored; [`fingerprint`] produces the stable hash used for
//! cross-adapter deduplication.

use std::sync::LazyLock;

use regex::Regex;
use sha2::{Digest, Sha256};

/// Leading ad-copy phrases stripped from snippet starts (and, with a space
/// prefix, from mid-sentence positions).
static PROMO_PREFIXES: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    [
        r"Learn\s+(everything\s+)?(you\s+need\s+to\s+know\s+)?(about\s+)?",
        r"Discover\s+(everything\s+)?(about\s+)?",
        r"Find\s+out\s+(everything\s+)?(about\s+)?",
        r"Get\s+(started\s+)?(with\s+)?(everything\s+)?(about\s+)?",
        r"Explore\s+(everything\s+)?(about\s+)?",
        r"Master\s+(everything\s+)?(about\s+)?",
        r"Unlock\s+(the\s+)?(secrets?\s+of\s+)?",
        r"Click\s+(here\s+)?(to\s+)?",
        r"Visit\s+(our\s+)?(website\s+)?(to\s+)?",
        r"Check\s+out\s+(our\s+)?",
        r"Sign\s+up\s+(for\s+)?",
        r"Subscribe\s+(to\s+)?",
        r"Join\s+(us\s+)?(to\s+)?",
        r"Start\s+(your\s+)?(journey\s+)?(with\s+)?",
    ]
    .iter()
    .map(|p| Regex::new(&format!("(?i)^{p}")).expect("static promo pattern"))
    .collect()
});

static PROMO_INFIXES: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    [
        r"Click\s+(here\s+)?(to\s+)?",
        r"Subscribe\s+(to\s+)?",
        r"Sign\s+up\s+(for\s+)?",
        r"Check\s+out\s+(our\s+)?",
    ]
    .iter()
    .map(|p| Regex::new(&format!(r"(?i)\s+{p}")).expect("static promo pattern"))
    .collect()
});

/// Trailing call-to-action endings replaced with a plain full stop.
static CTA_ENDINGS: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    [
        r"\s+to\s+get\s+started\.?$",
        r"\s+to\s+learn\s+more\.?$",
        r"\s+to\s+find\s+out\s+more\.?$",
        r"\s+to\s+discover\s+more\.?$",
        r"\s+and\s+more\.?$",
    ]
    .iter()
    .map(|p| Regex::new(&format!("(?i){p}")).expect("static CTA pattern"))
    .collect()
});

/// Footnote and citation markers left behind by encyclopedia extracts:
/// `[1]`, `[a]`, `[note 4]`, `[citation needed]`, `[update]`.
static REFERENCE_MARKERS: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\[(\d+|[a-z]|note\s+\d+|citation\s+needed|update|when\?)\]")
        .expect("static reference pattern")
});

/// Openers that mark a result as a landing page rather than content.
static GENERIC_OPENERS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)^(Official|Welcome|Visit|Click)\b").expect("static opener"));

/// Phrases that mark a snippet as ad copy no matter where they appear.
const PROMO_VOCABULARY: &[&str] = &[
    "shop now",
    "buy now",
    "click here",
    "sign up",
    "subscribe",
    "free trial",
    "download now",
    "limited offer",
    "join now",
];

/// Collapse runs of whitespace into single spaces and trim.
pub fn collapse_whitespace(s: &str) -> String {
    s.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn capitalize_first(s: &str) -> String {
    let mut chars = s.chars();
    match chars.next() {
        Some(first) if first.is_lowercase() => {
            first.to_uppercase().collect::<String>() + chars.as_str()
        }
        _ => s.to_string(),
    }
}

/// Remove leading/embedded ad-copy phrasing and trailing calls to action.
pub fn strip_promotional(text: &str) -> String {
    let mut cleaned = text.to_string();

    for pattern in PROMO_PREFIXES.iter() {
        cleaned = pattern.replace(&cleaned, "").into_owned();
    }
    for pattern in CTA_ENDINGS.iter() {
        cleaned = pattern.replace(&cleaned, ".").into_owned();
    }
    for pattern in PROMO_INFIXES.iter() {
        cleaned = pattern.replace_all(&cleaned, " ").into_owned();
    }

    capitalize_first(&collapse_whitespace(&cleaned))
}

/// Remove bracketed footnote numbers and citation markers characteristic of
/// encyclopedia extracts.
pub fn strip_reference_artifacts(text: &str) -> String {
    collapse_whitespace(&REFERENCE_MARKERS.replace_all(text, ""))
}

/// The full cleaning pipeline applied to every candidate body.
///
/// Idempotent: `normalize(normalize(x)) == normalize(x)`.
pub fn normalize(text: &str) -> String {
    strip_promotional(&strip_reference_artifacts(text))
}

/// Case-folded form used for title comparisons and index keys.
pub fn normalize_for_match(text: &str) -> String {
    collapse_whitespace(text).to_lowercase()
}

/// Whether a cleaned body is worth keeping.
///
/// Rejects bodies that are too short, open like a landing page, or still
/// carry call-to-action vocabulary after cleaning.
pub fn acceptable(text: &str, min_content_chars: usize) -> bool {
    let trimmed = text.trim();
    if trimmed.len() < min_content_chars {
        return false;
    }
    if GENERIC_OPENERS.is_match(trimmed) {
        return false;
    }
    let lower = trimmed.to_lowercase();
    !PROMO_VOCABULARY.iter().any(|p| lower.contains(p))
}

/// Stable dedup hash over the normalized title, the first 280 chars of the
/// normalized content, and the producing adapter (truncated to 8 chars so a
/// renamed adapter slug doesn't split history).
pub fn fingerprint(title: &str, content: &str, adapter: &str) -> String {
    let title = normalize_for_match(title);
    let content = normalize_for_match(content);
    let head: String = content.chars().take(280).collect();
    let adapter: String = adapter.chars().take(8).collect();

    let mut hasher = Sha256::new();
    hasher.update(title.as_bytes());
    hasher.update(b"|");
    hasher.update(head.as_bytes());
    hasher.update(b"|");
    hasher.update(adapter.as_bytes());
    format!("{:x}", hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strips_leading_promo_phrase() {
        let cleaned = strip_promotional("Learn everything about Rust ownership in this guide");
        assert_eq!(cleaned, "Rust ownership in this guide");
    }

    #[test]
    fn strips_trailing_cta() {
        let cleaned = strip_promotional("Rust is a memory-safe systems language to learn more");
        assert_eq!(cleaned, "Rust is a memory-safe systems language.");
    }

    #[test]
    fn strips_embedded_ad_copy() {
        let cleaned = strip_promotional("A practical intro to databases. Subscribe for updates");
        assert!(!cleaned.to_lowercase().contains("subscribe"), "got: {cleaned}");
    }

    #[test]
    fn capitalizes_after_strip() {
        let cleaned = strip_promotional("discover quantum computing basics");
        assert!(cleaned.starts_with("Quantum"), "got: {cleaned}");
    }

    #[test]
    fn reference_markers_are_removed() {
        let cleaned =
            strip_reference_artifacts("TCP[1] is a transport protocol[citation needed] used widely[note 2].");
        assert_eq!(cleaned, "TCP is a transport protocol used widely.");
    }

    #[test]
    fn normalize_is_idempotent() {
        let inputs = [
            "Learn everything about the Rust borrow checker to get started",
            "plain factual sentence about photosynthesis with no ad copy",
            "  whitespace   heavy\t\ttext [3] with markers  ",
            "Click here to subscribe now",
            "",
        ];
        for input in inputs {
            let once = normalize(input);
            let twice = normalize(&once);
            assert_eq!(once, twice, "not idempotent for: {input}");
        }
    }

    #[test]
    fn acceptable_rejects_short_bodies() {
        assert!(!acceptable("too short", 40));
        assert!(acceptable(
            "A factual description that is comfortably longer than the minimum body length.",
            40
        ));
    }

    #[test]
    fn acceptable_rejects_generic_openers() {
        assert!(!acceptable(
            "Official website of the Rust programming language with downloads and documentation.",
            40
        ));
        assert!(!acceptable(
            "Welcome to the best resource for learning about databases on the internet today.",
            40
        ));
    }

    #[test]
    fn acceptable_rejects_surviving_ad_copy() {
        assert!(!acceptable(
            "The definitive guide to gardening, shop now for exclusive tools and seeds online.",
            40
        ));
    }

    #[test]
    fn fingerprint_ignores_case_and_spacing() {
        let a = fingerprint("Rust Language", "Rust is   a systems language.", "duckduckgo");
        let b = fingerprint("rust language", "rust is a systems language.", "duckduckgo");
        assert_eq!(a, b);
    }

    #[test]
    fn fingerprint_distinguishes_adapters_by_prefix() {
        let a = fingerprint("Rust", "Same body text here for both.", "bing");
        let b = fingerprint("Rust", "Same body text here for both.", "google");
        assert_ne!(a, b);

        // Only the first 8 chars of the adapter slug participate.
        let c = fingerprint("Rust", "Same body text here for both.", "duckduckgo");
        let d = fingerprint("Rust", "Same body text here for both.", "duckduckg");
        assert_eq!(c, d);
    }

    #[test]
    fn fingerprint_only_hashes_content_head() {
        let head: String = "x".repeat(280);
        let a = fingerprint("t", &format!("{head}AAAA"), "bing");
        let b = fingerprint("t", &format!("{head}BBBB"), "bing");
        assert_eq!(a, b);
    }
}
