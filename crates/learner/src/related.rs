//! Related-topic discovery from crawled content.

use std::collections::HashSet;
use std::sync::LazyLock;

use regex::Regex;

/// Phrases that introduce a related concept in encyclopedic prose.
static RELATED_PATTERNS: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    [
        r"also known as ([^.,;]+)",
        r"related to ([^.,;]+)",
        r"similar to ([^.,;]+)",
        r"a type of ([^.,;]+)",
        r"a form of ([^.,;]+)",
    ]
    .iter()
    .map(|p| Regex::new(&format!("(?i){p}")).expect("static related pattern"))
    .collect()
});

/// Candidate names must be long enough to be a topic and short enough not
/// to be a swallowed clause.
const MIN_NAME_CHARS: usize = 4;
const MAX_NAME_CHARS: usize = 49;

/// Pull up to `cap` related topic names out of a body of crawled text.
pub fn extract_related_topics(content: &str, cap: usize) -> Vec<String> {
    let lower = content.to_lowercase();
    let mut seen: HashSet<String> = HashSet::new();
    let mut out = Vec::new();

    for pattern in RELATED_PATTERNS.iter() {
        for captures in pattern.captures_iter(&lower) {
            if out.len() >= cap {
                return out;
            }
            let Some(m) = captures.get(1) else {
                continue;
            };
            let name = m.as_str().trim().trim_matches(',').trim();
            if name.len() < MIN_NAME_CHARS || name.len() > MAX_NAME_CHARS {
                continue;
            }
            if seen.insert(name.to_string()) {
                out.push(name.to_string());
            }
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extracts_known_phrases() {
        let content = "TLS, also known as transport layer security, is related to \
                       public key cryptography. It is a form of encrypted transport.";
        let related = extract_related_topics(content, 5);
        assert!(related.contains(&"transport layer security".to_string()));
        assert!(related.contains(&"public key cryptography".to_string()));
        assert!(related.contains(&"encrypted transport".to_string()));
    }

    #[test]
    fn respects_cap_and_length_bounds() {
        let content = "x is similar to a. y is similar to very long phrase that runs on \
                       far past any reasonable topic name length limit for the store. \
                       z is similar to graphs. w is similar to trees. v is similar to heaps. \
                       u is similar to tries. t is similar to stacks.";
        let related = extract_related_topics(content, 3);
        assert_eq!(related.len(), 3);
        assert!(related.iter().all(|name| name.len() >= 4 && name.len() <= 49));
    }

    #[test]
    fn deduplicates_names() {
        let content = "It is related to graph theory. The field is also related to graph theory.";
        let related = extract_related_topics(content, 5);
        assert_eq!(related, vec!["graph theory".to_string()]);
    }
}
