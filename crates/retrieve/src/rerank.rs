//! Candidate scoring, ordering, and diversity sampling.
//!
//! Scoring layers, each bounded:
//! semantic overlap (0..1, dominant) + recency bonus (0..0.08)
//! + promotional penalty (−0.2..0) + low-content penalty (−0.2..0),
//! with the total clamped back to [0, 1].  Ordering is deterministic:
//! score descending, then the item's declared tie-break ascending.

use std::collections::{BTreeSet, HashMap, HashSet};

use chrono::{DateTime, Utc};

use thor_normalize::normalize_for_match;

/// Anything the scorer can rank: fresh candidates out of the adapters and
/// already-stored knowledge items alike.
pub trait Rankable {
    fn title(&self) -> &str;
    fn content(&self) -> &str;
    fn source_slug(&self) -> &str;
    fn timestamp(&self) -> Option<DateTime<Utc>>;
    /// Lower wins on score ties.  Use a stable per-source rank or id.
    fn tie_break(&self) -> usize;
}

impl Rankable for thor_store::KnowledgeItem {
    fn title(&self) -> &str {
        &self.title
    }

    fn content(&self) -> &str {
        &self.content
    }

    fn source_slug(&self) -> &str {
        &self.source_adapter
    }

    fn timestamp(&self) -> Option<DateTime<Utc>> {
        self.published_at.or(Some(self.learned_at))
    }

    fn tie_break(&self) -> usize {
        self.id as usize
    }
}

#[derive(Debug, Clone)]
pub struct RerankOptions {
    pub limit: usize,
    /// Cap per-source contribution and backfill from the global order.
    /// Used for comparison queries so one engine cannot dominate.
    pub diversify: bool,
    pub per_source_cap: usize,
}

/// Alias pairs expanded in both directions during term matching.
const SYNONYMS: &[(&str, &str)] = &[
    ("js", "javascript"),
    ("ts", "typescript"),
    ("py", "python"),
    ("golang", "go"),
    ("k8s", "kubernetes"),
    ("ml", "machine learning"),
    ("ai", "artificial intelligence"),
    ("db", "database"),
];

fn tokenize(text: &str) -> BTreeSet<String> {
    text.split(|ch: char| !ch.is_alphanumeric())
        .filter(|t| t.len() >= 2)
        .map(|t| t.to_lowercase())
        .collect()
}

fn aliases(term: &str) -> Vec<String> {
    let mut out = vec![term.to_string()];
    for (short, long) in SYNONYMS {
        if term == *short {
            out.extend(long.split_whitespace().map(String::from));
        } else if long.split_whitespace().any(|w| w == term) {
            out.push((*short).to_string());
        }
    }
    out
}

/// Keyword-overlap relevance with synonym expansion, in [0, 1].
pub fn semantic_score(query: &str, title: &str, content: &str) -> f32 {
    let query_terms = tokenize(query);
    if query_terms.is_empty() {
        return 0.0;
    }
    let text = format!("{title} {content}");
    let text_terms = tokenize(&text);

    let matched = query_terms
        .iter()
        .filter(|term| aliases(term).iter().any(|alias| text_terms.contains(alias)))
        .count();
    matched as f32 / query_terms.len() as f32
}

fn recency_bonus(timestamp: Option<DateTime<Utc>>) -> f32 {
    match timestamp {
        Some(ts) => {
            let age_days = (Utc::now() - ts).num_days().max(0) as f32;
            0.08 * (-age_days / 90.0).exp()
        }
        None => 0.0,
    }
}

/// Safety net for ad copy that survived normalization.
const PROMO_VOCABULARY: &[&str] = &[
    "click here",
    "subscribe",
    "buy now",
    "sign up",
    "signup",
    "join now",
    "limited offer",
    "official website",
    "discount",
    "coupon",
];

fn promotional_penalty(content: &str) -> f32 {
    let lower = content.to_lowercase();
    if PROMO_VOCABULARY.iter().any(|p| lower.contains(p)) {
        -0.2
    } else {
        0.0
    }
}

fn low_content_penalty(content: &str) -> f32 {
    if content.is_empty() {
        return -0.2;
    }
    if content.split_whitespace().count() < 6 {
        return -0.1;
    }
    if content.len() < 24 {
        return -0.05;
    }
    0.0
}

pub fn score<T: Rankable>(query: &str, item: &T) -> f32 {
    let total = semantic_score(query, item.title(), item.content())
        + recency_bonus(item.timestamp())
        + promotional_penalty(item.content())
        + low_content_penalty(item.content());
    total.clamp(0.0, 1.0)
}

/// Order `items` for `query` and return the top `opts.limit`.
///
/// Zero-score items are dropped.  Duplicate titles (case-insensitive,
/// trimmed) collapse to the first occurrence; untitled items pass through.
pub fn rerank<T: Rankable>(query: &str, items: Vec<T>, opts: &RerankOptions) -> Vec<T> {
    let mut seen_titles: HashSet<String> = HashSet::new();
    let deduped: Vec<T> = items
        .into_iter()
        .filter(|item| {
            let title = normalize_for_match(item.title());
            title.is_empty() || seen_titles.insert(title)
        })
        .collect();

    let mut scored: Vec<(f32, T)> = deduped
        .into_iter()
        .map(|item| (score(query, &item), item))
        .filter(|(s, _)| *s > 0.0)
        .collect();
    scored.sort_by(|(left_score, left), (right_score, right)| {
        right_score
            .total_cmp(left_score)
            .then_with(|| left.tie_break().cmp(&right.tie_break()))
    });

    let ordered: Vec<T> = scored.into_iter().map(|(_, item)| item).collect();
    if opts.diversify {
        let order = diversity_order(&ordered, opts.per_source_cap, opts.limit);
        let mut slots: Vec<Option<T>> = ordered.into_iter().map(Some).collect();
        order.into_iter().filter_map(|i| slots[i].take()).collect()
    } else {
        ordered.into_iter().take(opts.limit).collect()
    }
}

/// Selection order for diversity sampling over an already score-ordered
/// list: up to `per_source` from each source cluster (clusters visited in
/// order of first appearance), then backfill from the global order.
fn diversity_order<T: Rankable>(items: &[T], per_source: usize, limit: usize) -> Vec<usize> {
    let mut cluster_order: Vec<&str> = Vec::new();
    let mut clusters: HashMap<&str, Vec<usize>> = HashMap::new();
    for (i, item) in items.iter().enumerate() {
        let source = item.source_slug();
        if !clusters.contains_key(source) {
            cluster_order.push(source);
        }
        clusters.entry(source).or_default().push(i);
    }

    let mut selected: Vec<usize> = Vec::new();
    let mut picked: HashSet<usize> = HashSet::new();
    for source in &cluster_order {
        for &i in clusters[source].iter().take(per_source) {
            if selected.len() >= limit {
                return selected;
            }
            selected.push(i);
            picked.insert(i);
        }
    }
    for i in 0..items.len() {
        if selected.len() >= limit {
            break;
        }
        if picked.insert(i) {
            selected.push(i);
        }
    }
    selected
}
