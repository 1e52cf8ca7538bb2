//! Suggestion ranking
//!
//! Scores clipboard items against a question and the focused application.
//! Two modes:
//!
//! - vector mode, when the vector index returned similarities: semantic
//!   similarity dominates, blended with recency, usage, app and tag signals;
//! - fallback mode, when it did not: lexical token overlap replaces
//!   similarity and the app match weighs more.
//!
//! Ranking is a pure function of its inputs.

use crate::item::ClipboardItem;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::cmp::Ordering;
use std::collections::HashMap;

/// Tags that hint at developer or contact data and get a small boost
const COMMON_TAGS: &[&str] = &["code", "terminal", "error", "url", "email", "command"];

/// Items whose trimmed content is shorter than this never surface in vector mode
const MIN_CONTENT_CHARS: usize = 3;

/// A ranking query
#[derive(Debug, Clone)]
pub struct RankRequest {
    pub query: String,
    pub current_app: Option<String>,
    pub now: DateTime<Utc>,
    pub top_k: usize,
}

impl RankRequest {
    pub fn new(query: impl Into<String>, current_app: Option<String>) -> Self {
        Self {
            query: query.into(),
            current_app,
            now: Utc::now(),
            top_k: 3,
        }
    }

    pub fn with_top_k(mut self, top_k: usize) -> Self {
        self.top_k = top_k;
        self
    }

    pub fn at(mut self, now: DateTime<Utc>) -> Self {
        self.now = now;
        self
    }
}

/// An item with its relevance score
#[derive(Debug, Clone, Serialize)]
pub struct RankedSuggestion {
    pub item: ClipboardItem,
    pub score: f64,
}

/// Rank `candidates` for `request`
///
/// `similarities` maps vector ids to raw similarity scores. When it is
/// empty the lexical fallback is used.
pub fn rank(
    request: &RankRequest,
    candidates: &[ClipboardItem],
    similarities: &HashMap<String, f32>,
) -> Vec<RankedSuggestion> {
    let mut scored: Vec<RankedSuggestion> = if similarities.is_empty() {
        candidates
            .iter()
            .map(|item| RankedSuggestion {
                score: fallback_score(request, item),
                item: item.clone(),
            })
            .collect()
    } else {
        candidates
            .iter()
            .filter(|item| item.content.trim().chars().count() >= MIN_CONTENT_CHARS)
            .filter_map(|item| {
                let sim = item
                    .vector_id
                    .as_ref()
                    .and_then(|vid| similarities.get(vid))?;
                Some(RankedSuggestion {
                    score: vector_score(request, item, *sim),
                    item: item.clone(),
                })
            })
            .collect()
    };

    scored.sort_by(|a, b| {
        b.score
            .partial_cmp(&a.score)
            .unwrap_or(Ordering::Equal)
            .then_with(|| b.item.timestamp.cmp(&a.item.timestamp))
    });
    scored.truncate(request.top_k);

    tracing::debug!(
        "Ranked {} candidates ({} mode), kept {}",
        candidates.len(),
        if similarities.is_empty() { "fallback" } else { "vector" },
        scored.len()
    );

    scored
}

fn vector_score(request: &RankRequest, item: &ClipboardItem, similarity: f32) -> f64 {
    let sim = (similarity as f64).clamp(0.0, 1.0);
    let app_bonus = if app_matches(request, item) { 0.1 } else { 0.0 };

    0.5 * sim
        + 0.15 * recency(request, item)
        + 0.10 * frequency(item)
        + app_bonus
        + 0.15 * tag_relevance(&item.tags, &request.query, request.current_app.as_deref())
}

fn fallback_score(request: &RankRequest, item: &ClipboardItem) -> f64 {
    let app_match = if app_matches(request, item) { 1.0 } else { 0.0 };

    0.3 * token_overlap(&request.query, &item.content)
        + 0.25 * recency(request, item)
        + 0.15 * frequency(item)
        + 0.2 * app_match
        + 0.1 * tag_relevance(&item.tags, &request.query, request.current_app.as_deref())
}

/// e^(-hours/24)
fn recency(request: &RankRequest, item: &ClipboardItem) -> f64 {
    (-item.age_hours(request.now) / 24.0).exp()
}

fn frequency(item: &ClipboardItem) -> f64 {
    (item.usage_count as f64 / 10.0).min(1.0)
}

fn app_matches(request: &RankRequest, item: &ClipboardItem) -> bool {
    match (&request.current_app, &item.source_app) {
        (Some(current), Some(source)) => current == source,
        _ => false,
    }
}

/// Fraction of whitespace-separated query tokens found in the content
///
/// Case-insensitive substring match. An empty query scores 0.5.
pub fn token_overlap(query: &str, content: &str) -> f64 {
    let query = query.to_lowercase();
    let tokens: Vec<&str> = query.split_whitespace().collect();
    if tokens.is_empty() {
        return 0.5;
    }
    let content = content.to_lowercase();
    let found = tokens.iter().filter(|t| content.contains(*t)).count();
    found as f64 / tokens.len() as f64
}

/// Tag relevance in [0, 1]
pub fn tag_relevance(tags: &[String], query: &str, current_app: Option<&str>) -> f64 {
    let query = query.to_lowercase();
    let app = current_app.map(str::to_lowercase).unwrap_or_default();

    let total: f64 = tags
        .iter()
        .map(|tag| {
            let tag = tag.to_lowercase();
            let mut score = 0.0;
            if !tag.is_empty() && query.contains(&tag) {
                score += 0.3;
            }
            if !tag.is_empty() && !app.is_empty() && (app.contains(&tag) || tag.contains(&app)) {
                score += 0.25;
            }
            if COMMON_TAGS.contains(&tag.as_str()) {
                score += 0.05;
            }
            score
        })
        .sum();

    total.clamp(0.0, 1.0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn item(content: &str, hours_ago: i64, now: DateTime<Utc>) -> ClipboardItem {
        ClipboardItem::text(content, None).with_timestamp(now - Duration::hours(hours_ago))
    }

    fn with_vector(mut item: ClipboardItem, vid: &str) -> ClipboardItem {
        item.vector_id = Some(vid.to_string());
        item
    }

    #[test]
    fn test_token_overlap() {
        assert_eq!(token_overlap("", "anything"), 0.5);
        assert_eq!(token_overlap("   ", "anything"), 0.5);
        assert_eq!(token_overlap("Tracking Number", "your tracking number is 1Z"), 1.0);
        assert_eq!(token_overlap("tracking pizza", "tracking number"), 0.5);
        assert_eq!(token_overlap("pizza", "tracking number"), 0.0);
    }

    #[test]
    fn test_tag_relevance() {
        let tags = vec!["shipping".to_string()];
        assert!((tag_relevance(&tags, "my shipping status", None) - 0.3).abs() < 1e-9);

        let tags = vec!["terminal".to_string()];
        // app contains tag, and tag is common
        assert!((tag_relevance(&tags, "", Some("Terminal")) - 0.30).abs() < 1e-9);

        let tags = vec!["code".to_string()];
        // query match + app substring ("code" in "VS Code") + common
        assert!((tag_relevance(&tags, "code snippet", Some("VS Code")) - 0.6).abs() < 1e-9);

        assert_eq!(tag_relevance(&[], "query", Some("App")), 0.0);
    }

    #[test]
    fn test_tag_relevance_clamped() {
        let tags: Vec<String> = ["code", "terminal", "error", "url", "email"]
            .iter()
            .map(|s| s.to_string())
            .collect();
        let score = tag_relevance(&tags, "code terminal error url email", None);
        assert_eq!(score, 1.0);
    }

    #[test]
    fn test_empty_app_never_matches_tags() {
        let tags = vec!["notes".to_string()];
        assert_eq!(tag_relevance(&tags, "", Some("")), 0.0);
    }

    #[test]
    fn test_fallback_prefers_overlap_and_recency() {
        let now = Utc::now();
        let candidates = vec![
            item("Dinner reservation at 7pm", 1, now),
            item("Your tracking number is 1Z999AA10123456784", 2, now),
            item("Meeting notes from Monday", 2, now),
        ];
        let request = RankRequest::new("what is my tracking number", None).at(now);

        let ranked = rank(&request, &candidates, &HashMap::new());
        assert_eq!(ranked.len(), 3);
        assert!(ranked[0].item.content.contains("tracking number"));
    }

    #[test]
    fn test_vector_mode_excludes_items_without_vector_id() {
        let now = Utc::now();
        let a = with_vector(item("first item content", 1, now), "a");
        let b = item("second item content", 1, now);
        let c = with_vector(item("hi", 1, now), "c");
        let mut sims = HashMap::new();
        sims.insert("a".to_string(), 0.4);
        sims.insert("c".to_string(), 0.9);

        let request = RankRequest::new("anything", None).at(now);
        let ranked = rank(&request, &[a.clone(), b, c], &sims);
        assert_eq!(ranked.len(), 1);
        assert_eq!(ranked[0].item.id, a.id);
    }

    /// Candidate A: tagged "tracking", copied in Mail two hours ago, used 5 times.
    /// Candidate B: untagged, copied in Safari 300 hours ago, never used.
    fn tracking_candidates(now: DateTime<Utc>) -> (ClipboardItem, ClipboardItem) {
        let mut a = item("1Z999AA10123456784", 2, now);
        a.tags = vec!["tracking".to_string()];
        a.source_app = Some("Mail".to_string());
        a.usage_count = 5;
        a.vector_id = Some("a".to_string());

        let mut b = item("tracking number lookup", 300, now);
        b.source_app = Some("Safari".to_string());
        b.vector_id = Some("b".to_string());
        (a, b)
    }

    #[test]
    fn test_tracking_number_scenario_vector_mode() {
        let now = Utc::now();
        let (a, b) = tracking_candidates(now);
        let mut sims = HashMap::new();
        sims.insert("a".to_string(), 0.8);
        sims.insert("b".to_string(), 0.8);

        let request = RankRequest::new("tracking number", Some("Mail".to_string())).at(now);
        let ranked = rank(&request, &[b.clone(), a.clone()], &sims);
        assert_eq!(ranked[0].item.id, a.id);
        assert_eq!(ranked[1].item.id, b.id);
        assert!(ranked[0].score > ranked[1].score);
    }

    #[test]
    fn test_tracking_number_scenario_fallback_mode() {
        let now = Utc::now();
        let (a, b) = tracking_candidates(now);

        let request = RankRequest::new("tracking number", Some("Mail".to_string())).at(now);
        let ranked = rank(&request, &[b.clone(), a.clone()], &HashMap::new());
        assert_eq!(ranked[0].item.id, a.id);
        assert!(ranked[0].score > ranked[1].score);
    }

    #[test]
    fn test_app_match_bonus() {
        let now = Utc::now();
        let mut in_app = item("same text body", 5, now);
        in_app.source_app = Some("Terminal".to_string());
        let mut elsewhere = item("same text body", 5, now);
        elsewhere.source_app = Some("Safari".to_string());

        let request = RankRequest::new("", Some("Terminal".to_string())).at(now);
        let ranked = rank(&request, &[elsewhere, in_app.clone()], &HashMap::new());
        assert_eq!(ranked[0].item.id, in_app.id);
        assert!((ranked[0].score - ranked[1].score - 0.2).abs() < 1e-9);
    }

    #[test]
    fn test_frequency_caps_at_ten_uses() {
        let now = Utc::now();
        let mut heavy = item("used a lot", 0, now);
        heavy.usage_count = 50;
        let mut ten = item("used a lot", 0, now);
        ten.usage_count = 10;
        let request = RankRequest::new("", None).at(now);
        let a = fallback_score(&request, &heavy);
        let b = fallback_score(&request, &ten);
        assert!((a - b).abs() < 1e-9);
    }

    #[test]
    fn test_ties_break_newest_first() {
        let now = Utc::now();
        let older = item("identical", 0, now).with_timestamp(now - Duration::seconds(1));
        let newer = item("identical", 0, now).with_timestamp(now);
        // Ten years on, recency is zero for both and the scores tie exactly
        let request = RankRequest::new("", None).at(now + Duration::days(3650));
        let ranked = rank(&request, &[older.clone(), newer.clone()], &HashMap::new());
        assert_eq!(ranked[0].score, ranked[1].score);
        assert_eq!(ranked[0].item.id, newer.id);
        assert_eq!(ranked[1].item.id, older.id);
    }

    #[test]
    fn test_truncates_to_top_k_and_is_idempotent() {
        let now = Utc::now();
        let candidates: Vec<_> = (0..10)
            .map(|i| item(&format!("note number {}", i), i, now))
            .collect();
        let request = RankRequest::new("note", None).at(now).with_top_k(3);

        let first = rank(&request, &candidates, &HashMap::new());
        let second = rank(&request, &candidates, &HashMap::new());
        assert_eq!(first.len(), 3);
        let ids_a: Vec<_> = first.iter().map(|s| s.item.id).collect();
        let ids_b: Vec<_> = second.iter().map(|s| s.item.id).collect();
        assert_eq!(ids_a, ids_b);
        // scores are descending
        assert!(first.windows(2).all(|w| w[0].score >= w[1].score));
    }

    #[test]
    fn test_similarity_is_clamped() {
        let now = Utc::now();
        let a = with_vector(item("alpha beta gamma", 0, now), "a");
        let mut sims = HashMap::new();
        sims.insert("a".to_string(), 3.5);
        let request = RankRequest::new("", None).at(now);
        let ranked = rank(&request, &[a], &sims);
        // 0.5 * 1 + 0.15 * ~1 + 0 + 0 + 0
        assert!(ranked[0].score <= 0.65 + 1e-6);
    }
}
