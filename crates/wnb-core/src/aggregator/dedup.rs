use std::collections::HashSet;

use tracing::info;

use crate::domain::RawArticle;

pub const DEFAULT_SIMILARITY_THRESHOLD: f64 = 0.85;

/// Drops repeated URLs and near-identical titles, keeping the newest article.
#[derive(Clone, Copy, Debug)]
pub struct Deduplicator {
    threshold: f64,
}

impl Default for Deduplicator {
    fn default() -> Self {
        Self::new(DEFAULT_SIMILARITY_THRESHOLD)
    }
}

impl Deduplicator {
    pub fn new(threshold: f64) -> Self {
        Self { threshold }
    }

    pub fn deduplicate(&self, articles: Vec<RawArticle>) -> Vec<RawArticle> {
        let total = articles.len();
        let mut sorted = articles;
        sorted.sort_by_key(|a| std::cmp::Reverse(a.sort_time()));

        let mut seen_urls: HashSet<String> = HashSet::new();
        let mut seen_titles: Vec<Vec<char>> = Vec::new();
        let mut unique = Vec::with_capacity(sorted.len());

        for article in sorted {
            if seen_urls.contains(&article.url) {
                continue;
            }
            let title: Vec<char> = article.title.trim().to_lowercase().chars().collect();
            if seen_titles
                .iter()
                .any(|seen| similarity(&title, seen) >= self.threshold)
            {
                continue;
            }
            seen_urls.insert(article.url.clone());
            seen_titles.push(title);
            unique.push(article);
        }

        let removed = total - unique.len();
        if removed > 0 {
            info!(removed, "removed duplicate articles");
        }
        unique
    }
}

/// Ratcliff/Obershelp ratio `2*M/T`, where `M` is the number of characters in
/// matching blocks and `T` the combined length.
pub fn similarity(a: &[char], b: &[char]) -> f64 {
    let total = a.len() + b.len();
    if total == 0 {
        return 1.0;
    }
    2.0 * matching_chars(a, b) as f64 / total as f64
}

fn matching_chars(a: &[char], b: &[char]) -> usize {
    let (ai, bi, len) = longest_common_block(a, b);
    if len == 0 {
        return 0;
    }
    len + matching_chars(&a[..ai], &b[..bi]) + matching_chars(&a[ai + len..], &b[bi + len..])
}

/// Longest common substring; ties resolve to the earliest start in `a`, then `b`.
fn longest_common_block(a: &[char], b: &[char]) -> (usize, usize, usize) {
    let mut best = (0, 0, 0);
    let mut prev = vec![0usize; b.len() + 1];
    let mut cur = vec![0usize; b.len() + 1];

    for i in 0..a.len() {
        for j in 0..b.len() {
            cur[j + 1] = if a[i] == b[j] { prev[j] + 1 } else { 0 };
            let len = cur[j + 1];
            if len > best.2 {
                best = (i + 1 - len, j + 1 - len, len);
            }
        }
        std::mem::swap(&mut prev, &mut cur);
    }
    best
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::Region;
    use chrono::{Duration, Utc};

    fn chars(s: &str) -> Vec<char> {
        s.chars().collect()
    }

    fn article(title: &str, url: &str, age_minutes: i64) -> RawArticle {
        let mut a = RawArticle::new(Region::new("usa"), "src", title, url);
        a.published_at = Some(Utc::now() - Duration::minutes(age_minutes));
        a
    }

    #[test]
    fn similarity_matches_known_ratios() {
        assert_eq!(similarity(&chars("abcd"), &chars("abcd")), 1.0);
        assert_eq!(similarity(&chars("abcd"), &chars("wxyz")), 0.0);
        assert_eq!(similarity(&chars(""), &chars("")), 1.0);
        // "abxcd" vs "abcd": blocks "ab" + "cd" => 2*4/9
        let r = similarity(&chars("abxcd"), &chars("abcd"));
        assert!((r - 8.0 / 9.0).abs() < 1e-9);
    }

    #[test]
    fn repeated_urls_keep_the_newest() {
        let out = Deduplicator::default().deduplicate(vec![
            article("Old take on the story", "https://a/1", 60),
            article("Fresh take on the story", "https://a/1", 5),
        ]);
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].title, "Fresh take on the story");
    }

    #[test]
    fn near_identical_titles_are_dropped() {
        let out = Deduplicator::default().deduplicate(vec![
            article("Central bank raises rates by 0.5%", "https://a/1", 10),
            article("Central Bank raises rates by 0.5% ", "https://b/1", 20),
            article("Storm hits the coast", "https://c/1", 30),
        ]);
        let titles: Vec<_> = out.iter().map(|a| a.title.as_str()).collect();
        assert_eq!(
            titles,
            vec!["Central bank raises rates by 0.5%", "Storm hits the coast"]
        );
    }

    #[test]
    fn articles_without_publish_date_use_fetch_time() {
        let mut undated = RawArticle::new(Region::new("usa"), "src", "Undated", "https://u/1");
        undated.fetched_at = Utc::now();
        let out = Deduplicator::default().deduplicate(vec![
            article("Dated yesterday", "https://d/1", 24 * 60),
            undated,
        ]);
        assert_eq!(out[0].title, "Undated");
        assert!(Deduplicator::default().deduplicate(Vec::new()).is_empty());
    }
}
