//! Turning fetched articles into digests: dedup, summarize, translate, and the
//! world digest that spans every region.

pub mod dedup;
pub mod global_digest;
pub mod pipeline;
pub mod summarizer;
pub mod translator;

pub use dedup::Deduplicator;
pub use global_digest::GlobalDigestGenerator;
pub use pipeline::NewsPipeline;
pub use summarizer::Summarizer;
pub use translator::Translator;

use crate::{domain::Summary, formatting::escape_html};

/// Numbered stories as Telegram HTML (`<b>1. headline</b>` + summary).
pub fn stories_html(summary: &Summary) -> String {
    summary
        .stories
        .iter()
        .enumerate()
        .map(|(i, story)| {
            format!(
                "<b>{}. {}</b>\n{}",
                i + 1,
                escape_html(&story.headline),
                escape_html(&story.summary)
            )
        })
        .collect::<Vec<_>>()
        .join("\n\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::Story;

    #[test]
    fn stories_are_numbered_and_escaped() {
        let summary = Summary {
            key_topics: Vec::new(),
            stories: vec![
                Story {
                    headline: "A & B".to_string(),
                    summary: "first".to_string(),
                },
                Story {
                    headline: "C".to_string(),
                    summary: "x < y".to_string(),
                },
            ],
        };
        assert_eq!(
            stories_html(&summary),
            "<b>1. A &amp; B</b>\nfirst\n\n<b>2. C</b>\nx &lt; y"
        );
    }
}
