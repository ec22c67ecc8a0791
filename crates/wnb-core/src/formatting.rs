//! Telegram HTML rendering of digests.

use std::sync::OnceLock;

use chrono::{DateTime, Datelike, Timelike, Utc};
use chrono_tz::Tz;
use regex::Regex;

use crate::domain::{Digest, Region};

const TRUNCATION_MARK: &str = "\n\n<i>... (сокращено)</i>";
const TRUNCATION_RESERVE: usize = 50;
const MAX_TOPICS: usize = 5;
const MAX_SOURCES_REGIONAL: usize = 5;
const MAX_SOURCES_GLOBAL: usize = 8;

const MONTHS_GENITIVE: [&str; 12] = [
    "января",
    "февраля",
    "марта",
    "апреля",
    "мая",
    "июня",
    "июля",
    "августа",
    "сентября",
    "октября",
    "ноября",
    "декабря",
];

/// Escape HTML special characters for Telegram HTML parse mode.
pub fn escape_html(text: &str) -> String {
    text.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
}

pub fn region_emoji(region: &Region) -> &'static str {
    match region.as_str() {
        "global" | "middle_east" => "\u{1F30D}",
        "usa" => "\u{1F1FA}\u{1F1F8}",
        "china" => "\u{1F1E8}\u{1F1F3}",
        "japan" => "\u{1F1EF}\u{1F1F5}",
        "india" => "\u{1F1EE}\u{1F1F3}",
        "europe" => "\u{1F1EA}\u{1F1FA}",
        "latam" => "\u{1F30E}",
        "russia" => "\u{1F1F7}\u{1F1FA}",
        _ => "\u{1F4F0}",
    }
}

/// `18 октября 2026, 09:00 MSK`
pub fn format_datetime_ru(at: DateTime<Utc>, tz: Tz) -> String {
    let local = at.with_timezone(&tz);
    format!(
        "{} {} {}, {:02}:{:02} {}",
        local.day(),
        MONTHS_GENITIVE[local.month0() as usize],
        local.year(),
        local.hour(),
        local.minute(),
        local.format("%Z")
    )
}

/// Renders digests as Telegram messages no longer than `max_length` characters.
#[derive(Clone, Debug)]
pub struct DigestFormatter {
    max_length: usize,
    tz: Tz,
    separator: String,
}

impl DigestFormatter {
    pub fn new(max_length: usize, tz: Tz) -> Self {
        Self {
            max_length,
            tz,
            separator: format!("\n{}\n", "\u{2501}".repeat(20)),
        }
    }

    pub fn format(&self, digest: &Digest) -> String {
        if digest.region.is_global() {
            self.format_global(digest)
        } else {
            self.format_regional(digest)
        }
    }

    pub fn format_regional(&self, digest: &Digest) -> String {
        let name = if digest.region_name_ru.is_empty() {
            digest.region.to_string()
        } else {
            digest.region_name_ru.clone()
        };
        let header = format!(
            "{} <b>{} | {}</b>\n<i>{}</i>",
            region_emoji(&digest.region),
            escape_html(&name),
            digest.time_period.title_ru(),
            format_datetime_ru(digest.created_at, self.tz)
        );
        let news = format!(
            "\n\n\u{1F4F0} <b>Главные события:</b>\n\n{}",
            digest.summary_html
        );
        let stats = format!(
            "\n\n\u{1F4CA} <b>Статистика:</b>\n\u{2022} Источников: {} | Статей: {}",
            digest.sources_used.len(),
            digest.article_count
        );
        self.assemble(header, digest, news, stats, MAX_SOURCES_REGIONAL)
    }

    pub fn format_global(&self, digest: &Digest) -> String {
        let header = format!(
            "\u{1F30D} <b>МИРОВОЙ ДАЙДЖЕСТ | {}</b>\n<i>{}</i>",
            digest.time_period.title_ru(),
            format_datetime_ru(digest.created_at, self.tz)
        );
        let news = format!(
            "\n\n\u{1F525} <b>ГЛАВНЫЕ МИРОВЫЕ СОБЫТИЯ:</b>\n\n{}",
            digest.summary_html
        );
        let stats = format!(
            "\n\n\u{1F4CA} <b>Статистика:</b>\n\u{2022} Регионов: {} | Статей: {}",
            digest.covered_regions.len(),
            digest.article_count
        );
        self.assemble(header, digest, news, stats, MAX_SOURCES_GLOBAL)
    }

    pub fn format_error(&self, region: &Region, region_name_ru: &str, error: &str) -> String {
        format!(
            "{} <b>{}</b>\n\n\u{26A0}\u{FE0F} Ошибка при обработке: {}",
            region_emoji(region),
            escape_html(region_name_ru),
            escape_html(error)
        )
    }

    fn assemble(
        &self,
        header: String,
        digest: &Digest,
        news: String,
        stats: String,
        max_sources: usize,
    ) -> String {
        let topics = if digest.key_topics.is_empty() {
            String::new()
        } else {
            let list = digest
                .key_topics
                .iter()
                .take(MAX_TOPICS)
                .map(|t| format!("\u{2022} {}", escape_html(t)))
                .collect::<Vec<_>>()
                .join("\n");
            format!("\n\n\u{1F4CC} <b>Ключевые темы:</b>\n{list}")
        };

        let mut sources = digest
            .sources_used
            .iter()
            .take(max_sources)
            .map(|s| escape_html(s))
            .collect::<Vec<_>>()
            .join(", ");
        if digest.sources_used.len() > max_sources {
            sources.push_str(&format!(" (+{})", digest.sources_used.len() - max_sources));
        }

        let message = format!(
            "{header}{sep}{topics}{sep}{news}{sep}{stats}\n\n<i>Источники: {sources}</i>",
            sep = self.separator
        );
        truncate_message(&message, self.max_length)
    }
}

/// Cut an over-long message at a line break in its second half and mark it
/// as shortened. Lengths are in characters.
pub fn truncate_message(message: &str, max_length: usize) -> String {
    if message.chars().count() <= max_length {
        return message.to_string();
    }

    let keep = max_length.saturating_sub(TRUNCATION_RESERVE);
    let end = message
        .char_indices()
        .nth(keep)
        .map(|(i, _)| i)
        .unwrap_or(message.len());
    let mut cut = &message[..end];

    if let Some(nl) = cut.rfind('\n') {
        if cut[..nl].chars().count() > max_length / 2 {
            cut = &cut[..nl];
        }
    }
    // Never leave a half-written tag or entity behind.
    if let Some(open) = cut.rfind('<') {
        if !cut[open..].contains('>') {
            cut = &cut[..open];
        }
    }
    if let Some(amp) = cut.rfind('&') {
        if !cut[amp..].contains(';') {
            cut = &cut[..amp];
        }
    }

    format!("{cut}{}{TRUNCATION_MARK}", closing_tags(cut))
}

/// Closing tags for every element still open at the end of `html`,
/// innermost first.
fn closing_tags(html: &str) -> String {
    static TAG_RE: OnceLock<Regex> = OnceLock::new();
    let tag_re = TAG_RE.get_or_init(|| {
        Regex::new(r"<(/?)([a-zA-Z][a-zA-Z0-9-]*)[^>]*>").expect("valid regex")
    });

    let mut open: Vec<&str> = Vec::new();
    for caps in tag_re.captures_iter(html) {
        let (Some(slash), Some(name)) = (caps.get(1), caps.get(2)) else {
            continue;
        };
        let name = name.as_str();
        if slash.as_str().is_empty() {
            open.push(name);
        } else if let Some(pos) = open.iter().rposition(|t| t.eq_ignore_ascii_case(name)) {
            open.truncate(pos);
        }
    }

    open.iter().rev().map(|t| format!("</{t}>")).collect()
}
