//! Prompt templates for summarization, translation and the world digest.

pub const SUMMARY_SYSTEM: &str =
    "You are a professional news analyst. Always respond with valid JSON.";
pub const TRANSLATION_SYSTEM: &str =
    "You are a professional translator. Translate accurately while maintaining natural language flow.";
pub const GLOBAL_SYSTEM: &str =
    "You are a professional global news analyst. Always respond with valid JSON.";

const LANGUAGE_NAMES: &[(&str, &str)] = &[
    ("en", "English"),
    ("ru", "Russian"),
    ("zh", "Chinese"),
    ("ja", "Japanese"),
    ("de", "German"),
    ("es", "Spanish"),
    ("pt", "Portuguese"),
    ("ar", "Arabic"),
    ("hi", "Hindi"),
    ("fr", "French"),
];

/// English name of a language code, if known.
pub fn language_name(code: &str) -> Option<&'static str> {
    LANGUAGE_NAMES
        .iter()
        .find(|(c, _)| *c == code)
        .map(|(_, name)| *name)
}

pub fn summarization(articles_text: &str, region_name: &str, language: &str, max_words: u32) -> String {
    let output_lang = language_name(language).unwrap_or("English");
    format!(
        r#"Analyze the following news articles from {region_name} and create a structured summary.

ARTICLES:
{articles_text}

INSTRUCTIONS:
1. Identify the 3-5 most important and significant news stories
2. For each story, provide:
   - A clear, informative headline
   - A 2-3 sentence summary with key facts, numbers, and context
3. Extract 3-5 key topics/themes covered across all articles
4. Be objective and factual - present information without bias
5. Focus on events with real impact or significance
6. Total summary should be under {max_words} words

OUTPUT FORMAT (respond with valid JSON only):
{{
  "key_topics": ["Topic 1", "Topic 2", "Topic 3"],
  "stories": [
    {{
      "headline": "Clear headline describing the event",
      "summary": "2-3 sentence summary with key facts and context."
    }}
  ]
}}

Write all content in {output_lang}."#
    )
}

pub fn translation(text: &str, source_language: &str, target_language: &str) -> String {
    let source = language_name(source_language).unwrap_or(source_language);
    let target = language_name(target_language).unwrap_or(target_language);
    format!(
        r#"Translate the following text from {source} to {target}.

TEXT TO TRANSLATE:
{text}

REQUIREMENTS:
1. Preserve the exact meaning and tone of the original
2. Use natural, fluent {target} language
3. Keep proper nouns (names, organizations, places) recognizable
4. Maintain formatting (numbered lists, paragraphs, etc.)
5. Do not add explanations or commentary

OUTPUT: Only the translated text, nothing else."#
    )
}

pub fn global_digest(articles_text: &str, regions: &[String]) -> String {
    let regions = regions.join(", ");
    format!(
        r#"Analyze news from around the world and identify the 5-7 MOST IMPORTANT global events.

REGIONS COVERED: {regions}

NEWS ARTICLES:
{articles_text}

IMPORTANCE CRITERIA (prioritize in this order):
1. Geopolitical impact - events affecting international relations
2. Economic consequences - major market moves, trade, financial crises
3. Humanitarian significance - conflicts, disasters, health crises
4. Technological breakthroughs - major innovations affecting multiple countries
5. Environmental events - climate, natural disasters with global impact

CRITICAL RULES:
- If the SAME event is covered by multiple regions, combine into ONE entry
- List which regions are affected or covering each event
- Focus on FACTS, avoid repetition
- Only include truly significant world events, not local news
- Write summaries in Russian

OUTPUT FORMAT (respond with valid JSON only):
{{
  "key_topics": ["Геополитика", "Экономика", "Тема 3"],
  "events": [
    {{
      "headline": "Заголовок на русском языке",
      "summary": "Краткое описание события в 2-3 предложениях с ключевыми фактами.",
      "regions": ["usa", "europe", "china"],
      "importance": "high"
    }}
  ]
}}

IMPORTANT: All text must be in Russian. Respond ONLY with valid JSON."#
    )
}
