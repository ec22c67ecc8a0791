use std::{
    collections::BTreeMap,
    env, fs,
    path::{Path, PathBuf},
};

use chrono_tz::Tz;
use serde::Deserialize;

use crate::{
    domain::{default_language, ChatTarget, FeedSource, Region},
    errors::Error,
    Result,
};

pub const DEFAULT_ENV_FILE: &str = ".env";
pub const ENV_TEMPLATE_FILE: &str = ".env.example";
pub const DEFAULT_CONFIG_FILE: &str = "config/config.toml";
pub const DEFAULT_DATA_DIR: &str = "data";
pub const DEFAULT_TIMEZONE: &str = "Europe/Moscow";

/// Load `KEY=value` pairs from the env file into the process environment.
///
/// The file is mandatory: every mode except `help` refuses to start without it.
/// Variables that are already set are not overridden.
pub fn load_env_file(path: &Path) -> Result<()> {
    if !path.is_file() {
        let template = path
            .parent()
            .map(|p| p.join(ENV_TEMPLATE_FILE))
            .unwrap_or_else(|| PathBuf::from(ENV_TEMPLATE_FILE));
        return Err(Error::MissingEnvFile {
            path: path.to_path_buf(),
            template,
        });
    }

    dotenvy::from_path(path)
        .map_err(|e| Error::Config(format!("failed to read {}: {e}", path.display())))
}

/// Secrets and per-deployment knobs, read from the environment.
#[derive(Clone, Debug)]
pub struct Settings {
    pub openrouter_api_key: Option<String>,
    pub telegram_bot_token: Option<String>,
    pub telegram_chats: Vec<ChatTarget>,
    pub newsapi_key: Option<String>,
    pub user_timezone: Tz,
    pub log_level: String,
    pub config_path: PathBuf,
    pub data_dir: PathBuf,
}

impl Settings {
    pub fn from_env() -> Result<Self> {
        let tz_raw = env_str("USER_TIMEZONE")
            .and_then(non_empty)
            .unwrap_or_else(|| DEFAULT_TIMEZONE.to_string());
        let user_timezone = parse_timezone(&tz_raw)?;

        Ok(Self {
            openrouter_api_key: env_str("OPENROUTER_API_KEY").and_then(non_empty),
            telegram_bot_token: env_str("TELEGRAM_BOT_TOKEN").and_then(non_empty),
            telegram_chats: parse_chat_targets(env_str("TELEGRAM_CHAT_ID").as_deref()),
            newsapi_key: env_str("NEWSAPI_KEY").and_then(non_empty),
            user_timezone,
            log_level: env_str("LOG_LEVEL")
                .and_then(non_empty)
                .unwrap_or_else(|| "INFO".to_string()),
            config_path: env_path("WNB_CONFIG").unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_FILE)),
            data_dir: env_path("WNB_DATA_DIR").unwrap_or_else(|| PathBuf::from(DEFAULT_DATA_DIR)),
        })
    }

    /// Token and chat list, both required for anything that talks to Telegram.
    pub fn require_telegram(&self) -> Result<(&str, &[ChatTarget])> {
        let Some(token) = self.telegram_bot_token.as_deref() else {
            return Err(Error::Config(
                "TELEGRAM_BOT_TOKEN environment variable is required".to_string(),
            ));
        };
        Ok((token, &self.telegram_chats))
    }

    pub fn require_chats(&self) -> Result<&[ChatTarget]> {
        if self.telegram_chats.is_empty() {
            return Err(Error::Config(
                "TELEGRAM_CHAT_ID environment variable is required".to_string(),
            ));
        }
        Ok(&self.telegram_chats)
    }

    pub fn require_llm_key(&self) -> Result<&str> {
        self.openrouter_api_key.as_deref().ok_or_else(|| {
            Error::Config("OPENROUTER_API_KEY environment variable is required".to_string())
        })
    }
}

/// Static description of a region.
#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
pub struct RegionInfo {
    #[serde(default)]
    pub name_en: String,
    #[serde(default)]
    pub name_ru: String,
    #[serde(default = "default_language")]
    pub primary_language: String,
    #[serde(default = "default_region_tz")]
    pub timezone: String,
}

impl RegionInfo {
    fn fallback(region: &Region) -> Self {
        Self {
            name_en: region.to_string(),
            name_ru: region.to_string(),
            primary_language: default_language(),
            timezone: default_region_tz(),
        }
    }

    /// Region timezone; unknown names fall back to UTC.
    pub fn tz(&self) -> Tz {
        self.timezone.parse::<Tz>().unwrap_or(Tz::UTC)
    }
}

fn default_region_tz() -> String {
    "UTC".to_string()
}

#[derive(Clone, Debug, PartialEq, Deserialize)]
#[serde(default)]
pub struct LlmConfig {
    pub base_url: String,
    pub default_model: String,
    pub fallback_model: String,
    pub temperature: f32,
    pub max_tokens_summary: u32,
    pub max_tokens_translation: u32,
    pub max_tokens_global: u32,
    pub request_timeout_secs: u64,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            base_url: "https://openrouter.ai/api/v1".to_string(),
            default_model: "openai/gpt-4o-mini".to_string(),
            fallback_model: "meta-llama/llama-3.1-70b-instruct".to_string(),
            temperature: 0.3,
            max_tokens_summary: 2000,
            max_tokens_translation: 1000,
            max_tokens_global: 2000,
            request_timeout_secs: 120,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct TelegramConfig {
    pub retry_attempts: u32,
    pub retry_delay_seconds: u64,
    pub delay_between_messages_ms: u64,
    pub message_limit: usize,
}

impl Default for TelegramConfig {
    fn default() -> Self {
        Self {
            retry_attempts: 3,
            retry_delay_seconds: 5,
            delay_between_messages_ms: 2000,
            message_limit: 4096,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct SchedulerConfig {
    pub frequency: usize,
    pub delivery_times: Vec<String>,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            frequency: 2,
            delivery_times: vec!["09:00".to_string(), "21:00".to_string()],
        }
    }
}

impl SchedulerConfig {
    /// The delivery times actually in use (`frequency` first entries).
    pub fn active_times(&self) -> &[String] {
        let n = self.frequency.min(self.delivery_times.len());
        &self.delivery_times[..n]
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Relative paths resolve against the data directory.
    pub database_file: PathBuf,
    pub hours_back: i64,
    pub retention_days: i64,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            database_file: PathBuf::from("news.db"),
            hours_back: 12,
            retention_days: 7,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct FeedsConfig {
    pub timeout_secs: u64,
    pub user_agent: String,
}

impl Default for FeedsConfig {
    fn default() -> Self {
        Self {
            timeout_secs: 30,
            user_agent: "NewsAggregator/1.0 (https://github.com/news-aggregator)".to_string(),
        }
    }
}

/// File-based configuration (`config/config.toml`).
#[derive(Clone, Debug, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub regions: Vec<Region>,
    pub region_info: BTreeMap<String, RegionInfo>,
    pub llm: LlmConfig,
    pub telegram: TelegramConfig,
    pub scheduler: SchedulerConfig,
    pub storage: StorageConfig,
    pub feeds: FeedsConfig,
}

impl AppConfig {
    pub fn load(path: &Path) -> Result<Self> {
        if !path.is_file() {
            return Err(Error::Config(format!(
                "config file not found: {}",
                path.display()
            )));
        }
        let raw = fs::read_to_string(path)?;
        Self::parse(&raw, path)
    }

    pub fn parse(raw: &str, origin: &Path) -> Result<Self> {
        let mut cfg: AppConfig = toml::from_str(raw).map_err(|source| Error::Toml {
            path: origin.to_path_buf(),
            source,
        })?;
        cfg.regions = cfg.regions.iter().map(|r| Region::new(r.as_str())).collect();
        for region in &cfg.regions {
            validate_region(region)?;
        }
        Ok(cfg)
    }

    pub fn region_info(&self, region: &Region) -> RegionInfo {
        let Some(info) = self.region_info.get(region.as_str()) else {
            return RegionInfo::fallback(region);
        };
        let mut info = info.clone();
        if info.name_en.is_empty() {
            info.name_en = region.to_string();
        }
        if info.name_ru.is_empty() {
            info.name_ru = region.to_string();
        }
        info
    }
}

#[derive(Debug, Default, Deserialize)]
struct RegionSourcesFile {
    #[serde(default)]
    rss_sources: Vec<FeedSource>,
}

/// Everything a run needs: environment settings, file config and where the
/// file config lives (region sources are resolved next to it).
#[derive(Clone, Debug)]
pub struct Config {
    pub settings: Settings,
    pub app: AppConfig,
    pub config_dir: PathBuf,
}

impl Config {
    /// Load from the current environment (call [`load_env_file`] first).
    pub fn load() -> Result<Self> {
        let settings = Settings::from_env()?;
        let app = AppConfig::load(&settings.config_path)?;
        let config_dir = settings
            .config_path
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_else(|| PathBuf::from("."));
        Ok(Self {
            settings,
            app,
            config_dir,
        })
    }

    pub fn database_path(&self) -> PathBuf {
        let file = &self.app.storage.database_file;
        if file.is_absolute() {
            return file.clone();
        }
        self.settings.data_dir.join(file)
    }

    pub fn log_dir(&self) -> PathBuf {
        self.settings.data_dir.join("logs")
    }
}

/// Load `<config_dir>/sources/<region>.toml`. A missing file means no sources.
pub fn load_region_sources(config_dir: &Path, region: &Region) -> Result<Vec<FeedSource>> {
    validate_region(region)?;
    let path = config_dir
        .join("sources")
        .join(format!("{}.toml", region.as_str()));
    if !path.exists() {
        return Ok(Vec::new());
    }

    let raw = fs::read_to_string(&path)?;
    let file: RegionSourcesFile = toml::from_str(&raw).map_err(|source| Error::Toml {
        path: path.clone(),
        source,
    })?;
    Ok(file
        .rss_sources
        .into_iter()
        .filter(|s| !s.url.trim().is_empty())
        .collect())
}

/// Region tokens become file names, so only `[a-z0-9_-]` is accepted.
pub fn validate_region(region: &Region) -> Result<()> {
    let ok = !region.as_str().is_empty()
        && region
            .as_str()
            .chars()
            .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_' || c == '-');
    if ok {
        Ok(())
    } else {
        Err(Error::Config(format!("invalid region token: {region:?}")))
    }
}

pub fn parse_timezone(raw: &str) -> Result<Tz> {
    raw.trim()
        .parse::<Tz>()
        .map_err(|e| Error::Config(format!("invalid timezone {raw}: {e}")))
}

fn parse_chat_targets(v: Option<&str>) -> Vec<ChatTarget> {
    v.unwrap_or_default()
        .split(',')
        .filter_map(ChatTarget::parse)
        .collect()
}

fn env_str(key: &str) -> Option<String> {
    env::var(key).ok()
}

fn env_path(key: &str) -> Option<PathBuf> {
    env::var_os(key)
        .filter(|v| !v.is_empty())
        .map(PathBuf::from)
}

fn non_empty(s: String) -> Option<String> {
    if s.trim().is_empty() {
        None
    } else {
        Some(s.trim().to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::ChatId;

    const SAMPLE: &str = r#"
regions = ["USA", "europe", "russia"]

[region_info.usa]
name_en = "USA"
name_ru = "США"
primary_language = "en"
timezone = "America/New_York"

[region_info.russia]
name_ru = "Россия"
primary_language = "ru"
timezone = "Europe/Moscow"

[llm]
default_model = "test/model"

[scheduler]
frequency = 1
delivery_times = ["08:00", "20:00"]
"#;

    #[test]
    fn parses_app_config_with_defaults() {
        let cfg = AppConfig::parse(SAMPLE, Path::new("config.toml")).unwrap();
        assert_eq!(cfg.regions[0], Region::new("usa"));
        assert_eq!(cfg.llm.default_model, "test/model");
        assert_eq!(cfg.llm.base_url, "https://openrouter.ai/api/v1");
        assert_eq!(cfg.telegram.retry_attempts, 3);
        assert_eq!(cfg.scheduler.active_times(), ["08:00".to_string()]);
        assert_eq!(cfg.storage.hours_back, 12);
    }

    #[test]
    fn region_info_falls_back_to_token() {
        let cfg = AppConfig::parse(SAMPLE, Path::new("config.toml")).unwrap();
        let europe = cfg.region_info(&Region::new("europe"));
        assert_eq!(europe.name_ru, "europe");
        assert_eq!(europe.primary_language, "en");
        assert_eq!(europe.tz(), Tz::UTC);

        let russia = cfg.region_info(&Region::new("russia"));
        assert_eq!(russia.name_en, "russia");
        assert_eq!(russia.name_ru, "Россия");
        assert_eq!(russia.tz(), chrono_tz::Europe::Moscow);
    }

    #[test]
    fn rejects_path_like_region_tokens() {
        let bad = "regions = [\"../etc\"]";
        assert!(AppConfig::parse(bad, Path::new("c.toml")).is_err());
        assert!(validate_region(&Region::new("middle_east")).is_ok());
    }

    #[test]
    fn missing_env_file_is_reported_with_template() {
        let dir = tempfile::tempdir().unwrap();
        let err = load_env_file(&dir.path().join(".env")).unwrap_err();
        match err {
            Error::MissingEnvFile { template, .. } => {
                assert_eq!(template, dir.path().join(ENV_TEMPLATE_FILE));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn loads_region_sources_and_tolerates_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir_all(dir.path().join("sources")).unwrap();
        fs::write(
            dir.path().join("sources/usa.toml"),
            r#"
[[rss_sources]]
name = "NPR"
url = "https://feeds.npr.org/1001/rss.xml"

[[rss_sources]]
name = "Empty"
url = ""
"#,
        )
        .unwrap();

        let usa = load_region_sources(dir.path(), &Region::new("usa")).unwrap();
        assert_eq!(usa.len(), 1);
        assert_eq!(usa[0].name, "NPR");
        assert_eq!(usa[0].language, "en");

        let none = load_region_sources(dir.path(), &Region::new("japan")).unwrap();
        assert!(none.is_empty());
    }

    #[test]
    fn chat_targets_from_csv() {
        let chats = parse_chat_targets(Some("123, @news ,,-100"));
        assert_eq!(
            chats,
            vec![
                ChatTarget::Id(ChatId(123)),
                ChatTarget::Username("@news".to_string()),
                ChatTarget::Id(ChatId(-100)),
            ]
        );
    }

    #[test]
    fn timezone_validation() {
        assert!(parse_timezone("Europe/Berlin").is_ok());
        assert!(parse_timezone("Mars/Olympus").is_err());
    }
}
