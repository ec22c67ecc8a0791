use std::{ffi::OsString, fmt, path::PathBuf};

use clap::{error::ErrorKind, Parser};
use wnb_core::{config::DEFAULT_ENV_FILE, domain::Region};

pub const DEFAULT_REGION: &str = "usa";

pub const USAGE: &str = "\
World News Bot

Usage: wnb <command> [region] [options]

Commands:
  run                  Start continuous scheduled processing
  once                 Run one full cycle (all regions + world digest)
  test-telegram        Check the Telegram bot credentials
  test-rss [region]    Fetch and parse one region's feeds (default: usa)
  process [region]     Process and deliver one region (default: usa)
  help                 Show this help

Options:
  --region <region>    Region for test-rss / process
  --log-level <level>  Override LOG_LEVEL
  --env-file <path>    Environment file (default: .env)
";

#[derive(Debug, Parser)]
#[command(name = "wnb", about = "World news digest bot", disable_help_subcommand = true)]
pub struct Cli {
    /// run | once | test-telegram | test-rss | process | help
    pub command: Option<String>,

    /// Region for `test-rss` and `process`.
    pub region: Option<String>,

    #[arg(long = "region", value_name = "REGION")]
    pub region_flag: Option<String>,

    #[arg(long)]
    pub log_level: Option<String>,

    #[arg(long, default_value = DEFAULT_ENV_FILE)]
    pub env_file: PathBuf,
}

impl Cli {
    /// Parse `args`; `Ok(None)` for anything unrecognised (extra arguments,
    /// unknown flags), which prints usage. Explicit `--help` stays an error
    /// for clap to render.
    pub fn parse_or_usage<I, T>(args: I) -> Result<Option<Self>, clap::Error>
    where
        I: IntoIterator<Item = T>,
        T: Into<OsString> + Clone,
    {
        match Self::try_parse_from(args) {
            Ok(cli) => Ok(Some(cli)),
            Err(e) if matches!(e.kind(), ErrorKind::DisplayHelp | ErrorKind::DisplayVersion) => {
                Err(e)
            }
            Err(_) => Ok(None),
        }
    }

    pub fn mode(&self) -> Mode {
        let region = self.region.as_deref().or(self.region_flag.as_deref());
        Mode::from_args(self.command.as_deref(), region)
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Mode {
    Run,
    Once,
    TestTelegram,
    TestRss(Region),
    Process(Region),
    Help,
}

impl Mode {
    /// Unknown or missing commands fall through to `Help`.
    pub fn from_args(command: Option<&str>, region: Option<&str>) -> Self {
        let region = || Region::new(region.unwrap_or(DEFAULT_REGION));
        match command.map(str::trim) {
            Some("run") => Mode::Run,
            Some("once") => Mode::Once,
            Some("test-telegram") => Mode::TestTelegram,
            Some("test-rss") => Mode::TestRss(region()),
            Some("process") => Mode::Process(region()),
            _ => Mode::Help,
        }
    }

    pub fn uses_llm(&self) -> bool {
        matches!(self, Mode::Run | Mode::Once | Mode::Process(_))
    }

    pub fn uses_telegram(&self) -> bool {
        !matches!(self, Mode::TestRss(_) | Mode::Help)
    }

    /// Modes that deliver digests and therefore need at least one chat.
    pub fn delivers(&self) -> bool {
        self.uses_llm()
    }
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Mode::Run => f.write_str("run"),
            Mode::Once => f.write_str("once"),
            Mode::TestTelegram => f.write_str("test-telegram"),
            Mode::TestRss(r) => write!(f, "test-rss {r}"),
            Mode::Process(r) => write!(f, "process {r}"),
            Mode::Help => f.write_str("help"),
        }
    }
}
