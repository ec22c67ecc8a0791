use std::{process::ExitCode, sync::Arc};

use anyhow::Context;
use tracing::{debug, error, info, warn};

use wnb_core::{
    aggregator::NewsPipeline,
    app::NewsApp,
    config::{load_env_file, Config},
    delivery::DigestSender,
    domain::Region,
    feeds::HttpFeedFetcher,
    formatting::DigestFormatter,
    llm::LlmService,
    logging,
    messaging::{
        port::MessagingPort,
        throttled::{ThrottleConfig, ThrottledMessenger},
    },
    ports::NewsStore,
    scheduler::{shutdown_signal, NewsScheduler},
    setup::{ensure_layout, SetupOutcome},
};
use wnb_openai::OpenRouterClient;
use wnb_storage::SqliteNewsStore;
use wnb_telegram::TelegramMessenger;

mod cli;

use cli::{Cli, Mode, USAGE};

#[tokio::main]
async fn main() -> ExitCode {
    let cli = match Cli::parse_or_usage(std::env::args_os()) {
        Ok(Some(cli)) => cli,
        Ok(None) => {
            print!("{USAGE}");
            return ExitCode::SUCCESS;
        }
        Err(e) => e.exit(),
    };
    let mode = cli.mode();

    if mode == Mode::Help {
        print!("{USAGE}");
        return ExitCode::SUCCESS;
    }

    if let Err(e) = load_env_file(&cli.env_file) {
        eprintln!("Error: {e}");
        return ExitCode::FAILURE;
    }

    match run(&cli, mode).await {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::FAILURE,
        Err(e) => {
            let setup = e
                .downcast_ref::<wnb_core::Error>()
                .is_some_and(wnb_core::Error::is_setup_failure);
            if setup {
                eprintln!("Configuration error: {e:#}");
            } else {
                error!("{e:#}");
                eprintln!("Error: {e:#}");
            }
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: &Cli, mode: Mode) -> anyhow::Result<bool> {
    let cfg = Config::load()?;
    let layout = ensure_layout(&cfg.settings.data_dir).context("provisioning data directory")?;

    let level = cli
        .log_level
        .clone()
        .unwrap_or_else(|| cfg.settings.log_level.clone());
    let _log_guard = logging::init("wnb", &level, &cfg.log_dir())?;
    info!(command = %mode, "starting world news bot");
    match layout {
        SetupOutcome::Provisioned => {
            info!(data_dir = %cfg.settings.data_dir.display(), "provisioned data directory")
        }
        SetupOutcome::AlreadyProvisioned => debug!("data directory already provisioned"),
    }

    let app = build_app(&cfg, &mode).await?;

    let ok = match mode {
        Mode::Run => {
            let scheduler = NewsScheduler::from_config(&cfg.app.scheduler, cfg.settings.user_timezone)?;
            for job in scheduler.status() {
                let next = job
                    .next_run
                    .map(|t| t.format("%Y-%m-%d %H:%M %Z").to_string())
                    .unwrap_or_else(|| "never".to_string());
                info!(job = %job.id, next = %next, "scheduled");
            }
            match app.last_digest(&Region::global()).await {
                Ok(Some(last)) => info!(
                    created = %last.created_at.format("%Y-%m-%d %H:%M UTC"),
                    sent = last.sent_at.is_some(),
                    "last world digest"
                ),
                Ok(None) => info!("no world digest produced yet"),
                Err(e) => warn!("cannot read last digest: {e}"),
            }
            info!("bot is running, press Ctrl+C to stop");

            let task = move || {
                let app = app.clone();
                async move {
                    app.run_cycle().await;
                }
            };
            scheduler
                .run_until(task, async {
                    if let Err(e) = shutdown_signal().await {
                        error!("signal handling failed: {e}");
                    }
                })
                .await;
            info!("bot stopped");
            true
        }
        Mode::Once => {
            app.run_cycle().await.succeeded()
        }
        Mode::TestTelegram => app.test_telegram().await,
        Mode::TestRss(region) => app.test_rss(&region).await? > 0,
        Mode::Process(region) => app.process_single(&region).await,
        Mode::Help => true,
    };

    Ok(ok)
}

/// Wire adapters into a [`NewsApp`]. Credentials are only required by the
/// modes that use them.
async fn build_app(cfg: &Config, mode: &Mode) -> anyhow::Result<NewsApp> {
    let settings = &cfg.settings;
    let app_cfg = Arc::new(cfg.app.clone());

    let api_key = if mode.uses_llm() {
        settings.require_llm_key()?.to_string()
    } else {
        settings.openrouter_api_key.clone().unwrap_or_default()
    };
    let (token, chats) = if mode.uses_telegram() {
        let (token, chats) = settings.require_telegram()?;
        (token.to_string(), chats.to_vec())
    } else {
        (String::new(), settings.telegram_chats.clone())
    };
    if mode.delivers() {
        settings.require_chats()?;
    }

    let store: Arc<dyn NewsStore> = Arc::new(SqliteNewsStore::open(&cfg.database_path()).await?);
    let fetcher = Arc::new(HttpFeedFetcher::new(&app_cfg.feeds)?);
    let llm = LlmService::new(
        Arc::new(OpenRouterClient::new(api_key, &app_cfg.llm)?),
        app_cfg.llm.clone(),
    );

    let raw_messenger: Arc<dyn MessagingPort> =
        Arc::new(TelegramMessenger::new(token, app_cfg.telegram.message_limit));
    let messenger: Arc<dyn MessagingPort> = Arc::new(ThrottledMessenger::new(
        raw_messenger,
        ThrottleConfig::default(),
    ));

    let formatter = DigestFormatter::new(
        messenger.capabilities().max_message_len,
        settings.user_timezone,
    );
    let pipeline = NewsPipeline::new(
        store.clone(),
        fetcher,
        llm,
        app_cfg.clone(),
        cfg.config_dir.clone(),
        settings.user_timezone,
    );
    let sender = DigestSender::new(
        messenger,
        store.clone(),
        chats,
        formatter.clone(),
        &app_cfg.telegram,
    );

    Ok(NewsApp::new(app_cfg, pipeline, sender, store, formatter))
}
