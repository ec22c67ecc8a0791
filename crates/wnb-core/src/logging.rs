use std::path::Path;

use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::{errors::Error, Result};

/// Initialize tracing: console output plus a daily-rolling file in `log_dir`
/// (`news.log.YYYY-MM-DD`).
///
/// `RUST_LOG` wins over `level`. The returned guard flushes the file writer on
/// drop, so keep it alive for the whole process.
pub fn init(service_name: &str, level: &str, log_dir: &Path) -> Result<WorkerGuard> {
    std::fs::create_dir_all(log_dir)?;

    let level = normalize_level(level);
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new(format!(
            "warn,{service_name}={level},wnb={level},wnb_core={level},wnb_openai={level},wnb_storage={level},wnb_telegram={level}"
        ))
    });

    let file_appender = tracing_appender::rolling::daily(log_dir, "news.log");
    let (file_writer, guard) = tracing_appender::non_blocking(file_appender);

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_target(true).with_ansi(false))
        .with(
            fmt::layer()
                .with_writer(file_writer)
                .with_target(true)
                .with_ansi(false),
        )
        .try_init()
        .map_err(|e| Error::External(format!("failed to init tracing: {e}")))?;

    Ok(guard)
}

/// Map `INFO`/`warning`/... to an `EnvFilter` level; unknown values become `info`.
pub fn normalize_level(raw: &str) -> &'static str {
    match raw.trim().to_lowercase().as_str() {
        "trace" => "trace",
        "debug" => "debug",
        "warn" | "warning" => "warn",
        "error" | "critical" => "error",
        _ => "info",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn levels_are_normalized() {
        assert_eq!(normalize_level("INFO"), "info");
        assert_eq!(normalize_level("WARNING"), "warn");
        assert_eq!(normalize_level("critical"), "error");
        assert_eq!(normalize_level("verbose"), "info");
    }
}
