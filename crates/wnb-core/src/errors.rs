use std::path::PathBuf;

/// Core error type for the news bot.
///
/// Adapter crates (storage, Telegram, OpenRouter) map their specific errors into
/// this type so the pipeline can log and skip failures consistently.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("config error: {0}")]
    Config(String),

    #[error(
        "environment file {} not found; create it from {} and fill in your credentials",
        path.display(),
        template.display()
    )]
    MissingEnvFile { path: PathBuf, template: PathBuf },

    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("toml error in {path}: {source}")]
    Toml {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    #[error("storage error: {0}")]
    Storage(String),

    #[error("feed error: {url}: {reason}")]
    Feed { url: String, reason: String },

    #[error("llm error: {0}")]
    Llm(String),

    #[error("external error: {0}")]
    External(String),
}

impl Error {
    /// True for failures that stop the process before any work starts.
    pub fn is_setup_failure(&self) -> bool {
        matches!(self, Error::Config(_) | Error::MissingEnvFile { .. })
    }
}

pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_env_file_mentions_template() {
        let e = Error::MissingEnvFile {
            path: PathBuf::from(".env"),
            template: PathBuf::from(".env.example"),
        };
        let msg = e.to_string();
        assert!(msg.contains(".env.example"));
        assert!(e.is_setup_failure());
    }

    #[test]
    fn runtime_errors_are_not_setup_failures() {
        assert!(!Error::Llm("boom".to_string()).is_setup_failure());
    }
}
