use std::env;
use std::path::PathBuf;

pub const DEFAULT_OLLAMA_HOST: &str = "http://localhost:11434";
pub const DEFAULT_MODEL: &str = "mistral";
pub const DEFAULT_INDEX_DIR: &str = "embeddings/store";
pub const DEFAULT_BOT_USERNAME: &str = "@medication_remider_and_info_bot";
pub const DEFAULT_RETRIEVAL_K: usize = 3;
pub const DEFAULT_TESSERACT_CMD: &str = "tesseract";

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("TELEGRAM_BOT_TOKEN not set. Create a bot with @BotFather to get one.")]
    BotTokenNotSet,

    #[error("invalid value for {var}: '{value}'")]
    Invalid { var: &'static str, value: String },
}

/// Runtime settings shared by every subcommand.
///
/// Read from the environment:
/// - `OLLAMA_HOST`, `OLLAMA_MODEL`, `EMBEDDING_MODEL`: language model endpoint and models
/// - `INDEX_DIR`: where the vector store lives
/// - `RETRIEVAL_K`: passages retrieved per question
/// - `TESSERACT_CMD`: OCR binary
///
/// The bot token is resolved separately (`bot_token_from_env`) so that offline
/// subcommands never require it.
#[derive(Debug, Clone)]
pub struct Settings {
    pub ollama_host: String,
    pub chat_model: String,
    pub embedding_model: String,
    pub index_dir: PathBuf,
    pub retrieval_k: usize,
    pub tesseract_cmd: String,
    pub bot_username: String,
}

impl Settings {
    pub fn from_env() -> Result<Self, ConfigError> {
        let retrieval_k = match var("RETRIEVAL_K") {
            Some(raw) => raw
                .parse::<usize>()
                .ok()
                .filter(|k| *k > 0)
                .ok_or(ConfigError::Invalid {
                    var: "RETRIEVAL_K",
                    value: raw,
                })?,
            None => DEFAULT_RETRIEVAL_K,
        };

        let bot_username = var("BOT_USERNAME").unwrap_or_else(|| DEFAULT_BOT_USERNAME.to_string());
        let bot_username = if bot_username.starts_with('@') {
            bot_username
        } else {
            format!("@{bot_username}")
        };

        Ok(Self {
            ollama_host: var("OLLAMA_HOST")
                .unwrap_or_else(|| DEFAULT_OLLAMA_HOST.to_string())
                .trim_end_matches('/')
                .to_string(),
            chat_model: var("OLLAMA_MODEL").unwrap_or_else(|| DEFAULT_MODEL.to_string()),
            embedding_model: var("EMBEDDING_MODEL").unwrap_or_else(|| DEFAULT_MODEL.to_string()),
            index_dir: var("INDEX_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from(DEFAULT_INDEX_DIR)),
            retrieval_k,
            tesseract_cmd: var("TESSERACT_CMD")
                .unwrap_or_else(|| DEFAULT_TESSERACT_CMD.to_string()),
            bot_username,
        })
    }
}

/// Secret that must never show up in logs or `Debug` output.
#[derive(Clone)]
pub struct BotToken(String);

impl BotToken {
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }

    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Debug for BotToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("[REDACTED]")
    }
}

pub fn bot_token_from_env() -> Result<BotToken, ConfigError> {
    var("TELEGRAM_BOT_TOKEN")
        .map(BotToken)
        .ok_or(ConfigError::BotTokenNotSet)
}

/// Reads a trimmed environment variable, treating empty values as unset.
fn var(name: &str) -> Option<String> {
    env::var(name)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}
