use std::time::Duration;

use reqwest::Client;
use serde::Serialize;
use serde::de::DeserializeOwned;
use tracing::{debug, warn};

use super::types::{
    ApiResponse, File, GetFileRequest, GetUpdatesRequest, Message, SendMessageRequest, Update,
};
use crate::config::BotToken;

const API_BASE: &str = "https://api.telegram.org";
/// Long-poll wait passed to `getUpdates`.
pub const POLL_TIMEOUT: Duration = Duration::from_secs(30);
const REQUEST_TIMEOUT: Duration = Duration::from_secs(20);
/// Bot API download limit for `getFile`.
const MAX_FILE_BYTES: usize = 20_000_000;

#[derive(Debug, thiserror::Error)]
pub enum TelegramError {
    #[error("Telegram rejected the bot token (401). Check TELEGRAM_BOT_TOKEN.")]
    Unauthorized,

    #[error("Telegram rate limit exceeded; retry after {0}s")]
    RateLimited(u64),

    #[error("Telegram API error ({code}): {description}")]
    Api { code: u16, description: String },

    #[error("Telegram returned ok without a result")]
    MissingResult,

    #[error("file has no download path")]
    NoFilePath,

    #[error("file too large (>{} bytes)", MAX_FILE_BYTES)]
    FileTooLarge,

    // Built from `reqwest::Error::without_url` so the token never reaches logs.
    #[error("Network error: {0}")]
    Network(reqwest::Error),
}

impl From<reqwest::Error> for TelegramError {
    fn from(e: reqwest::Error) -> Self {
        TelegramError::Network(e.without_url())
    }
}

/// Minimal Bot API client: long polling, replies, and file downloads.
#[derive(Clone, Debug)]
pub struct TelegramClient {
    http: Client,
    token: BotToken,
    base_url: String,
}

impl TelegramClient {
    pub fn new(http: Client, token: BotToken) -> Self {
        Self {
            http,
            token,
            base_url: API_BASE.to_string(),
        }
    }

    #[cfg(test)]
    pub(crate) fn with_base_url(http: Client, base_url: &str) -> Self {
        Self {
            http,
            token: BotToken::new("123:test"),
            base_url: base_url.to_string(),
        }
    }

    async fn call<B, T>(&self, method: &str, body: &B, timeout: Duration) -> Result<T, TelegramError>
    where
        B: Serialize,
        T: DeserializeOwned,
    {
        let url = format!("{}/bot{}/{method}", self.base_url, self.token.expose());
        let response = self
            .http
            .post(&url)
            .header("User-Agent", crate::USER_AGENT)
            .json(body)
            .timeout(timeout)
            .send()
            .await?;

        let status = response.status();
        let text = response.text().await?;
        let parsed: ApiResponse<T> = match serde_json::from_str(&text) {
            Ok(parsed) => parsed,
            Err(_) => {
                warn!(%status, method, "Telegram returned a non-JSON body");
                return Err(TelegramError::Api {
                    code: status.as_u16(),
                    description: text.chars().take(200).collect(),
                });
            }
        };

        if parsed.ok {
            return parsed.result.ok_or(TelegramError::MissingResult);
        }

        let code = parsed.error_code.unwrap_or(status.as_u16());
        let err = match code {
            401 => TelegramError::Unauthorized,
            429 => TelegramError::RateLimited(
                parsed
                    .parameters
                    .and_then(|p| p.retry_after)
                    .unwrap_or(1),
            ),
            _ => TelegramError::Api {
                code,
                description: parsed
                    .description
                    .unwrap_or_else(|| "Unknown error".to_string()),
            },
        };
        warn!(method, error = %err, "Telegram API error");
        Err(err)
    }

    /// Waits up to `POLL_TIMEOUT` for updates after `offset`.
    pub async fn get_updates(&self, offset: i64) -> Result<Vec<Update>, TelegramError> {
        let request = GetUpdatesRequest {
            offset,
            timeout: POLL_TIMEOUT.as_secs(),
            allowed_updates: vec!["message"],
        };
        self.call("getUpdates", &request, POLL_TIMEOUT + REQUEST_TIMEOUT)
            .await
    }

    pub async fn send_message(&self, chat_id: i64, text: &str) -> Result<Message, TelegramError> {
        let request = SendMessageRequest { chat_id, text };
        let message: Message = self.call("sendMessage", &request, REQUEST_TIMEOUT).await?;
        debug!(chat_id, message_id = message.message_id, "message sent");
        Ok(message)
    }

    pub async fn get_file(&self, file_id: &str) -> Result<File, TelegramError> {
        self.call("getFile", &GetFileRequest { file_id }, REQUEST_TIMEOUT)
            .await
    }

    /// Downloads a file previously resolved with `get_file`.
    pub async fn download(&self, file: &File) -> Result<Vec<u8>, TelegramError> {
        let path = file.file_path.as_deref().ok_or(TelegramError::NoFilePath)?;
        let url = format!("{}/file/bot{}/{path}", self.base_url, self.token.expose());

        let response = self
            .http
            .get(&url)
            .header("User-Agent", crate::USER_AGENT)
            .timeout(REQUEST_TIMEOUT)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(TelegramError::Api {
                code: status.as_u16(),
                description: "file download failed".to_string(),
            });
        }
        if let Some(len) = response.content_length()
            && len as usize > MAX_FILE_BYTES
        {
            return Err(TelegramError::FileTooLarge);
        }

        let mut body = Vec::new();
        let mut stream = response;
        while let Some(chunk) = stream.chunk().await? {
            body.extend_from_slice(&chunk);
            if body.len() > MAX_FILE_BYTES {
                return Err(TelegramError::FileTooLarge);
            }
        }
        debug!(file_id = %file.file_id, bytes = body.len(), "file downloaded");
        Ok(body)
    }
}
