//! Best-effort machine translation between English and Bangla.

mod google;

pub use google::GoogleTranslator;

use tracing::warn;

/// Longest text the web endpoint accepts in one request.
pub const MAX_CHARS: usize = 5000;

#[derive(Debug, thiserror::Error)]
pub enum TranslateError {
    #[error("text too long to translate ({0} chars, max {MAX_CHARS})")]
    TooLong(usize),

    #[error("translation rate limit exceeded")]
    RateLimited,

    #[error("translation failed: status {0}")]
    Status(u16),

    #[error("unexpected translation response: {0}")]
    Malformed(String),

    #[error("invalid translation URL: {0}")]
    Url(#[from] url::ParseError),

    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),
}

/// `source` is an ISO 639-1 code or `"auto"`; `target` is an ISO 639-1 code.
pub trait Translator {
    async fn translate(&self, text: &str, source: &str, target: &str)
    -> Result<String, TranslateError>;
}

/// Translates `text`, falling back to the untranslated input on any failure.
pub async fn translate_or_original(
    translator: &impl Translator,
    text: &str,
    source: &str,
    target: &str,
) -> String {
    match translator.translate(text, source, target).await {
        Ok(translated) if !translated.trim().is_empty() => translated,
        Ok(_) => text.to_string(),
        Err(e) => {
            warn!(error = %e, source, target, "translation failed, keeping original text");
            text.to_string()
        }
    }
}
