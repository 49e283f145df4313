use std::time::Duration;

use reqwest::Client;
use serde_json::Value;
use tracing::debug;
use url::Url;

use super::{MAX_CHARS, TranslateError, Translator};

const API_BASE: &str = "https://translate.googleapis.com";
const REQUEST_TIMEOUT: Duration = Duration::from_secs(15);

/// Client for the public Google Translate web endpoint (`client=gtx`), which
/// needs no API key.
#[derive(Clone, Debug)]
pub struct GoogleTranslator {
    http: Client,
    base_url: String,
}

impl GoogleTranslator {
    pub fn new(http: Client) -> Self {
        Self {
            http,
            base_url: API_BASE.to_string(),
        }
    }

    #[cfg(test)]
    pub(crate) fn with_base_url(http: Client, base_url: &str) -> Self {
        Self {
            http,
            base_url: base_url.to_string(),
        }
    }

    fn request_url(&self, text: &str, source: &str, target: &str) -> Result<Url, TranslateError> {
        Ok(Url::parse_with_params(
            &format!("{}/translate_a/single", self.base_url),
            &[
                ("client", "gtx"),
                ("sl", source),
                ("tl", target),
                ("dt", "t"),
                ("q", text),
            ],
        )?)
    }
}

impl Translator for GoogleTranslator {
    async fn translate(
        &self,
        text: &str,
        source: &str,
        target: &str,
    ) -> Result<String, TranslateError> {
        if text.trim().is_empty() || source == target {
            return Ok(text.to_string());
        }
        let len = text.chars().count();
        if len > MAX_CHARS {
            return Err(TranslateError::TooLong(len));
        }

        let url = self.request_url(text, source, target)?;
        let response = self
            .http
            .get(url)
            .header("User-Agent", crate::USER_AGENT)
            .timeout(REQUEST_TIMEOUT)
            .send()
            .await?;

        let status = response.status();
        if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
            return Err(TranslateError::RateLimited);
        }
        if !status.is_success() {
            return Err(TranslateError::Status(status.as_u16()));
        }

        let body: Value = response.json().await?;
        let translated = extract_translation(&body)?;
        debug!(source, target, chars = translated.len(), "translated");
        Ok(translated)
    }
}

/// Joins the translated segments found at `body[0][i][0]`.
fn extract_translation(body: &Value) -> Result<String, TranslateError> {
    let segments = body
        .get(0)
        .and_then(Value::as_array)
        .ok_or_else(|| TranslateError::Malformed(snippet(body)))?;

    let translated: String = segments
        .iter()
        .filter_map(|segment| segment.get(0).and_then(Value::as_str))
        .collect();

    if translated.is_empty() {
        return Err(TranslateError::Malformed(snippet(body)));
    }
    Ok(translated)
}

fn snippet(body: &Value) -> String {
    body.to_string().chars().take(200).collect()
}
