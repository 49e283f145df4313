use std::future::Future;
use std::time::Duration;

use reqwest::Client;
use serde::Serialize;
use serde::de::DeserializeOwned;
use tracing::{debug, warn};

use super::types::{ApiError, EmbedRequest, EmbedResponse, GenerateRequest, GenerateResponse};

const GENERATE_TIMEOUT: Duration = Duration::from_secs(180);
const EMBED_TIMEOUT: Duration = Duration::from_secs(120);
const MAX_RETRIES: u32 = 3;
const INITIAL_BACKOFF: Duration = Duration::from_millis(1000);

#[derive(Debug, thiserror::Error)]
pub enum OllamaError {
    #[error("cannot reach Ollama at {0}. Is `ollama serve` running?")]
    Unreachable(String),

    #[error("model '{0}' not found. Run `ollama pull {0}` first.")]
    ModelNotFound(String),

    #[error("Ollama is overloaded. Please retry later.")]
    Overloaded,

    #[error("Ollama API error ({code}): {message}")]
    Api { code: u16, message: String },

    #[error("embedding response had {got} vectors for {expected} inputs")]
    EmbeddingCount { expected: usize, got: usize },

    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),
}

/// Turns text into vectors. `OllamaClient` in production, mocks in tests.
pub trait Embedder {
    /// Name of the embedding model, recorded in the index so vector spaces never mix.
    fn model(&self) -> &str;

    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, OllamaError>;
}

/// Completes a prompt with a language model.
pub trait Generator {
    async fn generate(&self, prompt: &str) -> Result<String, OllamaError>;
}

#[derive(Clone, Debug)]
pub struct OllamaClient {
    http: Client,
    base_url: String,
    chat_model: String,
    embedding_model: String,
    backoff: Duration,
}

impl OllamaClient {
    pub fn new(http: Client, base_url: &str, chat_model: &str, embedding_model: &str) -> Self {
        Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
            chat_model: chat_model.to_string(),
            embedding_model: embedding_model.to_string(),
            backoff: INITIAL_BACKOFF,
        }
    }

    #[cfg(test)]
    pub(crate) fn with_base_url(http: Client, base_url: &str) -> Self {
        Self {
            backoff: Duration::from_millis(5),
            ..Self::new(http, base_url, "mistral", "nomic-embed-text")
        }
    }

    async fn post_json<B, T>(
        &self,
        path: &str,
        model: &str,
        body: &B,
        timeout: Duration,
    ) -> Result<T, OllamaError>
    where
        B: Serialize,
        T: DeserializeOwned,
    {
        let url = format!("{}{path}", self.base_url);
        let response = self
            .http
            .post(&url)
            .header("User-Agent", crate::USER_AGENT)
            .json(body)
            .timeout(timeout)
            .send()
            .await
            .map_err(|e| {
                if e.is_connect() {
                    OllamaError::Unreachable(self.base_url.clone())
                } else {
                    OllamaError::Network(e)
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            let message = serde_json::from_str::<ApiError>(&text)
                .ok()
                .and_then(|body| body.error)
                .unwrap_or_else(|| text.chars().take(200).collect());
            let classified = classify_status(status.as_u16(), message, model);
            warn!(status = %status, error = %classified, "Ollama API error");
            return Err(classified);
        }

        Ok(response.json().await?)
    }

    async fn with_retries<T, F, Fut>(&self, mut op: F) -> Result<T, OllamaError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, OllamaError>>,
    {
        let mut last_err = None;
        for attempt in 0..MAX_RETRIES {
            match op().await {
                Ok(value) => return Ok(value),
                Err(e) if is_retriable(&e) => {
                    last_err = Some(e);
                    if attempt + 1 < MAX_RETRIES {
                        let delay = jittered_backoff(self.backoff, attempt);
                        debug!(
                            attempt = attempt + 1,
                            delay_ms = delay.as_millis() as u64,
                            "retrying after transient error"
                        );
                        tokio::time::sleep(delay).await;
                    }
                }
                Err(e) => return Err(e),
            }
        }
        Err(last_err.unwrap_or(OllamaError::Overloaded))
    }
}

impl Embedder for OllamaClient {
    fn model(&self) -> &str {
        &self.embedding_model
    }

    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, OllamaError> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }
        let request = EmbedRequest {
            model: &self.embedding_model,
            input: texts,
        };
        let response: EmbedResponse = self
            .with_retries(|| {
                self.post_json("/api/embed", &self.embedding_model, &request, EMBED_TIMEOUT)
            })
            .await?;

        if response.embeddings.len() != texts.len() {
            return Err(OllamaError::EmbeddingCount {
                expected: texts.len(),
                got: response.embeddings.len(),
            });
        }
        debug!(model = %self.embedding_model, count = texts.len(), "embedded batch");
        Ok(response.embeddings)
    }
}

impl Generator for OllamaClient {
    async fn generate(&self, prompt: &str) -> Result<String, OllamaError> {
        let request = GenerateRequest {
            model: &self.chat_model,
            prompt,
            stream: false,
        };
        let response: GenerateResponse = self
            .with_retries(|| {
                self.post_json("/api/generate", &self.chat_model, &request, GENERATE_TIMEOUT)
            })
            .await?;
        debug!(model = %self.chat_model, chars = response.response.len(), "generation complete");
        Ok(response.response)
    }
}

fn classify_status(code: u16, message: String, model: &str) -> OllamaError {
    match code {
        404 => OllamaError::ModelNotFound(model.to_string()),
        429 | 503 => OllamaError::Overloaded,
        _ => OllamaError::Api { code, message },
    }
}

fn is_retriable(e: &OllamaError) -> bool {
    matches!(
        e,
        OllamaError::Overloaded
            | OllamaError::Api {
                code: 500..=599,
                ..
            }
    )
}

/// Equal jitter backoff: base/2 + rand(0, base/2).
fn jittered_backoff(initial: Duration, attempt: u32) -> Duration {
    let base = initial.as_millis() as u64 * 2u64.pow(attempt);
    let half = base / 2;
    Duration::from_millis(half + fastrand::u64(..half.max(1)))
}


#[cfg(test)]
mod http_tests {
    use super::*;
    use wiremock::matchers::{body_partial_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[tokio::test]
    async fn embed_returns_one_vector_per_input() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/embed"))
            .and(body_partial_json(serde_json::json!({"model": "nomic-embed-text"})))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "model": "nomic-embed-text",
                "embeddings": [[0.1, 0.2], [0.3, 0.4]]
            })))
            .mount(&server)
            .await;

        let client = OllamaClient::with_base_url(Client::new(), &server.uri());
        let vectors = client
            .embed(&["napa".to_string(), "seclo".to_string()])
            .await
            .unwrap();

        assert_eq!(vectors.len(), 2);
        assert_eq!(vectors[1], vec![0.3, 0.4]);
    }

    #[tokio::test]
    async fn embed_empty_input_skips_request() {
        let server = MockServer::start().await;
        let client = OllamaClient::with_base_url(Client::new(), &server.uri());
        assert!(client.embed(&[]).await.unwrap().is_empty());
        assert!(server.received_requests().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn embed_count_mismatch_is_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/embed"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(serde_json::json!({"embeddings": [[0.1]]})),
            )
            .mount(&server)
            .await;

        let client = OllamaClient::with_base_url(Client::new(), &server.uri());
        let result = client.embed(&["a".to_string(), "b".to_string()]).await;
        assert!(matches!(
            result,
            Err(OllamaError::EmbeddingCount {
                expected: 2,
                got: 1
            })
        ));
    }

    #[tokio::test]
    async fn generate_sends_non_streaming_request() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/generate"))
            .and(body_partial_json(serde_json::json!({
                "model": "mistral",
                "stream": false
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "model": "mistral",
                "response": "Napa is paracetamol.",
                "done": true
            })))
            .mount(&server)
            .await;

        let client = OllamaClient::with_base_url(Client::new(), &server.uri());
        let answer = client.generate("What is Napa?").await.unwrap();
        assert_eq!(answer, "Napa is paracetamol.");
    }

    #[tokio::test]
    async fn generate_404_reports_missing_model() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/generate"))
            .respond_with(
                ResponseTemplate::new(404)
                    .set_body_json(serde_json::json!({"error": "model 'mistral' not found"})),
            )
            .mount(&server)
            .await;

        let client = OllamaClient::with_base_url(Client::new(), &server.uri());
        let result = client.generate("hi").await;
        assert!(matches!(result, Err(OllamaError::ModelNotFound(ref m)) if m == "mistral"));
    }

    #[tokio::test]
    async fn generate_retries_transient_overload() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/generate"))
            .respond_with(ResponseTemplate::new(503))
            .up_to_n_times(1)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/api/generate"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(serde_json::json!({"response": "ok"})),
            )
            .mount(&server)
            .await;

        let client = OllamaClient::with_base_url(Client::new(), &server.uri());
        assert_eq!(client.generate("hi").await.unwrap(), "ok");
        assert_eq!(server.received_requests().await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn generate_gives_up_after_max_retries() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/generate"))
            .respond_with(
                ResponseTemplate::new(500)
                    .set_body_json(serde_json::json!({"error": "llama runner crashed"})),
            )
            .mount(&server)
            .await;

        let client = OllamaClient::with_base_url(Client::new(), &server.uri());
        match client.generate("hi").await {
            Err(OllamaError::Api { code: 500, message }) => {
                assert!(message.contains("llama runner crashed"));
            }
            other => panic!("expected Api(500), got: {other:?}"),
        }
        assert_eq!(
            server.received_requests().await.unwrap().len(),
            MAX_RETRIES as usize
        );
    }

    #[tokio::test]
    async fn connection_refused_is_unreachable() {
        let client = OllamaClient::with_base_url(Client::new(), "http://127.0.0.1:1");
        let result = client.generate("hi").await;
        assert!(matches!(result, Err(OllamaError::Unreachable(_))));
    }
}
