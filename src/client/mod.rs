//! Chat-completion client for an OpenAI-style `/chat/completions` endpoint.
//!
//! Each [`ChatClient::send_chat`] call is an independent round trip: build the
//! request, send it with retries, then classify the final response into a reply
//! or a [`ChatError`]. The client holds no conversation state and can be shared
//! across tasks; clones reuse the same connection pool.

mod error;
mod retry;
mod transport;

use std::time::Duration;

use anyhow::{Context, Result};
use reqwest::header::{AUTHORIZATION, CONTENT_TYPE, HeaderMap, HeaderValue};
use reqwest::{Client, Method, StatusCode};
use serde::{Deserialize, Serialize};
use tracing::{debug, error, info, warn};

use crate::config::{Config, PROVIDER};
use crate::model::Message;

pub use error::{ChatError, UpstreamBody};
pub use retry::{DEFAULT_BACKOFF_FACTOR, DEFAULT_MAX_RETRIES, RetryPolicy};

use error::{MAX_BODY_DETAIL_CHARS, truncate_chars};
use transport::TransportFailure;

pub const DEFAULT_TEMPERATURE: f32 = 0.7;

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: &'a [Message],
    temperature: f32,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<u32>,
}

impl ChatRequest<'_> {
    fn field_names(&self) -> Vec<&'static str> {
        let mut fields = vec!["model", "messages", "temperature"];
        if self.max_tokens.is_some() {
            fields.push("max_tokens");
        }
        fields
    }
}

#[derive(Debug, Deserialize)]
struct CompletionResponse {
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ChoiceMessage,
}

#[derive(Debug, Deserialize)]
struct ChoiceMessage {
    content: String,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ChatOptions {
    pub temperature: f32,
    pub max_tokens: Option<u32>,
}

impl Default for ChatOptions {
    fn default() -> Self {
        Self {
            temperature: DEFAULT_TEMPERATURE,
            max_tokens: None,
        }
    }
}

#[derive(Clone)]
pub struct ClientSettings {
    pub base_url: String,
    pub api_key: String,
    pub model: String,
    pub timeout: Duration,
    pub retry: RetryPolicy,
}

impl From<&Config> for ClientSettings {
    fn from(cfg: &Config) -> Self {
        Self {
            base_url: cfg.base_url.clone(),
            api_key: cfg.api_key.clone(),
            model: cfg.model.clone(),
            timeout: Duration::from_secs(cfg.timeout_secs),
            retry: RetryPolicy::new(cfg.max_retries, cfg.backoff_factor),
        }
    }
}

#[derive(Clone)]
pub struct ChatClient {
    http: Client,
    endpoint: String,
    headers: HeaderMap,
    model: String,
    retry: RetryPolicy,
}

/// A fully received upstream response.
struct Received {
    status: StatusCode,
    headers: HeaderMap,
    text: String,
}

enum Attempt {
    Received(Received),
    Failed(reqwest::Error, TransportFailure),
}

fn completions_url(base_url: &str) -> String {
    format!("{}/chat/completions", base_url.trim_end_matches('/'))
}

fn auth_headers(api_key: &str) -> Result<HeaderMap> {
    let mut bearer = HeaderValue::from_str(&format!("Bearer {api_key}"))
        .context("API key contains characters that are not valid in an HTTP header")?;
    bearer.set_sensitive(true);

    let mut headers = HeaderMap::new();
    headers.insert(AUTHORIZATION, bearer);
    headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
    Ok(headers)
}

impl ChatClient {
    pub fn new(settings: ClientSettings) -> Result<Self> {
        let http = Client::builder()
            .timeout(settings.timeout)
            .build()
            .context("Failed to initialize HTTP client")?;

        Ok(Self {
            http,
            endpoint: completions_url(&settings.base_url),
            headers: auth_headers(&settings.api_key)?,
            model: settings.model,
            retry: settings.retry,
        })
    }

    pub fn from_config(cfg: &Config) -> Result<Self> {
        Self::new(ClientSettings::from(cfg))
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    pub async fn send(
        &self,
        messages: &[Message],
        options: ChatOptions,
    ) -> Result<String, ChatError> {
        self.send_chat(messages, options.temperature, options.max_tokens).await
    }

    pub async fn send_chat(
        &self,
        messages: &[Message],
        temperature: f32,
        max_tokens: Option<u32>,
    ) -> Result<String, ChatError> {
        if messages.is_empty() {
            let err = ChatError::unexpected("cannot send an empty conversation");
            error!(
                provider = PROVIDER,
                model = %self.model,
                error = %err,
                "refusing chat request"
            );
            return Err(err);
        }

        let request = ChatRequest {
            model: &self.model,
            messages,
            temperature,
            max_tokens,
        };
        info!(
            provider = PROVIDER,
            model = %self.model,
            message_count = messages.len(),
            "sending chat request"
        );
        debug!(payload_fields = ?request.field_names(), "chat request payload");

        let body = serde_json::to_vec(&request).map_err(|err| {
            error!(error = ?err, "failed to serialize chat request");
            ChatError::unexpected(err)
        })?;

        match self.send_with_retries(body).await {
            Attempt::Received(received) => classify(received),
            Attempt::Failed(err, failure) => {
                error!(
                    provider = PROVIDER,
                    model = %self.model,
                    failure = ?failure,
                    error = ?err,
                    "chat request failed before a complete response was received"
                );
                Err(transport::into_chat_error(err))
            }
        }
    }

    /// One attempt, including the body read, so a stall or reset mid-body is
    /// treated like any other transport failure.
    async fn send_once(&self, body: &[u8]) -> reqwest::Result<Received> {
        let response = self
            .http
            .post(&self.endpoint)
            .headers(self.headers.clone())
            .body(body.to_vec())
            .send()
            .await?;
        let status = response.status();
        let headers = response.headers().clone();
        let text = response.text().await?;
        Ok(Received {
            status,
            headers,
            text,
        })
    }

    async fn send_with_retries(&self, body: Vec<u8>) -> Attempt {
        let max_attempts = if self.retry.allows_method(&Method::POST) {
            self.retry.max_attempts()
        } else {
            1
        };
        let mut attempt = 1;

        loop {
            let outcome = match self.send_once(&body).await {
                Ok(received) => Attempt::Received(received),
                Err(err) => {
                    let failure = transport::classify(&err);
                    Attempt::Failed(err, failure)
                }
            };

            if attempt >= max_attempts {
                return outcome;
            }

            let retry_delay = match &outcome {
                Attempt::Received(received)
                    if self.retry.is_retryable_status(received.status.as_u16()) =>
                {
                    warn!(
                        provider = PROVIDER,
                        status = %received.status,
                        attempt,
                        max_attempts,
                        "retryable status from provider"
                    );
                    Some(self.retry.delay_after_response(attempt + 1, &received.headers))
                }
                Attempt::Failed(err, failure) if failure.is_retryable() => {
                    warn!(
                        provider = PROVIDER,
                        failure = ?failure,
                        error = %err,
                        attempt,
                        max_attempts,
                        "transport failure calling provider"
                    );
                    Some(self.retry.delay_before(attempt + 1))
                }
                _ => None,
            };
            let Some(delay) = retry_delay else {
                return outcome;
            };

            drop(outcome);
            attempt += 1;
            if !delay.is_zero() {
                debug!(attempt, delay_ms = delay.as_millis() as u64, "backing off before retry");
                tokio::time::sleep(delay).await;
            }
        }
    }
}

fn classify(received: Received) -> Result<String, ChatError> {
    let Received { status, text, .. } = received;

    if !status.is_success() {
        warn!(
            provider = PROVIDER,
            status = %status,
            body = %truncate_chars(&text, MAX_BODY_DETAIL_CHARS),
            "non-success response from provider"
        );
        return Err(match status {
            StatusCode::UNAUTHORIZED => ChatError::Unauthorized,
            StatusCode::TOO_MANY_REQUESTS => ChatError::RateLimited,
            _ => ChatError::Upstream {
                status: status.as_u16(),
                body: UpstreamBody::capture(&text),
            },
        });
    }

    let reply = extract_reply(&text).inspect_err(|err| {
        error!(
            provider = PROVIDER,
            error = ?err,
            body = %truncate_chars(&text, MAX_BODY_DETAIL_CHARS),
            "malformed response from provider"
        );
    })?;
    info!(provider = PROVIDER, reply_len = reply.len(), "received chat response");
    Ok(reply)
}

fn extract_reply(body: &str) -> Result<String, ChatError> {
    let parsed: CompletionResponse = serde_json::from_str(body).map_err(ChatError::malformed)?;
    parsed
        .choices
        .into_iter()
        .next()
        .map(|choice| choice.message.content)
        .ok_or_else(|| ChatError::malformed("response contained no choices"))
}

#[cfg(test)]
mod tests {
    use serde_json::Value;

    use super::{ChatError, ChatRequest, completions_url, extract_reply};
    use crate::model::Message;

    #[test]
    fn completions_url_trims_trailing_slash() {
        assert_eq!(
            completions_url("https://api.mistral.ai/v1/"),
            "https://api.mistral.ai/v1/chat/completions"
        );
        assert_eq!(
            completions_url("http://localhost:8080/v1"),
            "http://localhost:8080/v1/chat/completions"
        );
    }

    #[test]
    fn request_omits_max_tokens_when_unset() {
        let messages = [Message::system("sys"), Message::user("hi")];
        let request = ChatRequest {
            model: "m",
            messages: &messages,
            temperature: 0.7,
            max_tokens: None,
        };
        let json: Value = serde_json::to_value(&request).expect("request should serialize");
        let object = json.as_object().expect("request should be an object");

        assert!(!object.contains_key("max_tokens"));
        assert_eq!(object["messages"][1]["role"], "user");
        assert_eq!(request.field_names(), ["model", "messages", "temperature"]);
    }

    #[test]
    fn request_includes_max_tokens_when_set() {
        let messages = [Message::user("hi")];
        let request = ChatRequest {
            model: "m",
            messages: &messages,
            temperature: 0.2,
            max_tokens: Some(64),
        };
        let json: Value = serde_json::to_value(&request).expect("request should serialize");
        assert_eq!(json["max_tokens"], 64);
        assert!(request.field_names().contains(&"max_tokens"));
    }

    #[test]
    fn extract_reply_reads_first_choice() {
        let body = r#"{"id":"x","choices":[
            {"message":{"role":"assistant","content":"hello"}},
            {"message":{"content":"second"}}
        ]}"#;
        assert_eq!(extract_reply(body).expect("reply should parse"), "hello");
    }

    #[test]
    fn extract_reply_rejects_unexpected_shapes() {
        for body in [
            "not json",
            "{}",
            r#"{"choices":[]}"#,
            r#"{"choices":[{"message":{}}]}"#,
            r#"{"choices":[{"message":{"content":null}}]}"#,
            r#"{"choices":[{"message":{"content":42}}]}"#,
            r#"{"choices":{"message":{"content":"x"}}}"#,
        ] {
            assert!(
                matches!(extract_reply(body), Err(ChatError::MalformedResponse { .. })),
                "body {body} should be malformed"
            );
        }
    }
}
