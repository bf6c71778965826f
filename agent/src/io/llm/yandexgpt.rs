//! YandexGPT foundation-models completion API.

use std::time::Duration;

use anyhow::{Context, Result};
use reqwest::blocking::Client;
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument};

use super::{ChatClient, ChatMessage, ChatRole};
use crate::io::http::{build_client, ensure_success};

pub const YANDEX_COMPLETION_URL: &str =
    "https://llm.api.cloud.yandex.net/foundationModels/v1/completion";

/// Reply inserted after a system message, which the API does not accept.
const SYSTEM_ACK: &str = "OK.";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum YandexAuth {
    IamToken(String),
    ApiKey(String),
}

impl YandexAuth {
    fn header_value(&self) -> String {
        match self {
            YandexAuth::IamToken(token) => format!("Bearer {token}"),
            YandexAuth::ApiKey(key) => format!("Api-Key {key}"),
        }
    }
}

#[derive(Debug, Clone)]
pub struct YandexGptOptions {
    /// Completion URL override.
    pub endpoint: Option<String>,
    pub folder_id: String,
    pub model: String,
    pub auth: YandexAuth,
    pub temperature: f64,
    pub max_tokens: u32,
    pub timeout_secs: u64,
}

pub struct YandexGptClient {
    http: Client,
    endpoint: String,
    model_uri: String,
    auth: YandexAuth,
    temperature: f64,
    max_tokens: u32,
}

#[derive(Debug, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
struct CompletionRequest {
    model_uri: String,
    completion_options: CompletionOptions,
    messages: Vec<YandexMessage>,
}

#[derive(Debug, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
struct CompletionOptions {
    temperature: f64,
    /// The API takes this as a string.
    max_tokens: String,
}

#[derive(Debug, Serialize, PartialEq, Eq)]
struct YandexMessage {
    role: ChatRole,
    text: String,
}

#[derive(Deserialize, Default)]
struct CompletionResponse {
    #[serde(default)]
    result: CompletionResult,
}

#[derive(Deserialize, Default)]
struct CompletionResult {
    #[serde(default)]
    alternatives: Vec<Alternative>,
}

#[derive(Deserialize)]
struct Alternative {
    #[serde(default)]
    message: Option<AlternativeMessage>,
}

#[derive(Deserialize)]
struct AlternativeMessage {
    #[serde(default)]
    text: String,
}

impl YandexGptClient {
    pub fn new(options: YandexGptOptions) -> Result<Self> {
        Ok(Self {
            http: build_client(Duration::from_secs(options.timeout_secs))?,
            endpoint: options
                .endpoint
                .unwrap_or_else(|| YANDEX_COMPLETION_URL.to_string()),
            model_uri: format!("gpt://{}/{}", options.folder_id, options.model),
            auth: options.auth,
            temperature: options.temperature,
            max_tokens: options.max_tokens,
        })
    }

    fn request(&self, messages: &[ChatMessage]) -> CompletionRequest {
        CompletionRequest {
            model_uri: self.model_uri.clone(),
            completion_options: CompletionOptions {
                temperature: self.temperature,
                max_tokens: self.max_tokens.to_string(),
            },
            messages: to_yandex_messages(messages),
        }
    }
}

/// Rewrite system messages as a user turn followed by an assistant ack.
fn to_yandex_messages(messages: &[ChatMessage]) -> Vec<YandexMessage> {
    let mut out = Vec::with_capacity(messages.len() + 1);
    for message in messages {
        match message.role {
            ChatRole::System => {
                out.push(YandexMessage {
                    role: ChatRole::User,
                    text: message.content.clone(),
                });
                out.push(YandexMessage {
                    role: ChatRole::Assistant,
                    text: SYSTEM_ACK.to_string(),
                });
            }
            role => out.push(YandexMessage {
                role,
                text: message.content.clone(),
            }),
        }
    }
    out
}

impl ChatClient for YandexGptClient {
    #[instrument(skip_all, fields(model_uri = %self.model_uri, messages = messages.len()))]
    fn chat(&self, messages: &[ChatMessage]) -> Result<String> {
        let response = self
            .http
            .post(&self.endpoint)
            .header(reqwest::header::AUTHORIZATION, self.auth.header_value())
            .json(&self.request(messages))
            .send()
            .with_context(|| format!("send completion request to {}", self.endpoint))?;
        let response = ensure_success(response, "yandexgpt completion")?;
        let body: CompletionResponse = response.json().context("decode yandexgpt response")?;
        let text = body
            .result
            .alternatives
            .into_iter()
            .next()
            .and_then(|alt| alt.message)
            .map(|message| message.text)
            .unwrap_or_default();
        debug!(chars = text.len(), "yandexgpt reply received");
        Ok(text)
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn client(auth: YandexAuth) -> YandexGptClient {
        YandexGptClient::new(YandexGptOptions {
            endpoint: None,
            folder_id: "b1g".to_string(),
            model: "yandexgpt-lite/latest".to_string(),
            auth,
            temperature: 0.6,
            max_tokens: 2000,
            timeout_secs: 10,
        })
        .expect("client")
    }

    #[test]
    fn system_message_becomes_user_plus_ack() {
        let out = to_yandex_messages(&[ChatMessage::system("rules"), ChatMessage::user("task")]);
        let roles: Vec<ChatRole> = out.iter().map(|m| m.role).collect();
        assert_eq!(
            roles,
            vec![ChatRole::User, ChatRole::Assistant, ChatRole::User]
        );
        assert_eq!(out[0].text, "rules");
        assert_eq!(out[1].text, "OK.");
        assert_eq!(out[2].text, "task");
    }

    #[test]
    fn request_body_shape() {
        let c = client(YandexAuth::ApiKey("k".to_string()));
        let body = serde_json::to_value(c.request(&[ChatMessage::user("hi")])).expect("serialize");
        assert_eq!(
            body,
            json!({
                "modelUri": "gpt://b1g/yandexgpt-lite/latest",
                "completionOptions": {"temperature": 0.6, "maxTokens": "2000"},
                "messages": [{"role": "user", "text": "hi"}],
            })
        );
    }

    #[test]
    fn auth_header_prefers_iam_scheme() {
        assert_eq!(YandexAuth::IamToken("t".into()).header_value(), "Bearer t");
        assert_eq!(YandexAuth::ApiKey("k".into()).header_value(), "Api-Key k");
    }

    #[test]
    fn empty_alternatives_read_as_empty_text() {
        let body: CompletionResponse = serde_json::from_str(r#"{"result":{}}"#).expect("parse");
        assert!(body.result.alternatives.is_empty());
    }
}
