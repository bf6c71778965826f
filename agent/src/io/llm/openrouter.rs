//! OpenRouter (OpenAI-compatible chat completions).

use std::time::Duration;

use anyhow::{Context, Result};
use reqwest::blocking::Client;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use tracing::{debug, instrument};

use super::{ChatClient, ChatMessage, ResponseSchema};
use crate::io::http::{build_client, ensure_success};

pub const OPENROUTER_BASE: &str = "https://openrouter.ai/api/v1";

pub struct OpenRouterClient {
    http: Client,
    endpoint: String,
    api_key: String,
    model: String,
}

#[derive(Serialize)]
struct CompletionRequest<'a> {
    model: &'a str,
    messages: &'a [ChatMessage],
    #[serde(skip_serializing_if = "Option::is_none")]
    response_format: Option<Value>,
}

#[derive(Deserialize)]
struct CompletionResponse {
    #[serde(default)]
    choices: Vec<Choice>,
}

#[derive(Deserialize)]
struct Choice {
    message: ReplyMessage,
}

#[derive(Deserialize)]
struct ReplyMessage {
    #[serde(default)]
    content: Option<String>,
}

impl OpenRouterClient {
    pub fn new(
        base_url: Option<&str>,
        api_key: &str,
        model: &str,
        timeout_secs: u64,
    ) -> Result<Self> {
        let base = base_url.unwrap_or(OPENROUTER_BASE).trim_end_matches('/');
        Ok(Self {
            http: build_client(Duration::from_secs(timeout_secs))?,
            endpoint: format!("{base}/chat/completions"),
            api_key: api_key.to_string(),
            model: model.to_string(),
        })
    }

    fn complete(&self, messages: &[ChatMessage], response_format: Option<Value>) -> Result<String> {
        let request = CompletionRequest {
            model: &self.model,
            messages,
            response_format,
        };
        let response = self
            .http
            .post(&self.endpoint)
            .bearer_auth(&self.api_key)
            .json(&request)
            .send()
            .with_context(|| format!("send chat request to {}", self.endpoint))?;
        let response = ensure_success(response, "openrouter chat completion")?;
        let body: CompletionResponse = response.json().context("decode openrouter response")?;
        let content = body
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .unwrap_or_default();
        debug!(chars = content.len(), "openrouter reply received");
        Ok(content)
    }
}

impl ChatClient for OpenRouterClient {
    #[instrument(skip_all, fields(model = %self.model, messages = messages.len()))]
    fn chat(&self, messages: &[ChatMessage]) -> Result<String> {
        self.complete(messages, None)
    }

    #[instrument(skip_all, fields(model = %self.model, schema = schema.name))]
    fn chat_structured(
        &self,
        messages: &[ChatMessage],
        schema: &ResponseSchema,
    ) -> Result<Option<String>> {
        let format = json!({
            "type": "json_schema",
            "json_schema": {
                "name": schema.name,
                "strict": true,
                "schema": schema.schema,
            }
        });
        self.complete(messages, Some(format)).map(Some)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::io::llm::ChatRole;

    #[test]
    fn request_omits_absent_response_format() {
        let messages = vec![ChatMessage::user("hi")];
        let request = CompletionRequest {
            model: "m",
            messages: &messages,
            response_format: None,
        };
        let json = serde_json::to_value(&request).expect("serialize");
        assert_eq!(
            json,
            json!({"model": "m", "messages": [{"role": "user", "content": "hi"}]})
        );
        assert_eq!(messages[0].role, ChatRole::User);
    }

    #[test]
    fn null_content_reads_as_empty() {
        let body: CompletionResponse =
            serde_json::from_str(r#"{"choices":[{"message":{"content":null}}]}"#).expect("parse");
        let content = body
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .unwrap_or_default();
        assert_eq!(content, "");
    }

    #[test]
    fn endpoint_honours_base_override() {
        let client =
            OpenRouterClient::new(Some("http://localhost:9/v1/"), "k", "m", 5).expect("client");
        assert_eq!(client.endpoint, "http://localhost:9/v1/chat/completions");
    }
}
