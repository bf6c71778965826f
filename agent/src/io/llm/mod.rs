//! Chat-completion clients.
//!
//! Agents only see the [`ChatClient`] trait; [`create_chat_client`] picks the
//! concrete backend from [`AgentConfig`].

pub mod openrouter;
pub mod yandexgpt;

use anyhow::{Result, bail};
use serde::Serialize;
use serde_json::Value;
use tracing::debug;

use crate::io::config::{AgentConfig, Provider};

pub use openrouter::OpenRouterClient;
pub use yandexgpt::YandexGptClient;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ChatRole {
    System,
    User,
    Assistant,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ChatMessage {
    pub role: ChatRole,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: ChatRole::System,
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: ChatRole::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: ChatRole::Assistant,
            content: content.into(),
        }
    }
}

/// JSON schema the reply must conform to in structured mode.
#[derive(Debug, Clone, PartialEq)]
pub struct ResponseSchema {
    pub name: &'static str,
    pub schema: Value,
}

/// A chat-completion backend.
pub trait ChatClient {
    /// Send messages and return the reply text (empty when the backend
    /// returned no content).
    fn chat(&self, messages: &[ChatMessage]) -> Result<String>;

    /// Send messages constrained to `schema`.
    ///
    /// `Ok(None)` means the backend does not support structured output.
    fn chat_structured(
        &self,
        messages: &[ChatMessage],
        schema: &ResponseSchema,
    ) -> Result<Option<String>> {
        let _ = (messages, schema);
        Ok(None)
    }
}

impl<T: ChatClient + ?Sized> ChatClient for Box<T> {
    fn chat(&self, messages: &[ChatMessage]) -> Result<String> {
        (**self).chat(messages)
    }

    fn chat_structured(
        &self,
        messages: &[ChatMessage],
        schema: &ResponseSchema,
    ) -> Result<Option<String>> {
        (**self).chat_structured(messages, schema)
    }
}

/// Build the configured backend, checking that its credentials are present.
pub fn create_chat_client(config: &AgentConfig) -> Result<Box<dyn ChatClient>> {
    let llm = &config.settings.llm;
    debug!(provider = config.provider.as_str(), model = %config.model, "creating chat client");
    match config.provider {
        Provider::YandexGpt => {
            if config.yc_folder_id.is_empty() {
                bail!("YC_FOLDER_ID is required for YandexGPT");
            }
            let auth = if !config.yc_iam_token.is_empty() {
                yandexgpt::YandexAuth::IamToken(config.yc_iam_token.clone())
            } else if !config.llm_api_key.is_empty() {
                yandexgpt::YandexAuth::ApiKey(config.llm_api_key.clone())
            } else {
                bail!("YC_IAM_TOKEN or YC_API_KEY is required for YandexGPT");
            };
            Ok(Box::new(YandexGptClient::new(
                yandexgpt::YandexGptOptions {
                    endpoint: llm.base_url.clone(),
                    folder_id: config.yc_folder_id.clone(),
                    model: config.model.clone(),
                    auth,
                    temperature: llm.temperature,
                    max_tokens: llm.max_tokens,
                    timeout_secs: llm.timeout_secs,
                },
            )?))
        }
        Provider::OpenRouter => {
            if config.llm_api_key.is_empty() {
                bail!("OPENROUTER_API_KEY is required for OpenRouter");
            }
            Ok(Box::new(OpenRouterClient::new(
                llm.base_url.as_deref(),
                &config.llm_api_key,
                &config.model,
                llm.timeout_secs,
            )?))
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;
    use crate::io::config::AgentSettings;

    fn config(vars: &[(&str, &str)]) -> AgentConfig {
        let map: HashMap<&str, &str> = vars.iter().copied().collect();
        AgentConfig::from_env_with(AgentSettings::default(), |key| {
            map.get(key).map(|v| (*v).to_string())
        })
    }

    fn err_text(result: Result<Box<dyn ChatClient>>) -> String {
        match result {
            Ok(_) => panic!("expected configuration error"),
            Err(err) => err.to_string(),
        }
    }

    #[test]
    fn openrouter_requires_key() {
        assert!(err_text(create_chat_client(&config(&[]))).contains("OPENROUTER_API_KEY"));
        assert!(create_chat_client(&config(&[("OPENROUTER_API_KEY", "k")])).is_ok());
    }

    #[test]
    fn yandex_requires_folder_and_auth() {
        let no_folder = config(&[("LLM_PROVIDER", "yandexgpt"), ("YC_API_KEY", "k")]);
        assert!(err_text(create_chat_client(&no_folder)).contains("YC_FOLDER_ID"));

        let no_auth = config(&[("LLM_PROVIDER", "yandexgpt"), ("YC_FOLDER_ID", "f")]);
        assert!(err_text(create_chat_client(&no_auth)).contains("YC_IAM_TOKEN"));

        let iam = config(&[
            ("LLM_PROVIDER", "yandexgpt"),
            ("YC_FOLDER_ID", "f"),
            ("YC_IAM_TOKEN", "t"),
        ]);
        assert!(create_chat_client(&iam).is_ok());
    }

    #[test]
    fn roles_serialize_lowercase() {
        let json = serde_json::to_string(&ChatMessage::system("hi")).expect("serialize");
        assert_eq!(json, r#"{"role":"system","content":"hi"}"#);
    }
}
