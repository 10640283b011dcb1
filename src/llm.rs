use std::time::Duration;

use anyhow::{Context, Result};
use reqwest::blocking::Client;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::config::{AppConfig, PromptStyle};
use crate::http_client::{body_snippet, client_with_timeout};
use crate::prompt::{
    PromptContext, SYSTEM_PROMPT, format_enhanced_prompt, format_highly_optimized_prompt,
};

const TEMPERATURE: f64 = 0.3;
const MAX_TOKENS: u32 = 1800;

/// Anything that turns a system + user prompt into a completion.
pub trait ChatModel: Send + Sync {
    fn complete(&self, system: &str, user: &str) -> Result<String>;

    fn name(&self) -> &str;
}

pub struct OpenAiClient {
    client: Client,
    api_key: String,
    base_url: String,
    model: String,
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    temperature: f64,
    max_tokens: u32,
    messages: [ChatMessage<'a>; 2],
}

#[derive(Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<ChatChoice>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatReply,
}

#[derive(Deserialize)]
struct ChatReply {
    #[serde(default)]
    content: Option<String>,
}

impl OpenAiClient {
    pub fn new(
        api_key: impl Into<String>,
        base_url: impl Into<String>,
        model: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self> {
        Ok(Self {
            client: client_with_timeout(timeout)?,
            api_key: api_key.into(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            model: model.into(),
        })
    }

    /// `None` when no API key is configured.
    pub fn from_config(config: &AppConfig) -> Result<Option<Self>> {
        let Some(key) = config.openai_api_key.as_deref() else {
            return Ok(None);
        };
        Self::new(
            key,
            config.openai_base_url.as_str(),
            config.openai_model.as_str(),
            config.llm_timeout,
        )
        .map(Some)
    }
}

impl ChatModel for OpenAiClient {
    fn complete(&self, system: &str, user: &str) -> Result<String> {
        let url = format!("{}/chat/completions", self.base_url);
        let body = ChatRequest {
            model: &self.model,
            temperature: TEMPERATURE,
            max_tokens: MAX_TOKENS,
            messages: [
                ChatMessage {
                    role: "system",
                    content: system,
                },
                ChatMessage {
                    role: "user",
                    content: user,
                },
            ],
        };

        debug!(model = %self.model, prompt_chars = user.len(), "chat completion request");
        let resp = self
            .client
            .post(&url)
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .context("chat completion request failed")?;
        let status = resp.status();
        let text = resp.text().context("read chat completion body")?;
        if !status.is_success() {
            return Err(anyhow::anyhow!(
                "chat completion http {}: {}",
                status,
                body_snippet(&text)
            ));
        }

        let parsed: ChatResponse =
            serde_json::from_str(&text).context("invalid chat completion json")?;
        let content = parsed
            .choices
            .into_iter()
            .find_map(|c| c.message.content)
            .map(|c| c.trim().to_string())
            .filter(|c| !c.is_empty())
            .ok_or_else(|| anyhow::anyhow!("chat completion returned no content"))?;
        info!(model = %self.model, reply_chars = content.len(), "chat completion ok");
        Ok(content)
    }

    fn name(&self) -> &str {
        &self.model
    }
}

/// Builds the prompt in the configured style and sends it to `model`.
/// Returns `(prompt, reply)` so callers can keep the prompt for export.
pub fn analyze_with_gpt(
    model: &dyn ChatModel,
    ctx: &PromptContext,
    style: PromptStyle,
) -> Result<(String, String)> {
    let prompt = match style {
        PromptStyle::Optimized => format_highly_optimized_prompt(ctx),
        PromptStyle::Enhanced => format_enhanced_prompt(ctx),
    };
    let reply = model
        .complete(SYSTEM_PROMPT, &prompt)
        .with_context(|| format!("{} analysis failed", model.name()))?;
    Ok((prompt, reply))
}

/// Canned model for offline runs and tests.
pub struct StaticModel {
    pub reply: String,
}

impl ChatModel for StaticModel {
    fn complete(&self, _system: &str, _user: &str) -> Result<String> {
        Ok(self.reply.clone())
    }

    fn name(&self) -> &str {
        "static"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn request_serializes_in_chat_shape() {
        let body = ChatRequest {
            model: "gpt-4o-mini",
            temperature: TEMPERATURE,
            max_tokens: MAX_TOKENS,
            messages: [
                ChatMessage {
                    role: "system",
                    content: "s",
                },
                ChatMessage {
                    role: "user",
                    content: "u",
                },
            ],
        };
        let v = serde_json::to_value(&body).unwrap();
        assert_eq!(v["messages"][1]["role"], "user");
        assert_eq!(v["temperature"], 0.3);
    }

    #[test]
    fn response_without_content_is_empty() {
        let parsed: ChatResponse =
            serde_json::from_str(r#"{"choices":[{"message":{"role":"assistant"}}]}"#).unwrap();
        assert!(parsed.choices[0].message.content.is_none());
    }
}
