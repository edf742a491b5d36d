//! Language-model oracle abstraction.
//!
//! The [`Oracle`] trait decouples agents from the HTTP backend. Failures are
//! values ([`OracleError`]) that each agent converts into feedback text, a
//! failed fix, or a default judgement. Tests use scripted oracles.

use std::env;
use std::time::Duration;

use anyhow::{Result, anyhow};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, instrument, warn};

use crate::io::config::{OracleConfig, Sampling};

/// One chat completion request.
#[derive(Debug, Clone, PartialEq)]
pub struct CompletionRequest {
    pub system: String,
    pub user: String,
    pub max_tokens: u32,
    pub temperature: f32,
}

impl CompletionRequest {
    pub fn new(system: &str, user: String, sampling: Sampling) -> Self {
        Self {
            system: system.to_string(),
            user,
            max_tokens: sampling.max_tokens,
            temperature: sampling.temperature,
        }
    }
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum OracleError {
    #[error("request failed: {0}")]
    Transport(String),
    #[error("request timed out after {seconds}s")]
    Timeout { seconds: u64 },
    #[error("API error {status}: {body}")]
    Status { status: u16, body: String },
    #[error("malformed response: {0}")]
    Malformed(String),
}

pub trait Oracle {
    /// Model id recorded in the experiment log.
    fn model(&self) -> &str;
    fn complete(&self, request: &CompletionRequest) -> Result<String, OracleError>;
}

/// Client for an OpenAI-compatible `/chat/completions` endpoint.
pub struct ChatOracle {
    agent: ureq::Agent,
    url: String,
    api_key: String,
    model: String,
    timeout: Duration,
}

impl ChatOracle {
    /// Build from config, reading the API key (and model id when not set in
    /// the file) from the environment.
    pub fn from_env(config: &OracleConfig) -> Result<Self> {
        Self::from_lookup(config, |name| env::var(name).ok())
    }

    pub fn from_lookup(
        config: &OracleConfig,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Result<Self> {
        let present = |value: Option<String>| value.filter(|v| !v.trim().is_empty());
        let api_key = present(lookup(&config.api_key_env))
            .ok_or_else(|| anyhow!("{} not set; an API key is required", config.api_key_env))?;
        let model = present(config.model.clone())
            .or_else(|| present(lookup(&config.model_env)))
            .ok_or_else(|| {
                anyhow!(
                    "no model configured; set oracle.model or {}",
                    config.model_env
                )
            })?;

        let timeout = Duration::from_secs(config.timeout_secs);
        let agent_config = ureq::Agent::config_builder()
            .timeout_global(Some(timeout))
            .http_status_as_error(false)
            .build();
        Ok(Self {
            agent: ureq::Agent::new_with_config(agent_config),
            url: format!("{}/chat/completions", config.base_url.trim_end_matches('/')),
            api_key,
            model,
            timeout,
        })
    }
}

impl Oracle for ChatOracle {
    fn model(&self) -> &str {
        &self.model
    }

    #[instrument(skip_all, fields(model = %self.model, max_tokens = request.max_tokens))]
    fn complete(&self, request: &CompletionRequest) -> Result<String, OracleError> {
        let body = serde_json::to_vec(&chat_body(&self.model, request))
            .map_err(|e| OracleError::Malformed(e.to_string()))?;

        debug!(url = %self.url, "sending chat completion");
        let mut response = match self
            .agent
            .post(&self.url)
            .header("Authorization", &format!("Bearer {}", self.api_key))
            .header("Content-Type", "application/json")
            .send(&body[..])
        {
            Ok(response) => response,
            Err(ureq::Error::Timeout(_)) => {
                return Err(OracleError::Timeout {
                    seconds: self.timeout.as_secs(),
                });
            }
            Err(err) => return Err(OracleError::Transport(err.to_string())),
        };

        let status = response.status().as_u16();
        let text = response
            .body_mut()
            .read_to_string()
            .map_err(|e| OracleError::Transport(e.to_string()))?;
        if !(200..300).contains(&status) {
            warn!(status, "oracle returned an error status");
            return Err(OracleError::Status { status, body: text });
        }
        parse_chat_reply(&text)
    }
}

#[derive(Debug, Serialize)]
struct ChatBody<'a> {
    model: &'a str,
    messages: [ChatMessage<'a>; 2],
    max_tokens: u32,
    temperature: f32,
}

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'static str,
    content: &'a str,
}

fn chat_body<'a>(model: &'a str, request: &'a CompletionRequest) -> ChatBody<'a> {
    ChatBody {
        model,
        messages: [
            ChatMessage {
                role: "system",
                content: &request.system,
            },
            ChatMessage {
                role: "user",
                content: &request.user,
            },
        ],
        max_tokens: request.max_tokens,
        temperature: request.temperature,
    }
}

#[derive(Debug, Deserialize)]
struct ChatReply {
    #[serde(default)]
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: Option<ChatReplyMessage>,
}

#[derive(Debug, Deserialize)]
struct ChatReplyMessage {
    content: Option<String>,
}

/// Text of `choices[0].message.content`.
fn parse_chat_reply(text: &str) -> Result<String, OracleError> {
    let reply: ChatReply =
        serde_json::from_str(text).map_err(|e| OracleError::Malformed(e.to_string()))?;
    reply
        .choices
        .into_iter()
        .next()
        .and_then(|c| c.message)
        .and_then(|m| m.content)
        .ok_or_else(|| OracleError::Malformed("no message content in first choice".to_string()))
}
