#![forbid(unsafe_code)]

use std::env;
use std::fmt;
use std::sync::mpsc::{self, RecvTimeoutError};
use std::sync::{Arc, OnceLock};
use std::thread;
use std::time::Duration;

use serde::Serialize;
use serde_json::Value;
use tracing::{debug, warn};

use healthlog_kernel_contracts::model::{
    decode_model_extraction_json, ModelCallRequest, ModelExtraction, MODEL_MAX_USER_TEXT_CHARS,
};

use crate::cache::ExtractionCache;

pub const DEFAULT_MODEL_URL: &str = "https://api.openai.com/v1/chat/completions";
pub const DEFAULT_MODEL_NAME: &str = "gpt-4o-mini";
pub const DEFAULT_USER_AGENT: &str = "healthlog-understanding/1.0";
pub const DEFAULT_TIMEOUT_MS: u32 = 800;
pub const MIN_TIMEOUT_MS: u32 = 100;
pub const MAX_TIMEOUT_MS: u32 = 5_000;

pub const SYSTEM_INSTRUCTION: &str = "You extract one health-log entry from a short message. \
Reply with a single JSON object and nothing else, shaped as \
{\"intent\": string, \"slots\": object, \"confidence\": number, \"missing\": array of strings}. \
intent is one of food, drink, symptom, reflux, bm, checkin, other. \
Slot names: item, meal_time, quantity, brand, time, symptom_type, severity, bristol. \
meal_time is breakfast, lunch, dinner or snack. time is HH:MM in 24h. \
severity is an integer 1-10. bristol is an integer 1-7. \
Only fill slots the message states or clearly implies; list required but absent slots in missing. \
confidence is between 0 and 1. If the message is not a health-log entry use intent other.";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ModelErrorKind {
    Timeout,
    Transport,
    HttpStatus,
    Schema,
    Config,
}

impl ModelErrorKind {
    pub fn as_str(self) -> &'static str {
        match self {
            ModelErrorKind::Timeout => "timeout",
            ModelErrorKind::Transport => "transport",
            ModelErrorKind::HttpStatus => "http_status",
            ModelErrorKind::Schema => "schema",
            ModelErrorKind::Config => "config",
        }
    }
}

impl fmt::Display for ModelErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("model call failed ({kind}): {detail}")]
pub struct ModelTransportError {
    pub kind: ModelErrorKind,
    pub detail: String,
    pub http_status: Option<u16>,
}

impl ModelTransportError {
    pub fn new(kind: ModelErrorKind, detail: impl Into<String>) -> Self {
        Self {
            kind,
            detail: detail.into(),
            http_status: None,
        }
    }

    pub fn http_status(status: u16) -> Self {
        Self {
            kind: ModelErrorKind::HttpStatus,
            detail: format!("http status {status}"),
            http_status: Some(status),
        }
    }
}

/// One blocking request/response exchange with the external model. Returns the raw
/// text the model produced.
pub trait ModelTransport: Send + Sync {
    fn complete(&self, req: &ModelCallRequest) -> Result<String, ModelTransportError>;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModelProviderConfig {
    pub endpoint_url: String,
    pub model: String,
    pub api_key: Option<String>,
    pub timeout_ms: u32,
    pub user_agent: String,
}

impl ModelProviderConfig {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let non_empty = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        Self {
            endpoint_url: non_empty("HEALTHLOG_MODEL_URL")
                .unwrap_or_else(|| DEFAULT_MODEL_URL.to_string()),
            model: non_empty("HEALTHLOG_MODEL_NAME")
                .unwrap_or_else(|| DEFAULT_MODEL_NAME.to_string()),
            api_key: non_empty("HEALTHLOG_MODEL_API_KEY"),
            timeout_ms: non_empty("HEALTHLOG_MODEL_TIMEOUT_MS")
                .and_then(|v| v.trim().parse::<u32>().ok())
                .unwrap_or(DEFAULT_TIMEOUT_MS)
                .clamp(MIN_TIMEOUT_MS, MAX_TIMEOUT_MS),
            user_agent: non_empty("HEALTHLOG_USER_AGENT")
                .unwrap_or_else(|| DEFAULT_USER_AGENT.to_string()),
        }
    }

    pub fn has_credentials(&self) -> bool {
        self.api_key.is_some()
    }
}

/// Chat-completions transport over `ureq`. The agent is built on first use and
/// reused for every later call.
#[derive(Debug)]
pub struct OpenAiChatTransport {
    config: ModelProviderConfig,
    agent: OnceLock<ureq::Agent>,
}

impl OpenAiChatTransport {
    pub fn new(config: ModelProviderConfig) -> Self {
        Self {
            config,
            agent: OnceLock::new(),
        }
    }

    fn agent(&self) -> &ureq::Agent {
        self.agent.get_or_init(|| {
            let timeout = Duration::from_millis(u64::from(self.config.timeout_ms));
            ureq::AgentBuilder::new()
                .timeout_connect(timeout)
                .timeout_read(timeout)
                .timeout_write(timeout)
                .user_agent(&self.config.user_agent)
                .build()
        })
    }
}

impl ModelTransport for OpenAiChatTransport {
    fn complete(&self, req: &ModelCallRequest) -> Result<String, ModelTransportError> {
        let Some(api_key) = self.config.api_key.as_deref() else {
            return Err(ModelTransportError::new(
                ModelErrorKind::Config,
                "no api key configured",
            ));
        };
        let payload = serde_json::json!({
            "model": self.config.model,
            "temperature": req.temperature,
            "max_tokens": req.max_output_tokens,
            "response_format": {"type": "json_object"},
            "messages": [
                {"role": "system", "content": req.system_instruction},
                {"role": "user", "content": req.user_text},
            ],
        });
        let response = self
            .agent()
            .post(&self.config.endpoint_url)
            .set("Content-Type", "application/json")
            .set("Authorization", &format!("Bearer {api_key}"))
            .set("Accept", "application/json")
            .send_json(payload)
            .map_err(error_from_ureq)?;
        let body: Value = serde_json::from_reader(response.into_reader())
            .map_err(|_| ModelTransportError::new(ModelErrorKind::Schema, "response is not json"))?;
        extract_chat_content(&body).ok_or_else(|| {
            ModelTransportError::new(ModelErrorKind::Schema, "response has no message content")
        })
    }
}

fn error_from_ureq(err: ureq::Error) -> ModelTransportError {
    match err {
        ureq::Error::Status(status, _) => ModelTransportError::http_status(status),
        ureq::Error::Transport(transport) => {
            let combined = format!("{:?} {}", transport.kind(), transport).to_ascii_lowercase();
            let kind = if combined.contains("timeout") || combined.contains("timed out") {
                ModelErrorKind::Timeout
            } else {
                ModelErrorKind::Transport
            };
            ModelTransportError::new(kind, format!("{:?}", transport.kind()))
        }
    }
}

/// `choices[0].message.content` of a chat-completions response.
pub fn extract_chat_content(body: &Value) -> Option<String> {
    body.get("choices")?
        .as_array()?
        .first()?
        .get("message")?
        .get("content")?
        .as_str()
        .map(str::to_string)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ModelAdapterConfig {
    pub timeout_ms: u32,
    pub max_output_tokens: u16,
}

impl ModelAdapterConfig {
    pub fn mvp_v1() -> Self {
        Self {
            timeout_ms: DEFAULT_TIMEOUT_MS,
            max_output_tokens: 256,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum ModelOutcome {
    CacheHit(ModelExtraction),
    Fresh(ModelExtraction),
    NoResult(ModelErrorKind),
}

impl ModelOutcome {
    pub fn extraction(&self) -> Option<&ModelExtraction> {
        match self {
            ModelOutcome::CacheHit(x) | ModelOutcome::Fresh(x) => Some(x),
            ModelOutcome::NoResult(_) => None,
        }
    }
}

/// Cache-fronted, deadline-bounded model extraction. Never fails: every error,
/// malformed reply and timeout becomes [`ModelOutcome::NoResult`]. No retries.
#[derive(Clone)]
pub struct ModelAdapter {
    config: ModelAdapterConfig,
    transport: Arc<dyn ModelTransport>,
    cache: Arc<ExtractionCache>,
}

impl fmt::Debug for ModelAdapter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ModelAdapter")
            .field("config", &self.config)
            .field("cached", &self.cache.len())
            .finish_non_exhaustive()
    }
}

impl ModelAdapter {
    pub fn new(
        config: ModelAdapterConfig,
        transport: Arc<dyn ModelTransport>,
        cache: Arc<ExtractionCache>,
    ) -> Self {
        Self {
            config,
            transport,
            cache,
        }
    }

    pub fn cache(&self) -> &ExtractionCache {
        &self.cache
    }

    pub fn extract(&self, normalized_text: &str) -> ModelOutcome {
        if let Some(hit) = self.cache.get(normalized_text) {
            debug!("model cache hit");
            return ModelOutcome::CacheHit(hit);
        }
        debug!(input_chars = normalized_text.chars().count(), "model cache miss");

        match self.call_with_deadline(normalized_text) {
            Ok(extraction) => {
                self.cache.insert(normalized_text, extraction.clone());
                ModelOutcome::Fresh(extraction)
            }
            Err(err) => {
                warn!(
                    kind = err.kind.as_str(),
                    http_status = err.http_status,
                    input_chars = normalized_text.chars().count(),
                    "model extraction failed, keeping rules result"
                );
                ModelOutcome::NoResult(err.kind)
            }
        }
    }

    fn call_with_deadline(&self, text: &str) -> Result<ModelExtraction, ModelTransportError> {
        let user_text: String = text.chars().take(MODEL_MAX_USER_TEXT_CHARS).collect();
        let req = ModelCallRequest::v1(
            SYSTEM_INSTRUCTION.to_string(),
            user_text,
            self.config.max_output_tokens,
            self.config.timeout_ms,
        )
        .map_err(|v| ModelTransportError::new(ModelErrorKind::Config, v.to_string()))?;

        let (tx, rx) = mpsc::channel();
        let transport = Arc::clone(&self.transport);
        thread::Builder::new()
            .name("healthlog-model-call".to_string())
            .spawn(move || {
                // The receiver is gone once the deadline passed; the send result is moot.
                let _ = tx.send(transport.complete(&req));
            })
            .map_err(|e| ModelTransportError::new(ModelErrorKind::Transport, e.to_string()))?;

        let deadline = Duration::from_millis(u64::from(self.config.timeout_ms));
        let raw = match rx.recv_timeout(deadline) {
            Ok(reply) => reply?,
            Err(RecvTimeoutError::Timeout) => {
                return Err(ModelTransportError::new(
                    ModelErrorKind::Timeout,
                    format!("no reply within {}ms", self.config.timeout_ms),
                ))
            }
            Err(RecvTimeoutError::Disconnected) => {
                return Err(ModelTransportError::new(
                    ModelErrorKind::Transport,
                    "model worker exited without a reply",
                ))
            }
        };
        decode_model_extraction_json(&raw)
            .map_err(|v| ModelTransportError::new(ModelErrorKind::Schema, v.to_string()))
    }
}
