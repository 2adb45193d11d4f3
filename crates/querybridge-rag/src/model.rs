//! Language model runtime
//!
//! The runtime contract mirrors a model-invocation API: a model id, content
//! type and accept headers, and an opaque byte body in both directions. The
//! body format used by the query pipeline is the Anthropic messages envelope
//! ([`MessagesRequest`] / [`MessagesResponse`]).

use crate::error::ModelError;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::sync::Mutex;
use tracing::debug;

pub const ANTHROPIC_VERSION: &str = "bedrock-2023-05-31";
pub const JSON_CONTENT_TYPE: &str = "application/json";

/// One model invocation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InvokeModelRequest {
    pub model_id: String,
    pub content_type: String,
    pub accept: String,
    pub body: Vec<u8>,
}

impl InvokeModelRequest {
    /// JSON request for `model_id`
    pub fn json<T: Serialize>(model_id: impl Into<String>, body: &T) -> Result<Self, ModelError> {
        Ok(Self {
            model_id: model_id.into(),
            content_type: JSON_CONTENT_TYPE.to_string(),
            accept: JSON_CONTENT_TYPE.to_string(),
            body: serde_json::to_vec(body).map_err(|e| ModelError::Request(e.to_string()))?,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InvokeModelResponse {
    pub body: Vec<u8>,
}

/// Model runtime
#[async_trait::async_trait]
pub trait LanguageModel: Send + Sync {
    async fn invoke(&self, request: InvokeModelRequest) -> Result<InvokeModelResponse, ModelError>;
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub role: String,
    pub content: String,
}

/// Anthropic messages request body
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessagesRequest {
    pub anthropic_version: String,
    pub max_tokens: u32,
    pub messages: Vec<Message>,
}

impl MessagesRequest {
    /// A single user turn carrying `prompt`
    pub fn single_turn(prompt: impl Into<String>, max_tokens: u32) -> Self {
        Self {
            anthropic_version: ANTHROPIC_VERSION.to_string(),
            max_tokens,
            messages: vec![Message {
                role: "user".to_string(),
                content: prompt.into(),
            }],
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct ContentBlock {
    #[serde(rename = "type", default)]
    pub kind: Option<String>,

    #[serde(default)]
    pub text: Option<String>,
}

/// Anthropic messages response body
#[derive(Debug, Clone, Deserialize)]
pub struct MessagesResponse {
    #[serde(default)]
    pub content: Vec<ContentBlock>,

    #[serde(default)]
    pub stop_reason: Option<String>,
}

impl MessagesResponse {
    pub fn parse(body: &[u8]) -> Result<Self, ModelError> {
        serde_json::from_slice(body).map_err(|e| ModelError::InvalidResponse(format!("Malformed envelope: {}", e)))
    }

    /// Text of the first content block
    pub fn first_text(&self) -> Result<&str, ModelError> {
        self.content
            .first()
            .and_then(|block| block.text.as_deref())
            .ok_or_else(|| ModelError::InvalidResponse("Response has no content[0].text".to_string()))
    }
}

/// HTTP model runtime client
///
/// Posts the body to `{endpoint}/model/{model_id}/invoke`, optionally with a
/// bearer API key.
pub struct HttpLanguageModel {
    client: reqwest::Client,
    endpoint: String,
    api_key: Option<String>,
}

impl HttpLanguageModel {
    pub fn new(endpoint: impl Into<String>, api_key: Option<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            endpoint: endpoint.into().trim_end_matches('/').to_string(),
            api_key,
        }
    }

    pub fn invoke_url(&self, model_id: &str) -> String {
        format!("{}/model/{}/invoke", self.endpoint, urlencoding::encode(model_id))
    }
}

#[async_trait::async_trait]
impl LanguageModel for HttpLanguageModel {
    async fn invoke(&self, request: InvokeModelRequest) -> Result<InvokeModelResponse, ModelError> {
        let url = self.invoke_url(&request.model_id);
        debug!(model_id = %request.model_id, bytes = request.body.len(), "Invoking model");

        let mut builder = self
            .client
            .post(&url)
            .header(reqwest::header::CONTENT_TYPE, request.content_type)
            .header(reqwest::header::ACCEPT, request.accept)
            .body(request.body);
        if let Some(key) = &self.api_key {
            builder = builder.bearer_auth(key);
        }

        let response = builder
            .send()
            .await
            .map_err(|e| ModelError::Request(format!("Model API call failed: {}", e)))?;

        let status = response.status();
        let body = response
            .bytes()
            .await
            .map_err(|e| ModelError::Request(format!("Cannot read model response: {}", e)))?;

        if !status.is_success() {
            return Err(ModelError::Status(format!(
                "{}: {}",
                status,
                String::from_utf8_lossy(&body)
            )));
        }

        Ok(InvokeModelResponse { body: body.to_vec() })
    }
}

/// Model that answers from a script
///
/// Each invocation pops the next reply and wraps it in a messages envelope;
/// requests are recorded. Runs out of replies with a `Request` error.
#[derive(Default)]
pub struct ScriptedLanguageModel {
    replies: Mutex<VecDeque<String>>,
    requests: Mutex<Vec<InvokeModelRequest>>,
}

impl ScriptedLanguageModel {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_reply(self, text: impl Into<String>) -> Self {
        self.push_reply(text);
        self
    }

    pub fn push_reply(&self, text: impl Into<String>) {
        if let Ok(mut replies) = self.replies.lock() {
            replies.push_back(text.into());
        }
    }

    /// Requests received so far
    pub fn requests(&self) -> Vec<InvokeModelRequest> {
        self.requests.lock().map(|r| r.clone()).unwrap_or_default()
    }

    /// Prompts of the requests received so far
    pub fn prompts(&self) -> Vec<String> {
        self.requests()
            .iter()
            .filter_map(|request| serde_json::from_slice::<MessagesRequest>(&request.body).ok())
            .filter_map(|body| body.messages.into_iter().next().map(|m| m.content))
            .collect()
    }
}

#[async_trait::async_trait]
impl LanguageModel for ScriptedLanguageModel {
    async fn invoke(&self, request: InvokeModelRequest) -> Result<InvokeModelResponse, ModelError> {
        if let Ok(mut requests) = self.requests.lock() {
            requests.push(request);
        }

        let reply = self
            .replies
            .lock()
            .ok()
            .and_then(|mut replies| replies.pop_front())
            .ok_or_else(|| ModelError::Request("No scripted reply left".to_string()))?;

        let body = serde_json::json!({
            "id": "msg_scripted",
            "type": "message",
            "role": "assistant",
            "content": [{"type": "text", "text": reply}],
            "stop_reason": "end_turn",
        });

        Ok(InvokeModelResponse {
            body: serde_json::to_vec(&body).map_err(|e| ModelError::InvalidResponse(e.to_string()))?,
        })
    }
}
