//! OpenAI chat completions provider

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::client::{ChatResponse, LlmClient, ToolInvocation, ToolSpec};
use crate::error::LlmError;

const API_URL: &str = "https://api.openai.com/v1/chat/completions";
const DEFAULT_MODEL: &str = "gpt-4o-mini";
const REQUEST_TIMEOUT: Duration = Duration::from_secs(120);

pub struct OpenAiProvider {
    client: reqwest::Client,
    api_key: String,
    model: String,
}

impl OpenAiProvider {
    pub fn new(api_key: Option<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            api_key: api_key.unwrap_or_default(),
            model: DEFAULT_MODEL.to_string(),
        }
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    fn error(&self, message: impl Into<String>) -> LlmError {
        LlmError::Provider {
            provider: "openai".to_string(),
            message: message.into(),
        }
    }
}

#[derive(Debug, Serialize)]
struct CompletionsRequest {
    model: String,
    messages: Vec<Message>,
    temperature: f32,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    tools: Vec<serde_json::Value>,
}

#[derive(Debug, Serialize, Deserialize)]
struct Message {
    role: String,
    #[serde(default)]
    content: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    tool_calls: Option<Vec<ToolCall>>,
}

#[derive(Debug, Serialize, Deserialize)]
struct ToolCall {
    function: FunctionCall,
}

#[derive(Debug, Serialize, Deserialize)]
struct FunctionCall {
    name: String,
    arguments: String,
}

#[derive(Debug, Deserialize)]
struct CompletionsResponse {
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: Message,
}

#[async_trait]
impl LlmClient for OpenAiProvider {
    async fn chat(
        &self,
        system: &str,
        user: &str,
        tools: &[ToolSpec],
    ) -> Result<ChatResponse, LlmError> {
        let request = CompletionsRequest {
            model: self.model.clone(),
            messages: vec![
                Message {
                    role: "system".to_string(),
                    content: Some(system.to_string()),
                    tool_calls: None,
                },
                Message {
                    role: "user".to_string(),
                    content: Some(user.to_string()),
                    tool_calls: None,
                },
            ],
            temperature: 0.2,
            tools: tools
                .iter()
                .map(|t| {
                    json!({
                        "type": "function",
                        "function": {
                            "name": t.name,
                            "description": t.description,
                            "parameters": t.parameters,
                        },
                    })
                })
                .collect(),
        };

        let response = self
            .client
            .post(API_URL)
            .timeout(REQUEST_TIMEOUT)
            .bearer_auth(&self.api_key)
            .json(&request)
            .send()
            .await
            .map_err(|e| self.error(format!("request failed: {e}")))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(self.error(format!("status {status}: {body}")));
        }

        let parsed: CompletionsResponse = response
            .json()
            .await
            .map_err(|e| self.error(format!("invalid response body: {e}")))?;

        let Some(choice) = parsed.choices.into_iter().next() else {
            return Ok(ChatResponse::default());
        };

        let mut out = ChatResponse::default();
        if let Some(content) = choice.message.content {
            out.text = content;
        }
        for call in choice.message.tool_calls.unwrap_or_default() {
            let arguments = serde_json::from_str(&call.function.arguments)
                .unwrap_or(serde_json::Value::Null);
            out.tool_calls.push(ToolInvocation {
                name: call.function.name,
                arguments,
            });
        }
        Ok(out)
    }

    fn name(&self) -> &str {
        "openai"
    }
}
