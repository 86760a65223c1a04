//! Provider-neutral LLM invocation

use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::LlmError;
use crate::template::{TemplateRegistry, TemplateVars};

/// A tool the model may invoke, described as JSON schema.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolSpec {
    pub name: String,
    pub description: String,
    pub parameters: serde_json::Value,
}

/// A structured tool invocation returned by the model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolInvocation {
    pub name: String,
    pub arguments: serde_json::Value,
}

/// What a chat call produced: free-form text, structured tool
/// invocations, or both.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ChatResponse {
    pub text: String,
    pub tool_calls: Vec<ToolInvocation>,
}

impl ChatResponse {
    pub fn text(text: impl Into<String>) -> Self {
        ChatResponse {
            text: text.into(),
            tool_calls: Vec::new(),
        }
    }

    /// No text and no tool calls — triggers the provider fallback.
    pub fn is_empty(&self) -> bool {
        self.text.trim().is_empty() && self.tool_calls.is_empty()
    }
}

/// The one capability the engines need from a language model.
#[async_trait]
pub trait LlmClient: Send + Sync {
    async fn chat(
        &self,
        system: &str,
        user: &str,
        tools: &[ToolSpec],
    ) -> Result<ChatResponse, LlmError>;

    fn name(&self) -> &str;
}

/// Composite client: try the primary, and when it errors or comes back
/// empty, retry the call once on the secondary before surfacing failure.
pub struct FallbackClient {
    primary: Arc<dyn LlmClient>,
    secondary: Arc<dyn LlmClient>,
}

impl FallbackClient {
    pub fn new(primary: Arc<dyn LlmClient>, secondary: Arc<dyn LlmClient>) -> Self {
        FallbackClient { primary, secondary }
    }
}

#[async_trait]
impl LlmClient for FallbackClient {
    async fn chat(
        &self,
        system: &str,
        user: &str,
        tools: &[ToolSpec],
    ) -> Result<ChatResponse, LlmError> {
        match self.primary.chat(system, user, tools).await {
            Ok(response) if !response.is_empty() => return Ok(response),
            Ok(_) => {
                tracing::warn!(
                    provider = self.primary.name(),
                    "empty response, falling back to {}",
                    self.secondary.name()
                );
            }
            Err(e) => {
                tracing::warn!(
                    provider = self.primary.name(),
                    error = %e,
                    "provider failed, falling back to {}",
                    self.secondary.name()
                );
            }
        }

        let response = self.secondary.chat(system, user, tools).await?;
        if response.is_empty() {
            return Err(LlmError::Empty);
        }
        Ok(response)
    }

    fn name(&self) -> &str {
        "fallback"
    }
}

/// Deterministic client for tests and offline runs: always answers with
/// the configured text.
pub struct StaticClient {
    reply: String,
}

impl StaticClient {
    pub fn new(reply: impl Into<String>) -> Self {
        StaticClient { reply: reply.into() }
    }
}

#[async_trait]
impl LlmClient for StaticClient {
    async fn chat(
        &self,
        _system: &str,
        _user: &str,
        _tools: &[ToolSpec],
    ) -> Result<ChatResponse, LlmError> {
        Ok(ChatResponse::text(self.reply.clone()))
    }

    fn name(&self) -> &str {
        "static"
    }
}

/// The callable the documentation engines hold: resolve a template by
/// name, format it with the variables, and return the model's text.
pub async fn generate(
    client: &dyn LlmClient,
    registry: &TemplateRegistry,
    template_name: &str,
    vars: &TemplateVars,
) -> Result<String, LlmError> {
    let template = registry
        .get(template_name)
        .ok_or_else(|| LlmError::UnknownTemplate(template_name.to_string()))?;
    let (system, user) = template.compose(vars)?;

    let response = client.chat(&system, &user, &[]).await?;
    if response.text.trim().is_empty() {
        return Err(LlmError::Empty);
    }
    Ok(response.text)
}
