//! LLM provider implementations

pub mod anthropic;
pub mod openai;

use std::sync::Arc;

use crate::client::LlmClient;
use crate::error::LlmError;

/// Factory for providers by name.
pub fn create_provider(provider_name: &str, api_key: Option<String>) -> Result<Arc<dyn LlmClient>, LlmError> {
    match provider_name {
        "anthropic" => Ok(Arc::new(anthropic::AnthropicProvider::new(api_key))),
        "openai" => Ok(Arc::new(openai::OpenAiProvider::new(api_key))),
        other => Err(LlmError::Provider {
            provider: other.to_string(),
            message: "unknown provider".to_string(),
        }),
    }
}
