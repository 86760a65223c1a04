//! Rhizome AI — prompt templates and the provider-neutral LLM contract

pub mod client;
pub mod error;
pub mod providers;
pub mod template;
pub mod templates;


pub use client::{ChatResponse, FallbackClient, LlmClient, StaticClient, ToolInvocation, ToolSpec, generate};
pub use error::{LlmError, TemplateError};
pub use template::{PromptTemplate, TemplateRegistry, TemplateVars};
pub use templates::{
    ENHANCED_LEAF_FALLBACK, LEAF_NODE_ANALYSIS, PARENT_NODE_PARTIAL_CONTEXT,
    PARENT_NODE_WITH_CONTEXT,
};
