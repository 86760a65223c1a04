//! Error surface for templates and LLM calls

use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum TemplateError {
    /// A declared variable was not supplied. Fatal at the call site:
    /// this is a programming error, not a runtime condition.
    #[error("missing variable {variable:?} for template {template:?}")]
    MissingVariable {
        template: &'static str,
        variable: &'static str,
    },
}

#[derive(Debug, Error)]
pub enum LlmError {
    #[error(transparent)]
    Template(#[from] TemplateError),

    #[error("unknown template: {0}")]
    UnknownTemplate(String),

    #[error("provider {provider} request failed: {message}")]
    Provider { provider: String, message: String },

    /// The provider returned no usable content, and the fallback (if
    /// any) did too.
    #[error("empty response from provider")]
    Empty,
}
