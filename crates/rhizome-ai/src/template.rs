//! Prompt templates — immutable named records, not subclasses

use std::collections::{BTreeSet, HashMap};

use crate::error::TemplateError;

/// Variables supplied at format time.
pub type TemplateVars = HashMap<String, String>;

/// A named prompt template with separated system and input prompts.
/// Templates are data: new ones are added as records, and no template
/// knows about any particular LLM.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PromptTemplate {
    pub name: &'static str,
    pub description: &'static str,
    pub system_prompt: &'static str,
    pub input_prompt: &'static str,
    /// Declared variables; tests assert these match the `{placeholder}`s
    /// in the input prompt.
    pub variables: &'static [&'static str],
}

impl PromptTemplate {
    /// Substitute `{var}` placeholders in the input prompt. Every
    /// declared variable must be present.
    pub fn format_input(&self, vars: &TemplateVars) -> Result<String, TemplateError> {
        let mut out = self.input_prompt.to_string();
        for variable in self.variables {
            let value = vars.get(*variable).ok_or(TemplateError::MissingVariable {
                template: self.name,
                variable,
            })?;
            out = out.replace(&format!("{{{variable}}}"), value);
        }
        Ok(out)
    }

    /// System prompt plus the formatted input prompt.
    pub fn compose(&self, vars: &TemplateVars) -> Result<(String, String), TemplateError> {
        Ok((self.system_prompt.to_string(), self.format_input(vars)?))
    }

    /// The `{placeholder}` names appearing in the input prompt.
    pub fn placeholders(&self) -> BTreeSet<String> {
        let mut out = BTreeSet::new();
        let bytes = self.input_prompt.as_bytes();
        let mut i = 0;
        while i < bytes.len() {
            if bytes[i] == b'{' {
                if let Some(close) = self.input_prompt[i + 1..].find('}') {
                    let candidate = &self.input_prompt[i + 1..i + 1 + close];
                    if !candidate.is_empty()
                        && candidate
                            .bytes()
                            .all(|b| b.is_ascii_alphanumeric() || b == b'_')
                    {
                        out.insert(candidate.to_string());
                    }
                    i += close + 2;
                    continue;
                }
            }
            i += 1;
        }
        out
    }
}

/// Resolves templates by name for callers that carry only a template
/// name and a variable map.
#[derive(Debug, Clone)]
pub struct TemplateRegistry {
    templates: Vec<PromptTemplate>,
}

impl TemplateRegistry {
    pub fn new(templates: Vec<PromptTemplate>) -> Self {
        TemplateRegistry { templates }
    }

    pub fn get(&self, name: &str) -> Option<&PromptTemplate> {
        self.templates.iter().find(|t| t.name == name)
    }

    pub fn names(&self) -> Vec<&'static str> {
        self.templates.iter().map(|t| t.name).collect()
    }
}

impl Default for TemplateRegistry {
    /// The four traversal templates of the documentation engine.
    fn default() -> Self {
        TemplateRegistry::new(vec![
            crate::templates::LEAF_NODE_ANALYSIS,
            crate::templates::PARENT_NODE_WITH_CONTEXT,
            crate::templates::PARENT_NODE_PARTIAL_CONTEXT,
            crate::templates::ENHANCED_LEAF_FALLBACK,
        ])
    }
}
