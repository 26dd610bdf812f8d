//! Boundary to the natural-language generation service.
//!
//! The refinement loop only sees [`LanguageModel`]; [`ChatCompletionsModel`] is
//! the production implementation speaking the OpenAI-compatible chat API.

mod client;
mod prompt;

use serde::{Deserialize, Serialize};

pub use client::{ChatCompletionsModel, ModelConfig};
pub use prompt::{extract_code, system_prompt};

#[derive(Debug, thiserror::Error)]
pub enum GenerationError {
    #[error("generation request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("generation service returned HTTP {status}: {body}")]
    Service { status: u16, body: String },

    #[error("generation service returned an empty reply")]
    EmptyResponse,

    #[error("no API key found in environment variable {var}")]
    MissingApiKey { var: String },

    #[error("generation service unavailable: {0}")]
    Unavailable(String),
}

/// One chat message in the OpenAI wire shape.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: String,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: "system".to_string(),
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: "user".to_string(),
            content: content.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GenerationRequest<'a> {
    pub system_prompt: &'a str,
    pub instruction: &'a str,
    /// Code of the turn being refined. `None` for a fresh generation.
    pub prior_code: Option<&'a str>,
}

impl<'a> GenerationRequest<'a> {
    pub fn fresh(system_prompt: &'a str, prompt: &'a str) -> Self {
        Self {
            system_prompt,
            instruction: prompt,
            prior_code: None,
        }
    }

    pub fn refinement(system_prompt: &'a str, change: &'a str, prior_code: &'a str) -> Self {
        Self {
            system_prompt,
            instruction: change,
            prior_code: Some(prior_code),
        }
    }

    pub fn is_refinement(&self) -> bool {
        self.prior_code.is_some()
    }

    /// Chat transcript sent to the service: the system prompt, then one user message.
    pub fn messages(&self) -> Vec<ChatMessage> {
        let user = match self.prior_code {
            Some(code) => format!(
                "Here is the current script:\n```\n{}\n```\nModify it as follows: {}\nReturn the complete updated script.",
                code.trim_end(),
                self.instruction
            ),
            None => self.instruction.to_string(),
        };
        vec![ChatMessage::system(self.system_prompt), ChatMessage::user(user)]
    }
}

pub trait LanguageModel {
    /// Returns the raw reply text. Callers strip fences with [`extract_code`].
    fn generate(&mut self, request: &GenerationRequest<'_>) -> Result<String, GenerationError>;
}

impl<M: LanguageModel + ?Sized> LanguageModel for Box<M> {
    fn generate(&mut self, request: &GenerationRequest<'_>) -> Result<String, GenerationError> {
        (**self).generate(request)
    }
}
