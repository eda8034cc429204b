//! Answer generation trait and grounding prompts.

use anyhow::Result;
use async_trait::async_trait;

/// System prompt sent with every grounded question.
pub const SYSTEM_PROMPT: &str = "You answer using ONLY the provided context. \
If unsure, say you don't know. Cite the source filenames when possible.";

/// A language model that turns a system + user prompt pair into text.
#[async_trait]
pub trait Answerer: Send + Sync {
    /// Model identifier, for logs.
    fn model_name(&self) -> &str;

    async fn generate(&self, system: &str, user: &str) -> Result<String>;
}

/// Build the user turn: the raw question followed by the assembled context.
pub fn build_user_prompt(question: &str, context: &str) -> String {
    format!("Question: {}\n\nContext:\n{}", question, context)
}
