pub mod openai;

use crate::{errors::PromptError, types::AiResponse};
use async_trait::async_trait;
use dyn_clone::DynClone;
use std::fmt::Debug;

/// A trait for interacting with an AI provider.
///
/// This trait defines a common interface for generating SQL queries and answers from
/// natural language using different Large Language Models.
#[async_trait]
pub trait AiProvider: Send + Sync + Debug + DynClone {
    /// Generates a response from a given system and user prompt.
    ///
    /// The result carries the generated text and the token usage the provider
    /// reported for the call.
    async fn generate(
        &self,
        system_prompt: &str,
        user_prompt: &str,
    ) -> Result<AiResponse, PromptError>;
}

dyn_clone::clone_trait_object!(AiProvider);
