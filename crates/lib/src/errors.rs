use thiserror::Error;

/// Errors raised while talking to an AI provider or querying a user's store.
#[derive(Error, Debug)]
pub enum PromptError {
    #[error("Failed to build Reqwest client: {0}")]
    ReqwestClientBuild(reqwest::Error),
    #[error("Failed to send request to AI provider: {0}")]
    AiRequest(reqwest::Error),
    #[error("Failed to deserialize AI provider response: {0}")]
    AiDeserialization(reqwest::Error),
    #[error("AI provider returned an error: {0}")]
    AiApi(String),
    #[error("AI provider did not answer within {0} seconds")]
    AiTimeout(u64),
    #[error("API key is missing")]
    MissingApiKey,
    #[error("Unsupported model: {0}")]
    UnsupportedModel(String),
    #[error("AI provider is not configured: {0}")]
    MissingAiProvider(String),
    #[error("Storage provider connection error: {0}")]
    StorageConnection(String),
    #[error("Storage operation failed: {0}")]
    StorageOperationFailed(String),
    #[error("The generated query is not read-only: {0}")]
    NonReadOnlyQuery(String),
    #[error("The query agent gave up after {attempts} attempts: {last_error}")]
    AgentExhausted { attempts: u32, last_error: String },
    #[error("Regex error: {0}")]
    Regex(#[from] regex::Error),
    #[error("JSON serialization error: {0}")]
    JsonSerialization(#[from] serde_json::Error),
}

impl From<turso::Error> for PromptError {
    fn from(err: turso::Error) -> Self {
        PromptError::StorageOperationFailed(err.to_string())
    }
}
