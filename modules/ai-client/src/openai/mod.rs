mod client;
pub(crate) mod schema;
pub(crate) mod types;

pub use schema::StructuredOutput;

use anyhow::{anyhow, Result};
use tracing::debug;

use client::OpenAiClient;
use types::*;

// =============================================================================
// OpenAi Agent
// =============================================================================

/// Handle for an OpenAI-compatible chat-completions endpoint.
///
/// The handle is cheap to construct and holds no connection state; the HTTP
/// client is built per call via `client()`, so handles may be created fresh
/// for every call and never reused across concurrent scopes.
#[derive(Clone)]
pub struct OpenAi {
    api_key: String,
    model: String,
    base_url: Option<String>,
}

impl OpenAi {
    pub fn new(api_key: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            model: model.into(),
            base_url: None,
        }
    }

    pub fn from_env(model: impl Into<String>) -> Result<Self> {
        let api_key = std::env::var("OPENROUTER_API_KEY")
            .map_err(|_| anyhow!("OPENROUTER_API_KEY environment variable not set"))?;
        Ok(Self::new(api_key, model))
    }

    /// Point at a different OpenAI-compatible endpoint.
    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = Some(url.into());
        self
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    fn client(&self) -> OpenAiClient {
        let client = OpenAiClient::new(&self.api_key);
        if let Some(ref url) = self.base_url {
            client.with_base_url(url)
        } else {
            client
        }
    }

    /// Run one structured-output extraction: the model is constrained to
    /// return JSON conforming to `T`'s schema, deserialized into `T`.
    pub async fn extract<T: StructuredOutput>(
        &self,
        system_prompt: impl Into<String>,
        user_prompt: impl Into<String>,
    ) -> Result<T> {
        let schema = T::response_schema();

        debug!(
            model = %self.model,
            type_name = %T::type_name(),
            "Structured output extraction"
        );

        let request = StructuredRequest {
            model: self.model.clone(),
            messages: vec![
                WireMessage::system(system_prompt.into()),
                WireMessage::user(user_prompt.into()),
            ],
            temperature: Some(0.0),
            response_format: ResponseFormat {
                format_type: "json_schema".to_string(),
                json_schema: JsonSchemaFormat {
                    name: T::type_name(),
                    strict: true,
                    schema,
                },
            },
        };

        let content = self.client().structured_output(&request).await?;

        serde_json::from_str(&content)
            .map_err(|e| anyhow!("Failed to deserialize structured response: {e}"))
    }
}
