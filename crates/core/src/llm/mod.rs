pub mod anthropic;
pub mod error;
pub mod openai;
pub mod prompt;
mod transport;

use crate::config::Settings;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Provider {
    Anthropic,
    OpenAi,
}

impl Provider {
    pub fn as_str(self) -> &'static str {
        match self {
            Provider::Anthropic => "anthropic",
            Provider::OpenAi => "openai",
        }
    }
}

/// One instruction/input pair sent to a text model.
#[derive(Debug, Clone)]
pub struct TextRequest {
    pub instructions: String,
    pub input: String,
    /// Overrides the client's configured output ceiling.
    pub max_output_tokens: Option<u32>,
}

#[async_trait::async_trait]
pub trait AdvisorClient: Send + Sync {
    fn provider(&self) -> Provider;

    async fn generate(&self, request: TextRequest) -> anyhow::Result<String>;
}

/// OpenAI when its key is set, then Anthropic, otherwise none.
pub fn client_from_settings(settings: &Settings) -> anyhow::Result<Option<Box<dyn AdvisorClient>>> {
    if settings.openai_api_key.is_some() {
        return Ok(Some(Box::new(openai::OpenAiClient::from_settings(settings)?)));
    }
    if settings.anthropic_api_key.is_some() {
        return Ok(Some(Box::new(anthropic::AnthropicClient::from_settings(
            settings,
        )?)));
    }
    Ok(None)
}
