use crate::config::Settings;
use crate::llm::error::LlmDiagnosticsError;
use crate::llm::{transport, AdvisorClient, Provider, TextRequest};
use serde::{Deserialize, Serialize};

const DEFAULT_BASE_URL: &str = "https://api.openai.com";
const DEFAULT_MODEL: &str = "gpt-5-mini";
const DEFAULT_REASONING_EFFORT: &str = "medium";
const DEFAULT_MAX_OUTPUT_TOKENS: u32 = 600;
const DEFAULT_TIMEOUT_SECS: u64 = 90;

/// Client for the OpenAI Responses API.
#[derive(Debug, Clone)]
pub struct OpenAiClient {
    http: reqwest::Client,
    api_key: String,
    base_url: String,
    model: String,
    reasoning_effort: String,
    max_output_tokens: u32,
}

impl OpenAiClient {
    pub fn from_settings(settings: &Settings) -> anyhow::Result<Self> {
        let provider = Provider::OpenAi;
        Ok(Self {
            http: transport::http_client(provider, DEFAULT_TIMEOUT_SECS)?,
            api_key: settings.require_openai_api_key()?.to_string(),
            base_url: transport::env_string(provider, "BASE_URL", DEFAULT_BASE_URL),
            model: transport::env_string(provider, "MODEL", DEFAULT_MODEL),
            reasoning_effort: transport::env_string(
                provider,
                "REASONING_EFFORT",
                DEFAULT_REASONING_EFFORT,
            ),
            max_output_tokens: transport::env_parsed(
                provider,
                "MAX_OUTPUT_TOKENS",
                DEFAULT_MAX_OUTPUT_TOKENS,
            ),
        })
    }

    async fn create_response(
        &self,
        req: &CreateResponseRequest<'_>,
    ) -> anyhow::Result<(serde_json::Value, CreateResponseResponse)> {
        let request = self
            .http
            .post(transport::endpoint(&self.base_url, "v1/responses"))
            .bearer_auth(&self.api_key)
            .json(req);
        transport::send_json(Provider::OpenAi, request).await
    }

    fn response_text(res: &CreateResponseResponse) -> String {
        let mut out = String::new();
        for item in &res.output {
            let OutputItem::Message { content } = item else {
                continue;
            };
            for block in content {
                if let OutputContent::OutputText { text } = block {
                    if !out.is_empty() {
                        out.push('\n');
                    }
                    out.push_str(text);
                }
            }
        }
        out
    }

    fn hit_token_ceiling(res: &CreateResponseResponse) -> bool {
        res.status.as_deref() == Some("incomplete")
            && res
                .incomplete_details
                .as_ref()
                .and_then(|d| d.reason.as_deref())
                == Some("max_output_tokens")
    }
}

#[async_trait::async_trait]
impl AdvisorClient for OpenAiClient {
    fn provider(&self) -> Provider {
        Provider::OpenAi
    }

    async fn generate(&self, request: TextRequest) -> anyhow::Result<String> {
        let ceiling = request.max_output_tokens.unwrap_or(self.max_output_tokens);
        let model = self.model.as_str();
        let effort = self.reasoning_effort.as_str();
        let instructions = request.instructions.as_str();
        let input = request.input.as_str();
        let make_req = |max_output_tokens: u32| CreateResponseRequest {
            model,
            instructions,
            input,
            max_output_tokens,
            reasoning: Reasoning { effort },
        };

        let (mut raw_json, mut res) = self.create_response(&make_req(ceiling)).await?;

        // Reasoning can eat the whole budget before any text is emitted.
        if Self::hit_token_ceiling(&res) && Self::response_text(&res).trim().is_empty() {
            let bumped = transport::bumped_ceiling(ceiling);
            tracing::warn!(
                from = ceiling,
                to = bumped,
                "OpenAI response incomplete at max_output_tokens; retrying once"
            );
            let (rj, r) = self.create_response(&make_req(bumped)).await?;
            raw_json = rj;
            res = r;
        }

        let text = Self::response_text(&res);
        if text.trim().is_empty() {
            return Err(LlmDiagnosticsError::empty_output(Provider::OpenAi, raw_json).into());
        }
        Ok(text)
    }
}

#[derive(Debug, Serialize)]
struct CreateResponseRequest<'a> {
    model: &'a str,
    instructions: &'a str,
    input: &'a str,
    max_output_tokens: u32,
    reasoning: Reasoning<'a>,
}

#[derive(Debug, Serialize)]
struct Reasoning<'a> {
    effort: &'a str,
}

#[derive(Debug, Clone, Deserialize)]
struct CreateResponseResponse {
    #[serde(default)]
    output: Vec<OutputItem>,
    #[serde(default)]
    status: Option<String>,
    #[serde(default)]
    incomplete_details: Option<IncompleteDetails>,
}

#[derive(Debug, Clone, Deserialize)]
struct IncompleteDetails {
    #[serde(default)]
    reason: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type")]
enum OutputItem {
    #[serde(rename = "message")]
    Message {
        #[serde(default)]
        content: Vec<OutputContent>,
    },

    #[serde(other)]
    Other,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type")]
enum OutputContent {
    #[serde(rename = "output_text")]
    OutputText { text: String },

    #[serde(other)]
    Other,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn extracts_output_text_and_skips_reasoning() {
        let raw = json!({
            "id": "resp_1",
            "status": "completed",
            "output": [
                {"type": "reasoning", "id": "rs_1", "summary": []},
                {
                    "type": "message",
                    "role": "assistant",
                    "content": [
                        {"type": "output_text", "text": "- BCI.SN | Banca: $ 50,000", "annotations": []},
                        {"type": "refusal", "refusal": "no"}
                    ]
                }
            ]
        });
        let res: CreateResponseResponse = serde_json::from_value(raw).unwrap();
        assert_eq!(
            OpenAiClient::response_text(&res),
            "- BCI.SN | Banca: $ 50,000"
        );
        assert!(!OpenAiClient::hit_token_ceiling(&res));
    }

    #[test]
    fn detects_incomplete_reasoning_only_response() {
        let raw = json!({
            "status": "incomplete",
            "incomplete_details": {"reason": "max_output_tokens"},
            "output": [{"type": "reasoning", "id": "rs_1"}]
        });
        let res: CreateResponseResponse = serde_json::from_value(raw).unwrap();
        assert!(OpenAiClient::hit_token_ceiling(&res));
        assert!(OpenAiClient::response_text(&res).is_empty());
    }

    #[test]
    fn request_serializes_reasoning_effort() {
        let req = CreateResponseRequest {
            model: "gpt-5-mini",
            instructions: "sys",
            input: "hola",
            max_output_tokens: 600,
            reasoning: Reasoning { effort: "medium" },
        };
        let v = serde_json::to_value(&req).unwrap();
        assert_eq!(v["reasoning"]["effort"], "medium");
        assert_eq!(v["max_output_tokens"], 600);
    }
}
