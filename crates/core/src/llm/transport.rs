//! HTTP and env plumbing shared by the provider clients.
//!
//! Knobs are read as `<PREFIX>_<KNOB>` (e.g. `OPENAI_MODEL`, `ANTHROPIC_TIMEOUT_SECS`).

use crate::llm::error::LlmDiagnosticsError;
use crate::llm::Provider;
use anyhow::Context;
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::str::FromStr;
use std::time::Duration;

fn env_prefix(provider: Provider) -> &'static str {
    match provider {
        Provider::Anthropic => "ANTHROPIC",
        Provider::OpenAi => "OPENAI",
    }
}

fn knob(provider: Provider, name: &str) -> Option<String> {
    std::env::var(format!("{}_{name}", env_prefix(provider)))
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

pub(crate) fn env_string(provider: Provider, name: &str, default: &str) -> String {
    knob(provider, name).unwrap_or_else(|| default.to_string())
}

/// Unparseable values fall back to `default`.
pub(crate) fn env_parsed<T: FromStr>(provider: Provider, name: &str, default: T) -> T {
    knob(provider, name)
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

/// Client with the provider's `<PREFIX>_TIMEOUT_SECS` applied.
pub(crate) fn http_client(provider: Provider, default_timeout_secs: u64) -> anyhow::Result<reqwest::Client> {
    let timeout_secs = env_parsed(provider, "TIMEOUT_SECS", default_timeout_secs);
    reqwest::Client::builder()
        .timeout(Duration::from_secs(timeout_secs))
        .build()
        .context("failed to build reqwest client")
}

pub(crate) fn endpoint(base_url: &str, path: &str) -> String {
    format!("{}/{}", base_url.trim_end_matches('/'), path.trim_start_matches('/'))
}

/// Output ceiling for the single retry after a response was cut off.
pub(crate) fn bumped_ceiling(ceiling: u32) -> u32 {
    ceiling.saturating_mul(2).max(2048)
}

/// Sends `request` and decodes the JSON body, keeping the raw value for diagnostics.
pub(crate) async fn send_json<T: DeserializeOwned>(
    provider: Provider,
    request: reqwest::RequestBuilder,
) -> anyhow::Result<(Value, T)> {
    let res = request
        .send()
        .await
        .with_context(|| format!("{} request failed", provider.as_str()))?;
    let status = res.status();
    let text = res
        .text()
        .await
        .with_context(|| format!("failed to read {} response body", provider.as_str()))?;
    decode_body(provider, status, text)
}

fn decode_body<T: DeserializeOwned>(
    provider: Provider,
    status: reqwest::StatusCode,
    text: String,
) -> anyhow::Result<(Value, T)> {
    if !status.is_success() {
        return Err(LlmDiagnosticsError::http(provider, status, text).into());
    }
    let raw_json = serde_json::from_str::<Value>(&text)
        .with_context(|| format!("failed to parse {} response JSON: {text}", provider.as_str()))?;
    let parsed = serde_json::from_value::<T>(raw_json.clone())
        .with_context(|| format!("failed to decode {} response", provider.as_str()))?;
    Ok((raw_json, parsed))
}

#[cfg(test)]
mod tests {
    use super::*;
    use reqwest::StatusCode;
    use serde::Deserialize;

    #[derive(Debug, Deserialize, PartialEq)]
    struct Reply {
        id: String,
    }

    #[test]
    fn error_status_becomes_diagnostics() {
        let err = decode_body::<Reply>(
            Provider::Anthropic,
            StatusCode::SERVICE_UNAVAILABLE,
            r#"{"type":"error","error":{"type":"overloaded_error"}}"#.to_string(),
        )
        .unwrap_err();
        let diag = err.downcast_ref::<LlmDiagnosticsError>().unwrap();
        assert_eq!(diag.provider, Provider::Anthropic);
        assert_eq!(diag.stage, "http");
        assert!(diag.raw_response_json.is_some());
    }

    #[test]
    fn success_keeps_raw_and_typed_body() {
        let (raw, reply) = decode_body::<Reply>(
            Provider::OpenAi,
            StatusCode::OK,
            r#"{"id":"resp_1","extra":true}"#.to_string(),
        )
        .unwrap();
        assert_eq!(reply, Reply { id: "resp_1".to_string() });
        assert_eq!(raw["extra"], true);

        let bad = decode_body::<Reply>(Provider::OpenAi, StatusCode::OK, "<html>".to_string());
        assert!(bad.unwrap_err().to_string().contains("openai response JSON"));
    }

    #[test]
    fn endpoint_and_ceiling_helpers() {
        assert_eq!(endpoint("https://api.openai.com/", "/v1/responses"), "https://api.openai.com/v1/responses");
        assert_eq!(endpoint("http://localhost:8080", "v1/messages"), "http://localhost:8080/v1/messages");
        assert_eq!(bumped_ceiling(600), 2048);
        assert_eq!(bumped_ceiling(4096), 8192);
        assert_eq!(bumped_ceiling(u32::MAX), u32::MAX);
    }
}
