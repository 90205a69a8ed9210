//! Gemini `generateContent` client with function calling.

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::{LanguageModel, ModelReply, Prompt};
use crate::LlmError;

// ---

const MAX_ERROR_BODY: usize = 500;

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerateContentRequest {
    contents: Vec<Content>,
    #[serde(skip_serializing_if = "Option::is_none")]
    system_instruction: Option<Content>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    tools: Vec<FunctionTools>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tool_config: Option<ToolConfig>,
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct Content {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    role: Option<String>,
    #[serde(default)]
    parts: Vec<Part>,
}

#[derive(Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Part {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    text: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    function_call: Option<FunctionCall>,
}

#[derive(Debug, Serialize, Deserialize)]
struct FunctionCall {
    name: String,
    #[serde(default)]
    args: Value,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct FunctionTools {
    function_declarations: Vec<FunctionDeclaration>,
}

#[derive(Debug, Serialize)]
struct FunctionDeclaration {
    name: String,
    description: String,
    parameters: Value,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ToolConfig {
    function_calling_config: FunctionCallingConfig,
}

#[derive(Debug, Serialize)]
struct FunctionCallingConfig {
    mode: &'static str,
}

#[derive(Debug, Deserialize)]
struct GenerateContentResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Candidate {
    #[serde(default)]
    content: Option<Content>,
    #[serde(default)]
    finish_reason: Option<String>,
}

fn text_content(role: Option<&str>, text: &str) -> Content {
    Content {
        role: role.map(String::from),
        parts: vec![Part {
            text: Some(text.to_string()),
            function_call: None,
        }],
    }
}

/// Build the provider request. Tools switch on automatic function calling.
fn build_request(prompt: &Prompt) -> GenerateContentRequest {
    // ---
    let tools = if prompt.tools.is_empty() {
        Vec::new()
    } else {
        vec![FunctionTools {
            function_declarations: prompt
                .tools
                .iter()
                .map(|t| FunctionDeclaration {
                    name: t.name.to_string(),
                    description: t.description.to_string(),
                    parameters: t.parameters_schema(),
                })
                .collect(),
        }]
    };
    let tool_config = (!tools.is_empty()).then_some(ToolConfig {
        function_calling_config: FunctionCallingConfig { mode: "AUTO" },
    });

    GenerateContentRequest {
        contents: vec![text_content(Some("user"), &prompt.user)],
        system_instruction: prompt.system.as_deref().map(|s| text_content(None, s)),
        tools,
        tool_config,
    }
}

/// Single decoding step from provider response to [`ModelReply`].
///
/// Only the first `functionCall` part is honoured.
fn decode_reply(response: GenerateContentResponse) -> Result<ModelReply, LlmError> {
    // ---
    let candidate = response.candidates.into_iter().next().ok_or(LlmError::Empty)?;
    let parts = candidate.content.map(|c| c.parts).unwrap_or_default();

    let mut texts = Vec::new();
    let mut calls = Vec::new();
    for part in parts {
        if let Some(text) = part.text {
            texts.push(text);
        }
        if let Some(call) = part.function_call {
            calls.push(call);
        }
    }
    let text = texts.join("").trim().to_string();

    let mut calls = calls.into_iter();
    if let Some(call) = calls.next() {
        let ignored: Vec<String> = calls.map(|c| c.name).collect();
        if !ignored.is_empty() {
            tracing::warn!("Ignoring extra function calls in one turn: {:?}", ignored);
        }
        return Ok(ModelReply::ToolProposed {
            name: call.name,
            arguments: call.args,
            partial_text: (!text.is_empty()).then_some(text),
        });
    }

    if text.is_empty() {
        return Err(LlmError::Decode(format!(
            "candidate has no text or function call (finish reason: {})",
            candidate.finish_reason.as_deref().unwrap_or("unknown")
        )));
    }
    Ok(ModelReply::Direct(text))
}

/// HTTP client for the Gemini REST API.
pub struct GeminiClient {
    client: reqwest::Client,
    endpoint: String,
    api_key: String,
}

impl GeminiClient {
    pub fn new(
        api_key: &str,
        model: &str,
        base_url: &str,
        timeout: Duration,
    ) -> anyhow::Result<Self> {
        // ---
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(GeminiClient {
            client,
            endpoint: format!(
                "{}/models/{}:generateContent",
                base_url.trim_end_matches('/'),
                model
            ),
            api_key: api_key.to_string(),
        })
    }
}

#[async_trait]
impl LanguageModel for GeminiClient {
    async fn generate(&self, prompt: &Prompt) -> Result<ModelReply, LlmError> {
        // ---
        let body = build_request(prompt);
        tracing::debug!(
            "POST {} ({} tools offered)",
            self.endpoint,
            prompt.tools.len()
        );

        let response = self
            .client
            .post(&self.endpoint)
            .header("x-goog-api-key", &self.api_key)
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let mut body = response.text().await.unwrap_or_default();
            if body.len() > MAX_ERROR_BODY {
                let cut = (0..=MAX_ERROR_BODY)
                    .rev()
                    .find(|i| body.is_char_boundary(*i))
                    .unwrap_or(0);
                body.truncate(cut);
            }
            return Err(LlmError::Status {
                status: status.as_u16(),
                body,
            });
        }

        let decoded: GenerateContentResponse = response.json().await?;
        decode_reply(decoded)
    }
}

#[cfg(test)]
mod tests {
    // ---
    use super::*;
    use crate::tools::ToolRegistry;
    use serde_json::json;

    fn response(value: Value) -> GenerateContentResponse {
        serde_json::from_value(value).unwrap()
    }

    #[test]
    fn test_decode_direct_answer() {
        // ---
        let reply = decode_reply(response(json!({
            "candidates": [{
                "content": {"role": "model", "parts": [{"text": "Hello! "}, {"text": "How can I help?"}]},
                "finishReason": "STOP"
            }]
        })))
        .unwrap();

        assert_eq!(reply, ModelReply::Direct("Hello! How can I help?".to_string()));
    }

    #[test]
    fn test_decode_function_call_with_partial_text() {
        // ---
        let reply = decode_reply(response(json!({
            "candidates": [{
                "content": {"parts": [
                    {"text": "Let me check."},
                    {"functionCall": {"name": "summarize_recent_leakage", "args": {"hours": 48}}}
                ]}
            }]
        })))
        .unwrap();

        assert_eq!(
            reply,
            ModelReply::ToolProposed {
                name: "summarize_recent_leakage".to_string(),
                arguments: json!({"hours": 48}),
                partial_text: Some("Let me check.".to_string()),
            }
        );
    }

    #[test]
    fn test_decode_honours_only_first_call() {
        // ---
        let reply = decode_reply(response(json!({
            "candidates": [{
                "content": {"parts": [
                    {"functionCall": {"name": "predict_leak_risk", "args": "{}"}},
                    {"functionCall": {"name": "summarize_recent_leakage", "args": {}}}
                ]}
            }]
        })))
        .unwrap();

        match reply {
            ModelReply::ToolProposed {
                name,
                arguments,
                partial_text,
            } => {
                assert_eq!(name, "predict_leak_risk");
                assert_eq!(arguments, json!("{}"));
                assert_eq!(partial_text, None);
            }
            other => panic!("expected a tool proposal, got {:?}", other),
        }
    }

    #[test]
    fn test_decode_without_candidates() {
        // ---
        let err = decode_reply(response(json!({}))).unwrap_err();
        assert!(matches!(err, LlmError::Empty));

        let err = decode_reply(response(json!({
            "candidates": [{"finishReason": "SAFETY"}]
        })))
        .unwrap_err();
        assert!(matches!(err, LlmError::Decode(msg) if msg.contains("SAFETY")));
    }

    #[test]
    fn test_request_with_tools_uses_automatic_mode() {
        // ---
        let prompt = Prompt {
            system: Some("be brief".to_string()),
            user: "which zones leak most?".to_string(),
            tools: ToolRegistry::leak_tools().declarations().to_vec(),
        };
        let body = serde_json::to_value(build_request(&prompt)).unwrap();

        assert_eq!(body["contents"][0]["role"], "user");
        assert_eq!(body["contents"][0]["parts"][0]["text"], "which zones leak most?");
        assert_eq!(body["systemInstruction"]["parts"][0]["text"], "be brief");
        assert_eq!(body["toolConfig"]["functionCallingConfig"]["mode"], "AUTO");
        let declarations = body["tools"][0]["functionDeclarations"].as_array().unwrap();
        assert_eq!(declarations.len(), 2);
        assert_eq!(declarations[1]["name"], "summarize_recent_leakage");
    }

    #[test]
    fn test_narration_request_offers_no_tools() {
        // ---
        let prompt = Prompt {
            system: None,
            user: "explain".to_string(),
            tools: Vec::new(),
        };
        let body = serde_json::to_value(build_request(&prompt)).unwrap();

        assert!(body.get("tools").is_none());
        assert!(body.get("toolConfig").is_none());
        assert!(body.get("systemInstruction").is_none());
    }

    #[test]
    fn test_endpoint_url() {
        // ---
        let client = GeminiClient::new(
            "key",
            "gemini-1.5-flash",
            "https://generativelanguage.googleapis.com/v1beta/",
            Duration::from_secs(5),
        )
        .unwrap();
        assert_eq!(
            client.endpoint,
            "https://generativelanguage.googleapis.com/v1beta/models/gemini-1.5-flash:generateContent"
        );
    }
}
