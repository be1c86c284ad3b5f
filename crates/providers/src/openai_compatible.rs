use crate::traits::*;
use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use serde_json::{json, Value};
use std::time::Duration;
use tracing::debug;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(120);

#[derive(Debug, Deserialize)]
struct ChatCompletionResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ResponseMessage,
    #[serde(default)]
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ResponseMessage {
    content: Option<String>,
    #[serde(default)]
    tool_calls: Option<Vec<WireToolCall>>,
}

#[derive(Debug, Deserialize)]
struct WireToolCall {
    #[serde(default)]
    id: String,
    function: WireFunction,
}

#[derive(Debug, Deserialize)]
struct WireFunction {
    name: String,
    #[serde(default)]
    arguments: String,
}

/// Client for any `/chat/completions` endpoint speaking the OpenAI tool-call
/// protocol.
pub struct OpenAICompatibleProvider {
    client: Client,
    base_url: String,
    api_key: Option<String>,
    model: String,
}

impl OpenAICompatibleProvider {
    pub fn new(base_url: String, api_key: Option<String>, model: String) -> Self {
        let client = Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .unwrap_or_else(|_| Client::new());

        Self {
            client,
            base_url,
            api_key,
            model,
        }
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    fn request_body(&self, messages: &[ChatMessage], tools: &[Value]) -> Value {
        let mut body = json!({
            "model": self.model,
            "messages": messages.iter().map(to_wire).collect::<Vec<_>>(),
        });

        if !tools.is_empty() {
            body["tools"] = json!(tools);
            body["tool_choice"] = json!("auto");
        }

        body
    }
}

/// Encode one history entry in the chat-completions message format.
fn to_wire(message: &ChatMessage) -> Value {
    let mut wire = json!({
        "role": message.role,
        "content": message.content,
    });

    if !message.tool_calls.is_empty() {
        wire["tool_calls"] = message
            .tool_calls
            .iter()
            .map(|call| {
                let arguments = match &call.arguments {
                    Value::String(raw) => raw.clone(),
                    other => other.to_string(),
                };
                json!({
                    "id": call.id,
                    "type": "function",
                    "function": {
                        "name": call.name,
                        "arguments": arguments
                    }
                })
            })
            .collect();
    }

    if let Some(id) = &message.tool_call_id {
        wire["tool_call_id"] = json!(id);
    }

    wire
}

fn parse_completion(body: &str) -> Result<Completion, ProviderError> {
    let response: ChatCompletionResponse =
        serde_json::from_str(body).map_err(|e| ProviderError::Parse(e.to_string()))?;

    let choice = response
        .choices
        .into_iter()
        .next()
        .ok_or_else(|| ProviderError::Parse("No choices in response".to_string()))?;

    let tool_calls = choice
        .message
        .tool_calls
        .unwrap_or_default()
        .into_iter()
        .enumerate()
        .map(|(index, call)| {
            let id = if call.id.is_empty() {
                format!("call_{}", index)
            } else {
                call.id
            };
            ToolInvocationRequest {
                id,
                name: call.function.name,
                arguments: ToolInvocationRequest::decode_arguments(&call.function.arguments),
            }
        })
        .collect();

    Ok(Completion {
        content: choice.message.content,
        tool_calls,
        finish_reason: choice.finish_reason.unwrap_or_else(|| "stop".to_string()),
    })
}

#[async_trait]
impl CompletionService for OpenAICompatibleProvider {
    async fn complete(
        &self,
        messages: &[ChatMessage],
        tools: &[Value],
    ) -> Result<Completion, ProviderError> {
        let url = format!("{}/chat/completions", self.base_url.trim_end_matches('/'));
        let body = self.request_body(messages, tools);

        debug!("llm url={}", url);
        debug!("llm messages={} tools={}", messages.len(), tools.len());

        let mut request = self.client.post(&url).json(&body);

        if let Some(api_key) = &self.api_key {
            request = request.bearer_auth(api_key);
        }

        let response = request.send().await.map_err(|e| {
            if e.is_connect() || e.is_timeout() {
                ProviderError::Http(format!("Network connection failed: {}", e))
            } else {
                ProviderError::Http(e.to_string())
            }
        })?;

        let status = response.status();
        let text = response
            .text()
            .await
            .map_err(|e| ProviderError::Http(e.to_string()))?;

        if !status.is_success() {
            let message = match status.as_u16() {
                401 => format!("Authentication failed. Check your API key. Details: {}", text),
                404 => format!("Invalid endpoint (404 Not Found). Details: {}", text),
                429 => format!("Rate limit exceeded. Details: {}", text),
                _ => format!("{}: {}", status, text),
            };
            return Err(ProviderError::Api(message));
        }

        parse_completion(&text)
    }

    fn name(&self) -> &str {
        "OpenAI Compatible"
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_final_answer() {
        let body = r#"{
            "choices": [{
                "message": {"role": "assistant", "content": "All pages archived."},
                "finish_reason": "stop"
            }]
        }"#;

        let completion = parse_completion(body).unwrap();
        assert_eq!(completion.content.as_deref(), Some("All pages archived."));
        assert!(!completion.requests_tools());
        assert_eq!(completion.finish_reason, "stop");
    }

    #[test]
    fn test_parse_tool_calls_in_order() {
        let body = r#"{
            "choices": [{
                "message": {
                    "role": "assistant",
                    "content": null,
                    "tool_calls": [
                        {"id": "call_a", "type": "function",
                         "function": {"name": "unar", "arguments": "{\"filename\": \"vol1.cbz\"}"}},
                        {"id": "call_b", "type": "function",
                         "function": {"name": "ls", "arguments": "{}"}}
                    ]
                },
                "finish_reason": "tool_calls"
            }]
        }"#;

        let completion = parse_completion(body).unwrap();
        assert!(completion.content.is_none());
        assert_eq!(completion.tool_calls.len(), 2);
        assert_eq!(completion.tool_calls[0].id, "call_a");
        assert_eq!(completion.tool_calls[0].name, "unar");
        assert_eq!(
            completion.tool_calls[0].arguments,
            json!({"filename": "vol1.cbz"})
        );
        assert_eq!(completion.tool_calls[1].name, "ls");
    }

    #[test]
    fn test_parse_keeps_call_with_bad_arguments() {
        let body = r#"{
            "choices": [{
                "message": {
                    "content": null,
                    "tool_calls": [{"function": {"name": "cd", "arguments": "{oops"}}]
                }
            }]
        }"#;

        let completion = parse_completion(body).unwrap();
        assert_eq!(completion.tool_calls.len(), 1);
        assert_eq!(completion.tool_calls[0].id, "call_0");
        assert_eq!(completion.tool_calls[0].arguments, json!("{oops"));
        assert_eq!(completion.finish_reason, "stop");
    }

    #[test]
    fn test_parse_no_choices() {
        let result = parse_completion(r#"{"choices": []}"#);
        assert!(matches!(result, Err(ProviderError::Parse(_))));
    }

    #[test]
    fn test_wire_format_for_tool_exchange() {
        let call = ToolInvocationRequest::new("call_1", "cd", json!({"dir": "/archive"}));
        let assistant = to_wire(&ChatMessage::assistant(None, vec![call]));
        assert_eq!(assistant["role"], "assistant");
        assert!(assistant["content"].is_null());
        assert_eq!(assistant["tool_calls"][0]["id"], "call_1");
        assert_eq!(assistant["tool_calls"][0]["type"], "function");
        assert_eq!(
            assistant["tool_calls"][0]["function"]["arguments"],
            r#"{"dir":"/archive"}"#
        );

        let result = to_wire(&ChatMessage::tool_result("call_1", ""));
        assert_eq!(result["role"], "tool");
        assert_eq!(result["tool_call_id"], "call_1");
        assert_eq!(result["content"], "");
    }

    #[test]
    fn test_request_body_includes_tools() {
        let provider = OpenAICompatibleProvider::new(
            "http://localhost:1".to_string(),
            None,
            "gpt-5-nano-2025-08-07".to_string(),
        );
        let tools = vec![json!({"type": "function", "function": {"name": "pwd"}})];
        let body = provider.request_body(
            &[ChatMessage::system("sys"), ChatMessage::user("hi")],
            &tools,
        );

        assert_eq!(body["model"], "gpt-5-nano-2025-08-07");
        assert_eq!(body["messages"].as_array().unwrap().len(), 2);
        assert_eq!(body["messages"][1]["content"], "hi");
        assert_eq!(body["tools"][0]["function"]["name"], "pwd");
        assert_eq!(body["tool_choice"], "auto");
    }

    #[tokio::test]
    async fn test_unreachable_endpoint_is_http_error() {
        let provider = OpenAICompatibleProvider::new(
            "http://127.0.0.1:9".to_string(),
            Some("key".to_string()),
            "model".to_string(),
        );
        let result = provider.complete(&[ChatMessage::user("hi")], &[]).await;
        assert!(matches!(result, Err(ProviderError::Http(_))));
    }
}
