use anyhow::{anyhow, Result};
use async_trait::async_trait;
use eventsource_stream::Eventsource;
use futures::StreamExt;
use reqwest::{Client, Response};
use serde_json::{json, Value};
use std::time::Duration;

use super::base::{CompletionRequest, Provider, ProviderEvent, ProviderEventStream};
use super::configs::{AnthropicProviderConfig, ANTHROPIC_VERSION};

pub struct AnthropicProvider {
    client: Client,
    config: AnthropicProviderConfig,
}

impl AnthropicProvider {
    pub fn new(config: AnthropicProviderConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(600)) // 10 minutes timeout
            .build()?;

        Ok(Self { client, config })
    }

    fn create_request_payload(&self, request: &CompletionRequest) -> Value {
        let mut payload = json!({
            "model": self.config.model,
            "max_tokens": request.max_tokens,
            "system": [{
                "type": "text",
                "text": request.system,
                "cache_control": { "type": "ephemeral" }
            }],
            "messages": request.messages,
            "stream": true
        });

        if let Some(object) = payload.as_object_mut() {
            if let Some(temperature) = request.temperature {
                object.insert("temperature".to_string(), json!(temperature));
            }
            // The API rejects an empty tool list, so leave the key out entirely
            if !request.tools.is_empty() {
                object.insert("tools".to_string(), json!(request.tools));
            }
        }

        payload
    }

    async fn post(&self, payload: Value) -> Result<Response> {
        let url = format!("{}/v1/messages", self.config.host.trim_end_matches('/'));

        let response = self
            .client
            .post(&url)
            .header("x-api-key", &self.config.api_key)
            .header("anthropic-version", ANTHROPIC_VERSION)
            .json(&payload)
            .send()
            .await
            .map_err(|e| anyhow!("Request to {} failed: {}", url, e))?;

        let status = response.status();
        if status.is_success() {
            Ok(response)
        } else {
            let error_text = response.text().await.unwrap_or_default();
            Err(anyhow!("Request failed: {} - {}", status, error_text))
        }
    }
}

/// Decode one SSE data payload, skipping keep-alives and event kinds we don't use.
///
/// A payload that doesn't decode ends the stream: dropping it could truncate a
/// tool input or leave a block open.
fn parse_event(event_type: &str, data: &str) -> Option<Result<ProviderEvent>> {
    match serde_json::from_str::<ProviderEvent>(data) {
        Ok(ProviderEvent::Ping) | Ok(ProviderEvent::Unknown) => None,
        Ok(event) => Some(Ok(event)),
        Err(e) => {
            tracing::error!(event_type, data, "SSE parsing error: {}", e);
            Some(Err(anyhow!("Malformed {} event: {}", event_type, e)))
        }
    }
}

#[async_trait]
impl Provider for AnthropicProvider {
    async fn stream(&self, request: &CompletionRequest) -> Result<ProviderEventStream> {
        let payload = self.create_request_payload(request);
        let response = self.post(payload).await?;

        let events = response.bytes_stream().eventsource().filter_map(|sse| async move {
            match sse {
                Ok(sse) => parse_event(&sse.event, &sse.data),
                Err(e) => Some(Err(anyhow!("SSE Error: {}", e))),
            }
        });

        Ok(Box::pin(events))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::message::Message;
    use crate::models::tool::Tool;
    use futures::TryStreamExt;
    use wiremock::matchers::{body_partial_json, header, method, path};
    use wiremock::{Mock, MockServer, Request, ResponseTemplate};

    fn sse_body(events: &[Value]) -> String {
        events
            .iter()
            .map(|event| format!("event: {}\ndata: {}\n\n", event["type"].as_str().unwrap(), event))
            .collect()
    }

    async fn setup_mock_server(template: ResponseTemplate) -> (MockServer, AnthropicProvider) {
        let mock_server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/messages"))
            .and(header("x-api-key", "test_api_key"))
            .and(header("anthropic-version", ANTHROPIC_VERSION))
            .respond_with(template)
            .mount(&mock_server)
            .await;

        let config = AnthropicProviderConfig {
            host: mock_server.uri(),
            api_key: "test_api_key".to_string(),
            model: "claude-sonnet-4-5-20250929".to_string(),
        };

        let provider = AnthropicProvider::new(config).unwrap();
        (mock_server, provider)
    }

    fn request(tools: Vec<Tool>) -> CompletionRequest {
        CompletionRequest {
            system: "You are a recruiter.".to_string(),
            messages: vec![Message::user().with_text("hello")],
            tools,
            temperature: Some(0.5),
            max_tokens: 1024,
        }
    }

    #[tokio::test]
    async fn test_stream_text_reply() -> Result<()> {
        let body = sse_body(&[
            json!({"type": "message_start", "message": {"id": "msg_1", "role": "assistant", "content": []}}),
            json!({"type": "content_block_start", "index": 0, "content_block": {"type": "text", "text": ""}}),
            json!({"type": "ping"}),
            json!({"type": "content_block_delta", "index": 0, "delta": {"type": "text_delta", "text": "Hi"}}),
            json!({"type": "content_block_delta", "index": 0, "delta": {"type": "text_delta", "text": " there"}}),
            json!({"type": "content_block_stop", "index": 0}),
            json!({"type": "message_delta", "delta": {"stop_reason": "end_turn"}, "usage": {"output_tokens": 3}}),
            json!({"type": "message_stop"}),
        ]);
        let (_server, provider) =
            setup_mock_server(ResponseTemplate::new(200).set_body_raw(body, "text/event-stream"))
                .await;

        let events: Vec<ProviderEvent> = provider.stream(&request(vec![])).await?.try_collect().await?;

        assert_eq!(
            events,
            vec![
                ProviderEvent::MessageStart,
                ProviderEvent::text_start(0),
                ProviderEvent::text(0, "Hi"),
                ProviderEvent::text(0, " there"),
                ProviderEvent::block_stop(0),
                ProviderEvent::stop_reason("end_turn"),
                ProviderEvent::MessageStop,
            ]
        );
        Ok(())
    }

    #[tokio::test]
    async fn test_error_event_is_forwarded() -> Result<()> {
        let body = sse_body(&[
            json!({"type": "message_start", "message": {}}),
            json!({"type": "error", "error": {"type": "overloaded_error", "message": "Overloaded"}}),
        ]);
        let (_server, provider) =
            setup_mock_server(ResponseTemplate::new(200).set_body_raw(body, "text/event-stream"))
                .await;

        let events: Vec<ProviderEvent> = provider.stream(&request(vec![])).await?.try_collect().await?;
        assert!(matches!(
            &events[1],
            ProviderEvent::Error { error } if error.message == "Overloaded" && error.kind == "overloaded_error"
        ));
        Ok(())
    }

    #[tokio::test]
    async fn test_malformed_payload_ends_stream_with_error() -> Result<()> {
        let mut body = sse_body(&[
            json!({"type": "message_start", "message": {}}),
            json!({"type": "content_block_start", "index": 0, "content_block": {"type": "tool_use", "id": "toolu_1", "name": "generate_seo_content"}}),
            json!({"type": "content_block_delta", "index": 0, "delta": {"type": "input_json_delta", "partial_json": "{\"job"}}),
        ]);
        body.push_str("event: content_block_delta\ndata: {\"type\": \"content_block_delta\", \"index\": 0, \"delta\": {\"type\n\n");
        body.push_str(&sse_body(&[
            json!({"type": "content_block_stop", "index": 0}),
            json!({"type": "message_stop"}),
        ]));
        let (_server, provider) =
            setup_mock_server(ResponseTemplate::new(200).set_body_raw(body, "text/event-stream"))
                .await;

        let mut events = provider.stream(&request(vec![])).await?;
        let mut decoded = 0;
        let err = loop {
            match events.next().await {
                Some(Ok(_)) => decoded += 1,
                Some(Err(e)) => break e,
                None => panic!("stream ended without reporting the malformed payload"),
            }
        };
        assert_eq!(decoded, 3);
        assert!(err.to_string().contains("content_block_delta"));
        Ok(())
    }

    #[tokio::test]
    async fn test_http_error_status() {
        let (_server, provider) = setup_mock_server(
            ResponseTemplate::new(401).set_body_string("{\"error\":\"invalid x-api-key\"}"),
        )
        .await;

        let err = match provider.stream(&request(vec![])).await {
            Ok(_) => panic!("expected the request to fail"),
            Err(e) => e,
        };
        assert!(err.to_string().contains("401"));
        assert!(err.to_string().contains("invalid x-api-key"));
    }

    #[tokio::test]
    async fn test_payload_shape() -> Result<()> {
        let mock_server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/messages"))
            .and(body_partial_json(json!({
                "model": "claude-test",
                "max_tokens": 1024,
                "stream": true,
                "system": [{"type": "text", "text": "You are a recruiter.", "cache_control": {"type": "ephemeral"}}],
                "messages": [{"role": "user", "content": [{"type": "text", "text": "hello"}]}],
                "tools": [{"name": "generate_seo_content", "description": "seo", "input_schema": {"type": "object"}}]
            })))
            .respond_with(ResponseTemplate::new(200).set_body_raw("", "text/event-stream"))
            .expect(1)
            .mount(&mock_server)
            .await;

        let provider = AnthropicProvider::new(AnthropicProviderConfig {
            host: mock_server.uri(),
            api_key: "k".to_string(),
            model: "claude-test".to_string(),
        })?;
        let tools = vec![Tool::new("generate_seo_content", "seo", json!({"type": "object"}))];
        let events: Vec<ProviderEvent> = provider.stream(&request(tools)).await?.try_collect().await?;
        assert!(events.is_empty());
        Ok(())
    }

    #[tokio::test]
    async fn test_tools_key_omitted_when_none_enabled() -> Result<()> {
        let mock_server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/messages"))
            .respond_with(ResponseTemplate::new(200).set_body_raw("", "text/event-stream"))
            .mount(&mock_server)
            .await;

        let provider = AnthropicProvider::new(AnthropicProviderConfig {
            host: mock_server.uri(),
            api_key: "k".to_string(),
            model: "claude-test".to_string(),
        })?;
        let _ = provider.stream(&request(vec![])).await?;

        let received: Vec<Request> = mock_server.received_requests().await.unwrap_or_default();
        let body: Value = serde_json::from_slice(&received[0].body)?;
        assert!(body.get("tools").is_none());
        assert_eq!(body["temperature"], json!(0.5));
        Ok(())
    }
}
