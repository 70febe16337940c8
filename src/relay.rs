use crate::config::RelayConfig;
use crate::error::{RelayError, Result};
use crate::logging::{LogLevel, SharedLogger};
use crate::translate::anthropic_types::{ErrorResponse, MessagesResponse};
use crate::translate::openai_types::{ChatCompletionResponse, ChatErrorResponse};
use crate::translate::response::{openai_error_to_anthropic, openai_to_anthropic};
use crate::translate::streaming::translate_stream;

use bytes::Bytes;
use futures::stream::{self, Stream};
use std::pin::Pin;

/// Outcome of relaying a non-streaming request
pub enum RelayResult {
    Success(MessagesResponse),
    Error(ErrorResponse, u16),
}

/// Anthropic SSE bytes, ready to be written to the client.
pub type ByteStream = Pin<Box<dyn Stream<Item = Result<Bytes>> + Send>>;

/// An inbound request body, already shaped for the upstream Chat Completions API.
///
/// The relay does not rewrite it; it only reads the model name (echoed back in
/// the translated response) and whether a stream was requested.
#[derive(Debug, Clone)]
pub struct RelayRequest {
    pub model: String,
    pub stream: bool,
    pub body: serde_json::Value,
}

impl RelayRequest {
    pub fn from_body(body: &[u8]) -> Result<Self> {
        let body: serde_json::Value = serde_json::from_slice(body)?;
        if !body.is_object() {
            return Err(RelayError::translation("Request body must be a JSON object"));
        }

        let model = body
            .get("model")
            .and_then(serde_json::Value::as_str)
            .unwrap_or_default()
            .to_string();
        let stream = body
            .get("stream")
            .and_then(serde_json::Value::as_bool)
            .unwrap_or(false);

        Ok(Self {
            model,
            stream,
            body,
        })
    }
}

async fn send_upstream(
    req: &RelayRequest,
    config: &RelayConfig,
    client: &reqwest::Client,
) -> Result<reqwest::Response> {
    let api_key = config.resolve_api_key()?;
    let url = config.completions_url();

    let response = client
        .post(&url)
        .header("Authorization", format!("Bearer {}", api_key))
        .header("Content-Type", "application/json")
        .json(&req.body)
        .send()
        .await?;
    Ok(response)
}

/// HTTP client for upstream calls. Timeouts bound connecting and each read,
/// so a stream stays open for as long as the upstream keeps sending.
pub fn build_client(config: &RelayConfig) -> Result<reqwest::Client> {
    let client = reqwest::Client::builder()
        .connect_timeout(config.connect_timeout())
        .read_timeout(config.read_timeout())
        .build()?;
    Ok(client)
}

fn upstream_error(status: u16, body: &str) -> ErrorResponse {
    match serde_json::from_str::<ChatErrorResponse>(body) {
        Ok(err) => openai_error_to_anthropic(&err),
        Err(_) => ErrorResponse::api_error(format!(
            "Upstream returned status {}: {}",
            status,
            truncate(body, 500)
        )),
    }
}

/// Forward a non-streaming request and translate the whole completion.
pub async fn relay_non_streaming(
    req: &RelayRequest,
    config: &RelayConfig,
    client: &reqwest::Client,
    logger: &SharedLogger,
) -> Result<RelayResult> {
    logger.info(
        "relay",
        format!("POST {} model={}", config.completions_url(), req.model),
    );

    let response = send_upstream(req, config, client).await?;
    let status = response.status().as_u16();
    let body = response.text().await?;

    logger.debug(
        "relay",
        format!("Response status={} body_len={}", status, body.len()),
    );

    if status >= 400 {
        let err = upstream_error(status, &body);
        logger.log_with_context(
            LogLevel::Warn,
            "relay",
            format!("Upstream error: {}", err.error.message),
            serde_json::json!({ "status": status, "type": err.error.error_type }),
        );
        return Ok(RelayResult::Error(err, status));
    }

    let completion: ChatCompletionResponse = serde_json::from_str(&body).map_err(|e| {
        RelayError::translation(format!(
            "Failed to parse upstream response: {}. Body: {}",
            e,
            truncate(&body, 300)
        ))
    })?;

    let message = openai_to_anthropic(&completion, &req.model);

    logger.info(
        "relay",
        format!(
            "Completed: id={} blocks={} stop_reason={:?}",
            message.id,
            message.content.len(),
            message.stop_reason
        ),
    );

    Ok(RelayResult::Success(message))
}

/// Forward a streaming request, returning the translated Anthropic SSE bytes.
///
/// An upstream error status becomes a single `event: error` frame.
pub async fn relay_streaming(
    req: &RelayRequest,
    config: &RelayConfig,
    client: &reqwest::Client,
    logger: &SharedLogger,
) -> Result<ByteStream> {
    logger.info(
        "relay",
        format!(
            "POST {} model={} (streaming)",
            config.completions_url(),
            req.model
        ),
    );

    let response = send_upstream(req, config, client).await?;
    let status = response.status().as_u16();

    if status >= 400 {
        let body = response.text().await.unwrap_or_default();
        logger.warn(
            "relay",
            format!("Streaming error status={}: {}", status, truncate(&body, 300)),
        );

        let frame = error_frame(&upstream_error(status, &body))?;
        return Ok(Box::pin(stream::once(async move { Ok(frame) })));
    }

    Ok(Box::pin(translate_stream(
        response.bytes_stream(),
        req.model.clone(),
        config.stream.max_line_bytes,
    )))
}

/// Frame an Anthropic error object as an SSE `error` event.
pub fn error_frame(err: &ErrorResponse) -> Result<Bytes> {
    let json = serde_json::to_string(err)?;
    Ok(Bytes::from(format!("event: error\ndata: {}\n\n", json)))
}

fn truncate(s: &str, max: usize) -> &str {
    if s.len() <= max {
        return s;
    }
    let mut end = max;
    while !s.is_char_boundary(end) {
        end -= 1;
    }
    &s[..end]
}
