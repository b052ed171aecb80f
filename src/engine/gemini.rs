use std::pin::Pin;

use async_trait::async_trait;
use eventsource_stream::Eventsource;
use futures_util::{Stream, StreamExt};
use serde::{Deserialize, Serialize};

use crate::config::GeminiConfig;
use crate::error::{remote_err, AppError};
use crate::models::Citation;

const BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta/models";

// ============================================================================
// Wire types — request
// ============================================================================

/// One conversation turn on the wire.
#[derive(Debug, Clone, Serialize)]
pub struct Content {
    pub role: String,
    pub parts: Vec<Part>,
}

impl Content {
    pub fn user(parts: Vec<Part>) -> Self {
        Self {
            role: "user".to_string(),
            parts,
        }
    }

    pub fn model_text(text: impl Into<String>) -> Self {
        Self {
            role: "model".to_string(),
            parts: vec![Part::text(text)],
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(untagged)]
pub enum Part {
    Text {
        text: String,
    },
    InlineData {
        #[serde(rename = "inlineData")]
        inline_data: InlineData,
    },
}

impl Part {
    pub fn text(text: impl Into<String>) -> Self {
        Part::Text { text: text.into() }
    }

    pub fn inline_image(mime: impl Into<String>, base64: impl Into<String>) -> Self {
        Part::InlineData {
            inline_data: InlineData {
                mime_type: mime.into(),
                data: base64.into(),
            },
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct InlineData {
    pub mime_type: String,
    pub data: String,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerateContentBody<'a> {
    contents: &'a [Content],
    #[serde(skip_serializing_if = "Option::is_none")]
    system_instruction: Option<Content>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tools: Option<Vec<Tool>>,
}

#[derive(Serialize)]
struct Tool {
    #[serde(rename = "googleSearch")]
    google_search: serde_json::Value,
}

impl Tool {
    fn google_search() -> Self {
        Self {
            google_search: serde_json::json!({}),
        }
    }
}

// ============================================================================
// Wire types — streamed response
// ============================================================================

#[derive(Debug, Deserialize)]
struct GenerateContentResponse {
    candidates: Option<Vec<Candidate>>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Candidate {
    content: Option<CandidateContent>,
    grounding_metadata: Option<GroundingMetadata>,
}

#[derive(Debug, Deserialize)]
struct CandidateContent {
    parts: Option<Vec<ResponsePart>>,
}

#[derive(Debug, Deserialize)]
struct ResponsePart {
    text: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GroundingMetadata {
    grounding_chunks: Option<Vec<GroundingChunk>>,
}

#[derive(Debug, Deserialize)]
struct GroundingChunk {
    web: Option<WebSource>,
}

#[derive(Debug, Deserialize)]
struct WebSource {
    uri: Option<String>,
    title: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ErrorWrapper {
    error: ErrorBody,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    message: Option<String>,
    status: Option<String>,
}

// ============================================================================
// Backend abstraction
// ============================================================================

/// One decoded streamed chunk: zero-or-more characters of text delta, plus
/// whatever grounding citations the chunk carried (typically only the
/// terminal chunk has any).
#[derive(Debug, Clone, Default, PartialEq)]
pub struct GenerationChunk {
    pub text: Option<String>,
    pub citations: Vec<Citation>,
}

/// Outbound request assembled by the session controller.
#[derive(Debug, Clone)]
pub struct GenerateRequest {
    pub system_instruction: String,
    pub contents: Vec<Content>,
    /// Enables web-search grounding for this request.
    pub web_search: bool,
}

pub type GenerationStream =
    Pin<Box<dyn Stream<Item = Result<GenerationChunk, AppError>> + Send>>;

/// Seam to the hosted generation service. The production implementation is
/// `GeminiClient`; tests substitute scripted backends.
#[async_trait]
pub trait GenerationBackend: Send + Sync {
    /// Issue the outbound call and return the lazy chunk sequence. The
    /// request is accepted once the handle is returned; data follows.
    async fn stream_generate(&self, request: GenerateRequest)
        -> Result<GenerationStream, AppError>;
}

// ============================================================================
// GeminiClient
// ============================================================================

/// HTTP client for the Gemini `streamGenerateContent` SSE endpoint.
pub struct GeminiClient {
    http: reqwest::Client,
    config: GeminiConfig,
}

impl GeminiClient {
    pub fn new(config: GeminiConfig) -> Self {
        let http = reqwest::Client::builder()
            .connect_timeout(config.connect_timeout)
            .build()
            .expect("failed to build reqwest client");
        Self { http, config }
    }

    fn endpoint(&self) -> String {
        format!(
            "{}/{}:streamGenerateContent?alt=sse",
            BASE_URL, self.config.model
        )
    }
}

#[async_trait]
impl GenerationBackend for GeminiClient {
    async fn stream_generate(
        &self,
        request: GenerateRequest,
    ) -> Result<GenerationStream, AppError> {
        let body = GenerateContentBody {
            contents: &request.contents,
            system_instruction: Some(Content {
                role: "system".to_string(),
                parts: vec![Part::text(request.system_instruction.clone())],
            }),
            tools: request.web_search.then(|| vec![Tool::google_search()]),
        };

        let response = self
            .http
            .post(self.endpoint())
            .header("x-goog-api-key", &self.config.api_key)
            .json(&body)
            .send()
            .await
            .map_err(remote_err)?;

        if !response.status().is_success() {
            let status = response.status();
            let body_text = response
                .text()
                .await
                .unwrap_or_else(|_| "failed to read error body".to_string());
            return Err(map_http_error(status, &body_text));
        }

        let stream = response
            .bytes_stream()
            .eventsource()
            .map(|event| match event {
                Ok(event) => parse_chunk(&event.data),
                Err(e) => Err(remote_err(e)),
            });
        Ok(Box::pin(stream))
    }
}

/// Decode one SSE data payload into a `GenerationChunk`.
pub fn parse_chunk(data: &str) -> Result<GenerationChunk, AppError> {
    let response: GenerateContentResponse = serde_json::from_str(data)
        .map_err(|e| AppError::RemoteCall(format!("malformed stream chunk: {e}")))?;

    let mut chunk = GenerationChunk::default();
    let Some(candidate) = response.candidates.and_then(|mut c| {
        if c.is_empty() {
            None
        } else {
            Some(c.remove(0))
        }
    }) else {
        return Ok(chunk);
    };

    if let Some(parts) = candidate.content.and_then(|c| c.parts) {
        let text: String = parts.into_iter().filter_map(|p| p.text).collect();
        if !text.is_empty() {
            chunk.text = Some(text);
        }
    }

    if let Some(grounding) = candidate
        .grounding_metadata
        .and_then(|g| g.grounding_chunks)
    {
        chunk.citations = grounding
            .into_iter()
            .filter_map(|g| g.web)
            .map(|web| Citation {
                uri: web.uri,
                title: web.title,
            })
            .collect();
    }

    Ok(chunk)
}

/// Surface the service's `{error: {message, status}}` envelope when present.
fn map_http_error(status: reqwest::StatusCode, body: &str) -> AppError {
    let message = serde_json::from_str::<ErrorWrapper>(body)
        .map(|wrapper| {
            let status_text = wrapper.error.status.unwrap_or_default();
            let msg = wrapper.error.message.unwrap_or_else(|| body.to_string());
            if status_text.is_empty() {
                msg
            } else {
                format!("{status_text}: {msg}")
            }
        })
        .unwrap_or_else(|_| body.to_string());
    AppError::RemoteCall(format!("{status}: {message}"))
}
