//! HTTP client for the local AI sidecar
//!
//! The sidecar runs the language model, the vision model and the vector
//! store behind a small JSON API. ureq is blocking, so every call hops onto
//! the blocking pool.

use super::{AiCollaborator, VectorIndex};
use crate::config::AiConfig;
use crate::error::AiError;
use crate::item::{parse_tag_list, ClipboardItem};
use serde::Deserialize;
use serde_json::{json, Value};
use std::time::Duration;

/// Items sent along with a question
const ANSWER_CONTEXT_ITEMS: usize = 10;
/// Characters of each context item sent along with a question
const ANSWER_CONTEXT_CHARS: usize = 500;

/// Sidecar API client
#[derive(Debug, Clone)]
pub struct SidecarClient {
    /// Base endpoint URL (e.g., "http://127.0.0.1:8000")
    endpoint: String,
    api_key: Option<String>,
    timeout: Duration,
}

#[derive(Debug, Deserialize)]
struct MessageResponse {
    response: String,
}

#[derive(Debug, Deserialize)]
struct AddResponse {
    vector_id: String,
}

#[derive(Debug, Deserialize)]
struct SearchHit {
    id: String,
    score: f32,
}

#[derive(Debug, Deserialize)]
struct SearchResponse {
    #[serde(default)]
    results: Vec<SearchHit>,
}

impl SidecarClient {
    pub fn new(config: &AiConfig) -> Result<Self, AiError> {
        let endpoint = config.endpoint.trim_end_matches('/').to_string();

        if !endpoint.starts_with("http://") && !endpoint.starts_with("https://") {
            return Err(AiError::Config(format!(
                "endpoint must start with http:// or https://, got: {}",
                endpoint
            )));
        }

        if endpoint.starts_with("http://")
            && !endpoint.contains("localhost")
            && !endpoint.contains("127.0.0.1")
            && !endpoint.contains("[::1]")
        {
            tracing::warn!(
                "AI endpoint uses HTTP without TLS. Clipboard contents will be transmitted unencrypted!"
            );
        }

        let api_key = config
            .api_key
            .clone()
            .or_else(|| std::env::var("CLIPPY_API_KEY").ok())
            .filter(|k| !k.is_empty());

        tracing::debug!(
            "Configured sidecar client: endpoint={}, timeout={}s",
            endpoint,
            config.timeout_secs
        );

        Ok(Self {
            endpoint,
            api_key,
            timeout: Duration::from_secs(config.timeout_secs.max(1)),
        })
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.endpoint, path)
    }

    fn authorize(&self, mut request: ureq::Request) -> ureq::Request {
        if let Some(ref key) = self.api_key {
            request = request.set("Authorization", &format!("Bearer {}", key));
        }
        request
    }

    fn map_error(e: ureq::Error) -> AiError {
        match e {
            ureq::Error::Status(code, resp) => {
                let body = resp.into_string().unwrap_or_default();
                AiError::Server(format!("{}: {}", code, body))
            }
            ureq::Error::Transport(t) => AiError::Network(t.to_string()),
        }
    }

    fn post_json(&self, path: &str, body: Value) -> Result<ureq::Response, AiError> {
        let request = ureq::post(&self.url(path)).timeout(self.timeout);
        self.authorize(request)
            .send_json(body)
            .map_err(Self::map_error)
    }

    fn parse<T: for<'de> Deserialize<'de>>(response: ureq::Response) -> Result<T, AiError> {
        response
            .into_json()
            .map_err(|e| AiError::Malformed(e.to_string()))
    }

    /// Run a blocking request on the blocking pool
    async fn blocking<T, F>(&self, f: F) -> Result<T, AiError>
    where
        T: Send + 'static,
        F: FnOnce(SidecarClient) -> Result<T, AiError> + Send + 'static,
    {
        let client = self.clone();
        tokio::task::spawn_blocking(move || f(client))
            .await
            .map_err(|e| AiError::Network(format!("Task join error: {}", e)))?
    }

    /// Whether the sidecar answers `GET /health`
    pub fn health(&self) -> Result<Value, AiError> {
        let request = ureq::get(&self.url("/health")).timeout(Duration::from_secs(3));
        let response = self.authorize(request).call().map_err(Self::map_error)?;
        Self::parse(response)
    }

    fn message(&self, body: Value) -> Result<String, AiError> {
        let response = self.post_json("/v1/agent/message", body)?;
        let parsed: MessageResponse = Self::parse(response)?;
        Ok(parsed.response.trim().to_string())
    }

    /// Build the multipart form body for an image upload
    fn build_multipart_body(png: &[u8]) -> (String, Vec<u8>) {
        let boundary = format!(
            "----ClippyBoundary{}",
            std::time::SystemTime::now()
                .duration_since(std::time::UNIX_EPOCH)
                .unwrap_or_default()
                .as_nanos()
        );

        let mut body = Vec::new();
        body.extend_from_slice(format!("--{}\r\n", boundary).as_bytes());
        body.extend_from_slice(
            b"Content-Disposition: form-data; name=\"file\"; filename=\"image.png\"\r\n",
        );
        body.extend_from_slice(b"Content-Type: image/png\r\n\r\n");
        body.extend_from_slice(png);
        body.extend_from_slice(b"\r\n");
        body.extend_from_slice(format!("--{}--\r\n", boundary).as_bytes());

        (boundary, body)
    }
}

fn tags_request(content: &str, app_name: Option<&str>, context: &[String]) -> Value {
    json!({
        "message": "Generate 3-5 short lowercase tags for this clipboard content. Reply with the tags only, comma separated.",
        "context": {
            "task": "tags",
            "app_name": app_name,
            "content": content,
            "recent": context,
        }
    })
}

fn answer_request(question: &str, app_name: Option<&str>, context: &[ClipboardItem]) -> Value {
    let items: Vec<Value> = context
        .iter()
        .take(ANSWER_CONTEXT_ITEMS)
        .map(|item| {
            json!({
                "id": item.id.to_string(),
                "content": item.preview(ANSWER_CONTEXT_CHARS),
                "content_type": item.content_type.as_str(),
                "source_app": item.source_app,
                "tags": item.tags,
                "timestamp": item.timestamp.to_rfc3339(),
            })
        })
        .collect();

    json!({
        "message": question,
        "context": {
            "task": "answer",
            "app_name": app_name,
            "clipboard_items": items,
        }
    })
}

fn add_request(item: &ClipboardItem) -> Value {
    json!({
        "id": item.id.to_string(),
        "text_content": item.content,
        "timestamp": item.timestamp.to_rfc3339(),
        "source_app": item.source_app,
        "tags": item.tags,
    })
}

#[async_trait::async_trait]
impl AiCollaborator for SidecarClient {
    async fn generate_tags(
        &self,
        content: &str,
        app_name: Option<&str>,
        context: &[String],
    ) -> Result<Vec<String>, AiError> {
        let body = tags_request(content, app_name, context);
        let response = self.blocking(move |c| c.message(body)).await?;
        Ok(parse_tag_list(&response))
    }

    async fn generate_answer(
        &self,
        question: &str,
        app_name: Option<&str>,
        context: &[ClipboardItem],
    ) -> Result<Option<String>, AiError> {
        let body = answer_request(question, app_name, context);
        let start = std::time::Instant::now();
        let response = self.blocking(move |c| c.message(body)).await?;
        tracing::debug!("Answer received in {:.2}s", start.elapsed().as_secs_f32());
        Ok((!response.is_empty()).then_some(response))
    }

    async fn describe_image(&self, png: Vec<u8>) -> Result<String, AiError> {
        if png.is_empty() {
            return Err(AiError::Malformed("empty image".to_string()));
        }
        self.blocking(move |c| {
            let (boundary, body) = SidecarClient::build_multipart_body(&png);
            let request = ureq::post(&c.url("/v1/agent/vision"))
                .timeout(c.timeout)
                .set(
                    "Content-Type",
                    &format!("multipart/form-data; boundary={}", boundary),
                );
            let response = c
                .authorize(request)
                .send_bytes(&body)
                .map_err(SidecarClient::map_error)?;
            let parsed: MessageResponse = SidecarClient::parse(response)?;
            let description = parsed.response.trim().to_string();
            if description.is_empty() {
                return Err(AiError::Malformed("empty image description".to_string()));
            }
            Ok(description)
        })
        .await
    }
}

#[async_trait::async_trait]
impl VectorIndex for SidecarClient {
    async fn embed(&self, item: &ClipboardItem) -> Result<String, AiError> {
        let body = add_request(item);
        self.blocking(move |c| {
            let response = c.post_json("/v1/memory/add", body)?;
            let parsed: AddResponse = SidecarClient::parse(response)?;
            Ok(parsed.vector_id)
        })
        .await
    }

    async fn search(&self, query: &str, limit: usize) -> Result<Vec<(String, f32)>, AiError> {
        let body = json!({ "query": query, "limit": limit });
        self.blocking(move |c| {
            let response = c.post_json("/v1/memory/search", body)?;
            let parsed: SearchResponse = SidecarClient::parse(response)?;
            Ok(parsed.results.into_iter().map(|h| (h.id, h.score)).collect())
        })
        .await
    }

    async fn remove(&self, vector_id: &str) -> Result<(), AiError> {
        let body = json!({ "id": vector_id });
        self.blocking(move |c| c.post_json("/v1/memory/delete", body).map(|_| ()))
            .await
    }
}
