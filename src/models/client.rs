//! Provider-neutral generation client.
//!
//! The pipeline's only obligation on a text-generation backend is "generate
//! text from a prompt plus optional page images, or fail with a transient or
//! permanent error". [`GenerateRequest`] / [`GenerateResponse`] capture that
//! contract; [`LlmClient`] dispatches to the concrete provider clients and
//! [`LlmClient::generate_with_retry`] layers bounded exponential backoff on
//! top for transient failures.

use std::time::Duration;

use tracing::warn;

use super::bedrock::BedrockClient;
use super::openai::OpenAIClient;
use crate::error::{LecternError, Result};

/// Default number of attempts for a single generation call.
pub const DEFAULT_MAX_ATTEMPTS: u32 = 3;

/// Base delay before the first retry; doubles on each subsequent attempt.
const BACKOFF_BASE: Duration = Duration::from_millis(500);

/// A single generation request: prompt text plus optional PNG page images.
#[derive(Debug, Clone, Default)]
pub struct GenerateRequest {
    /// Prompt text
    pub prompt: String,
    /// PNG-encoded page images attached to the request, in page order
    pub images: Vec<Vec<u8>>,
    /// Maximum tokens to generate
    pub max_tokens: u32,
    /// Sampling temperature
    pub temperature: f64,
}

impl GenerateRequest {
    /// Text-only request with the pipeline's defaults (fairly deterministic).
    #[must_use]
    pub fn text(prompt: impl Into<String>, max_tokens: u32) -> Self {
        Self {
            prompt: prompt.into(),
            images: Vec::new(),
            max_tokens,
            temperature: 0.3,
        }
    }

    /// Attach PNG page images to the request.
    #[must_use]
    pub fn with_images(mut self, images: Vec<Vec<u8>>) -> Self {
        self.images = images;
        self
    }
}

/// A generation reply with token accounting.
#[derive(Debug, Clone, Default)]
pub struct GenerateResponse {
    /// Generated text content
    pub content: String,
    /// Model identifier that produced the reply
    pub model: String,
    /// Input tokens consumed
    pub input_tokens: u32,
    /// Output tokens generated
    pub output_tokens: u32,
}

/// Concrete generation backend.
///
/// Enum dispatch keeps the call sites free of `dyn` plumbing; each variant
/// wraps one provider client.
#[derive(Debug, Clone)]
pub enum LlmClient {
    /// `OpenAI` chat-completions API
    OpenAI(OpenAIClient),
    /// Claude via AWS Bedrock
    Bedrock(BedrockClient),
}

impl LlmClient {
    /// Issue one generation call, no retries.
    ///
    /// # Errors
    ///
    /// Returns [`LecternError::TransientProvider`] for rate-limit, server,
    /// or network failures and [`LecternError::PersistentProvider`] for
    /// authentication, quota, or malformed-request failures.
    pub async fn generate(&self, request: &GenerateRequest) -> Result<GenerateResponse> {
        match self {
            Self::OpenAI(client) => client.generate(request).await,
            Self::Bedrock(client) => client.generate(request).await,
        }
    }

    /// Issue a generation call with bounded retry on transient failures.
    ///
    /// Backs off exponentially between attempts (500ms, 1s, 2s, ...).
    /// Persistent failures are returned immediately without retrying.
    ///
    /// # Errors
    ///
    /// Returns the last transient error once attempts are exhausted, or the
    /// first persistent error encountered.
    pub async fn generate_with_retry(
        &self,
        request: &GenerateRequest,
        max_attempts: u32,
    ) -> Result<GenerateResponse> {
        let mut last_err = None;

        for attempt in 0..max_attempts.max(1) {
            if attempt > 0 {
                let delay = BACKOFF_BASE * 2u32.pow(attempt - 1);
                warn!(
                    "retrying generation call (attempt {}/{}) after {:?}",
                    attempt + 1,
                    max_attempts,
                    delay
                );
                tokio::time::sleep(delay).await;
            }

            match self.generate(request).await {
                Ok(response) => return Ok(response),
                Err(e) if e.is_transient() => last_err = Some(e),
                Err(e) => return Err(e),
            }
        }

        Err(last_err.unwrap_or_else(|| {
            LecternError::TransientProvider("no attempts were made".into())
        }))
    }
}

/// Classify an HTTP status into the provider error taxonomy.
///
/// Rate limiting (429), request timeout (408), and server errors (5xx) are
/// transient; everything else client-side (auth, quota, malformed request)
/// is persistent.
#[must_use]
pub fn classify_status(status: u16, body: &str) -> LecternError {
    let detail = format!("HTTP {status}: {}", truncate(body, 300));
    match status {
        408 | 429 | 500..=599 => LecternError::TransientProvider(detail),
        _ => LecternError::PersistentProvider(detail),
    }
}

/// Extract the JSON payload from a possibly markdown-wrapped reply.
///
/// Models frequently wrap structured replies in ```` ```json ```` fences or
/// prepend prose; this strips one fence or falls back to the outermost
/// `{...}` span.
#[must_use]
pub fn extract_json(text: &str) -> String {
    let text = text.trim();

    if text.starts_with("```") {
        if let Some(start) = text.find('\n') {
            let after_first_line = &text[start + 1..];
            if let Some(end) = after_first_line.rfind("```") {
                return after_first_line[..end].trim().to_string();
            }
        }
    }

    if let Some(start) = text.find('{') {
        if let Some(end) = text.rfind('}') {
            if end > start {
                return text[start..=end].to_string();
            }
        }
    }

    text.to_string()
}

fn truncate(s: &str, max: usize) -> String {
    if s.len() <= max {
        s.to_string()
    } else {
        let mut end = max;
        while !s.is_char_boundary(end) {
            end -= 1;
        }
        format!("{}...", &s[..end])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classify_status() {
        assert!(classify_status(429, "rate limited").is_transient());
        assert!(classify_status(503, "overloaded").is_transient());
        assert!(classify_status(408, "timeout").is_transient());
        assert!(!classify_status(401, "bad key").is_transient());
        assert!(!classify_status(400, "bad request").is_transient());
        assert!(!classify_status(403, "quota").is_transient());
    }

    #[test]
    fn test_extract_json_fenced() {
        let reply = "```json\n{\"sections\": []}\n```";
        assert_eq!(extract_json(reply), "{\"sections\": []}");
    }

    #[test]
    fn test_extract_json_generic_fence() {
        let reply = "```\n{\"a\": 1}\n```";
        assert_eq!(extract_json(reply), "{\"a\": 1}");
    }

    #[test]
    fn test_extract_json_with_prose() {
        let reply = "Here is the analysis:\n{\"a\": 1}\nHope that helps!";
        assert_eq!(extract_json(reply), "{\"a\": 1}");
    }

    #[test]
    fn test_extract_json_passthrough() {
        assert_eq!(extract_json("  {\"a\": 1}  "), "{\"a\": 1}");
        assert_eq!(extract_json("not json at all"), "not json at all");
    }
}
