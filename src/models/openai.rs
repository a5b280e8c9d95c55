//! `OpenAI` chat-completions client for GPT-4o vision models.
//!
//! Both pipeline phases go through the same endpoint: phase 1 attaches
//! base64-encoded page images to the user message, phase 2 is text-only.
//!
//! ## Supported Models
//!
//! - **GPT-4o**: vision-capable, used for page analysis
//! - **GPT-4o mini**: cheaper, adequate for cell generation
//!
//! Errors are classified per the pipeline taxonomy: 408/429/5xx and network
//! failures are transient (retried with backoff), other HTTP errors are
//! persistent and abort the run.

use base64::Engine;
use reqwest::Client;
use serde::{Deserialize, Serialize};

use super::client::{classify_status, GenerateRequest, GenerateResponse};
use crate::error::{LecternError, Result};

const API_URL: &str = "https://api.openai.com/v1/chat/completions";

/// `OpenAI` chat completion request body.
#[derive(Debug, Serialize)]
struct ChatRequest {
    model: String,
    messages: Vec<Message>,
    max_tokens: u32,
    temperature: f64,
}

#[derive(Debug, Serialize)]
struct Message {
    role: String,
    content: Vec<Content>,
}

#[derive(Debug, Serialize)]
#[serde(untagged)]
enum Content {
    Text { r#type: String, text: String },
    Image { r#type: String, image_url: ImageUrl },
}

#[derive(Debug, Serialize)]
struct ImageUrl {
    url: String,
    detail: String,
}

/// `OpenAI` chat completion response.
#[derive(Debug, Deserialize)]
struct ChatResponse {
    model: String,
    choices: Vec<Choice>,
    usage: Option<Usage>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ResponseMessage,
}

#[derive(Debug, Deserialize)]
struct ResponseMessage {
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Usage {
    prompt_tokens: u32,
    completion_tokens: u32,
}

/// `OpenAI` model variants used by the pipeline.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum OpenAIModel {
    /// GPT-4o - vision model used for page analysis
    #[default]
    Gpt4o,
    /// GPT-4o mini - cheaper model for text-only generation
    Gpt4oMini,
}

impl OpenAIModel {
    /// Get the `OpenAI` API model identifier string
    #[inline]
    #[must_use]
    pub const fn model_id(&self) -> &str {
        match self {
            Self::Gpt4o => "gpt-4o",
            Self::Gpt4oMini => "gpt-4o-mini",
        }
    }
}

impl std::fmt::Display for OpenAIModel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.model_id())
    }
}

impl std::str::FromStr for OpenAIModel {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "gpt-4o" | "gpt4o" | "4o" => Ok(Self::Gpt4o),
            "gpt-4o-mini" | "gpt4o-mini" | "4o-mini" | "mini" => Ok(Self::Gpt4oMini),
            _ => Err(format!(
                "unknown OpenAI model '{s}'. Valid options: gpt-4o, gpt-4o-mini"
            )),
        }
    }
}

/// HTTP client for `OpenAI` API requests.
#[derive(Debug, Clone)]
pub struct OpenAIClient {
    client: Client,
    api_key: String,
    model: OpenAIModel,
}

impl OpenAIClient {
    /// Create a new `OpenAI` client with the given API key and model.
    #[must_use]
    pub fn new(api_key: String, model: OpenAIModel) -> Self {
        Self {
            client: Client::new(),
            api_key,
            model,
        }
    }

    /// Issue one generation call.
    ///
    /// # Errors
    ///
    /// Returns a classified transient or persistent provider error.
    pub async fn generate(&self, request: &GenerateRequest) -> Result<GenerateResponse> {
        let mut content = vec![Content::Text {
            r#type: "text".to_string(),
            text: request.prompt.clone(),
        }];

        for png in &request.images {
            let image_b64 = base64::engine::general_purpose::STANDARD.encode(png);
            content.push(Content::Image {
                r#type: "image_url".to_string(),
                image_url: ImageUrl {
                    url: format!("data:image/png;base64,{image_b64}"),
                    detail: "high".to_string(),
                },
            });
        }

        let body = ChatRequest {
            model: self.model.model_id().to_string(),
            messages: vec![Message {
                role: "user".to_string(),
                content,
            }],
            max_tokens: request.max_tokens,
            temperature: request.temperature,
        };

        let response = self
            .client
            .post(API_URL)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .header("Content-Type", "application/json")
            .json(&body)
            .send()
            .await
            .map_err(|e| LecternError::TransientProvider(format!("request failed: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response.text().await.unwrap_or_default();
            return Err(classify_status(status.as_u16(), &error_text));
        }

        let chat: ChatResponse = response
            .json()
            .await
            .map_err(|e| LecternError::TransientProvider(format!("malformed response: {e}")))?;

        let content = chat
            .choices
            .first()
            .and_then(|c| c.message.content.clone())
            .unwrap_or_default();
        let (input_tokens, output_tokens) = chat
            .usage
            .map_or((0, 0), |u| (u.prompt_tokens, u.completion_tokens));

        Ok(GenerateResponse {
            content,
            model: chat.model,
            input_tokens,
            output_tokens,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_openai_model_display() {
        assert_eq!(format!("{}", OpenAIModel::Gpt4o), "gpt-4o");
        assert_eq!(format!("{}", OpenAIModel::Gpt4oMini), "gpt-4o-mini");
    }

    #[test]
    fn test_openai_model_from_str() {
        assert_eq!("gpt-4o".parse::<OpenAIModel>().unwrap(), OpenAIModel::Gpt4o);
        assert_eq!("4o".parse::<OpenAIModel>().unwrap(), OpenAIModel::Gpt4o);
        assert_eq!(
            "gpt-4o-mini".parse::<OpenAIModel>().unwrap(),
            OpenAIModel::Gpt4oMini
        );
        assert_eq!("MINI".parse::<OpenAIModel>().unwrap(), OpenAIModel::Gpt4oMini);
        assert!("claude".parse::<OpenAIModel>().is_err());
    }

    #[test]
    fn test_openai_model_roundtrip() {
        for model in [OpenAIModel::Gpt4o, OpenAIModel::Gpt4oMini] {
            let parsed: OpenAIModel = model.model_id().parse().unwrap();
            assert_eq!(parsed, model);
        }
    }
}
