//! AWS Bedrock client for Claude models.
//!
//! Uses the Converse API with the default AWS credentials chain:
//!
//! 1. Environment variables (`AWS_ACCESS_KEY_ID`, `AWS_SECRET_ACCESS_KEY`)
//! 2. AWS credentials file (`~/.aws/credentials`)
//! 3. IAM role (for EC2/Lambda)
//!
//! Phase 1 requests attach PNG page images as image blocks ahead of the
//! prompt text; phase 2 requests are text-only. Throttling and service
//! errors are classified as transient so the caller's retry loop applies.

use aws_sdk_bedrockruntime::{
    error::SdkError,
    operation::converse::ConverseError,
    primitives::Blob,
    types::{
        ContentBlock, ConversationRole, ImageBlock, ImageFormat, ImageSource,
        InferenceConfiguration, Message,
    },
    Client,
};

use super::client::{GenerateRequest, GenerateResponse};
use crate::error::{LecternError, Result};

/// Claude model variants available on Bedrock.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum ClaudeModel {
    /// Claude Sonnet 3.5 v2 - good balance of speed and quality
    #[default]
    ClaudeSonnet35V2,
    /// Claude Opus 4.5 - best for dense, equation-heavy material
    ClaudeOpus45,
}

impl ClaudeModel {
    /// Get the AWS Bedrock model identifier string
    #[inline]
    #[must_use]
    pub const fn model_id(&self) -> &str {
        match self {
            Self::ClaudeSonnet35V2 => "us.anthropic.claude-3-5-sonnet-20241022-v2:0",
            Self::ClaudeOpus45 => "global.anthropic.claude-opus-4-5-20251101-v1:0",
        }
    }

    /// Get the human-readable model name for display purposes
    #[inline]
    #[must_use]
    pub const fn display_name(&self) -> &str {
        match self {
            Self::ClaudeSonnet35V2 => "claude-sonnet-3.5-v2",
            Self::ClaudeOpus45 => "claude-opus-4.5",
        }
    }
}

impl std::fmt::Display for ClaudeModel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.display_name())
    }
}

impl std::str::FromStr for ClaudeModel {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "claude-sonnet-3.5-v2" | "sonnet-3.5-v2" | "sonnet35v2" | "sonnet" => {
                Ok(Self::ClaudeSonnet35V2)
            }
            "claude-opus-4.5" | "opus-4.5" | "opus45" | "opus" => Ok(Self::ClaudeOpus45),
            _ => Err(format!(
                "unknown Claude model '{s}'. Valid options: claude-sonnet-3.5-v2, sonnet, claude-opus-4.5, opus"
            )),
        }
    }
}

/// AWS Bedrock client for Claude models.
#[derive(Debug, Clone)]
pub struct BedrockClient {
    client: Client,
    model: ClaudeModel,
}

impl BedrockClient {
    /// Create a new Bedrock client using default AWS credentials.
    pub async fn new(model: ClaudeModel) -> Self {
        let config = aws_config::load_defaults(aws_config::BehaviorVersion::latest()).await;
        Self {
            client: Client::new(&config),
            model,
        }
    }

    /// Create a new Bedrock client for a specific region.
    pub async fn new_with_region(region: &str, model: ClaudeModel) -> Self {
        let config = aws_config::defaults(aws_config::BehaviorVersion::latest())
            .region(aws_config::Region::new(region.to_string()))
            .load()
            .await;
        Self {
            client: Client::new(&config),
            model,
        }
    }

    /// Issue one generation call via the Converse API.
    ///
    /// # Errors
    ///
    /// Returns a classified transient or persistent provider error.
    pub async fn generate(&self, request: &GenerateRequest) -> Result<GenerateResponse> {
        let mut builder = Message::builder().role(ConversationRole::User);

        for png in &request.images {
            let image_block = ImageBlock::builder()
                .format(ImageFormat::Png)
                .source(ImageSource::Bytes(Blob::new(png.clone())))
                .build()
                .map_err(|e| {
                    LecternError::PersistentProvider(format!("failed to build image block: {e}"))
                })?;
            builder = builder.content(ContentBlock::Image(image_block));
        }

        let message = builder
            .content(ContentBlock::Text(request.prompt.clone()))
            .build()
            .map_err(|e| {
                LecternError::PersistentProvider(format!("failed to build message: {e}"))
            })?;

        let response = self
            .client
            .converse()
            .model_id(self.model.model_id())
            .messages(message)
            .inference_config(inference_config(request))
            .send()
            .await
            .map_err(classify_sdk_error)?;

        let output = response.output().ok_or_else(|| {
            LecternError::TransientProvider("no output in Bedrock response".into())
        })?;
        let message = output.as_message().map_err(|_| {
            LecternError::TransientProvider("Bedrock output is not a message".into())
        })?;

        let content = message
            .content()
            .iter()
            .find_map(|block| {
                if let ContentBlock::Text(text) = block {
                    Some(text.clone())
                } else {
                    None
                }
            })
            .unwrap_or_default();

        let (input_tokens, output_tokens) = response.usage().map_or((0, 0), |u| {
            (
                u.input_tokens().try_into().unwrap_or(0),
                u.output_tokens().try_into().unwrap_or(0),
            )
        });

        Ok(GenerateResponse {
            content,
            model: self.model.display_name().to_string(),
            input_tokens,
            output_tokens,
        })
    }
}

/// Carry the request's token budget and sampling temperature onto the
/// Converse call.
#[allow(clippy::cast_possible_truncation)]
fn inference_config(request: &GenerateRequest) -> InferenceConfiguration {
    InferenceConfiguration::builder()
        .max_tokens(i32::try_from(request.max_tokens).unwrap_or(i32::MAX))
        .temperature(request.temperature as f32)
        .build()
}

/// Map Bedrock SDK failures into the pipeline's error taxonomy.
///
/// Throttling and internal service errors are retriable; access-denied and
/// validation failures are not.
fn classify_sdk_error(err: SdkError<ConverseError>) -> LecternError {
    match &err {
        SdkError::ServiceError(service_err) => match service_err.err() {
            ConverseError::ThrottlingException(_)
            | ConverseError::InternalServerException(_)
            | ConverseError::ModelNotReadyException(_)
            | ConverseError::ServiceUnavailableException(_) => {
                LecternError::TransientProvider(format!("Bedrock: {err}"))
            }
            _ => LecternError::PersistentProvider(format!("Bedrock: {err}")),
        },
        SdkError::TimeoutError(_) | SdkError::DispatchFailure(_) | SdkError::ResponseError(_) => {
            LecternError::TransientProvider(format!("Bedrock: {err}"))
        }
        _ => LecternError::PersistentProvider(format!("Bedrock: {err}")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_model_ids() {
        assert!(ClaudeModel::ClaudeOpus45.model_id().contains("opus"));
        assert!(ClaudeModel::ClaudeSonnet35V2.model_id().contains("sonnet"));
    }

    #[test]
    fn test_claude_model_display() {
        assert_eq!(format!("{}", ClaudeModel::ClaudeOpus45), "claude-opus-4.5");
        assert_eq!(
            format!("{}", ClaudeModel::ClaudeSonnet35V2),
            "claude-sonnet-3.5-v2"
        );
    }

    #[test]
    fn test_claude_model_from_str() {
        assert_eq!(
            "opus".parse::<ClaudeModel>().unwrap(),
            ClaudeModel::ClaudeOpus45
        );
        assert_eq!(
            "sonnet".parse::<ClaudeModel>().unwrap(),
            ClaudeModel::ClaudeSonnet35V2
        );
        assert_eq!(
            "Claude-Opus-4.5".parse::<ClaudeModel>().unwrap(),
            ClaudeModel::ClaudeOpus45
        );
        assert!("gpt-4".parse::<ClaudeModel>().is_err());
    }

    #[test]
    fn test_inference_config_carries_request_budget() {
        let request = GenerateRequest::text("prompt", 4000);
        let config = inference_config(&request);
        assert_eq!(config.max_tokens(), Some(4000));
        assert!((config.temperature().unwrap() - 0.3).abs() < 1e-6);
    }

    #[test]
    fn test_claude_model_roundtrip() {
        for model in [ClaudeModel::ClaudeOpus45, ClaudeModel::ClaudeSonnet35V2] {
            let parsed: ClaudeModel = model.display_name().parse().unwrap();
            assert_eq!(parsed, model);
        }
    }
}
