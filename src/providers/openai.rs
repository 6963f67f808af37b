//! OpenAI-backed provider implementations
//!
//! All four providers share one `async-openai` client configured from
//! [`ProviderConfig`]. Rate limits and service outages map to
//! [`VideoRagError::TransientProvider`] so the caller's retry loop can tell
//! them apart from fatal input errors.

use crate::config::ProviderConfig;
use crate::error::{Result, VideoRagError};
use crate::providers::{AudioChunk, Frame, Reasoner, SpeechToText, TextEmbedder, VisionCaptioner};
use crate::segment::{FrameCaption, TranscriptWindow};
use async_openai::config::OpenAIConfig;
use async_openai::error::OpenAIError;
use async_openai::types::{
    AudioInput, ChatCompletionRequestMessage, ChatCompletionRequestMessageContentPartImageArgs,
    ChatCompletionRequestMessageContentPartTextArgs, ChatCompletionRequestSystemMessage,
    ChatCompletionRequestSystemMessageContent, ChatCompletionRequestUserMessage,
    ChatCompletionRequestUserMessageContent, CreateChatCompletionRequestArgs,
    CreateEmbeddingRequestArgs, CreateTranscriptionRequestArgs, EmbeddingInput, ImageDetail,
    ImageUrlArgs,
};
use async_openai::Client;
use base64::Engine as _;

fn build_client(config: &ProviderConfig) -> Client<OpenAIConfig> {
    let mut openai_config = OpenAIConfig::new().with_api_key(config.api_key.clone());
    if let Some(base_url) = &config.base_url {
        openai_config = openai_config.with_api_base(base_url.clone());
    }
    Client::with_config(openai_config)
}

/// Map an OpenAI client error onto the videorag taxonomy.
fn map_openai_error(err: OpenAIError, context: &str) -> VideoRagError {
    match &err {
        OpenAIError::Reqwest(_) | OpenAIError::StreamError(_) => {
            VideoRagError::TransientProvider(format!("{}: {}", context, err))
        }
        OpenAIError::ApiError(api) => {
            let retryable = api.r#type.as_deref() == Some("server_error")
                || api.message.to_lowercase().contains("rate limit");
            if retryable {
                VideoRagError::TransientProvider(format!("{}: {}", context, err))
            } else {
                VideoRagError::InvalidInput(format!("{}: {}", context, err))
            }
        }
        _ => VideoRagError::Generic(format!("{}: {}", context, err)),
    }
}

/// Whisper transcription via the OpenAI audio endpoint
pub struct OpenAiTranscriber {
    client: Client<OpenAIConfig>,
    model: String,
}

impl OpenAiTranscriber {
    /// Create a transcriber from provider settings
    pub fn new(config: &ProviderConfig) -> Self {
        Self {
            client: build_client(config),
            model: config.transcription_model.clone(),
        }
    }
}

#[async_trait::async_trait]
impl SpeechToText for OpenAiTranscriber {
    async fn transcribe(&self, chunk: &AudioChunk) -> Result<Vec<TranscriptWindow>> {
        if chunk.data.is_empty() {
            return Err(VideoRagError::InvalidInput(format!(
                "audio slice [{:.1}, {:.1}) is empty",
                chunk.start, chunk.end
            )));
        }

        let filename = format!("slice-{}.mp3", (chunk.start * 1000.0) as u64);
        let request = CreateTranscriptionRequestArgs::default()
            .model(&self.model)
            .file(AudioInput::from_vec_u8(filename, chunk.data.clone()))
            .build()
            .map_err(|e| map_openai_error(e, "transcription request"))?;

        let response = self
            .client
            .audio()
            .transcribe(request)
            .await
            .map_err(|e| map_openai_error(e, "transcription"))?;

        log::debug!(
            "Transcribed audio slice [{:.1}, {:.1}): {} chars",
            chunk.start,
            chunk.end,
            response.text.len()
        );

        Ok(vec![TranscriptWindow {
            start: chunk.start,
            end: chunk.end,
            text: response.text,
        }])
    }
}

/// Frame captioning via a vision-capable chat model
pub struct OpenAiCaptioner {
    client: Client<OpenAIConfig>,
    model: String,
}

impl OpenAiCaptioner {
    /// Create a captioner from provider settings
    pub fn new(config: &ProviderConfig) -> Self {
        Self {
            client: build_client(config),
            model: config.vision_model.clone(),
        }
    }
}

#[async_trait::async_trait]
impl VisionCaptioner for OpenAiCaptioner {
    async fn describe(&self, frame: &Frame) -> Result<FrameCaption> {
        if frame.jpeg.is_empty() {
            return Err(VideoRagError::InvalidInput(format!(
                "frame at {:.1}s has no image data",
                frame.ts
            )));
        }

        let data_url = format!(
            "data:image/jpeg;base64,{}",
            base64::engine::general_purpose::STANDARD.encode(&frame.jpeg)
        );

        let text_part = ChatCompletionRequestMessageContentPartTextArgs::default()
            .text(
                "Describe this video frame. Mention the scene, important actions, \
                 visible objects (comma-separated after 'Objects:') and any on-screen \
                 text (after 'Text:'). Be concise but information dense.",
            )
            .build()
            .map_err(|e| map_openai_error(e, "caption request"))?;
        let image_part = ChatCompletionRequestMessageContentPartImageArgs::default()
            .image_url(
                ImageUrlArgs::default()
                    .url(data_url)
                    .detail(ImageDetail::Low)
                    .build()
                    .map_err(|e| map_openai_error(e, "caption request"))?,
            )
            .build()
            .map_err(|e| map_openai_error(e, "caption request"))?;

        let request = CreateChatCompletionRequestArgs::default()
            .model(&self.model)
            .messages(vec![ChatCompletionRequestMessage::User(
                ChatCompletionRequestUserMessage {
                    content: ChatCompletionRequestUserMessageContent::Array(vec![
                        text_part.into(),
                        image_part.into(),
                    ]),
                    name: None,
                },
            )])
            .max_tokens(300u32)
            .build()
            .map_err(|e| map_openai_error(e, "caption request"))?;

        let response = self
            .client
            .chat()
            .create(request)
            .await
            .map_err(|e| map_openai_error(e, "caption"))?;

        let description = response
            .choices
            .first()
            .and_then(|choice| choice.message.content.clone())
            .unwrap_or_default();

        Ok(parse_caption(frame.ts, &description))
    }
}

/// Split a free-form caption into the structured FrameCaption fields.
fn parse_caption(ts: f64, raw: &str) -> FrameCaption {
    let mut description_lines = Vec::new();
    let mut objects = Vec::new();
    let mut text = String::new();

    for line in raw.lines() {
        let trimmed = line.trim();
        if let Some(rest) = trimmed.strip_prefix("Objects:") {
            objects.extend(
                rest.split(',')
                    .map(|o| o.trim().trim_end_matches('.').to_string())
                    .filter(|o| !o.is_empty()),
            );
        } else if let Some(rest) = trimmed.strip_prefix("Text:") {
            text = rest.trim().to_string();
        } else if !trimmed.is_empty() {
            description_lines.push(trimmed.to_string());
        }
    }

    FrameCaption {
        frame_ts: ts,
        description: description_lines.join(" "),
        objects,
        text,
    }
}

/// Embedding provider over the OpenAI embeddings endpoint
pub struct OpenAiEmbedder {
    client: Client<OpenAIConfig>,
    model: String,
    max_batch: usize,
}

impl OpenAiEmbedder {
    /// Create an embedder for the given model
    pub fn new(config: &ProviderConfig, model: &str, max_batch: usize) -> Self {
        Self {
            client: build_client(config),
            model: model.to_string(),
            max_batch,
        }
    }
}

#[async_trait::async_trait]
impl TextEmbedder for OpenAiEmbedder {
    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }
        if texts.len() > self.max_batch {
            return Err(VideoRagError::InvalidInput(format!(
                "batch of {} exceeds provider limit {}",
                texts.len(),
                self.max_batch
            )));
        }

        let request = CreateEmbeddingRequestArgs::default()
            .model(&self.model)
            .input(EmbeddingInput::StringArray(texts.to_vec()))
            .build()
            .map_err(|e| map_openai_error(e, "embedding request"))?;

        let response = self
            .client
            .embeddings()
            .create(request)
            .await
            .map_err(|e| map_openai_error(e, "embedding"))?;

        let mut data = response.data;
        data.sort_by_key(|entry| entry.index);

        if data.len() != texts.len() {
            return Err(VideoRagError::EmbeddingProvider(format!(
                "provider returned {} vectors for {} inputs",
                data.len(),
                texts.len()
            )));
        }

        Ok(data.into_iter().map(|entry| entry.embedding).collect())
    }

    fn model(&self) -> &str {
        &self.model
    }

    fn max_batch_size(&self) -> usize {
        self.max_batch
    }
}

/// Chat completion provider used for answer assembly
pub struct OpenAiReasoner {
    client: Client<OpenAIConfig>,
    model: String,
}

impl OpenAiReasoner {
    /// Create a reasoner from provider settings
    pub fn new(config: &ProviderConfig) -> Self {
        Self {
            client: build_client(config),
            model: config.chat_model.clone(),
        }
    }
}

#[async_trait::async_trait]
impl Reasoner for OpenAiReasoner {
    async fn complete(&self, system_prompt: &str, user_prompt: &str) -> Result<String> {
        let messages = vec![
            ChatCompletionRequestMessage::System(ChatCompletionRequestSystemMessage {
                content: ChatCompletionRequestSystemMessageContent::Text(system_prompt.to_string()),
                name: None,
            }),
            ChatCompletionRequestMessage::User(ChatCompletionRequestUserMessage {
                content: ChatCompletionRequestUserMessageContent::Text(user_prompt.to_string()),
                name: None,
            }),
        ];

        let request = CreateChatCompletionRequestArgs::default()
            .model(&self.model)
            .messages(messages)
            .temperature(0.2)
            .build()
            .map_err(|e| map_openai_error(e, "chat request"))?;

        let response = self
            .client
            .chat()
            .create(request)
            .await
            .map_err(|e| map_openai_error(e, "chat"))?;

        response
            .choices
            .first()
            .and_then(|choice| choice.message.content.clone())
            .ok_or_else(|| VideoRagError::Generic("no content in chat response".to_string()))
    }
}
