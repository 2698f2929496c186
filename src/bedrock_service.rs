use core::str;
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

use anyhow::{bail, Context, Result};
use aws_sdk_bedrockruntime::types::ConverseStreamOutput as StreamEvent;
use aws_sdk_bedrockruntime::types::{
    AsyncInvokeOutputDataConfig, AsyncInvokeS3OutputDataConfig, AsyncInvokeStatus, ContentBlock,
    ConversationRole::{Assistant, User},
    InferenceConfiguration, Message, SystemContentBlock,
};
use aws_sdk_bedrockruntime::Client;
use aws_smithy_types::{Blob, Document};
use base64::prelude::*;
use serde_json::json;

use crate::attachment::{content_block_for_file, reference_image_for_file};
use crate::config::{AppConfig, ModelFamily};
use crate::request_types::{
    value_to_document, ImageGenerationRequest, ImageGenerationResponse, VideoGenerationRequest,
};
use crate::storage_service::parse_s3_uri;
use crate::terminal_service::TerminalService;

/// An in-flight Nova Reel job and where its output will land.
#[derive(Clone, Debug)]
pub struct VideoJob {
    pub invocation_arn: String,
    pub bucket: String,
    pub prefix: String,
}

/// Snapshot of an async video job, from GetAsyncInvoke.
#[derive(Clone, Debug)]
pub struct VideoJobStatus {
    pub status: String,
    pub completed: bool,
    pub failed: bool,
    pub error: Option<String>,
}

#[derive(Debug)]
pub struct BedrockService {
    bedrock_client: Client,
    model_id: String,
    family: ModelFamily,
    system_prompt: SystemContentBlock,
    inference_config: InferenceConfiguration,
    additional_fields: Option<Document>,
    config: AppConfig,
    conversation: Vec<Message>,
    terminal: TerminalService,
}

// public impl
impl BedrockService {
    pub fn new(client: &Client, config: &AppConfig, model_id: &str) -> Result<Self> {
        let family = ModelFamily::from_model_id(model_id);
        let system_prompt = SystemContentBlock::Text(config.system_prompt.clone());
        let (inference_config, additional_fields) = build_inference_settings(config, family);

        Ok(Self {
            bedrock_client: client.to_owned(),
            model_id: model_id.to_owned(),
            family,
            system_prompt,
            inference_config,
            additional_fields,
            config: config.clone(),
            conversation: vec![],
            terminal: TerminalService::new(),
        })
    }

    pub fn family(&self) -> ModelFamily {
        self.family
    }

    /// One text turn: build the user message, send it, print the reply.
    /// Provider errors are reported to the terminal without ending the
    /// session; returns whether a reply was delivered.
    pub async fn chat(
        &mut self,
        prompt: &str,
        context: Option<&str>,
        attachments: &[PathBuf],
        streaming: bool,
    ) -> Result<bool> {
        let message = user_message(prompt, context, attachments)?;
        self.conversation.push(message);

        let result = if streaming {
            self.send_streaming().await
        } else {
            self.send().await
        };
        self.record_reply(result)
    }

    fn record_reply(&mut self, result: Result<String>) -> Result<bool> {
        match result {
            Ok(reply) => {
                let assistant = Message::builder()
                    .role(Assistant)
                    .content(ContentBlock::Text(reply))
                    .build()?;
                self.conversation.push(assistant);
                Ok(true)
            }
            Err(err) => {
                // drop the failed turn so retries start clean
                self.conversation.pop();
                self.terminal.clear_line()?;
                self.terminal.log_error(&err.root_cause().to_string())?;
                Ok(false)
            }
        }
    }

    /// Nova Canvas turn: generate, decode, save under `output_dir`, reveal.
    pub async fn generate_image(&mut self, prompt: &str, output_dir: &Path) -> Result<()> {
        let images = match self.invoke_image_model(prompt).await {
            Ok(images) => images,
            Err(err) => {
                self.terminal.clear_line()?;
                self.terminal.log_error(&err.root_cause().to_string())?;
                return Ok(());
            }
        };

        let saved = match save_images(&images, output_dir) {
            Ok(saved) => saved,
            Err(err) => {
                self.terminal.clear_line()?;
                self.terminal.log_error(&err.root_cause().to_string())?;
                return Ok(());
            }
        };
        self.terminal.clear_line()?;
        for path in &saved {
            self.terminal
                .log_assistant(&format!("Image saved to {}", path.display()))?;
            // best effort reveal
            let _ = open::that_detached(path);
        }
        Ok(())
    }

    /// Nova Reel turn: start the async job; completion is polled separately.
    pub async fn generate_video(
        &mut self,
        prompt: &str,
        s3_uri: &str,
        reference_image: Option<&Path>,
    ) -> Result<VideoJob> {
        let (bucket, prefix) = parse_s3_uri(s3_uri)?;
        let reference = match reference_image {
            Some(path) => Some(reference_image_for_file(path)?),
            None => None,
        };
        let request =
            VideoGenerationRequest::new(prompt, reference, &self.config.nova_reel_params);

        let output_config = AsyncInvokeOutputDataConfig::S3OutputDataConfig(
            AsyncInvokeS3OutputDataConfig::builder()
                .s3_uri(s3_uri)
                .build()?,
        );

        let response = self
            .bedrock_client
            .start_async_invoke()
            .model_id(&self.model_id)
            .model_input(request.to_document()?)
            .output_data_config(output_config)
            .send()
            .await?;

        Ok(VideoJob {
            invocation_arn: response.invocation_arn().to_owned(),
            bucket,
            prefix,
        })
    }

    pub async fn video_status(&self, invocation_arn: &str) -> Result<VideoJobStatus> {
        let response = self
            .bedrock_client
            .get_async_invoke()
            .invocation_arn(invocation_arn)
            .send()
            .await?;

        let status = response.status();
        Ok(VideoJobStatus {
            status: status.as_str().to_owned(),
            completed: *status == AsyncInvokeStatus::Completed,
            failed: *status == AsyncInvokeStatus::Failed,
            error: response.failure_message().map(str::to_owned),
        })
    }
}

// request plumbing
impl BedrockService {
    async fn send(&mut self) -> Result<String> {
        let response = self
            .bedrock_client
            .converse()
            .model_id(&self.model_id)
            .system(self.system_prompt.clone())
            .set_messages(Some(self.conversation.clone()))
            .inference_config(self.inference_config.clone())
            .set_additional_model_request_fields(self.additional_fields.clone())
            .send()
            .await?;

        let output = response.output().context("Error getting output")?;
        let message = match output.as_message() {
            Ok(message) => message,
            Err(_) => {
                bail!("Output is not a message")
            }
        };

        let mut reply = String::new();
        for content in message.content() {
            if let ContentBlock::Text(text_content) = content {
                reply.push_str(text_content);
            }
        }
        self.terminal.clear_line()?;
        self.terminal.log_assistant(&reply)?;
        Ok(reply)
    }

    async fn send_streaming(&mut self) -> Result<String> {
        let response = self
            .bedrock_client
            .converse_stream()
            .model_id(&self.model_id)
            .system(self.system_prompt.clone())
            .set_messages(Some(self.conversation.clone()))
            .inference_config(self.inference_config.clone())
            .set_additional_model_request_fields(self.additional_fields.clone())
            .send()
            .await?;

        self.terminal.clear_line()?;
        self.terminal.log_assistant_header()?;

        let mut stream = response.stream;
        let mut reply = String::new();
        loop {
            let event = match stream.recv().await {
                Ok(Some(event)) => event,
                Ok(None) => break,
                Err(err) => {
                    self.terminal.end_stream()?;
                    return Err(err.into());
                }
            };
            if let StreamEvent::ContentBlockDelta(delta_event) = event {
                if let Some(delta) = delta_event.delta() {
                    if let Ok(text) = delta.as_text() {
                        reply.push_str(text);
                        self.terminal.stream_chunk(text)?;
                    }
                }
            }
        }
        self.terminal.end_stream()?;
        Ok(reply)
    }

    // returns an array of base64 image strings
    async fn invoke_image_model(&mut self, prompt: &str) -> Result<Vec<String>> {
        let request = ImageGenerationRequest::new(prompt, &self.config.nova_canvas_params);
        let body = serde_json::to_string(&request)?;

        let response = self
            .bedrock_client
            .invoke_model()
            .model_id(&self.model_id)
            .content_type("application/json")
            .body(Blob::new(body.as_bytes()))
            .send()
            .await?;

        let body = response.body().clone().into_inner();
        let body_string = str::from_utf8(&body)?;
        let parsed: ImageGenerationResponse = serde_json::from_str(body_string)?;
        Ok(parsed.images)
    }
}

fn build_inference_settings(
    config: &AppConfig,
    family: ModelFamily,
) -> (InferenceConfiguration, Option<Document>) {
    match family {
        ModelFamily::Claude => {
            let params = &config.claude_model_params;
            let inference = InferenceConfiguration::builder()
                .max_tokens(params.max_tokens)
                .temperature(params.temperature)
                .top_p(params.top_p)
                .build();
            let additional = value_to_document(&json!({ "top_k": params.top_k }));
            (inference, Some(additional))
        }
        _ => {
            let params = &config.nova_model_params;
            let inference = InferenceConfiguration::builder()
                .max_tokens(params.max_tokens)
                .temperature(params.temperature)
                .top_p(params.top_p)
                .build();
            // Nova takes topK nested under inferenceConfig
            let additional =
                value_to_document(&json!({ "inferenceConfig": { "topK": params.top_k } }));
            (inference, Some(additional))
        }
    }
}

/// User turn: retrieval context is folded into the text per the prompt
/// template, attachments become image or document blocks.
pub fn user_message(
    prompt: &str,
    context: Option<&str>,
    attachments: &[PathBuf],
) -> Result<Message> {
    let text = match context {
        Some(context) if !context.is_empty() => format!(
            "Answer the following question based on the provided context: \n\n {context} \n\n question: {prompt}"
        ),
        _ => prompt.to_owned(),
    };

    let mut builder = Message::builder().role(User).content(ContentBlock::Text(text));
    for path in attachments {
        builder = builder.content(content_block_for_file(path)?);
    }
    Ok(builder.build()?)
}

fn save_images(images: &[String], output_dir: &Path) -> Result<Vec<PathBuf>> {
    if !output_dir.as_os_str().is_empty() {
        std::fs::create_dir_all(output_dir)
            .with_context(|| format!("failed to create {}", output_dir.display()))?;
    }
    let stamp = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|elapsed| elapsed.as_secs())
        .unwrap_or(0);

    let mut saved = vec![];
    for (index, image_string) in images.iter().enumerate() {
        let bytes = BASE64_STANDARD.decode(image_string)?;
        let image =
            image::load_from_memory(&bytes).context("failed to decode generated image")?;
        let image_path = output_dir.join(format!("generated-{stamp}-{index}.png"));
        image
            .save(&image_path)
            .with_context(|| format!("failed to save {}", image_path.display()))?;
        saved.push(image_path);
    }
    Ok(saved)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn config() -> AppConfig {
        AppConfig::parse(include_str!("../app/config.json")).unwrap()
    }

    #[test]
    fn claude_settings_carry_top_k_at_top_level() {
        let (inference, additional) = build_inference_settings(&config(), ModelFamily::Claude);
        assert_eq!(inference.max_tokens(), Some(2048));
        assert_eq!(inference.temperature(), Some(0.0));
        let expected = value_to_document(&json!({ "top_k": 100 }));
        assert_eq!(additional, Some(expected));
    }

    #[test]
    fn nova_settings_nest_top_k_under_inference_config() {
        let (inference, additional) = build_inference_settings(&config(), ModelFamily::Nova);
        assert_eq!(inference.top_p(), Some(0.9));
        let expected = value_to_document(&json!({ "inferenceConfig": { "topK": 20 } }));
        assert_eq!(additional, Some(expected));
    }

    #[test]
    fn user_message_without_context_is_plain_prompt() {
        let message = user_message("what is an orderset?", None, &[]).unwrap();
        let text = message.content()[0].as_text().unwrap();
        assert_eq!(text, "what is an orderset?");
    }

    #[test]
    fn user_message_with_context_uses_template() {
        let message =
            user_message("what changed?", Some("Document 1: revision notes"), &[]).unwrap();
        let text = message.content()[0].as_text().unwrap();
        assert!(text.contains("based on the provided context"), "{text}");
        assert!(text.contains("Document 1: revision notes"), "{text}");
        assert!(text.ends_with("question: what changed?"), "{text}");
    }

    #[test]
    fn empty_context_is_treated_as_absent() {
        let message = user_message("hello", Some(""), &[]).unwrap();
        let text = message.content()[0].as_text().unwrap();
        assert_eq!(text, "hello");
    }

    fn offline_service() -> BedrockService {
        let conf = aws_sdk_bedrockruntime::config::Config::builder()
            .behavior_version(aws_sdk_bedrockruntime::config::BehaviorVersion::latest())
            .build();
        let client = Client::from_conf(conf);
        BedrockService::new(&client, &config(), "eu.amazon.nova-pro-v1:0").unwrap()
    }

    #[test]
    fn failed_turn_is_dropped_and_not_answered() {
        let mut service = offline_service();
        let message = user_message("hello", None, &[]).unwrap();
        service.conversation.push(message);

        let answered = service
            .record_reply(Err(anyhow::anyhow!("throttled")))
            .unwrap();
        assert!(!answered);
        assert!(service.conversation.is_empty());
    }

    #[test]
    fn successful_turn_records_assistant_reply() {
        let mut service = offline_service();
        let message = user_message("hello", None, &[]).unwrap();
        service.conversation.push(message);

        let answered = service.record_reply(Ok("hi there".to_owned())).unwrap();
        assert!(answered);
        assert_eq!(service.conversation.len(), 2);
        assert_eq!(*service.conversation[1].role(), Assistant);
    }

    #[test]
    fn save_images_reports_bad_payload() {
        let output_dir = std::env::temp_dir().join("bedrock-multimodal-chat-test");
        let err = save_images(&["not base64!!".to_owned()], &output_dir).unwrap_err();
        assert!(!err.to_string().is_empty());
    }
}
