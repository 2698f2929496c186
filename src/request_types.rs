use std::collections::HashMap;

use anyhow::Result;
use aws_smithy_types::{Document, Number};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::config::{ImageQuality, NovaCanvasParams, NovaReelParams};

/// InvokeModel request body for Nova Canvas.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImageGenerationRequest {
    pub task_type: ImageTaskType,
    pub text_to_image_params: TextToImageParams,
    pub image_generation_config: ImageGenerationConfig,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ImageTaskType {
    TextImage,
    Inpainting,
    Outpainting,
    ImageVariation,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TextToImageParams {
    pub text: String,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImageGenerationConfig {
    pub width: i32,
    pub height: i32,
    pub quality: ImageQuality,
    pub cfg_scale: f32,
    pub number_of_images: i32,
}

impl ImageGenerationRequest {
    pub fn new(prompt: &str, params: &NovaCanvasParams) -> Self {
        Self {
            task_type: ImageTaskType::TextImage,
            text_to_image_params: TextToImageParams {
                text: prompt.to_owned(),
            },
            image_generation_config: ImageGenerationConfig {
                width: params.width,
                height: params.height,
                quality: params.quality,
                cfg_scale: params.cfg_scale,
                number_of_images: params.number_of_images,
            },
        }
    }
}

/// InvokeModel response body for Nova Canvas: one base64 string per image.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImageGenerationResponse {
    pub images: Vec<String>,
}

/// StartAsyncInvoke model input for Nova Reel.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VideoGenerationRequest {
    pub task_type: VideoTaskType,
    pub text_to_video_params: TextToVideoParams,
    pub video_generation_config: VideoGenerationConfig,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum VideoTaskType {
    TextVideo,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TextToVideoParams {
    pub text: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub images: Option<Vec<ReferenceImage>>,
}

/// Optional base64-encoded reference image steering the video.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReferenceImage {
    pub format: String,
    pub source: ReferenceImageSource,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReferenceImageSource {
    pub bytes: String,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VideoGenerationConfig {
    pub duration_seconds: i32,
    pub fps: i32,
    pub dimension: String,
}

impl VideoGenerationRequest {
    pub fn new(
        prompt: &str,
        reference_image: Option<ReferenceImage>,
        params: &NovaReelParams,
    ) -> Self {
        Self {
            task_type: VideoTaskType::TextVideo,
            text_to_video_params: TextToVideoParams {
                text: prompt.to_owned(),
                images: reference_image.map(|image| vec![image]),
            },
            video_generation_config: VideoGenerationConfig {
                duration_seconds: params.duration_seconds,
                fps: params.fps,
                dimension: params.dimension.clone(),
            },
        }
    }

    /// StartAsyncInvoke takes its model input as a smithy `Document`.
    pub fn to_document(&self) -> Result<Document> {
        let value = serde_json::to_value(self)?;
        Ok(value_to_document(&value))
    }
}

pub fn value_to_document(value: &Value) -> Document {
    match value {
        Value::Null => Document::Null,
        Value::Bool(flag) => Document::Bool(*flag),
        Value::Number(number) => {
            if let Some(unsigned) = number.as_u64() {
                Document::Number(Number::PosInt(unsigned))
            } else if let Some(signed) = number.as_i64() {
                Document::Number(Number::NegInt(signed))
            } else {
                Document::Number(Number::Float(number.as_f64().unwrap_or(0.0)))
            }
        }
        Value::String(text) => Document::String(text.to_owned()),
        Value::Array(items) => Document::Array(items.iter().map(value_to_document).collect()),
        Value::Object(entries) => Document::Object(
            entries
                .iter()
                .map(|(key, item)| (key.to_owned(), value_to_document(item)))
                .collect::<HashMap<String, Document>>(),
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn canvas_params() -> NovaCanvasParams {
        NovaCanvasParams {
            width: 1280,
            height: 720,
            quality: ImageQuality::Standard,
            cfg_scale: 7.0,
            number_of_images: 1,
        }
    }

    fn reel_params() -> NovaReelParams {
        NovaReelParams {
            duration_seconds: 6,
            fps: 24,
            dimension: "1280x720".to_owned(),
        }
    }

    #[test]
    fn image_request_matches_canvas_wire_format() {
        let request = ImageGenerationRequest::new("a hospital ward", &canvas_params());
        let value = serde_json::to_value(&request).unwrap();
        assert_eq!(
            value,
            json!({
                "taskType": "TEXT_IMAGE",
                "textToImageParams": { "text": "a hospital ward" },
                "imageGenerationConfig": {
                    "width": 1280,
                    "height": 720,
                    "quality": "standard",
                    "cfgScale": 7.0,
                    "numberOfImages": 1
                }
            })
        );
    }

    #[test]
    fn video_request_matches_reel_wire_format() {
        let request = VideoGenerationRequest::new("waves at sunset", None, &reel_params());
        let value = serde_json::to_value(&request).unwrap();
        assert_eq!(
            value,
            json!({
                "taskType": "TEXT_VIDEO",
                "textToVideoParams": { "text": "waves at sunset" },
                "videoGenerationConfig": {
                    "durationSeconds": 6,
                    "fps": 24,
                    "dimension": "1280x720"
                }
            })
        );
    }

    #[test]
    fn video_request_includes_reference_image() {
        let image = ReferenceImage {
            format: "png".to_owned(),
            source: ReferenceImageSource {
                bytes: "aGVsbG8=".to_owned(),
            },
        };
        let request = VideoGenerationRequest::new("waves", Some(image), &reel_params());
        let value = serde_json::to_value(&request).unwrap();
        assert_eq!(
            value["textToVideoParams"]["images"],
            json!([{ "format": "png", "source": { "bytes": "aGVsbG8=" } }])
        );
    }

    #[test]
    fn value_to_document_covers_all_shapes() {
        let document = value_to_document(&json!({
            "text": "hi",
            "count": 3,
            "offset": -2,
            "scale": 7.5,
            "flag": true,
            "nothing": null,
            "items": [1, "two"]
        }));
        let object = match document {
            Document::Object(object) => object,
            other => panic!("expected object, got {other:?}"),
        };
        assert_eq!(object.get("text"), Some(&Document::String("hi".to_owned())));
        assert_eq!(object.get("count"), Some(&Document::Number(Number::PosInt(3))));
        assert_eq!(object.get("offset"), Some(&Document::Number(Number::NegInt(-2))));
        assert_eq!(object.get("scale"), Some(&Document::Number(Number::Float(7.5))));
        assert_eq!(object.get("flag"), Some(&Document::Bool(true)));
        assert_eq!(object.get("nothing"), Some(&Document::Null));
        assert_eq!(
            object.get("items"),
            Some(&Document::Array(vec![
                Document::Number(Number::PosInt(1)),
                Document::String("two".to_owned())
            ]))
        );
    }

    #[test]
    fn image_response_parses() {
        let response: ImageGenerationResponse =
            serde_json::from_value(json!({ "images": ["abc", "def"] })).unwrap();
        assert_eq!(response.images.len(), 2);
    }
}
