use std::collections::HashMap;
use std::fs;
use std::path::Path;

use anyhow::{bail, Context, Result};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// The exact top-level key set; anything else in the file is rejected.
const TOP_LEVEL_KEYS: [&str; 11] = [
    "page_title",
    "start_message",
    "system_prompt",
    "bedrock_region",
    "claude_model_params",
    "nova_model_params",
    "nova_canvas_params",
    "nova_reel_params",
    "kb_configs",
    "multimodal_llms",
    "regions",
];

/// Application configuration, loaded once from `app/config.json` at startup
/// and immutable afterwards. Missing or malformed keys fail the load with an
/// error naming the key, never fall back to silent defaults.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct AppConfig {
    pub page_title: String,
    pub start_message: String,
    pub system_prompt: String,
    pub bedrock_region: String,
    pub claude_model_params: ClaudeModelParams,
    pub nova_model_params: NovaModelParams,
    pub nova_canvas_params: NovaCanvasParams,
    pub nova_reel_params: NovaReelParams,
    pub kb_configs: KbConfigs,
    pub multimodal_llms: HashMap<String, HashMap<String, String>>,
    pub regions: HashMap<String, String>,
}

/// Tuning knobs for Anthropic models, snake_case as the Claude API expects.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ClaudeModelParams {
    pub max_tokens: i32,
    pub temperature: f32,
    pub top_k: i32,
    pub top_p: f32,
}

/// Tuning knobs for Amazon Nova text models, camelCase as the Nova API expects.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct NovaModelParams {
    pub max_tokens: i32,
    pub temperature: f32,
    pub top_p: f32,
    pub top_k: i32,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct NovaCanvasParams {
    pub width: i32,
    pub height: i32,
    pub quality: ImageQuality,
    pub cfg_scale: f32,
    pub number_of_images: i32,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ImageQuality {
    Standard,
    Premium,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct NovaReelParams {
    pub duration_seconds: i32,
    pub fps: i32,
    pub dimension: String,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct KbConfigs {
    pub vector_search_configuration: VectorSearchConfiguration,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct VectorSearchConfiguration {
    pub number_of_results: i32,
}

/// Which parameter block a model id resolves to. Matching is by model id
/// substring, with Nova text parameters as the fallback family.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ModelFamily {
    Claude,
    Nova,
    NovaCanvas,
    NovaReel,
}

impl ModelFamily {
    pub fn from_model_id(model_id: &str) -> Self {
        if model_id.contains("nova-canvas") {
            Self::NovaCanvas
        } else if model_id.contains("nova-reel") {
            Self::NovaReel
        } else if model_id.contains("anthropic") {
            Self::Claude
        } else {
            Self::Nova
        }
    }
}

impl AppConfig {
    pub fn load(path: &Path) -> Result<Self> {
        let raw = fs::read_to_string(path)
            .with_context(|| format!("failed to read configuration file {}", path.display()))?;
        let config = Self::parse(&raw)
            .with_context(|| format!("invalid configuration in {}", path.display()))?;
        Ok(config)
    }

    pub fn parse(raw: &str) -> Result<Self> {
        let value: Value =
            serde_json::from_str(raw).context("configuration is not valid JSON")?;
        let object = value
            .as_object()
            .context("configuration root must be a JSON object")?;

        for key in object.keys() {
            if !TOP_LEVEL_KEYS.contains(&key.as_str()) {
                bail!("unknown key {key} in configuration");
            }
        }

        let config = Self {
            page_title: section(object, "page_title")?,
            start_message: section(object, "start_message")?,
            system_prompt: section(object, "system_prompt")?,
            bedrock_region: section(object, "bedrock_region")?,
            claude_model_params: section(object, "claude_model_params")?,
            nova_model_params: section(object, "nova_model_params")?,
            nova_canvas_params: section(object, "nova_canvas_params")?,
            nova_reel_params: section(object, "nova_reel_params")?,
            kb_configs: section(object, "kb_configs")?,
            multimodal_llms: section(object, "multimodal_llms")?,
            regions: section(object, "regions")?,
        };
        config.validate()?;
        Ok(config)
    }

    /// Region code for a region display name.
    pub fn region_code(&self, region: &str) -> Result<&str> {
        match self.regions.get(region) {
            Some(code) => Ok(code.as_str()),
            None => bail!(
                "region {region} is not listed under regions (available: {})",
                join_sorted_keys(&self.regions)
            ),
        }
    }

    /// Model table for a region display name.
    pub fn models_for_region(&self, region: &str) -> Result<&HashMap<String, String>> {
        match self.multimodal_llms.get(region) {
            Some(models) => Ok(models),
            None => bail!(
                "region {region} is not listed under multimodal_llms (available: {})",
                join_sorted_keys(&self.multimodal_llms)
            ),
        }
    }

    /// Model id for a (region display name, model display name) pair.
    pub fn model_id(&self, region: &str, model: &str) -> Result<&str> {
        let models = self.models_for_region(region)?;
        match models.get(model) {
            Some(id) => Ok(id.as_str()),
            None => bail!(
                "model {model} is not available in {region} (available: {})",
                join_sorted_keys(models)
            ),
        }
    }

    /// Display name of the default region: the one whose code matches
    /// `bedrock_region`, falling back to the alphabetically first entry.
    pub fn default_region(&self) -> Result<&str> {
        let matching = self
            .regions
            .iter()
            .filter(|(_, code)| *code == &self.bedrock_region)
            .map(|(name, _)| name.as_str())
            .min();
        match matching {
            Some(name) => Ok(name),
            None => self
                .regions
                .keys()
                .map(String::as_str)
                .min()
                .context("regions is empty"),
        }
    }

    /// Alphabetically first model display name available in a region.
    pub fn default_model(&self, region: &str) -> Result<&str> {
        self.models_for_region(region)?
            .keys()
            .map(String::as_str)
            .min()
            .with_context(|| format!("multimodal_llms.{region} is empty"))
    }

    fn validate(&self) -> Result<()> {
        if self.system_prompt.trim().is_empty() {
            bail!("system_prompt must not be empty");
        }
        if self.regions.is_empty() {
            bail!("regions must list at least one region");
        }
        for region in self.regions.keys() {
            if !self.multimodal_llms.contains_key(region) {
                bail!("region {region} listed under regions has no entry under multimodal_llms");
            }
        }

        let claude = &self.claude_model_params;
        check_tokens("claude_model_params.max_tokens", claude.max_tokens)?;
        check_unit_interval("claude_model_params.temperature", claude.temperature)?;
        check_unit_interval("claude_model_params.top_p", claude.top_p)?;
        check_non_negative("claude_model_params.top_k", claude.top_k)?;

        let nova = &self.nova_model_params;
        check_tokens("nova_model_params.maxTokens", nova.max_tokens)?;
        check_unit_interval("nova_model_params.temperature", nova.temperature)?;
        check_unit_interval("nova_model_params.topP", nova.top_p)?;
        check_non_negative("nova_model_params.topK", nova.top_k)?;

        let canvas = &self.nova_canvas_params;
        check_dimension("nova_canvas_params.width", canvas.width)?;
        check_dimension("nova_canvas_params.height", canvas.height)?;
        if !(1.1..=10.0).contains(&canvas.cfg_scale) {
            bail!(
                "nova_canvas_params.cfgScale must be within 1.1..=10.0, got {}",
                canvas.cfg_scale
            );
        }
        if !(1..=5).contains(&canvas.number_of_images) {
            bail!(
                "nova_canvas_params.numberOfImages must be within 1..=5, got {}",
                canvas.number_of_images
            );
        }

        let reel = &self.nova_reel_params;
        if reel.fps != 24 {
            bail!("nova_reel_params.fps must be 24, got {}", reel.fps);
        }
        if reel.duration_seconds != 6 {
            bail!(
                "nova_reel_params.durationSeconds must be 6, got {}",
                reel.duration_seconds
            );
        }
        if reel.dimension != "1280x720" {
            bail!(
                "nova_reel_params.dimension must be 1280x720, got {}",
                reel.dimension
            );
        }

        let results = self.kb_configs.vector_search_configuration.number_of_results;
        if !(1..=100).contains(&results) {
            bail!(
                "kb_configs.vectorSearchConfiguration.numberOfResults must be within 1..=100, got {results}"
            );
        }

        Ok(())
    }
}

fn section<T: DeserializeOwned>(object: &Map<String, Value>, key: &str) -> Result<T> {
    let value = object
        .get(key)
        .with_context(|| format!("missing required key {key}"))?;
    serde_json::from_value(value.clone()).with_context(|| format!("invalid value for key {key}"))
}

fn check_tokens(key: &str, value: i32) -> Result<()> {
    if value <= 0 {
        bail!("{key} must be positive, got {value}");
    }
    Ok(())
}

fn check_unit_interval(key: &str, value: f32) -> Result<()> {
    if !(0.0..=1.0).contains(&value) {
        bail!("{key} must be within 0.0..=1.0, got {value}");
    }
    Ok(())
}

fn check_non_negative(key: &str, value: i32) -> Result<()> {
    if value < 0 {
        bail!("{key} must not be negative, got {value}");
    }
    Ok(())
}

fn check_dimension(key: &str, value: i32) -> Result<()> {
    if !(320..=4096).contains(&value) {
        bail!("{key} must be within 320..=4096 pixels, got {value}");
    }
    Ok(())
}

fn join_sorted_keys<V>(map: &HashMap<String, V>) -> String {
    let mut keys: Vec<&str> = map.keys().map(String::as_str).collect();
    keys.sort_unstable();
    keys.join(", ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::{json, Value};

    fn sample() -> Value {
        json!({
            "page_title": "Orderset Assistant",
            "start_message": "Hello!",
            "system_prompt": "You are a clinical informatics assistant.",
            "bedrock_region": "eu-central-1",
            "claude_model_params": {
                "max_tokens": 2048, "temperature": 0.0, "top_k": 100, "top_p": 0.9
            },
            "nova_model_params": {
                "maxTokens": 2048, "temperature": 0.3, "topP": 0.9, "topK": 20
            },
            "nova_canvas_params": {
                "width": 1280, "height": 720, "quality": "standard",
                "cfgScale": 7.0, "numberOfImages": 1
            },
            "nova_reel_params": {
                "durationSeconds": 6, "fps": 24, "dimension": "1280x720"
            },
            "kb_configs": {
                "vectorSearchConfiguration": { "numberOfResults": 5 }
            },
            "multimodal_llms": {
                "Frankfurt": {
                    "Claude 3.5 Sonnet": "eu.anthropic.claude-3-5-sonnet-20240620-v1:0",
                    "Nova Pro": "eu.amazon.nova-pro-v1:0"
                },
                "N. Virginia": {
                    "Nova Canvas": "amazon.nova-canvas-v1:0",
                    "Nova Reel": "amazon.nova-reel-v1:0"
                }
            },
            "regions": {
                "Frankfurt": "eu-central-1",
                "N. Virginia": "us-east-1"
            }
        })
    }

    fn parse(value: Value) -> Result<AppConfig> {
        AppConfig::parse(&value.to_string())
    }

    #[test]
    fn parses_sample_config() {
        let config = parse(sample()).unwrap();
        assert_eq!(config.page_title, "Orderset Assistant");
        assert_eq!(config.claude_model_params.top_k, 100);
        assert_eq!(config.nova_model_params.max_tokens, 2048);
        assert_eq!(config.nova_canvas_params.quality, ImageQuality::Standard);
        assert_eq!(
            config.kb_configs.vector_search_configuration.number_of_results,
            5
        );
    }

    #[test]
    fn shipped_config_file_is_valid() {
        let raw = include_str!("../app/config.json");
        AppConfig::parse(raw).unwrap();
    }

    #[test]
    fn missing_required_key_fails_with_key_name() {
        let mut value = sample();
        value.as_object_mut().unwrap().remove("system_prompt");
        let err = parse(value).unwrap_err();
        assert!(err.to_string().contains("system_prompt"), "{err}");
    }

    #[test]
    fn unknown_top_level_key_is_rejected() {
        let mut value = sample();
        value
            .as_object_mut()
            .unwrap()
            .insert("surprise".to_owned(), json!(1));
        let err = parse(value).unwrap_err();
        assert!(err.to_string().contains("surprise"), "{err}");
    }

    #[test]
    fn wrong_shape_fails_naming_key() {
        let mut value = sample();
        value["claude_model_params"] = json!("not an object");
        let err = parse(value).unwrap_err();
        assert!(err.to_string().contains("claude_model_params"), "{err}");
    }

    #[test]
    fn wrong_type_inside_section_names_section_key() {
        let mut value = sample();
        value["claude_model_params"]["max_tokens"] = json!("lots");
        let err = parse(value).unwrap_err();
        assert!(err.to_string().contains("claude_model_params"), "{err}");
    }

    #[test]
    fn temperature_out_of_range_fails() {
        let mut value = sample();
        value["nova_model_params"]["temperature"] = json!(1.5);
        let err = parse(value).unwrap_err();
        assert!(err.to_string().contains("temperature"), "{err}");
    }

    #[test]
    fn cfg_scale_out_of_range_fails() {
        let mut value = sample();
        value["nova_canvas_params"]["cfgScale"] = json!(11.0);
        let err = parse(value).unwrap_err();
        assert!(err.to_string().contains("cfgScale"), "{err}");
    }

    #[test]
    fn reel_fps_other_than_24_fails() {
        let mut value = sample();
        value["nova_reel_params"]["fps"] = json!(30);
        let err = parse(value).unwrap_err();
        assert!(err.to_string().contains("fps"), "{err}");
    }

    #[test]
    fn region_without_model_table_fails() {
        let mut value = sample();
        value["regions"]
            .as_object_mut()
            .unwrap()
            .insert("Tokyo".to_owned(), json!("ap-northeast-1"));
        let err = parse(value).unwrap_err();
        assert!(err.to_string().contains("Tokyo"), "{err}");
    }

    #[test]
    fn round_trip_is_identical() {
        let config = parse(sample()).unwrap();
        let serialized = serde_json::to_string(&config).unwrap();
        let reloaded = AppConfig::parse(&serialized).unwrap();
        assert_eq!(config, reloaded);
    }

    #[test]
    fn model_lookup_and_errors() {
        let config = parse(sample()).unwrap();
        assert_eq!(config.region_code("Frankfurt").unwrap(), "eu-central-1");
        assert_eq!(
            config.model_id("N. Virginia", "Nova Canvas").unwrap(),
            "amazon.nova-canvas-v1:0"
        );
        assert!(config.region_code("Oregon").is_err());
        assert!(config.model_id("Frankfurt", "Nova Canvas").is_err());
    }

    #[test]
    fn default_region_matches_bedrock_region() {
        let config = parse(sample()).unwrap();
        assert_eq!(config.default_region().unwrap(), "Frankfurt");
        assert_eq!(config.default_model("Frankfurt").unwrap(), "Claude 3.5 Sonnet");
    }

    #[test]
    fn model_family_dispatch() {
        assert_eq!(
            ModelFamily::from_model_id("amazon.nova-canvas-v1:0"),
            ModelFamily::NovaCanvas
        );
        assert_eq!(
            ModelFamily::from_model_id("amazon.nova-reel-v1:0"),
            ModelFamily::NovaReel
        );
        assert_eq!(
            ModelFamily::from_model_id("eu.anthropic.claude-3-5-sonnet-20240620-v1:0"),
            ModelFamily::Claude
        );
        assert_eq!(
            ModelFamily::from_model_id("eu.amazon.nova-pro-v1:0"),
            ModelFamily::Nova
        );
        assert_eq!(
            ModelFamily::from_model_id("mistral.mistral-large-2402-v1:0"),
            ModelFamily::Nova
        );
    }

    #[test]
    fn load_reports_missing_file() {
        let err = AppConfig::load(Path::new("/nonexistent/config.json")).unwrap_err();
        assert!(err.to_string().contains("/nonexistent/config.json"), "{err}");
    }
}
