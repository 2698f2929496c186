pub mod attachment;
pub mod bedrock_service;
pub mod config;
pub mod kb_service;
pub mod request_types;
pub mod storage_service;
pub mod terminal_service;

use std::env;
use std::io::{stdout, Stdout};
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{bail, Context, Result};
use aws_config::meta::region::RegionProviderChain;
use aws_config::Region;
use clap::{Arg, ArgAction, Command};
use crossterm::event::{self, Event, KeyCode, KeyModifiers};
use crossterm::terminal::Clear;
use crossterm::{terminal, ExecutableCommand};

use bedrock_service::BedrockService;
use config::{AppConfig, ModelFamily};
use kb_service::KbService;
use terminal_service::TerminalService;

const REGION_KEY: &str = "BEDROCK_REGION";
const DEFAULT_CONFIG_PATH: &str = "app/config.json";

const VIDEO_POLL_INTERVAL: Duration = Duration::from_secs(10);
const VIDEO_POLL_ATTEMPTS: u32 = 36;

const FINISH: &str = "
================================================================================
Thank you for checking out!
================================================================================
";

fn command() -> Command {
    Command::new("bedrock_multimodal_chat")
        .about("A multimodal AI chat assistant powered by AWS Bedrock")
        .arg(
            Arg::new("config")
                .long("config")
                .value_name("PATH")
                .default_value(DEFAULT_CONFIG_PATH)
                .help("Path to the configuration file"),
        )
        .arg(
            Arg::new("region")
                .long("region")
                .value_name("NAME")
                .help("Region display name from the configuration's regions table"),
        )
        .arg(
            Arg::new("model")
                .long("model")
                .value_name("NAME")
                .help("Model display name from the configuration's model table"),
        )
        .arg(
            Arg::new("kb")
                .long("kb")
                .value_name("NAME")
                .help("Knowledge base name to retrieve context from"),
        )
        .arg(
            Arg::new("no-stream")
                .long("no-stream")
                .action(ArgAction::SetTrue)
                .help("Wait for complete responses instead of streaming"),
        )
        .arg(
            Arg::new("s3-output")
                .long("s3-output")
                .value_name("S3_URI")
                .help("s3:// location for generated videos (required for Nova Reel)"),
        )
        .arg(
            Arg::new("file")
                .long("file")
                .value_name("PATH")
                .action(ArgAction::Append)
                .help("Attach a local file to each prompt (repeatable)"),
        )
        .arg(
            Arg::new("output-dir")
                .long("output-dir")
                .value_name("DIR")
                .default_value(".")
                .help("Directory for generated images"),
        )
}

#[derive(Debug)]
struct SessionOptions {
    streaming: bool,
    s3_uri: Option<String>,
    attachments: Vec<PathBuf>,
    output_dir: PathBuf,
}

#[tokio::main]
async fn main() -> Result<()> {
    let matches = command().get_matches();

    let config_path = matches
        .get_one::<String>("config")
        .map(String::as_str)
        .unwrap_or(DEFAULT_CONFIG_PATH);
    let configs = AppConfig::load(Path::new(config_path))?;

    let region_name = match matches.get_one::<String>("region") {
        Some(region) => region.as_str(),
        None => configs.default_region()?,
    };
    let model_name = match matches.get_one::<String>("model") {
        Some(model) => model.as_str(),
        None => configs.default_model(region_name)?,
    };
    let model_id = configs.model_id(region_name, model_name)?.to_owned();
    let family = ModelFamily::from_model_id(&model_id);

    let options = SessionOptions {
        // image and video models have no streaming API
        streaming: !matches.get_flag("no-stream")
            && !matches!(family, ModelFamily::NovaCanvas | ModelFamily::NovaReel),
        s3_uri: matches.get_one::<String>("s3-output").cloned(),
        attachments: matches
            .get_many::<String>("file")
            .unwrap_or_default()
            .map(PathBuf::from)
            .collect(),
        output_dir: matches
            .get_one::<String>("output-dir")
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from(".")),
    };

    ensure_video_output(family, &options)?;

    let region_code = env::var(REGION_KEY).unwrap_or(configs.region_code(region_name)?.to_owned());
    let region_provider =
        RegionProviderChain::first_try(Region::new(region_code)).or_default_provider();
    let aws_config = aws_config::from_env().region(region_provider).load().await;

    let runtime_client = aws_sdk_bedrockruntime::Client::new(&aws_config);
    let agent_runtime_client = aws_sdk_bedrockagentruntime::Client::new(&aws_config);
    let s3_client = aws_sdk_s3::Client::new(&aws_config);

    // image and video models take no retrieval context
    let kb_id = match matches.get_one::<String>("kb") {
        Some(kb_name) if family == ModelFamily::Claude || family == ModelFamily::Nova => {
            let agent_client = aws_sdk_bedrockagent::Client::new(&aws_config);
            let all_kbs = kb_service::list_knowledge_bases(&agent_client).await?;
            match all_kbs.get(kb_name) {
                Some(kb_id) => Some(kb_id.to_owned()),
                None => {
                    let mut names: Vec<&str> = all_kbs.keys().map(String::as_str).collect();
                    names.sort_unstable();
                    bail!(
                        "knowledge base {kb_name} not found in {region_name} (available: {})",
                        names.join(", ")
                    );
                }
            }
        }
        _ => None,
    };

    let mut bedrock_service = BedrockService::new(&runtime_client, &configs, &model_id)?;
    let kb_service = KbService::new(&agent_runtime_client, &configs.kb_configs, kb_id);

    let mut terminal_service = TerminalService::new();
    let mut stdout: Stdout = stdout();

    terminal_service.log_info(&introduction(&configs, region_name, model_name))?;
    terminal::enable_raw_mode()?;
    terminal_service.log_info("You:\r")?;

    let mut user_input: String = String::new();
    let mut empty_input: bool = false;

    'chat: loop {
        let event = event::read()?;

        if let Event::Key(key_event) = event {
            // terminate
            if key_event.code == KeyCode::Esc
                || (key_event.code == KeyCode::Char('c')
                    && key_event.modifiers == KeyModifiers::CONTROL)
            {
                break 'chat;
            }

            match key_event.code {
                KeyCode::Char(c) => {
                    if empty_input {
                        empty_input = false;
                        stdout.execute(Clear(terminal::ClearType::CurrentLine))?;
                        terminal_service.log_info("\rYou:\r")?;
                    }
                    terminal_service.log_user_inline(&c)?;
                    user_input.push(c);
                }
                KeyCode::Enter => {
                    if user_input.is_empty() {
                        empty_input = true;
                        terminal_service.clear_line()?;
                        terminal_service.log_info_inline("\rEnter something!\r")?;
                        continue;
                    }

                    terminal_service.log_info_inline("\n\r..... Please wait!\r")?;
                    terminal::disable_raw_mode()?;
                    handle_prompt(
                        &mut bedrock_service,
                        &kb_service,
                        &s3_client,
                        &mut terminal_service,
                        &user_input,
                        &options,
                    )
                    .await?;
                    terminal::enable_raw_mode()?;
                    terminal_service.log_info("\rYou:\r")?;
                    user_input = String::from("");
                }
                KeyCode::Backspace | KeyCode::Delete => {
                    terminal_service.delete_char()?;
                    user_input.pop();
                }
                KeyCode::Esc => {
                    break 'chat;
                }
                _ => {}
            }
        }
    }

    terminal::disable_raw_mode()?;
    terminal_service.log_info(FINISH)?;
    Ok(())
}

fn ensure_video_output(family: ModelFamily, options: &SessionOptions) -> Result<()> {
    if family == ModelFamily::NovaReel && options.s3_uri.is_none() {
        bail!("please provide an --s3-output location for video generation");
    }
    Ok(())
}

fn introduction(configs: &AppConfig, region_name: &str, model_name: &str) -> String {
    format!(
        "
================================================================================
{}
================================================================================
{}

Region: {region_name}
Model: {model_name}

To exit the program, simply type `ESC` or `Ctrl+C`.

P.S.: You have to log in to AWS and have the model enabled to use the app!\r
",
        configs.page_title, configs.start_message
    )
}

async fn handle_prompt(
    bedrock_service: &mut BedrockService,
    kb_service: &KbService,
    s3_client: &aws_sdk_s3::Client,
    terminal_service: &mut TerminalService,
    prompt: &str,
    options: &SessionOptions,
) -> Result<()> {
    match bedrock_service.family() {
        ModelFamily::NovaCanvas => {
            bedrock_service
                .generate_image(prompt, &options.output_dir)
                .await?;
        }
        ModelFamily::NovaReel => {
            // checked before the chat loop starts
            let s3_uri = options
                .s3_uri
                .as_deref()
                .context("missing --s3-output location for video generation")?;
            let reference_image = options
                .attachments
                .iter()
                .find(|path| {
                    matches!(
                        path.extension().and_then(|extension| extension.to_str()),
                        Some("png" | "jpeg" | "jpg")
                    )
                })
                .map(PathBuf::as_path);
            run_video_job(
                bedrock_service,
                s3_client,
                terminal_service,
                prompt,
                s3_uri,
                reference_image,
            )
            .await?;
        }
        _ => {
            let docs = match kb_service.get_relevant_docs(prompt).await {
                Ok(docs) => docs,
                Err(err) => {
                    terminal_service.log_error(&err.root_cause().to_string())?;
                    vec![]
                }
            };
            let context = if docs.is_empty() {
                None
            } else {
                Some(kb_service::docs_to_context(&docs))
            };
            let answered = bedrock_service
                .chat(
                    prompt,
                    context.as_deref(),
                    &options.attachments,
                    options.streaming,
                )
                .await?;
            if answered {
                terminal_service.log_sources(&docs)?;
            }
        }
    }
    Ok(())
}

async fn run_video_job(
    bedrock_service: &mut BedrockService,
    s3_client: &aws_sdk_s3::Client,
    terminal_service: &mut TerminalService,
    prompt: &str,
    s3_uri: &str,
    reference_image: Option<&Path>,
) -> Result<()> {
    terminal_service.log_info("Starting video generation. This may take a few minutes...\r")?;
    let job = match bedrock_service
        .generate_video(prompt, s3_uri, reference_image)
        .await
    {
        Ok(job) => job,
        Err(err) => {
            terminal_service.log_error(&err.root_cause().to_string())?;
            return Ok(());
        }
    };

    for _ in 0..VIDEO_POLL_ATTEMPTS {
        let status = match bedrock_service.video_status(&job.invocation_arn).await {
            Ok(status) => status,
            Err(err) => {
                terminal_service.log_error(&err.root_cause().to_string())?;
                return Ok(());
            }
        };

        if status.completed {
            let key = match storage_service::find_video_object(s3_client, &job.bucket, &job.prefix)
                .await
            {
                Ok(key) => key,
                Err(err) => {
                    terminal_service.log_error(&err.root_cause().to_string())?;
                    return Ok(());
                }
            };
            if let Some(key) = key {
                terminal_service.log_assistant(&format!(
                    "Video generation completed! Video available at: s3://{}/{}",
                    job.bucket, key
                ))?;
                return Ok(());
            }
            terminal_service
                .log_info("Video processing... Waiting for the S3 upload to complete...\r")?;
        } else if status.failed {
            let reason = status.error.unwrap_or_else(|| "unknown error".to_owned());
            terminal_service.log_error(&format!("Video generation failed: {reason}"))?;
            return Ok(());
        } else {
            terminal_service.log_info(&format!(
                "Generating video... This can take up to 5 minutes. Status: {}\r",
                status.status
            ))?;
        }

        tokio::time::sleep(VIDEO_POLL_INTERVAL).await;
    }

    terminal_service.log_error("Timed out waiting for the video generation job")?;
    Ok(())
}
