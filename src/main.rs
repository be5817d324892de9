use anyhow::Result;
use clap::{Arg, ArgAction, Command};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;

mod api;
mod captions;
mod config;
mod engine;
mod formats;
mod render;
mod storage;
mod transcription;

use crate::config::Config;
use crate::engine::FfmpegEngine;
use crate::formats::{FormatName, VideoFormat};
use crate::render::LocalRenderer;
use crate::transcription::{validate_segments, ReplicateClient, TranscriptSegment};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter("clipcast=info,warn")
        .init();

    let matches = Command::new("clipcast")
        .version(env!("CARGO_PKG_VERSION"))
        .about("Captioned clip video generation: transcription, caption overlays, rendering")
        .subcommand(
            Command::new("serve")
                .about("Start the HTTP API server")
                .arg(
                    Arg::new("port")
                        .short('p')
                        .long("port")
                        .value_name("PORT")
                        .help("Port to listen on"),
                ),
        )
        .subcommand(
            Command::new("transcribe")
                .about("Transcribe an audio file and print the segments as JSON")
                .arg(
                    Arg::new("audio")
                        .short('a')
                        .long("audio")
                        .value_name("FILE")
                        .help("Audio file to transcribe")
                        .required(true),
                ),
        )
        .subcommand(
            Command::new("render")
                .about("Render a captioned video locally")
                .arg(
                    Arg::new("audio")
                        .short('a')
                        .long("audio")
                        .value_name("FILE")
                        .help("Audio file for the clip")
                        .required(true),
                )
                .arg(
                    Arg::new("transcript")
                        .short('t')
                        .long("transcript")
                        .value_name("FILE")
                        .help("Transcript segments as a JSON array of {start, end, text}")
                        .required(true),
                )
                .arg(
                    Arg::new("format")
                        .short('f')
                        .long("format")
                        .value_name("NAME")
                        .help("Output format: landscape, portrait, square, or tiktok")
                        .default_value("landscape"),
                )
                .arg(
                    Arg::new("output")
                        .short('o')
                        .long("output")
                        .value_name("FILE")
                        .help("Output MP4 path")
                        .default_value("output.mp4"),
                )
                .arg(
                    Arg::new("quiet")
                        .short('q')
                        .long("quiet")
                        .help("Suppress encode progress output")
                        .action(ArgAction::SetTrue),
                ),
        )
        .subcommand_required(true)
        .get_matches();

    let config = Config::load()?;
    config.validate()?;

    match matches.subcommand() {
        Some(("serve", sub_matches)) => {
            let mut config = config;
            if let Some(port) = sub_matches.get_one::<String>("port") {
                config.server.port = port.parse()?;
            }
            info!("{}", config.summary());
            api::start_http_server(Arc::new(config)).await
        }
        Some(("transcribe", sub_matches)) => {
            let audio_path = PathBuf::from(sub_matches.get_one::<String>("audio").unwrap());
            run_transcribe(&config, &audio_path).await
        }
        Some(("render", sub_matches)) => {
            let audio_path = PathBuf::from(sub_matches.get_one::<String>("audio").unwrap());
            let transcript_path =
                PathBuf::from(sub_matches.get_one::<String>("transcript").unwrap());
            let format: FormatName = sub_matches.get_one::<String>("format").unwrap().parse()?;
            let output_path = PathBuf::from(sub_matches.get_one::<String>("output").unwrap());
            let quiet = sub_matches.get_flag("quiet");
            run_render(
                &config,
                &audio_path,
                &transcript_path,
                format,
                &output_path,
                quiet,
            )
            .await
        }
        _ => unreachable!("subcommand is required"),
    }
}

async fn run_transcribe(config: &Config, audio_path: &PathBuf) -> Result<()> {
    info!("🎤 Transcribing {}", audio_path.display());

    let audio = tokio::fs::read(audio_path).await?;
    let mime_type = mime_for_extension(audio_path);

    let client = ReplicateClient::new(config.transcription.clone())?;
    let segments = client.transcribe(&audio, mime_type).await?;

    info!("✅ {} segments", segments.len());
    println!("{}", serde_json::to_string_pretty(&segments)?);
    Ok(())
}

async fn run_render(
    config: &Config,
    audio_path: &PathBuf,
    transcript_path: &PathBuf,
    format: FormatName,
    output_path: &PathBuf,
    quiet: bool,
) -> Result<()> {
    let audio = tokio::fs::read(audio_path).await?;
    let transcript = tokio::fs::read_to_string(transcript_path).await?;
    let segments: Vec<TranscriptSegment> = serde_json::from_str(&transcript)?;
    validate_segments(&segments).map_err(|e| anyhow::anyhow!(e))?;

    let duration = engine::probe_duration(&config.render.ffprobe_path, audio_path).await?;
    info!("📊 Audio duration: {:.2}s", duration);

    let renderer = LocalRenderer::new(
        Box::new(FfmpegEngine::new(&config.render)),
        &config.render,
    );

    let progress: Option<crate::engine::ProgressFn> = if quiet {
        None
    } else {
        Some(Box::new(|percent| {
            info!("🎞️  Encoding: {}%", percent);
        }))
    };

    let video = renderer
        .render(
            &audio,
            &segments,
            VideoFormat::by_name(format),
            duration,
            progress,
        )
        .await?;
    renderer.dispose().await?;

    tokio::fs::write(output_path, &video).await?;
    info!(
        "🎉 Wrote {} ({} bytes)",
        output_path.display(),
        video.len()
    );
    Ok(())
}

/// MIME type from the audio file extension
fn mime_for_extension(path: &PathBuf) -> &'static str {
    match path
        .extension()
        .and_then(|ext| ext.to_str())
        .map(str::to_ascii_lowercase)
        .as_deref()
    {
        Some("wav") => "audio/wav",
        Some("m4a") | Some("mp4") => "audio/mp4",
        Some("ogg") => "audio/ogg",
        Some("flac") => "audio/flac",
        _ => "audio/mpeg",
    }
}
