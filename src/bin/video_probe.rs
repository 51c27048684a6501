// video_probe - command-line front end
// Probes and transcodes video files through the system ffmpeg/ffprobe binaries

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use video_probe::{
    is_installed, EncodeOptions, MediaInfo, ProbeMode, RawInfo, ToolConfig, Toolchain, Video,
    DEFAULT_SCREENSHOT_OFFSET, DEFAULT_THUMBNAIL_BOUND,
};

#[derive(Parser)]
#[command(name = "video_probe", version, about = "Probe and transcode video files through ffmpeg")]
struct Args {
    /// ffmpeg binary
    #[arg(long, global = true, default_value = "ffmpeg")]
    ffmpeg: PathBuf,

    /// ffprobe binary
    #[arg(long, global = true, default_value = "ffprobe")]
    ffprobe: PathBuf,

    /// Kill any tool invocation running longer than this
    #[arg(long, global = true)]
    timeout_secs: Option<u64>,

    /// Scrape the `ffmpeg -i` banner instead of asking ffprobe for JSON
    #[arg(long, global = true)]
    diagnostic: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Print metadata for one or more files as JSON
    Info {
        #[arg(required = true)]
        files: Vec<PathBuf>,
    },

    /// Re-encode with explicit codecs; arguments after `--` go to ffmpeg as-is
    Encode {
        input: PathBuf,

        /// Output container extension
        #[arg(long)]
        extension: String,

        #[arg(long)]
        video_codec: String,

        #[arg(long)]
        audio_codec: String,

        /// Enable experimental codecs (`-strict experimental`)
        #[arg(long)]
        strict: bool,

        /// Reuse-able output directory instead of a temp file
        #[arg(long)]
        persist: Option<PathBuf>,

        #[arg(last = true)]
        extra: Vec<String>,
    },

    /// Re-encode into a known container format with its default codecs
    Convert {
        input: PathBuf,

        format: String,

        #[arg(long)]
        persist: Option<PathBuf>,
    },

    /// Grab a single frame; negative offsets count back from the end
    Screenshot {
        input: PathBuf,

        #[arg(long, default_value_t = DEFAULT_SCREENSHOT_OFFSET, allow_hyphen_values = true)]
        offset: f64,

        /// Write the image here; otherwise the temp file is kept and its path printed
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Write a JPEG thumbnail bounded to SIZE x SIZE
    Thumbnail {
        input: PathBuf,

        #[arg(long, default_value_t = DEFAULT_THUMBNAIL_BOUND)]
        size: u32,

        #[arg(short, long)]
        output: PathBuf,
    },
}

#[derive(Serialize)]
struct InfoReport {
    path: PathBuf,
    source_type: String,
    #[serde(flatten)]
    info: MediaInfo,
    #[serde(skip_serializing_if = "Option::is_none")]
    raw_info: Option<RawInfo>,
}

impl InfoReport {
    fn new(video: &Video) -> Self {
        Self {
            path: video.path().to_path_buf(),
            source_type: video.html5_source_type(),
            info: video.info().clone(),
            raw_info: video.raw_info().cloned(),
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info"))
        )
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();

    let config = ToolConfig {
        ffmpeg: args.ffmpeg,
        ffprobe: args.ffprobe,
        timeout: args.timeout_secs.map(Duration::from_secs),
        probe_mode: if args.diagnostic { ProbeMode::Diagnostic } else { ProbeMode::Structured },
    };

    if !is_installed(&config.ffmpeg) {
        warn!("{} does not appear to be installed", config.ffmpeg.display());
    }

    let toolchain = Toolchain::new(config);

    match args.command {
        Commands::Info { files } => {
            let handles: Vec<_> = files
                .into_iter()
                .map(|file| {
                    let toolchain = toolchain.clone();
                    tokio::spawn(async move {
                        let video = Video::open_async(&file, toolchain)
                            .await
                            .with_context(|| format!("Failed to probe {}", file.display()))?;
                        Ok::<_, anyhow::Error>(InfoReport::new(&video))
                    })
                })
                .collect();

            let mut reports = Vec::with_capacity(handles.len());
            for handle in handles {
                reports.push(handle.await.context("Probe task panicked")??);
            }

            println!("{}", serde_json::to_string_pretty(&reports)?);
        }

        Commands::Encode { input, extension, video_codec, audio_codec, strict, persist, extra } => {
            let video = open(&input, &toolchain).await?;
            let mut options = EncodeOptions::new(extension, video_codec, audio_codec)
                .extra_args(extra)
                .strict(strict);
            if let Some(dir) = persist {
                options = options.persist_in(dir);
            }

            let encoded = video.encode_async(options).await.context("Encode failed")?;
            info!("Encoded {:.2}s of media", encoded.duration());
            println!("{}", encoded.path().display());
        }

        Commands::Convert { input, format, persist } => {
            let video = open(&input, &toolchain).await?;
            let converted = video
                .convert_async(format, persist)
                .await
                .context("Conversion failed")?;
            println!("{}", converted.path().display());
        }

        Commands::Screenshot { input, offset, output } => {
            let video = open(&input, &toolchain).await?;
            match output {
                Some(output) => {
                    let bytes = video.screenshot_async(offset).await.context("Screenshot failed")?;
                    std::fs::write(&output, &bytes)
                        .with_context(|| format!("Failed to write {}", output.display()))?;
                    println!("{}", output.display());
                }
                None => {
                    let path = video.screenshot_file_async(offset).await.context("Screenshot failed")?;
                    println!("{}", path.display());
                }
            }
        }

        Commands::Thumbnail { input, size, output } => {
            let video = open(&input, &toolchain).await?;
            let bytes = video.thumbnail_async(size).await.context("Thumbnail failed")?;
            std::fs::write(&output, &bytes)
                .with_context(|| format!("Failed to write {}", output.display()))?;
            info!("Wrote {} byte thumbnail", bytes.len());
            println!("{}", output.display());
        }
    }

    Ok(())
}

async fn open(input: &Path, toolchain: &Toolchain) -> Result<Video> {
    Video::open_async(input, toolchain.clone())
        .await
        .with_context(|| format!("Failed to probe {}", input.display()))
}
