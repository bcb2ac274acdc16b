//! Kaliscope - Main Entry Point
//!
//! Plays a pipeline headlessly: loads a pipeline file (or the default
//! pipeline), builds its processing graph and runs the playback engine until
//! the end of the stream or the requested number of frames.

use anyhow::{bail, Context};
use clap::Parser;
use kaliscope_rs::{
    config::AppConfig,
    engine::{FrameEvent, PlaybackEngine, SeekPosition},
    pipeline::{GraphBuilder, PipelineDocument, PluginHost, PluginRegistry, PresetLibrary},
};
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[derive(Debug, Parser)]
#[command(name = "kaliscope", version, about = "Frame-accurate film-scan playback")]
struct Args {
    /// Pipeline file to play (JSON or TOML). Defaults to ~/.kaliscope_pipeline.json
    #[arg(short, long)]
    pipeline: Option<PathBuf>,

    /// Apply a preset from the preset directory instead of a pipeline file
    #[arg(long, conflicts_with = "pipeline")]
    preset: Option<String>,

    /// Stop after this many frames
    #[arg(short, long)]
    frames: Option<u64>,

    /// Produce one frame per step instead of playing continuously
    #[arg(short, long)]
    step: bool,

    /// First frame to play
    #[arg(long, default_value_t = 0)]
    start: u64,

    /// Start this far into the reel, in percent
    #[arg(long, conflicts_with = "start")]
    start_percent: Option<f64>,

    /// List the available plugins and presets, then exit
    #[arg(long)]
    list: bool,
}

fn main() -> anyhow::Result<()> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info,kaliscope_rs=debug")),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let args = Args::parse();
    tracing::info!("Starting Kaliscope");

    let mut app_config = AppConfig::load_or_default();
    let host = Arc::new(PluginRegistry::with_builtins());
    let presets = PresetLibrary::load_dir(&app_config.preset_directory);

    if args.list {
        for plugin in host.plugins() {
            println!("{} ({})", plugin.display_name(), plugin.kind);
        }
        for name in presets.names() {
            println!("preset: {}", name);
        }
        return Ok(());
    }

    let mut document = PipelineDocument::new(host.clone());
    if let Some(name) = &args.preset {
        let preset = presets
            .get(name)
            .with_context(|| format!("Unknown preset {:?}", name))?;
        document.apply_preset(preset);
    } else if let Some(path) = &args.pipeline {
        document
            .load_file(path)
            .with_context(|| format!("Failed to load pipeline {}", path.display()))?;
        app_config.add_recent_pipeline(path);
        if let Err(e) = app_config.save() {
            tracing::warn!("Failed to save app config: {}", e);
        }
    } else {
        document.load_default().context("Failed to load default pipeline")?;
    }

    if document.model().is_empty() {
        bail!("Pipeline is empty, nothing to play");
    }
    tracing::info!("Pipeline: {}", document.model().identifiers().join(" -> "));

    let graph = GraphBuilder::new(host)
        .with_config(&app_config.engine)
        .build(document.model())
        .context("Failed to build processing graph")?;

    let engine = Arc::new(PlaybackEngine::new(app_config.engine.clone()));
    engine.set_processing_graph(Arc::new(graph));
    engine.set_frame_stepping(args.step);
    let first = match args.start_percent {
        Some(percent) => engine.seek_to(SeekPosition::Percent(percent))?,
        None => engine.seek_to(SeekPosition::Frame(args.start))?,
    };
    match engine.duration() {
        Some(duration) => tracing::info!(
            "Reel of {} frames ({:.1}s), starting at frame {}",
            engine.length().unwrap_or_default(),
            duration.as_secs_f64(),
            first
        ),
        None => tracing::info!("Starting at frame {}", first),
    }

    let frames = engine.subscribe();
    engine.start()?;

    let mut produced = 0u64;
    let limit = args.frames.unwrap_or(u64::MAX);
    if args.step && limit > 0 {
        engine.process_next_frame();
    }

    while produced < limit {
        let Some(event) = frames.recv() else {
            break;
        };
        match event {
            FrameEvent::FrameReady { index, frame } => {
                tracing::info!("Frame {}: {}x{}", index, frame.width(), frame.height());
                engine.frame_processed(index);
                produced += 1;
                if args.step && produced < limit {
                    engine.process_next_frame();
                }
            }
            FrameEvent::FrameError { index, message } => {
                tracing::warn!("Frame {} failed: {}", index, message);
                produced += 1;
                if args.step && produced < limit {
                    engine.process_next_frame();
                }
            }
            FrameEvent::EndOfStream => break,
            FrameEvent::Fatal(message) => {
                engine.stop();
                bail!("Playback failed: {}", message);
            }
        }
    }

    tracing::info!("Shutting down after {} frames", produced);
    engine.stop();
    Ok(())
}
