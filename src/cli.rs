// SPDX-License-Identifier: GPL-3.0-only

//! CLI commands
//!
//! - Rendering a still image through the full compositing pipeline
//! - Printing adapter information
//! - Writing a default configuration file

use clap::Args;
use image::Rgba;
use std::path::PathBuf;
use std::time::Duration;
use stream_compositor::config::{CompositorConfig, RenderBackend};
use stream_compositor::filters::{ColorFilter, ColorFilterKind};
use stream_compositor::gpu::GpuContext;
use stream_compositor::overlay::{FontRasterizer, GifObject, ImageObject, TextObject, TranslateTo};
use stream_compositor::photo::{EncodingFormat, PhotoEncoder};
use stream_compositor::Compositor;

const FRAME_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Args, Debug)]
pub struct RenderArgs {
    /// Input image
    input: PathBuf,

    /// Output file or directory (default: current directory, timestamped name)
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// JSON configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Encoder width (default: input width)
    #[arg(long)]
    width: Option<u32>,

    /// Encoder height (default: input height)
    #[arg(long)]
    height: Option<u32>,

    /// Filter to append, repeatable: grayscale, sepia, negative, brightness=<-1..1>
    #[arg(short, long)]
    filter: Vec<String>,

    /// Still image overlay
    #[arg(long, conflicts_with_all = ["overlay_gif", "text"])]
    overlay_image: Option<PathBuf>,

    /// Animated gif overlay (first frame is used for a still render)
    #[arg(long, conflicts_with = "text")]
    overlay_gif: Option<PathBuf>,

    /// Text overlay, requires --font
    #[arg(long, requires = "font")]
    text: Option<String>,

    /// TrueType/OpenType font for --text
    #[arg(long)]
    font: Option<PathBuf>,

    /// Text size in pixels
    #[arg(long, default_value = "48")]
    text_size: f32,

    /// Overlay anchor: center, top, bottom, left, right, top-left, top-right, bottom-left, bottom-right
    #[arg(long)]
    anchor: Option<String>,

    /// Overlay size in percent of the frame
    #[arg(long)]
    overlay_scale: Option<f32>,

    /// Overlay opacity (0-1)
    #[arg(long)]
    overlay_alpha: Option<f32>,

    /// Stream rotation in degrees
    #[arg(short, long)]
    rotation: Option<i32>,

    #[arg(long)]
    flip_horizontal: bool,

    #[arg(long)]
    flip_vertical: bool,

    /// Enable the anti-aliasing pass
    #[arg(long)]
    aa: bool,

    /// Output a muted (black) frame
    #[arg(long)]
    mute: bool,

    /// Composite on the GPU
    #[arg(long)]
    gpu: bool,
}

fn parse_filter(arg: &str) -> Result<ColorFilterKind, String> {
    if let Some((name, amount)) = arg.split_once('=')
        && name.trim().eq_ignore_ascii_case("brightness")
    {
        let amount: f32 = amount
            .trim()
            .parse()
            .map_err(|_| format!("Invalid brightness amount '{}'", amount))?;
        return Ok(ColorFilterKind::Brightness(amount));
    }
    ColorFilterKind::from_name(arg).ok_or_else(|| format!("Unknown filter '{}'", arg))
}

fn parse_anchor(name: &str) -> Result<TranslateTo, String> {
    let anchor = match name.trim().to_ascii_lowercase().replace('_', "-").as_str() {
        "center" => TranslateTo::Center,
        "top" => TranslateTo::Top,
        "bottom" => TranslateTo::Bottom,
        "left" => TranslateTo::Left,
        "right" => TranslateTo::Right,
        "top-left" => TranslateTo::TopLeft,
        "top-right" => TranslateTo::TopRight,
        "bottom-left" => TranslateTo::BottomLeft,
        "bottom-right" => TranslateTo::BottomRight,
        _ => return Err(format!("Unknown anchor '{}'", name)),
    };
    Ok(anchor)
}

/// Composite one still image and save the captured stream frame
pub fn render(args: RenderArgs) -> Result<(), Box<dyn std::error::Error>> {
    let mut config = match &args.config {
        Some(path) => CompositorConfig::load(path)?,
        None => CompositorConfig::default(),
    };
    if args.gpu {
        config.backend = RenderBackend::Gpu;
    }
    // A still render needs exactly one frame, produced by the input
    config.force_render = false;

    let input = image::open(&args.input)?.into_rgba8();
    let width = args.width.unwrap_or(input.width());
    let height = args.height.unwrap_or(input.height());
    println!("Input: {}x{}, output: {}x{}", input.width(), input.height(), width, height);

    let compositor = Compositor::with_config(&config)?;
    compositor.set_encoder_size(width, height)?;
    compositor.init()?;

    for arg in &args.filter {
        let kind = parse_filter(arg)?;
        compositor.set_filter_at(usize::MAX, ColorFilter::boxed(kind))?;
    }

    if let Some(path) = &args.overlay_image {
        compositor.set_image(ImageObject::from_path(path)?)?;
    } else if let Some(path) = &args.overlay_gif {
        compositor.set_gif(GifObject::from_path(path)?)?;
    } else if let (Some(text), Some(font)) = (&args.text, &args.font) {
        let rasterizer = FontRasterizer::from_path(font)?;
        compositor.set_text(TextObject::new(
            text.as_str(),
            args.text_size,
            Rgba([255, 255, 255, 255]),
            &rasterizer,
        ))?;
    }
    if let Some(scale) = args.overlay_scale {
        compositor.set_stream_object_size(scale, scale)?;
    }
    if let Some(anchor) = &args.anchor {
        compositor.set_stream_object_position_to(parse_anchor(anchor)?)?;
    }
    if let Some(alpha) = args.overlay_alpha {
        compositor.set_stream_object_alpha(alpha)?;
    }

    if let Some(degrees) = args.rotation {
        compositor.set_stream_rotation(degrees)?;
    }
    if args.flip_horizontal {
        compositor.set_stream_horizontal_flip(true)?;
    }
    if args.flip_vertical {
        compositor.set_stream_vertical_flip(true)?;
    }
    compositor.enable_aa(args.aa || config.aa_enabled)?;
    if args.mute {
        compositor.mute_video()?;
    }

    compositor.start()?;
    let photo = compositor.take_photo_async();
    compositor.surface()?.push_frame(input)?;

    let rt = tokio::runtime::Runtime::new()?;
    let frame = rt
        .block_on(async { tokio::time::timeout(FRAME_TIMEOUT, photo).await })
        .map_err(|_| "Timed out waiting for the composited frame")??;
    compositor.stop()?;

    let format = args
        .output
        .as_deref()
        .filter(|p| !p.is_dir())
        .and_then(EncodingFormat::from_path)
        .unwrap_or(config.photo_format);
    let encoder = PhotoEncoder::with(format, config.photo_quality);

    let output_dir = match args.output.as_ref() {
        Some(path) if path.is_dir() => path.clone(),
        Some(path) => path
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .map(|p| p.to_path_buf())
            .unwrap_or_else(|| PathBuf::from(".")),
        None => PathBuf::from("."),
    };
    std::fs::create_dir_all(&output_dir)?;

    let saved = rt.block_on(encoder.encode_and_save(frame, output_dir))?;

    if let Some(user_path) = args.output
        && !user_path.is_dir()
    {
        std::fs::rename(&saved, &user_path)?;
        println!("Frame saved: {}", user_path.display());
        return Ok(());
    }

    println!("Frame saved: {}", saved.display());
    Ok(())
}

/// Print version and adapter details
pub fn info(show_config: bool) -> Result<(), Box<dyn std::error::Error>> {
    println!("stream-compositor {}", env!("GIT_VERSION"));

    match GpuContext::new_blocking("stream-compositor-info") {
        Ok(gpu) => {
            let info = gpu.info();
            println!("GPU adapter: {} ({:?})", info.adapter_name, info.backend);
        }
        Err(e) => println!("GPU adapter: unavailable ({}), software backend only", e),
    }

    if show_config {
        println!("{}", serde_json::to_string_pretty(&CompositorConfig::default())?);
    }
    Ok(())
}

pub fn init_config(path: PathBuf) -> Result<(), Box<dyn std::error::Error>> {
    CompositorConfig::default().save(&path)?;
    println!("Configuration written: {}", path.display());
    Ok(())
}
