use anyhow::Context;
use clap::{Parser, Subcommand};
use disc_alignment::alignment::{place_inspections, AnchorContext, ImgPoint};
use disc_alignment::config::load_config_or_default;
use disc_alignment::locator::{locate_in_search_region, LocateParams};
use disc_alignment::roi::{Roi, RoiRole};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "discalign")]
#[command(about = "Pattern localization and ROI alignment for brake-disc inspection")]
#[command(version = "0.1.0")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}

#[derive(Subcommand)]
enum Commands {
    /// Locate a pattern region inside a search region of an image
    Locate {
        /// Path to the captured image
        #[arg(short, long)]
        image: PathBuf,

        /// Search rectangle as "x,y,w,h" in image coordinates
        #[arg(short, long)]
        search_rect: String,

        /// Pattern rectangle as "x,y,w,h"; cropped from the same image
        #[arg(short, long, conflicts_with = "pattern_image")]
        pattern_rect: Option<String>,

        /// Pre-cropped pattern image, used instead of a pattern rectangle
        #[arg(short = 'P', long)]
        pattern_image: Option<PathBuf>,

        /// Matching mode: auto, features or edges
        #[arg(short, long)]
        mode: Option<String>,

        /// Confidence threshold in [0, 100]
        #[arg(short, long)]
        threshold: Option<i32>,

        /// Rotation sweep range in degrees
        #[arg(short, long)]
        rot_range: Option<i32>,

        /// Scale sweep bounds
        #[arg(long)]
        scale_min: Option<f64>,
        #[arg(long)]
        scale_max: Option<f64>,

        /// Optional matcher configuration file (TOML or JSON)
        #[arg(short, long)]
        config: Option<PathBuf>,
    },

    /// Reposition inspection regions from located master centers
    Reposition {
        /// Layout file with baseline regions and baseline master centers
        #[arg(short, long)]
        layout: PathBuf,

        /// Current master 1 center as "x,y"
        #[arg(long)]
        m1: String,

        /// Current master 2 center as "x,y"
        #[arg(long)]
        m2: String,
    },
}

/// Baseline state saved at layout time, consumed by `reposition`.
#[derive(Debug, Serialize, Deserialize)]
struct LayoutFile {
    baselines: Vec<Roi>,
    baseline_m1: ImgPoint,
    baseline_m2: ImgPoint,
}

#[derive(Debug, Serialize)]
struct LocateOutput {
    center: Option<(f64, f64)>,
    score: i32,
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    env_logger::Builder::from_default_env()
        .filter_level(match cli.verbose {
            0 => log::LevelFilter::Warn,
            1 => log::LevelFilter::Info,
            2 => log::LevelFilter::Debug,
            _ => log::LevelFilter::Trace,
        })
        .init();

    match cli.command {
        Commands::Locate {
            image,
            search_rect,
            pattern_rect,
            pattern_image,
            mode,
            threshold,
            rot_range,
            scale_min,
            scale_max,
            config,
        } => handle_locate(
            image,
            search_rect,
            pattern_rect,
            pattern_image,
            mode,
            threshold,
            rot_range,
            scale_min,
            scale_max,
            config,
        ),
        Commands::Reposition { layout, m1, m2 } => handle_reposition(layout, m1, m2),
    }
}

#[allow(clippy::too_many_arguments)]
fn handle_locate(
    image_path: PathBuf,
    search_rect: String,
    pattern_rect: Option<String>,
    pattern_image: Option<PathBuf>,
    mode: Option<String>,
    threshold: Option<i32>,
    rot_range: Option<i32>,
    scale_min: Option<f64>,
    scale_max: Option<f64>,
    config_path: Option<PathBuf>,
) -> anyhow::Result<()> {
    let config = load_config_or_default(config_path.as_deref());

    let image = image::open(&image_path)
        .with_context(|| format!("failed to load image {}", image_path.display()))?;

    let search_roi = roi_from_rect_arg("search", RoiRole::MasterSearch, &search_rect)?;

    let override_gray = match &pattern_image {
        Some(path) => {
            let pattern = image::open(path)
                .with_context(|| format!("failed to load pattern {}", path.display()))?;
            Some(disc_alignment::preprocessing::to_grayscale(&pattern))
        }
        None => None,
    };

    let pattern_roi = match &pattern_rect {
        Some(rect) => roi_from_rect_arg("pattern", RoiRole::MasterPattern, rect)?,
        None => {
            anyhow::ensure!(
                override_gray.is_some(),
                "either --pattern-rect or --pattern-image is required"
            );
            // Placeholder; the override path never resolves this region.
            Roi::rect("pattern", RoiRole::MasterPattern, 0.0, 0.0, 1.0, 1.0)
        }
    };

    let mut params = LocateParams::from(&config.analyze);
    if let Some(mode) = mode {
        params.mode = mode.parse()?;
    }
    if let Some(threshold) = threshold {
        params.score_threshold = threshold;
    }
    if let Some(rot_range) = rot_range {
        params.rot_range_deg = rot_range;
    }
    if let Some(scale_min) = scale_min {
        params.scale_min = scale_min;
    }
    if let Some(scale_max) = scale_max {
        params.scale_max = scale_max;
    }

    let sink = |message: &str| log::info!("{message}");
    let (center, score) = locate_in_search_region(
        &image,
        &pattern_roi,
        &search_roi,
        &params,
        &config,
        override_gray.as_ref(),
        Some(&sink),
    )?;

    println!("{}", serde_json::to_string_pretty(&LocateOutput { center, score })?);
    Ok(())
}

fn handle_reposition(layout_path: PathBuf, m1: String, m2: String) -> anyhow::Result<()> {
    let content = std::fs::read_to_string(&layout_path)
        .with_context(|| format!("failed to read layout {}", layout_path.display()))?;
    let layout: LayoutFile = serde_json::from_str(&content)?;
    for roi in &layout.baselines {
        roi.validate()?;
    }

    let anchors = AnchorContext {
        baseline_m1: Some(layout.baseline_m1),
        baseline_m2: Some(layout.baseline_m2),
        current_m1: parse_point(&m1)?,
        current_m2: parse_point(&m2)?,
    };

    let mut placed = layout.baselines.clone();
    place_inspections(&mut placed, &layout.baselines, &anchors);

    println!("{}", serde_json::to_string_pretty(&placed)?);
    Ok(())
}

/// Parse "x,y,w,h" (top-left corner + size) into a center-based rectangle ROI.
fn roi_from_rect_arg(id: &str, role: RoiRole, arg: &str) -> anyhow::Result<Roi> {
    let parts: Vec<f64> = arg
        .split(',')
        .map(|p| p.trim().parse::<f64>())
        .collect::<Result<_, _>>()
        .with_context(|| format!("invalid rectangle '{arg}', expected x,y,w,h"))?;
    anyhow::ensure!(parts.len() == 4, "invalid rectangle '{arg}', expected 4 values");
    let (x, y, w, h) = (parts[0], parts[1], parts[2], parts[3]);
    anyhow::ensure!(w > 0.0 && h > 0.0, "rectangle size must be positive");

    Ok(Roi::rect(id, role, x + w * 0.5, y + h * 0.5, w, h))
}

fn parse_point(arg: &str) -> anyhow::Result<ImgPoint> {
    let parts: Vec<f64> = arg
        .split(',')
        .map(|p| p.trim().parse::<f64>())
        .collect::<Result<_, _>>()
        .with_context(|| format!("invalid point '{arg}', expected x,y"))?;
    anyhow::ensure!(parts.len() == 2, "invalid point '{arg}', expected 2 values");
    Ok(ImgPoint::new(parts[0], parts[1]))
}
