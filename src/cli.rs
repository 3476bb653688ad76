use clap::Parser;
use std::path::PathBuf;

use crate::batch::BatchOptions;
use crate::detection::DetectOptions;
use crate::transform::{BoundsPolicy, CanvasPolicy, CropOptions, Interpolation};

#[derive(Parser, Debug)]
#[command(name = "film-deskew")]
#[command(version, about = "Find scanned film frames, deskew them and crop to the frame")]
pub struct Cli {
    /// Directory containing the scans
    #[arg(required = true)]
    pub input: PathBuf,

    /// File name suffix identifying scans
    #[arg(short, long, default_value = ".tif")]
    pub ext: String,

    /// Output directory [default: <input>/cropped]
    #[arg(short, long)]
    pub output: Option<PathBuf>,

    /// Edge strength threshold in (0, 1); 0.5 suits film scans, lower for faint frames
    #[arg(short, long, default_value = "0.5", value_parser = parse_threshold)]
    pub threshold: f64,

    /// Pixels along each border ignored during corner detection
    #[arg(long, default_value = "3")]
    pub edge_margin: u32,

    /// Rotated canvas size: keep or expand
    #[arg(long, default_value = "keep", value_parser = parse_canvas)]
    pub canvas: CanvasPolicy,

    /// Rotation sampling: nearest or bilinear
    #[arg(long, default_value = "nearest", value_parser = parse_interpolation)]
    pub interpolation: Interpolation,

    /// Crop boxes past the rotated image: clamp or reject
    #[arg(long, default_value = "clamp", value_parser = parse_bounds)]
    pub bounds: BoundsPolicy,

    /// Also write corner overlays and before/after comparisons
    #[arg(long)]
    pub diagnostics: bool,

    /// Worker threads [default: one per core]
    #[arg(short, long)]
    pub jobs: Option<usize>,

    /// Show detection details
    #[arg(short, long)]
    pub verbose: bool,
}

impl Cli {
    pub fn output_dir(&self) -> PathBuf {
        self.output
            .clone()
            .unwrap_or_else(|| self.input.join("cropped"))
    }

    pub fn batch_options(&self) -> BatchOptions {
        BatchOptions {
            detect: DetectOptions::new(self.threshold, self.edge_margin),
            crop: CropOptions {
                canvas: self.canvas,
                interpolation: self.interpolation,
                bounds: self.bounds,
            },
            diagnostics: self.diagnostics,
        }
    }
}

fn parse_threshold(s: &str) -> Result<f64, String> {
    let value: f64 = s
        .parse()
        .map_err(|_| format!("Invalid threshold: {}", s))?;

    if !(value > 0.0 && value < 1.0) {
        return Err("Threshold must lie strictly between 0 and 1".to_string());
    }

    Ok(value)
}

fn parse_canvas(s: &str) -> Result<CanvasPolicy, String> {
    s.parse()
}

fn parse_interpolation(s: &str) -> Result<Interpolation, String> {
    s.parse()
}

fn parse_bounds(s: &str) -> Result<BoundsPolicy, String> {
    s.parse()
}
