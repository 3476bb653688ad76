use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use image::{DynamicImage, GrayImage, ImageResult};
use log::{debug, error, info, warn};
use rayon::prelude::*;

use crate::detection::{detect, CandidateMask, DetectOptions};
use crate::diagnostics::{candidate_overlay, corner_overlay, side_by_side};
use crate::error::{DeskewError, FilmError};
use crate::geometry::{CornerSet, CropBox, RotationAngle};
use crate::transform::{rotate_and_crop, CropOptions};

/// Settings shared by every image in a batch
#[derive(Debug, Clone, Copy, Default)]
pub struct BatchOptions {
    pub detect: DetectOptions,
    pub crop: CropOptions,
    /// Keep the intermediate images and write overlays next to each output
    pub diagnostics: bool,
}

/// Intermediate images kept only when diagnostics are requested
#[derive(Debug, Clone)]
pub struct FilmDiagnostics {
    /// Working channel before rotation
    pub original: GrayImage,
    pub mask: CandidateMask,
}

/// A deskewed, cropped film scan plus what was learned on the way
#[derive(Debug, Clone)]
pub struct Film {
    /// Deskewed and cropped working channel
    pub image: GrayImage,
    pub corners: CornerSet,
    pub angle: RotationAngle,
    pub crop_box: CropBox,
    pub diagnostics: Option<FilmDiagnostics>,
}

/// What remains of a film once its outputs are on disk
#[derive(Debug, Clone)]
pub struct SavedFilm {
    pub corners: CornerSet,
    pub angle: RotationAngle,
    pub crop_box: CropBox,
    /// Path of the cropped image
    pub output: PathBuf,
}

/// Result for one input file
#[derive(Debug)]
pub struct FilmOutcome {
    pub path: PathBuf,
    pub result: std::result::Result<SavedFilm, FilmError>,
}

/// Files in `dir` whose name ends with `extension` (case-insensitive),
/// sorted by path
pub fn collect_inputs(dir: &Path, extension: &str) -> Result<Vec<PathBuf>> {
    let suffix = extension.to_lowercase();
    let entries =
        fs::read_dir(dir).with_context(|| format!("Failed to read input directory: {:?}", dir))?;

    let mut files = Vec::new();
    for entry in entries {
        let entry = entry.with_context(|| format!("Failed to list directory: {:?}", dir))?;
        let path = entry.path();
        let matches = path
            .file_name()
            .map(|name| name.to_string_lossy().to_lowercase().ends_with(&suffix))
            .unwrap_or(false);
        if matches && path.is_file() {
            files.push(path);
        }
    }

    files.sort();
    Ok(files)
}

/// Detect, deskew and crop one decoded image
pub fn process_image(
    img: &DynamicImage,
    options: &BatchOptions,
) -> std::result::Result<Film, DeskewError> {
    let detection = detect(img, &options.detect)?;
    let cropped = rotate_and_crop(&detection.channel, &detection.corners, &options.crop)?;

    let diagnostics = options.diagnostics.then(|| FilmDiagnostics {
        original: detection.channel,
        mask: detection.mask,
    });

    Ok(Film {
        image: cropped.image,
        corners: detection.corners,
        angle: cropped.angle,
        crop_box: cropped.crop_box,
        diagnostics,
    })
}

/// Decode and process one file
pub fn process_file(path: &Path, options: &BatchOptions) -> std::result::Result<Film, FilmError> {
    let img = image::open(path).map_err(|source| FilmError::Decode {
        path: path.to_path_buf(),
        source,
    })?;
    process_image(&img, options).map_err(|source| FilmError::Deskew {
        path: path.to_path_buf(),
        source,
    })
}

fn save_png(
    path: PathBuf,
    write: impl FnOnce(&Path) -> ImageResult<()>,
) -> std::result::Result<PathBuf, FilmError> {
    match write(&path) {
        Ok(()) => {
            debug!("Saved {:?}", path);
            Ok(path)
        }
        Err(source) => Err(FilmError::Save { path, source }),
    }
}

/// Write `<stem>_cropped.png` for `source` into `output_dir`, plus the
/// `_corners`, `_mask` and `_compare` overlays when the film carries
/// diagnostics.
pub fn save_film(
    film: &Film,
    source: &Path,
    output_dir: &Path,
) -> std::result::Result<PathBuf, FilmError> {
    let stem = source.file_stem().unwrap_or_default().to_string_lossy();
    let named = |suffix: &str| output_dir.join(format!("{}_{}.png", stem, suffix));

    let output = save_png(named("cropped"), |p| film.image.save(p))?;

    if let Some(diag) = &film.diagnostics {
        save_png(named("corners"), |p| {
            corner_overlay(&diag.original, &film.corners).save(p)
        })?;
        save_png(named("mask"), |p| {
            candidate_overlay(&diag.mask, &film.corners).save(p)
        })?;
        save_png(named("compare"), |p| {
            side_by_side(&diag.original, &film.image).save(p)
        })?;
    }

    Ok(output)
}

fn process_and_save(
    path: &Path,
    options: &BatchOptions,
    output_dir: &Path,
) -> std::result::Result<SavedFilm, FilmError> {
    let film = process_file(path, options)?;
    let output = save_film(&film, path, output_dir)?;
    info!(
        "{:?}: rotated {:.2}°, cropped to {}x{}",
        path,
        film.angle.degrees(),
        film.image.width(),
        film.image.height()
    );

    Ok(SavedFilm {
        corners: film.corners,
        angle: film.angle,
        crop_box: film.crop_box,
        output,
    })
}

/// Process and save every file in parallel. Each film is written and dropped
/// as soon as it is done; results keep the input order and a failed image
/// never stops the others.
pub fn run_batch(
    paths: &[PathBuf],
    options: &BatchOptions,
    output_dir: &Path,
) -> Vec<FilmOutcome> {
    paths
        .par_iter()
        .map(|path| {
            let result = process_and_save(path, options, output_dir);
            if let Err(err) = &result {
                if err.is_per_image() {
                    warn!("Skipping {}", err);
                } else {
                    error!("{}", err);
                }
            }
            FilmOutcome {
                path: path.clone(),
                result,
            }
        })
        .collect()
}
