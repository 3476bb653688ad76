use std::path::PathBuf;

use thiserror::Error;

use crate::geometry::{CropBox, Quadrant};

/// Failures of the corner detection and rotate-crop stages.
///
/// Every variant except `InvalidParameter` describes a problem with one
/// particular image; callers processing many images should log and skip.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum DeskewError {
    #[error("no candidate edge pixels in the {0} quadrant")]
    EmptyQuadrant(Quadrant),

    #[error("top corners share x = {x}, rotation angle is undefined")]
    DegenerateAngle { x: f64 },

    #[error("crop box {0} has no area")]
    DegenerateCrop(CropBox),

    #[error("crop box {requested} extends outside the {width}x{height} rotated image")]
    OutOfBoundsCrop {
        requested: CropBox,
        width: u32,
        height: u32,
    },

    #[error("invalid parameter: {0}")]
    InvalidParameter(String),
}

impl DeskewError {
    /// True for failures caused by the image content rather than by the
    /// caller's configuration.
    pub fn is_per_image(&self) -> bool {
        !matches!(self, DeskewError::InvalidParameter(_))
    }
}

/// Failure to turn one file into a cropped film.
#[derive(Debug, Error)]
pub enum FilmError {
    #[error("failed to decode {path:?}: {source}")]
    Decode {
        path: PathBuf,
        #[source]
        source: image::ImageError,
    },

    #[error("{path:?}: {source}")]
    Deskew {
        path: PathBuf,
        #[source]
        source: DeskewError,
    },

    #[error("failed to save {path:?}: {source}")]
    Save {
        path: PathBuf,
        #[source]
        source: image::ImageError,
    },
}

impl FilmError {
    /// The deskew failure behind this error, if decoding succeeded.
    pub fn deskew(&self) -> Option<&DeskewError> {
        match self {
            FilmError::Deskew { source, .. } => Some(source),
            FilmError::Decode { .. } | FilmError::Save { .. } => None,
        }
    }

    /// False when the failure comes from the batch settings and would repeat
    /// for every other file.
    pub fn is_per_image(&self) -> bool {
        self.deskew().map_or(true, DeskewError::is_per_image)
    }
}
