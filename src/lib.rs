pub mod batch;
pub mod cli;
pub mod detection;
pub mod diagnostics;
pub mod error;
pub mod geometry;
pub mod transform;

pub use batch::{
    collect_inputs, process_file, process_image, run_batch, save_film, BatchOptions, Film,
    FilmOutcome, SavedFilm,
};
pub use cli::Cli;
pub use detection::{detect, detect_corners, CandidateMask, DetectOptions, Detection};
pub use error::{DeskewError, FilmError};
pub use geometry::{CornerSet, CropBox, Point, Quadrant, RotationAngle};
pub use transform::{rotate_and_crop, CropOptions, Cropped};
