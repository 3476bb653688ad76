use image::{DynamicImage, GrayImage, Luma};
use log::debug;
use nalgebra::DMatrix;

use crate::error::DeskewError;
use crate::geometry::{canvas_center, CornerSet, Point, Quadrant};

/// Vertical-derivative operator, 3 rows by 5 columns. The horizontal operator
/// is its transpose.
const SOBEL_Y: [[f64; 5]; 3] = [
    [-1.0, -2.0, -3.0, -2.0, -1.0],
    [0.0, 0.0, 0.0, 0.0, 0.0],
    [1.0, 2.0, 3.0, 2.0, 1.0],
];

/// Detection parameters
#[derive(Debug, Clone, Copy)]
pub struct DetectOptions {
    /// Rescaled gradient magnitude a pixel must exceed to be a candidate, in (0, 1)
    pub threshold: f64,
    /// Pixels this close to any border are never candidates
    pub edge_margin: u32,
}

impl DetectOptions {
    pub fn new(threshold: f64, edge_margin: u32) -> Self {
        Self {
            threshold,
            edge_margin,
        }
    }

    pub fn validate(&self) -> Result<(), DeskewError> {
        if !(self.threshold.is_finite() && self.threshold > 0.0 && self.threshold < 1.0) {
            return Err(DeskewError::InvalidParameter(format!(
                "threshold must lie strictly between 0 and 1, got {}",
                self.threshold
            )));
        }
        Ok(())
    }
}

impl Default for DetectOptions {
    fn default() -> Self {
        Self::new(0.5, 3)
    }
}

/// Result of the detection pipeline
#[derive(Debug, Clone)]
pub struct Detection {
    pub corners: CornerSet,
    /// Thresholded edge pixels the corners were chosen from
    pub mask: CandidateMask,
    /// Working channel the edges were computed on
    pub channel: GrayImage,
}

/// Boolean grid of pixels whose edge strength passed the threshold
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CandidateMask {
    width: u32,
    height: u32,
    bits: Vec<bool>,
}

impl CandidateMask {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            bits: vec![false; width as usize * height as usize],
        }
    }

    pub fn from_fn(width: u32, height: u32, f: impl Fn(u32, u32) -> bool) -> Self {
        let mut mask = Self::new(width, height);
        for y in 0..height {
            for x in 0..width {
                mask.set(x, y, f(x, y));
            }
        }
        mask
    }

    /// Threshold a rescaled edge map (rows = y), ignoring `edge_margin` pixels
    /// along every border.
    pub fn from_edges(edges: &DMatrix<f64>, threshold: f64, edge_margin: u32) -> Self {
        let height = edges.nrows() as u32;
        let width = edges.ncols() as u32;
        let margin = edge_margin as u64;
        let inside = |v: u32, len: u32| (v as u64) >= margin && (v as u64) + margin < len as u64;

        Self::from_fn(width, height, |x, y| {
            inside(x, width) && inside(y, height) && edges[(y as usize, x as usize)] > threshold
        })
    }

    pub fn dimensions(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    pub fn get(&self, x: u32, y: u32) -> bool {
        self.bits[self.index(x, y)]
    }

    pub fn set(&mut self, x: u32, y: u32, value: bool) {
        let idx = self.index(x, y);
        self.bits[idx] = value;
    }

    fn index(&self, x: u32, y: u32) -> usize {
        y as usize * self.width as usize + x as usize
    }

    pub fn count(&self) -> usize {
        self.bits.iter().filter(|&&b| b).count()
    }

    /// Candidate pixel coordinates in row-major order
    pub fn candidates(&self) -> impl Iterator<Item = (u32, u32)> + '_ {
        let width = self.width as usize;
        self.bits
            .iter()
            .enumerate()
            .filter(|(_, b)| **b)
            .map(move |(i, _)| ((i % width) as u32, (i / width) as u32))
    }

    /// Pick, per quadrant, the candidate farthest from the image center.
    ///
    /// Ties keep the pixel seen first in row-major order.
    pub fn select_corners(&self) -> Result<CornerSet, DeskewError> {
        let center = canvas_center(self.width, self.height);
        let mut best: [Option<(f64, Point)>; 4] = [None; 4];

        for (x, y) in self.candidates() {
            let (px, py) = (x as f64, y as f64);
            let quadrant = Quadrant::of(px, py, center);
            let dist_sq = (px - center.x).powi(2) + (py - center.y).powi(2);
            let slot = &mut best[quadrant.index()];
            let farther = match slot {
                Some((best_sq, _)) => dist_sq > *best_sq,
                None => true,
            };
            if farther {
                *slot = Some((dist_sq, Point::new(px, py)));
            }
        }

        let mut points = [Point::origin(); 4];
        for quadrant in Quadrant::ALL {
            let (_, point) = best[quadrant.index()].ok_or(DeskewError::EmptyQuadrant(quadrant))?;
            points[quadrant.index()] = point;
        }
        Ok(CornerSet::from_points(points))
    }
}

/// First channel of the image (red for colour sources, luma for grayscale)
pub fn working_channel(img: &DynamicImage) -> GrayImage {
    let rgb = img.to_rgb8();
    GrayImage::from_fn(rgb.width(), rgb.height(), |x, y| Luma([rgb.get_pixel(x, y)[0]]))
}

/// Channel values on a 0 to 100 scale, rows = y
pub fn intensity_grid(gray: &GrayImage) -> DMatrix<f64> {
    let (width, height) = gray.dimensions();
    DMatrix::from_fn(height as usize, width as usize, |row, col| {
        gray.get_pixel(col as u32, row as u32)[0] as f64 / 2.55
    })
}

/// Same-size 2D convolution with zero padding outside the grid
pub fn convolve_same(grid: &DMatrix<f64>, kernel: &DMatrix<f64>) -> DMatrix<f64> {
    let (rows, cols) = grid.shape();
    let (krows, kcols) = kernel.shape();
    let (ry, rx) = (krows as isize / 2, kcols as isize / 2);

    DMatrix::from_fn(rows, cols, |r, c| {
        let mut sum = 0.0;
        for i in 0..krows {
            // Convolution flips the kernel relative to the grid.
            let gr = r as isize + ry - i as isize;
            if gr < 0 || gr >= rows as isize {
                continue;
            }
            for j in 0..kcols {
                let gc = c as isize + rx - j as isize;
                if gc < 0 || gc >= cols as isize {
                    continue;
                }
                sum += kernel[(i, j)] * grid[(gr as usize, gc as usize)];
            }
        }
        sum
    })
}

fn sobel_y() -> DMatrix<f64> {
    DMatrix::from_fn(3, 5, |r, c| SOBEL_Y[r][c])
}

/// Edge strength `sqrt(dx^2 + dy^2)` per pixel
pub fn gradient_magnitude(grid: &DMatrix<f64>) -> DMatrix<f64> {
    let kernel_y = sobel_y();
    let kernel_x = kernel_y.transpose();
    let dx = convolve_same(grid, &kernel_x);
    let dy = convolve_same(grid, &kernel_y);
    dx.zip_map(&dy, |gx, gy| (gx * gx + gy * gy).sqrt())
}

/// Min-max rescale over the whole grid to [0, 1]; a flat grid becomes zeros.
pub fn rescale_unit(grid: &DMatrix<f64>) -> DMatrix<f64> {
    let min = grid.iter().copied().fold(f64::INFINITY, f64::min);
    let max = grid.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    let range = max - min;
    if !(range > 0.0) {
        return DMatrix::zeros(grid.nrows(), grid.ncols());
    }
    grid.map(|v| (v - min) / range)
}

/// Main detection function: locate the frame corners in an image
pub fn detect(img: &DynamicImage, options: &DetectOptions) -> Result<Detection, DeskewError> {
    options.validate()?;

    let gray = working_channel(img);
    let grid = intensity_grid(&gray);
    let edges = rescale_unit(&gradient_magnitude(&grid));
    let mask = CandidateMask::from_edges(&edges, options.threshold, options.edge_margin);

    debug!(
        "{}x{} image: {} candidate pixels above {:.3} (margin {})",
        gray.width(),
        gray.height(),
        mask.count(),
        options.threshold,
        options.edge_margin
    );

    let corners = mask.select_corners()?;

    debug!(
        "Corners: TR ({}, {}), TL ({}, {}), BL ({}, {}), BR ({}, {})",
        corners.top_right.x,
        corners.top_right.y,
        corners.top_left.x,
        corners.top_left.y,
        corners.bottom_left.x,
        corners.bottom_left.y,
        corners.bottom_right.x,
        corners.bottom_right.y
    );

    Ok(Detection {
        corners,
        mask,
        channel: gray,
    })
}

/// Corner-only form of [`detect`]
pub fn detect_corners(
    img: &DynamicImage,
    threshold: f64,
    edge_margin: u32,
) -> Result<CornerSet, DeskewError> {
    detect(img, &DetectOptions::new(threshold, edge_margin)).map(|d| d.corners)
}
