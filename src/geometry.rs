use std::fmt;

use nalgebra::{Matrix3, Point2, Vector3};

use crate::error::DeskewError;

/// Pixel coordinates: `x` is the column, `y` the row, origin at the top left.
pub type Point = Point2<f64>;

/// Corner extents below this are treated as zero when sizing a crop.
const MIN_EXTENT: f64 = 1e-6;

/// One of the four regions an image is split into at its geometric center
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Quadrant {
    TopRight,
    TopLeft,
    BottomLeft,
    BottomRight,
}

impl Quadrant {
    /// Quadrants in the order corners are reported
    pub const ALL: [Quadrant; 4] = [
        Quadrant::TopRight,
        Quadrant::TopLeft,
        Quadrant::BottomLeft,
        Quadrant::BottomRight,
    ];

    /// Classify a point against a center. Points on the vertical split line
    /// belong to the right half, points on the horizontal split line to the
    /// bottom half.
    pub fn of(x: f64, y: f64, center: Point) -> Self {
        let right = x >= center.x;
        let top = y < center.y;
        match (right, top) {
            (true, true) => Quadrant::TopRight,
            (false, true) => Quadrant::TopLeft,
            (false, false) => Quadrant::BottomLeft,
            (true, false) => Quadrant::BottomRight,
        }
    }

    pub fn index(self) -> usize {
        match self {
            Quadrant::TopRight => 0,
            Quadrant::TopLeft => 1,
            Quadrant::BottomLeft => 2,
            Quadrant::BottomRight => 3,
        }
    }
}

impl fmt::Display for Quadrant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Quadrant::TopRight => "top-right",
            Quadrant::TopLeft => "top-left",
            Quadrant::BottomLeft => "bottom-left",
            Quadrant::BottomRight => "bottom-right",
        };
        f.write_str(name)
    }
}

/// The four corners of a detected frame, one per quadrant.
///
/// Rotation is estimated from `top_left` and `top_right`, so the roles are
/// named rather than implied by position in a list.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CornerSet {
    pub top_right: Point,
    pub top_left: Point,
    pub bottom_left: Point,
    pub bottom_right: Point,
}

impl CornerSet {
    pub fn new(top_right: Point, top_left: Point, bottom_left: Point, bottom_right: Point) -> Self {
        Self {
            top_right,
            top_left,
            bottom_left,
            bottom_right,
        }
    }

    /// Build from points ordered as [`Quadrant::ALL`]
    pub fn from_points(points: [Point; 4]) -> Self {
        let [top_right, top_left, bottom_left, bottom_right] = points;
        Self::new(top_right, top_left, bottom_left, bottom_right)
    }

    /// Corners ordered as [`Quadrant::ALL`]
    pub fn points(&self) -> [Point; 4] {
        [self.top_right, self.top_left, self.bottom_left, self.bottom_right]
    }

    pub fn get(&self, quadrant: Quadrant) -> Point {
        self.points()[quadrant.index()]
    }
}

/// In-plane rotation that levels the frame's top edge, in degrees.
///
/// Positive angles turn image content counter-clockwise as seen on screen.
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd)]
pub struct RotationAngle(f64);

impl RotationAngle {
    pub fn from_degrees(degrees: f64) -> Self {
        Self(degrees)
    }

    /// Slope angle of the top edge, `atan(dy / dx)` from the top-right to the
    /// top-left corner. A vertical top edge has no defined slope and is
    /// reported instead of guessed.
    pub fn from_corners(corners: &CornerSet) -> Result<Self, DeskewError> {
        let dx = corners.top_left.x - corners.top_right.x;
        let dy = corners.top_left.y - corners.top_right.y;
        if dx == 0.0 || !dx.is_finite() || !dy.is_finite() {
            return Err(DeskewError::DegenerateAngle {
                x: corners.top_left.x,
            });
        }
        Ok(Self((dy / dx).atan().to_degrees()))
    }

    pub fn degrees(self) -> f64 {
        self.0
    }

    pub fn radians(self) -> f64 {
        self.0.to_radians()
    }

    pub fn is_zero(self) -> bool {
        self.0 == 0.0
    }
}

impl std::ops::Neg for RotationAngle {
    type Output = Self;

    fn neg(self) -> Self {
        Self(-self.0)
    }
}

/// Affine matrix rotating about `from_center` by `angle`, then placing that
/// center at `to_center`.
///
/// The linear part is `[[cos, sin], [-sin, cos]]`, which in image
/// coordinates (y down) turns content counter-clockwise for positive angles.
pub fn rotation_matrix(angle: RotationAngle, from_center: Point, to_center: Point) -> Matrix3<f64> {
    let (sin, cos) = angle.radians().sin_cos();

    #[rustfmt::skip]
    let translate_to_origin = Matrix3::new(
        1.0, 0.0, -from_center.x,
        0.0, 1.0, -from_center.y,
        0.0, 0.0, 1.0,
    );

    #[rustfmt::skip]
    let rotate = Matrix3::new(
        cos, sin, 0.0,
        -sin, cos, 0.0,
        0.0, 0.0, 1.0,
    );

    #[rustfmt::skip]
    let translate_back = Matrix3::new(
        1.0, 0.0, to_center.x,
        0.0, 1.0, to_center.y,
        0.0, 0.0, 1.0,
    );

    translate_back * rotate * translate_to_origin
}

/// Transform a point using the affine matrix
pub fn transform_point(matrix: &Matrix3<f64>, point: Point) -> Point {
    let p = Vector3::new(point.x, point.y, 1.0);
    let result = matrix * p;
    Point::new(result.x / result.z, result.y / result.z)
}

/// Canvas size needed to hold a `width` x `height` image rotated by `angle`
pub fn rotated_canvas_size(angle: RotationAngle, width: u32, height: u32) -> (u32, u32) {
    let origin = Point::origin();
    let matrix = rotation_matrix(angle, origin, origin);
    let corners = [
        Point::new(0.0, 0.0),
        Point::new(width as f64, 0.0),
        Point::new(0.0, height as f64),
        Point::new(width as f64, height as f64),
    ];

    let transformed: Vec<Point> = corners
        .iter()
        .map(|&p| transform_point(&matrix, p))
        .collect();

    let min_x = transformed.iter().map(|p| p.x).fold(f64::INFINITY, f64::min);
    let max_x = transformed.iter().map(|p| p.x).fold(f64::NEG_INFINITY, f64::max);
    let min_y = transformed.iter().map(|p| p.y).fold(f64::INFINITY, f64::min);
    let max_y = transformed.iter().map(|p| p.y).fold(f64::NEG_INFINITY, f64::max);

    // Trig round-off must not grow an unrotated canvas by a pixel.
    let new_width = (max_x - min_x - MIN_EXTENT).ceil().max(1.0) as u32;
    let new_height = (max_y - min_y - MIN_EXTENT).ceil().max(1.0) as u32;

    (new_width, new_height)
}

/// Geometric center of a `width` x `height` canvas
pub fn canvas_center(width: u32, height: u32) -> Point {
    Point::new(width as f64 / 2.0, height as f64 / 2.0)
}

/// Integer crop rectangle with exclusive upper bounds, `[x0, xf) x [y0, yf)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CropBox {
    pub x0: i64,
    pub xf: i64,
    pub y0: i64,
    pub yf: i64,
}

impl CropBox {
    pub fn new(x0: i64, xf: i64, y0: i64, yf: i64) -> Self {
        Self { x0, xf, y0, yf }
    }

    /// Smallest integer box containing every point.
    ///
    /// Fails when the points span no area on either axis, e.g. when they are
    /// collinear along the crop direction.
    pub fn enclosing(points: &[Point]) -> Result<Self, DeskewError> {
        let min_x = points.iter().map(|p| p.x).fold(f64::INFINITY, f64::min);
        let max_x = points.iter().map(|p| p.x).fold(f64::NEG_INFINITY, f64::max);
        let min_y = points.iter().map(|p| p.y).fold(f64::INFINITY, f64::min);
        let max_y = points.iter().map(|p| p.y).fold(f64::NEG_INFINITY, f64::max);

        let finite = [min_x, max_x, min_y, max_y].iter().all(|v| v.is_finite());
        if !finite {
            return Err(DeskewError::DegenerateCrop(CropBox::new(0, 0, 0, 0)));
        }

        let crop = CropBox {
            x0: min_x.floor() as i64,
            xf: max_x.floor() as i64 + 1,
            y0: min_y.floor() as i64,
            yf: max_y.floor() as i64 + 1,
        };

        if max_x - min_x < MIN_EXTENT || max_y - min_y < MIN_EXTENT {
            return Err(DeskewError::DegenerateCrop(crop));
        }
        Ok(crop)
    }

    pub fn width(&self) -> i64 {
        self.xf - self.x0
    }

    pub fn height(&self) -> i64 {
        self.yf - self.y0
    }

    pub fn is_empty(&self) -> bool {
        self.x0 >= self.xf || self.y0 >= self.yf
    }

    pub fn contains(&self, point: Point) -> bool {
        point.x >= self.x0 as f64
            && point.x < self.xf as f64
            && point.y >= self.y0 as f64
            && point.y < self.yf as f64
    }

    /// Whether the box lies entirely inside a `width` x `height` canvas
    pub fn fits_within(&self, width: u32, height: u32) -> bool {
        self.x0 >= 0 && self.y0 >= 0 && self.xf <= width as i64 && self.yf <= height as i64
    }

    /// Intersection with a `width` x `height` canvas, `None` if nothing is left
    pub fn clamp_to(&self, width: u32, height: u32) -> Option<Self> {
        let clamped = CropBox {
            x0: self.x0.clamp(0, width as i64),
            xf: self.xf.clamp(0, width as i64),
            y0: self.y0.clamp(0, height as i64),
            yf: self.yf.clamp(0, height as i64),
        };
        (!clamped.is_empty()).then_some(clamped)
    }
}

impl fmt::Display for CropBox {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}, {}) x [{}, {})", self.x0, self.xf, self.y0, self.yf)
    }
}
