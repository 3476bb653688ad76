use std::fmt;
use std::str::FromStr;

use image::{imageops, GrayImage, Luma};
use log::debug;
use nalgebra::Matrix3;

use crate::error::DeskewError;
use crate::geometry::{
    canvas_center, rotated_canvas_size, rotation_matrix, transform_point, CornerSet, CropBox,
    Point, RotationAngle,
};

/// Pixel value used where a rotated canvas has no source pixel
const FILL: u8 = 0;

/// How rotated pixels are sampled from the source
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Interpolation {
    #[default]
    Nearest,
    Bilinear,
}

/// Size of the canvas a rotated image is drawn on
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CanvasPolicy {
    /// Same size as the source; content rotated past the border is lost
    #[default]
    Keep,
    /// Grown so the whole rotated source fits
    Expand,
}

/// What to do with a crop box that reaches past the rotated canvas
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BoundsPolicy {
    #[default]
    Clamp,
    Reject,
}

macro_rules! named_variants {
    ($ty:ident { $($variant:ident => $name:literal),+ $(,)? }) => {
        impl FromStr for $ty {
            type Err = String;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                match s.to_ascii_lowercase().as_str() {
                    $($name => Ok($ty::$variant),)+
                    other => Err(format!(
                        "unknown {} '{}', expected one of: {}",
                        stringify!($ty),
                        other,
                        [$($name),+].join(", ")
                    )),
                }
            }
        }

        impl fmt::Display for $ty {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                match self {
                    $($ty::$variant => f.write_str($name),)+
                }
            }
        }
    };
}

named_variants!(Interpolation { Nearest => "nearest", Bilinear => "bilinear" });
named_variants!(CanvasPolicy { Keep => "keep", Expand => "expand" });
named_variants!(BoundsPolicy { Clamp => "clamp", Reject => "reject" });

/// Rotate-and-crop parameters
#[derive(Debug, Clone, Copy, Default)]
pub struct CropOptions {
    pub canvas: CanvasPolicy,
    pub interpolation: Interpolation,
    pub bounds: BoundsPolicy,
}

/// A rotated image together with the matrix that moved its content
#[derive(Debug, Clone)]
pub struct Rotated {
    pub image: GrayImage,
    pub angle: RotationAngle,
    /// Maps source coordinates into the rotated canvas
    pub forward: Matrix3<f64>,
}

impl Rotated {
    pub fn map_point(&self, point: Point) -> Point {
        transform_point(&self.forward, point)
    }

    /// Corners in the rotated canvas, ordered as [`CornerSet::points`]
    pub fn map_corners(&self, corners: &CornerSet) -> [Point; 4] {
        corners.points().map(|p| self.map_point(p))
    }
}

/// Output of [`rotate_and_crop`]
#[derive(Debug, Clone)]
pub struct Cropped {
    pub image: GrayImage,
    pub angle: RotationAngle,
    pub crop_box: CropBox,
    /// Corners in the rotated canvas, ordered as [`CornerSet::points`]
    pub rotated_corners: [Point; 4],
}

/// Nearest-neighbour sample, `None` outside the image
fn sample_nearest(img: &GrayImage, x: f64, y: f64) -> Option<u8> {
    let (width, height) = img.dimensions();
    let px = x.round();
    let py = y.round();
    if px < 0.0 || py < 0.0 || px >= width as f64 || py >= height as f64 {
        return None;
    }
    Some(img.get_pixel(px as u32, py as u32)[0])
}

/// Bilinear sample, `None` more than half a pixel outside the image
fn sample_bilinear(img: &GrayImage, x: f64, y: f64) -> Option<u8> {
    let (width, height) = img.dimensions();
    if x < -0.5 || y < -0.5 || x > width as f64 - 0.5 || y > height as f64 - 0.5 {
        return None;
    }

    let x0 = x.floor() as i64;
    let y0 = y.floor() as i64;
    let x_frac = x - x.floor();
    let y_frac = y - y.floor();

    let get_pixel = |px: i64, py: i64| -> f64 {
        let px = px.clamp(0, width as i64 - 1) as u32;
        let py = py.clamp(0, height as i64 - 1) as u32;
        img.get_pixel(px, py)[0] as f64
    };

    let top = get_pixel(x0, y0) * (1.0 - x_frac) + get_pixel(x0 + 1, y0) * x_frac;
    let bottom = get_pixel(x0, y0 + 1) * (1.0 - x_frac) + get_pixel(x0 + 1, y0 + 1) * x_frac;
    let value = top * (1.0 - y_frac) + bottom * y_frac;

    Some(value.round().clamp(0.0, 255.0) as u8)
}

/// Rotate an image about its center using inverse mapping.
///
/// The returned `forward` matrix is the exact inverse of the mapping used to
/// sample, so points sent through it stay on the same image content.
pub fn rotate_image(
    img: &GrayImage,
    angle: RotationAngle,
    canvas: CanvasPolicy,
    interpolation: Interpolation,
) -> Rotated {
    let (src_width, src_height) = img.dimensions();
    let (new_width, new_height) = match canvas {
        CanvasPolicy::Keep => (src_width, src_height),
        CanvasPolicy::Expand => rotated_canvas_size(angle, src_width, src_height),
    };

    let src_center = canvas_center(src_width, src_height);
    let dst_center = canvas_center(new_width, new_height);
    let forward = rotation_matrix(angle, src_center, dst_center);

    if angle.is_zero() && (new_width, new_height) == (src_width, src_height) {
        return Rotated {
            image: img.clone(),
            angle,
            forward,
        };
    }

    let backward = rotation_matrix(-angle, dst_center, src_center);

    debug!(
        "Rotate {:.3}°: {}x{} -> {}x{}",
        angle.degrees(),
        src_width,
        src_height,
        new_width,
        new_height
    );

    let image = GrayImage::from_fn(new_width, new_height, |out_x, out_y| {
        let src = transform_point(&backward, Point::new(out_x as f64, out_y as f64));
        let value = match interpolation {
            Interpolation::Nearest => sample_nearest(img, src.x, src.y),
            Interpolation::Bilinear => sample_bilinear(img, src.x, src.y),
        };
        Luma([value.unwrap_or(FILL)])
    });

    Rotated {
        image,
        angle,
        forward,
    }
}

/// Copy the pixels inside `crop_box`, which must lie within the image
fn crop(img: &GrayImage, crop_box: &CropBox) -> GrayImage {
    imageops::crop_imm(
        img,
        crop_box.x0 as u32,
        crop_box.y0 as u32,
        crop_box.width() as u32,
        crop_box.height() as u32,
    )
    .to_image()
}

/// Deskew the frame bounded by `corners` and crop to it
pub fn rotate_and_crop(
    img: &GrayImage,
    corners: &CornerSet,
    options: &CropOptions,
) -> Result<Cropped, DeskewError> {
    let angle = RotationAngle::from_corners(corners)?;
    let rotated = rotate_image(img, angle, options.canvas, options.interpolation);
    let rotated_corners = rotated.map_corners(corners);
    let requested = CropBox::enclosing(&rotated_corners)?;

    let (width, height) = rotated.image.dimensions();
    let crop_box = match options.bounds {
        BoundsPolicy::Clamp => requested
            .clamp_to(width, height)
            .ok_or(DeskewError::DegenerateCrop(requested))?,
        BoundsPolicy::Reject if !requested.fits_within(width, height) => {
            return Err(DeskewError::OutOfBoundsCrop {
                requested,
                width,
                height,
            });
        }
        BoundsPolicy::Reject => requested,
    };

    if crop_box != requested {
        debug!("Crop {} clamped to {}", requested, crop_box);
    }

    Ok(Cropped {
        image: crop(&rotated.image, &crop_box),
        angle,
        crop_box,
        rotated_corners,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn corners(points: [(f64, f64); 4]) -> CornerSet {
        CornerSet::from_points(points.map(|(x, y)| Point::new(x, y)))
    }

    /// Distinct value per pixel so crops can be compared exactly
    fn gradient_image(width: u32, height: u32) -> GrayImage {
        GrayImage::from_fn(width, height, |x, y| Luma([(x * 7 + y * 13) as u8]))
    }

    #[test]
    fn test_policy_names_round_trip() {
        assert_eq!("expand".parse::<CanvasPolicy>(), Ok(CanvasPolicy::Expand));
        assert_eq!("Bilinear".parse::<Interpolation>(), Ok(Interpolation::Bilinear));
        assert_eq!(BoundsPolicy::Reject.to_string(), "reject");
        assert!("sideways".parse::<BoundsPolicy>().is_err());
    }

    #[test]
    fn test_zero_rotation_is_a_copy() {
        let img = gradient_image(12, 9);
        let rotated = rotate_image(
            &img,
            RotationAngle::from_degrees(0.0),
            CanvasPolicy::Expand,
            Interpolation::Bilinear,
        );
        assert_eq!(rotated.image, img);
        assert_eq!(rotated.map_point(Point::new(3.0, 4.0)), Point::new(3.0, 4.0));
    }

    #[test]
    fn test_quarter_turn_moves_pixels() {
        // 90° counter-clockwise on screen: the top-right pixel ends up top-left.
        let mut img = GrayImage::new(4, 4);
        img.put_pixel(3, 0, Luma([255]));
        let rotated = rotate_image(
            &img,
            RotationAngle::from_degrees(90.0),
            CanvasPolicy::Keep,
            Interpolation::Nearest,
        );
        let moved = rotated.map_point(Point::new(3.0, 0.0));
        let (mx, my) = (moved.x.round() as u32, moved.y.round() as u32);
        assert_eq!((mx, my), (0, 1));
        assert_eq!(rotated.image.get_pixel(mx, my)[0], 255);
    }

    #[test]
    fn test_expanded_canvas_keeps_all_content() {
        let img = GrayImage::from_pixel(20, 10, Luma([200]));
        let rotated = rotate_image(
            &img,
            RotationAngle::from_degrees(30.0),
            CanvasPolicy::Expand,
            Interpolation::Nearest,
        );
        assert!(rotated.image.width() > 20);
        assert!(rotated.image.height() > 10);

        for corner in [(0.5, 0.5), (19.0, 0.5), (0.5, 9.0), (19.0, 9.0)] {
            let p = rotated.map_point(Point::new(corner.0, corner.1));
            assert!(p.x >= 0.0 && p.x < rotated.image.width() as f64);
            assert!(p.y >= 0.0 && p.y < rotated.image.height() as f64);
        }
    }

    #[test]
    fn test_mapped_points_track_rotated_content() {
        // The center of a bright 3x3 block must still be bright where its
        // mapped coordinate lands.
        let mut img = GrayImage::new(41, 41);
        for y in 11..=13 {
            for x in 29..=31 {
                img.put_pixel(x, y, Luma([255]));
            }
        }
        for degrees in [-35.0, -8.0, 12.5, 40.0] {
            for canvas in [CanvasPolicy::Keep, CanvasPolicy::Expand] {
                let rotated = rotate_image(
                    &img,
                    RotationAngle::from_degrees(degrees),
                    canvas,
                    Interpolation::Nearest,
                );
                let p = rotated.map_point(Point::new(30.0, 12.0));
                let (x, y) = (p.x.round() as u32, p.y.round() as u32);
                assert_eq!(rotated.image.get_pixel(x, y)[0], 255, "{}° {:?}", degrees, canvas);
            }
        }
    }

    #[test]
    fn test_aligned_corners_crop_directly() {
        let img = gradient_image(10, 10);
        let set = corners([(8.0, 1.0), (1.0, 1.0), (1.0, 8.0), (8.0, 8.0)]);
        let cropped = rotate_and_crop(&img, &set, &CropOptions::default()).unwrap();

        assert!(cropped.angle.is_zero());
        assert_eq!(cropped.crop_box, CropBox::new(1, 9, 1, 9));
        assert_eq!(cropped.image.dimensions(), (8, 8));
        assert_eq!(cropped.image, imageops::crop_imm(&img, 1, 1, 8, 8).to_image());
    }

    #[test]
    fn test_sloped_top_edge_changes_crop() {
        let img = gradient_image(10, 10);
        let set = corners([(8.0, 3.0), (1.0, 1.0), (1.0, 8.0), (8.0, 8.0)]);
        let cropped = rotate_and_crop(&img, &set, &CropOptions::default()).unwrap();

        let expected = (2.0f64 / 7.0).atan().to_degrees();
        assert!((cropped.angle.degrees() - expected).abs() < 1e-9);
        assert_eq!(cropped.crop_box, CropBox::new(0, 9, 2, 9));
        assert_eq!(cropped.image.dimensions(), (9, 7));

        // Top corners end up level after rotation.
        let [tr, tl, _, _] = cropped.rotated_corners;
        assert!((tr.y - tl.y).abs() < 1e-9);
    }

    #[test]
    fn test_crop_contains_rotated_corners() {
        let img = gradient_image(60, 50);
        let set = corners([(48.0, 9.0), (10.0, 14.0), (13.0, 41.0), (51.0, 37.0)]);
        let options = CropOptions {
            canvas: CanvasPolicy::Expand,
            ..CropOptions::default()
        };
        let cropped = rotate_and_crop(&img, &set, &options).unwrap();
        for p in cropped.rotated_corners {
            assert!(cropped.crop_box.contains(p), "{:?} outside {}", p, cropped.crop_box);
        }
        assert_eq!(
            cropped.image.dimensions(),
            (cropped.crop_box.width() as u32, cropped.crop_box.height() as u32)
        );
    }

    #[test]
    fn test_collinear_corners_fail() {
        let img = gradient_image(10, 10);
        let level = corners([(8.0, 5.0), (2.0, 5.0), (1.0, 5.0), (9.0, 5.0)]);
        assert!(matches!(
            rotate_and_crop(&img, &level, &CropOptions::default()),
            Err(DeskewError::DegenerateCrop(_))
        ));

        // Points on y = x / 2 + 1 collapse onto one row once levelled.
        let sloped = corners([(6.0, 4.0), (2.0, 2.0), (0.0, 1.0), (8.0, 5.0)]);
        assert!(matches!(
            rotate_and_crop(&img, &sloped, &CropOptions::default()),
            Err(DeskewError::DegenerateCrop(_))
        ));
    }

    #[test]
    fn test_out_of_bounds_policies() {
        let img = gradient_image(10, 10);
        let set = corners([(12.0, -2.0), (-3.0, -2.0), (-3.0, 6.0), (12.0, 6.0)]);

        let clamped = rotate_and_crop(&img, &set, &CropOptions::default()).unwrap();
        assert_eq!(clamped.crop_box, CropBox::new(0, 10, 0, 7));
        assert_eq!(clamped.image.dimensions(), (10, 7));

        let options = CropOptions {
            bounds: BoundsPolicy::Reject,
            ..CropOptions::default()
        };
        assert_eq!(
            rotate_and_crop(&img, &set, &options).unwrap_err(),
            DeskewError::OutOfBoundsCrop {
                requested: CropBox::new(-3, 13, -2, 7),
                width: 10,
                height: 10,
            }
        );
    }

    #[test]
    fn test_crop_entirely_off_canvas_is_degenerate() {
        let img = gradient_image(10, 10);
        let set = corners([(30.0, 20.0), (22.0, 20.0), (22.0, 28.0), (30.0, 28.0)]);
        assert!(matches!(
            rotate_and_crop(&img, &set, &CropOptions::default()),
            Err(DeskewError::DegenerateCrop(_))
        ));
    }

    #[test]
    fn test_vertical_top_edge_fails() {
        let img = gradient_image(10, 10);
        let set = corners([(5.0, 1.0), (5.0, 4.0), (1.0, 8.0), (8.0, 8.0)]);
        assert_eq!(
            rotate_and_crop(&img, &set, &CropOptions::default()).unwrap_err(),
            DeskewError::DegenerateAngle { x: 5.0 }
        );
    }
}
