//! Images for checking detections by eye.

use image::{imageops, GrayImage, Rgb, RgbImage};
use imageproc::drawing::{draw_cross_mut, draw_line_segment_mut};

use crate::detection::CandidateMask;
use crate::geometry::CornerSet;

const CANDIDATE: Rgb<u8> = Rgb([255, 255, 255]);
const MARKER: Rgb<u8> = Rgb([255, 0, 0]);

fn gray_to_rgb(gray: &GrayImage) -> RgbImage {
    RgbImage::from_fn(gray.width(), gray.height(), |x, y| {
        let v = gray.get_pixel(x, y)[0];
        Rgb([v, v, v])
    })
}

/// Outline the quadrilateral TR -> TL -> BL -> BR -> TR and cross each corner
fn draw_corners(canvas: &mut RgbImage, corners: &CornerSet) {
    let points = corners.points();
    for (i, p) in points.iter().enumerate() {
        let next = points[(i + 1) % points.len()];
        draw_line_segment_mut(
            canvas,
            (p.x as f32, p.y as f32),
            (next.x as f32, next.y as f32),
            MARKER,
        );
    }
    for p in points {
        draw_cross_mut(canvas, MARKER, p.x.round() as i32, p.y.round() as i32);
    }
}

/// Candidate pixels in white on black with the chosen corners marked
pub fn candidate_overlay(mask: &CandidateMask, corners: &CornerSet) -> RgbImage {
    let (width, height) = mask.dimensions();
    let mut canvas = RgbImage::from_fn(width, height, |x, y| {
        if mask.get(x, y) {
            CANDIDATE
        } else {
            Rgb([0, 0, 0])
        }
    });
    draw_corners(&mut canvas, corners);
    canvas
}

/// The working channel with the chosen corners marked
pub fn corner_overlay(gray: &GrayImage, corners: &CornerSet) -> RgbImage {
    let mut canvas = gray_to_rgb(gray);
    draw_corners(&mut canvas, corners);
    canvas
}

/// Original and cropped images next to each other, top aligned
pub fn side_by_side(original: &GrayImage, cropped: &GrayImage) -> RgbImage {
    let width = original.width() + cropped.width();
    let height = original.height().max(cropped.height());
    let mut canvas = RgbImage::new(width, height);
    imageops::replace(&mut canvas, &gray_to_rgb(original), 0, 0);
    imageops::replace(&mut canvas, &gray_to_rgb(cropped), original.width() as i64, 0);
    canvas
}
