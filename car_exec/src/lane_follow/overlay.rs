//! Heading line overlay for annotated frames

use image::{Rgb, RgbImage};
use imageproc::drawing::draw_line_segment_mut;

/// Colour of the heading line.
const LINE_COLOUR: Rgb<u8> = Rgb([255, 0, 0]);

/// Weight of the original frame under the overlay.
const FRAME_WEIGHT: f32 = 0.8;

/// Draw a line from the bottom centre of the image towards the steering direction.
///
/// The line ends half way up the image, leaning left for angles below 90 and right above.
/// Endpoints outside the image are clipped, so this never fails.
pub fn draw_heading_line(image: &RgbImage, steering_angle_deg: i32, width_px: u32) -> RgbImage {
    let (w, h) = image.dimensions();

    // Dim the frame so the line stands out
    let mut out = image.clone();
    for p in out.pixels_mut() {
        for c in p.0.iter_mut() {
            *c = ((*c as f32) * FRAME_WEIGHT + 1.0).min(255.0) as u8;
        }
    }

    if w == 0 || h == 0 {
        return out
    }

    let (x1, y1, x2, y2) = heading_endpoints(w, h, steering_angle_deg);

    // Thicken the line by drawing it once per offset within the width
    let half = (width_px / 2) as i32;
    for ox in -half..=half {
        for oy in -half..=half {
            let (ox, oy) = (ox as f32, oy as f32);
            draw_line_segment_mut(
                &mut out,
                (x1 as f32 + ox, y1 as f32 + oy),
                (x2 as f32 + ox, y2 as f32 + oy),
                LINE_COLOUR
            );
        }
    }

    out
}

/// Start and end point of the heading line, in pixels.
fn heading_endpoints(width: u32, height: u32, steering_angle_deg: i32) -> (f64, f64, f64, f64) {
    let h = height as f64;
    let x1 = (width / 2) as f64;
    let y1 = h - 1.0;
    let y2 = h / 2.0;

    let tan = (steering_angle_deg as f64).to_radians().tan();

    // Near 0 or 180 degrees the line would be horizontal and infinitely long
    let x2 = if tan.abs() < 1e-3 {
        x1
    }
    else {
        x1 - (h / 2.0) / tan
    };

    (x1, y1, x2.max(-1.0).min(width as f64), y2)
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_endpoints() {
        let (x1, _, x2, y2) = heading_endpoints(320, 240, 90);
        assert_eq!(x1, 160.0);
        assert!((x2 - 160.0).abs() < 1e-6);
        assert_eq!(y2, 120.0);

        // Turning left leans the line left
        let (_, _, x2, _) = heading_endpoints(320, 240, 45);
        assert!((x2 - 40.0).abs() < 1e-6);

        let (_, _, x2, _) = heading_endpoints(320, 240, 135);
        assert!((x2 - 280.0).abs() < 1e-6);
    }

    #[test]
    fn test_draw_never_panics() {
        let img = RgbImage::new(32, 24);
        for angle in &[0, 1, 40, 90, 140, 179, 180] {
            let out = draw_heading_line(&img, *angle, 5);
            assert_eq!(out.dimensions(), (32, 24));
            assert_eq!(*out.get_pixel(16, 23), LINE_COLOUR);
        }

        let out = draw_heading_line(&RgbImage::new(0, 0), 90, 5);
        assert_eq!(out.dimensions(), (0, 0));
    }
}
