//! Rotation of the source raster into the display raster.

use image::{imageops, DynamicImage, Rgba, RgbaImage};

use crate::constant::{FULL_ROTATION, ROTATION_STEP};

/// Clockwise rotation in whole degrees, always in `[0, 360)`.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub struct Rotation(u16);

impl Rotation {
    pub fn new(degrees: i32) -> Self {
        Self(degrees.rem_euclid(i32::from(FULL_ROTATION)) as u16)
    }

    pub fn degrees(self) -> u16 {
        self.0
    }

    pub fn rotate_right(self) -> Self {
        Self::new(i32::from(self.0) + i32::from(ROTATION_STEP))
    }

    pub fn rotate_left(self) -> Self {
        Self::new(i32::from(self.0) - i32::from(ROTATION_STEP))
    }
}

impl std::fmt::Display for Rotation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}°", self.0)
    }
}

/// Bounding box of a `width` x `height` raster rotated by `degrees`.
pub fn rotated_bounds(width: u32, height: u32, degrees: f64) -> (u32, u32) {
    let (sin, cos) = degrees.to_radians().sin_cos();
    let (sin, cos) = (sin.abs(), cos.abs());
    let (w, h) = (f64::from(width), f64::from(height));
    let new_w = w * cos + h * sin;
    let new_h = w * sin + h * cos;
    (new_w.round() as u32, new_h.round() as u32)
}

/// Renders `source` rotated clockwise by `rotation` onto a canvas sized to
/// fit the rotated content. Uncovered canvas pixels are transparent.
pub fn render_rotated(source: &DynamicImage, rotation: Rotation) -> DynamicImage {
    match rotation.degrees() {
        0 => source.clone(),
        90 => DynamicImage::ImageRgba8(imageops::rotate90(source)),
        180 => DynamicImage::ImageRgba8(imageops::rotate180(source)),
        270 => DynamicImage::ImageRgba8(imageops::rotate270(source)),
        degrees => DynamicImage::ImageRgba8(rotate_about_center(
            &source.to_rgba8(),
            f32::from(degrees),
        )),
    }
}

fn rotate_about_center(src: &RgbaImage, degrees: f32) -> RgbaImage {
    let (w, h) = src.dimensions();
    let (new_w, new_h) = rotated_bounds(w, h, f64::from(degrees));
    let (sin, cos) = degrees.to_radians().sin_cos();

    let src_center = (w as f32 * 0.5, h as f32 * 0.5);
    let dst_center = (new_w as f32 * 0.5, new_h as f32 * 0.5);

    RgbaImage::from_fn(new_w, new_h, |x, y| {
        // Inverse-map the pixel center back into the source
        let dx = x as f32 + 0.5 - dst_center.0;
        let dy = y as f32 + 0.5 - dst_center.1;
        let sx = dx * cos + dy * sin + src_center.0;
        let sy = -dx * sin + dy * cos + src_center.1;
        sample_bilinear(src, sx - 0.5, sy - 0.5)
    })
}

/// Bilinear sample with premultiplied alpha; outside the raster is transparent.
fn sample_bilinear(src: &RgbaImage, fx: f32, fy: f32) -> Rgba<u8> {
    let (w, h) = src.dimensions();
    if fx <= -1.0 || fy <= -1.0 || fx >= w as f32 || fy >= h as f32 {
        return Rgba([0, 0, 0, 0]);
    }

    let x0 = fx.floor();
    let y0 = fy.floor();
    let (tx, ty) = (fx - x0, fy - y0);
    let (x0, y0) = (x0 as i64, y0 as i64);

    let fetch = |x: i64, y: i64| -> [f32; 4] {
        if x < 0 || y < 0 || x >= i64::from(w) || y >= i64::from(h) {
            return [0.0; 4];
        }
        let p = src.get_pixel(x as u32, y as u32).0;
        let a = f32::from(p[3]) / 255.0;
        [
            f32::from(p[0]) * a,
            f32::from(p[1]) * a,
            f32::from(p[2]) * a,
            f32::from(p[3]),
        ]
    };

    let taps = [
        (fetch(x0, y0), (1.0 - tx) * (1.0 - ty)),
        (fetch(x0 + 1, y0), tx * (1.0 - ty)),
        (fetch(x0, y0 + 1), (1.0 - tx) * ty),
        (fetch(x0 + 1, y0 + 1), tx * ty),
    ];

    let mut acc = [0.0f32; 4];
    for (px, weight) in taps {
        for (c, v) in acc.iter_mut().zip(px) {
            *c += v * weight;
        }
    }

    let alpha = acc[3];
    if alpha <= 0.0 {
        return Rgba([0, 0, 0, 0]);
    }
    let unmul = 255.0 / alpha;
    Rgba([
        (acc[0] * unmul).round().clamp(0.0, 255.0) as u8,
        (acc[1] * unmul).round().clamp(0.0, 255.0) as u8,
        (acc[2] * unmul).round().clamp(0.0, 255.0) as u8,
        alpha.round().clamp(0.0, 255.0) as u8,
    ])
}

#[cfg(test)]
mod tests {
    use super::*;

    fn solid(width: u32, height: u32) -> DynamicImage {
        DynamicImage::ImageRgba8(RgbaImage::from_pixel(
            width,
            height,
            Rgba([200, 100, 50, 255]),
        ))
    }

    #[test]
    fn rotation_wraps() {
        assert_eq!(Rotation::new(0).rotate_left().degrees(), 270);
        assert_eq!(Rotation::new(270).rotate_right().degrees(), 0);
        assert_eq!(Rotation::new(360).degrees(), 0);
        assert_eq!(Rotation::new(-450).degrees(), 270);
    }

    #[test]
    fn four_quarter_turns_restore_bounds() {
        let (w, h) = (640, 480);
        let mut rotation = Rotation::default();
        let mut seen = Vec::new();
        for _ in 0..4 {
            rotation = rotation.rotate_right();
            seen.push(rotated_bounds(w, h, f64::from(rotation.degrees())));
        }
        assert_eq!(rotation, Rotation::default());
        assert_eq!(seen, vec![(480, 640), (640, 480), (480, 640), (640, 480)]);
    }

    #[test]
    fn diagonal_bounds_expand() {
        assert_eq!(rotated_bounds(100, 100, 45.0), (141, 141));
        assert_eq!(rotated_bounds(200, 100, 30.0), (223, 187));
    }

    #[test]
    fn quarter_turn_transposes_pixels() {
        let mut img = RgbaImage::new(3, 2);
        img.put_pixel(0, 0, Rgba([255, 0, 0, 255]));
        let rotated = render_rotated(&DynamicImage::ImageRgba8(img), Rotation::new(90)).to_rgba8();
        assert_eq!(rotated.dimensions(), (2, 3));
        // Top-left lands top-right after a clockwise quarter turn
        assert_eq!(rotated.get_pixel(1, 0), &Rgba([255, 0, 0, 255]));
    }

    #[test]
    fn free_angle_fills_bounds_and_leaves_corners_clear() {
        let rotated = render_rotated(&solid(100, 60), Rotation::new(30)).to_rgba8();
        assert_eq!(rotated.dimensions(), rotated_bounds(100, 60, 30.0));

        let (w, h) = rotated.dimensions();
        assert_eq!(rotated.get_pixel(w / 2, h / 2), &Rgba([200, 100, 50, 255]));
        assert_eq!(rotated.get_pixel(0, 0)[3], 0);
        assert_eq!(rotated.get_pixel(w - 1, h - 1)[3], 0);
    }

    #[test]
    fn zero_rotation_is_identity() {
        let src = solid(8, 4);
        assert_eq!(render_rotated(&src, Rotation::default()), src);
    }
}
