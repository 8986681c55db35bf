//! Extraction of the framed region and encoding to an embedded-data URI.

use std::io::Cursor;
use std::sync::Arc;

use base64::{Engine as _, engine::general_purpose::STANDARD as BASE64};
use image::codecs::jpeg::JpegEncoder;
use image::imageops::{self, FilterType};
use image::{DynamicImage, GenericImageView, ImageFormat, RgbaImage};
use log::{debug, warn};

use crate::constant::JPEG_QUALITY;
use crate::error::{CropError, Result};
use crate::geometry::{FrameCoords, ScreenRect};
use crate::loader::{self, ImageRef, LifetimeToken};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ExportFormat {
    Lossy,
    Lossless,
}

impl ExportFormat {
    pub fn mime(self) -> &'static str {
        match self {
            ExportFormat::Lossy => "image/jpeg",
            ExportFormat::Lossless => "image/png",
        }
    }

    pub fn extension(self) -> &'static str {
        match self {
            ExportFormat::Lossy => "jpg",
            ExportFormat::Lossless => "png",
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ExportPayload {
    pub format: ExportFormat,
    pub width: u32,
    pub height: u32,
    pub data_uri: String,
}

impl ExportPayload {
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        let (_, payload) = self
            .data_uri
            .split_once(',')
            .ok_or_else(|| CropError::InvalidDataUri("missing ',' separator".into()))?;
        BASE64
            .decode(payload)
            .map_err(|e| CropError::InvalidDataUri(e.to_string()))
    }
}

/// Crop rectangle in display-raster pixels. The origin may be negative when
/// the frame hangs over the raster's edge.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct NativeRect {
    pub x: i64,
    pub y: i64,
    pub width: u32,
    pub height: u32,
}

/// Maps a stage-relative frame onto the raster's native pixel grid.
///
/// `raster_screen` and `stage_screen` are on-screen bounds in the same space;
/// their offset places the raster within the stage.
pub fn map_to_native(
    frame: &FrameCoords,
    raster_screen: &ScreenRect,
    stage_screen: &ScreenRect,
    native_width: u32,
) -> NativeRect {
    let offset_x = raster_screen.x - stage_screen.x;
    let offset_y = raster_screen.y - stage_screen.y;
    let scale = native_width as f32 / raster_screen.width;

    NativeRect {
        x: ((frame.tx - offset_x) * scale).round() as i64,
        y: ((frame.ty - offset_y) * scale).round() as i64,
        width: (frame.sx * scale).round().max(0.0) as u32,
        height: (frame.sy * scale).round().max(0.0) as u32,
    }
}

/// Parts of `rect` outside the raster stay transparent.
pub fn extract_region(display: &DynamicImage, rect: NativeRect) -> Result<RgbaImage> {
    if rect.width == 0 || rect.height == 0 {
        return Err(CropError::EmptyRegion {
            width: rect.width,
            height: rect.height,
        });
    }

    let mut output = RgbaImage::new(rect.width, rect.height);
    let (w, h) = display.dimensions();

    let x0 = rect.x.max(0);
    let y0 = rect.y.max(0);
    let x1 = (rect.x + i64::from(rect.width)).min(i64::from(w));
    let y1 = (rect.y + i64::from(rect.height)).min(i64::from(h));

    if x1 > x0 && y1 > y0 {
        let visible = display
            .crop_imm(x0 as u32, y0 as u32, (x1 - x0) as u32, (y1 - y0) as u32)
            .to_rgba8();
        imageops::replace(&mut output, &visible, x0 - rect.x, y0 - rect.y);
    }
    Ok(output)
}

/// Keeps destination pixels only where the mask is opaque. The mask is
/// stretched over the whole output first.
pub fn apply_mask(output: &mut RgbaImage, mask: &DynamicImage) {
    let (w, h) = output.dimensions();
    let mask = if mask.dimensions() == (w, h) {
        mask.to_rgba8()
    } else {
        imageops::resize(mask, w, h, FilterType::Triangle)
    };

    for (px, m) in output.pixels_mut().zip(mask.pixels()) {
        let alpha = u16::from(px[3]) * u16::from(m[3]);
        px[3] = ((alpha + 127) / 255) as u8;
    }
}

pub fn encode(image: &RgbaImage, format: ExportFormat) -> Result<ExportPayload> {
    let mut bytes: Vec<u8> = Vec::new();
    match format {
        ExportFormat::Lossy => {
            let rgb = DynamicImage::ImageRgba8(image.clone()).to_rgb8();
            JpegEncoder::new_with_quality(&mut bytes, JPEG_QUALITY)
                .encode_image(&rgb)
                .map_err(|e| CropError::Encode(e.to_string()))?;
        }
        ExportFormat::Lossless => {
            image
                .write_to(&mut Cursor::new(&mut bytes), ImageFormat::Png)
                .map_err(|e| CropError::Encode(e.to_string()))?;
        }
    }

    Ok(ExportPayload {
        format,
        width: image.width(),
        height: image.height(),
        data_uri: format!("data:{};base64,{}", format.mime(), BASE64.encode(&bytes)),
    })
}

#[derive(Clone, Debug)]
pub struct ExportRequest {
    pub frame: FrameCoords,
    pub display: Arc<DynamicImage>,
    pub raster_screen: ScreenRect,
    pub stage_screen: ScreenRect,
    pub mask: Option<ImageRef>,
    pub token: LifetimeToken,
}

/// Crops, optionally masks, and encodes. Resolves once whether or not a mask
/// is involved. A mask that fails to decode degrades to the unmasked export.
pub async fn export(request: ExportRequest) -> Result<ExportPayload> {
    let rect = map_to_native(
        &request.frame,
        &request.raster_screen,
        &request.stage_screen,
        request.display.width(),
    );
    debug!("exporting native rect {rect:?}");
    let mut output = extract_region(&request.display, rect)?;

    let Some(mask_ref) = request.mask else {
        return encode(&output, ExportFormat::Lossy);
    };

    match loader::decode(mask_ref, request.token).await {
        Ok(mask) => {
            apply_mask(&mut output, &mask);
            encode(&output, ExportFormat::Lossless)
        }
        Err(CropError::Cancelled) => Err(CropError::Cancelled),
        Err(err) => {
            warn!("mask decode failed, exporting without mask: {err}");
            encode(&output, ExportFormat::Lossy)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::loader::Lifetime;
    use image::Rgba;

    fn gradient(width: u32, height: u32) -> DynamicImage {
        DynamicImage::ImageRgba8(RgbaImage::from_fn(width, height, |x, y| {
            Rgba([(x % 256) as u8, (y % 256) as u8, 128, 255])
        }))
    }

    fn png_ref(image: &RgbaImage) -> ImageRef {
        let mut bytes = Vec::new();
        image
            .write_to(&mut Cursor::new(&mut bytes), ImageFormat::Png)
            .unwrap();
        ImageRef::Bytes(bytes.into())
    }

    fn request(lifetime: &Lifetime, mask: Option<ImageRef>) -> ExportRequest {
        ExportRequest {
            frame: FrameCoords::new(10.0, 10.0, 100.0, 100.0),
            display: Arc::new(gradient(400, 400)),
            raster_screen: ScreenRect::new(0.0, 0.0, 200.0, 200.0),
            stage_screen: ScreenRect::new(0.0, 0.0, 200.0, 200.0),
            mask,
            token: lifetime.token(),
        }
    }

    #[test]
    fn maps_frame_through_scale() {
        let rect = map_to_native(
            &FrameCoords::new(10.0, 10.0, 100.0, 100.0),
            &ScreenRect::new(0.0, 0.0, 200.0, 200.0),
            &ScreenRect::new(0.0, 0.0, 200.0, 200.0),
            400,
        );
        assert_eq!(
            rect,
            NativeRect {
                x: 20,
                y: 20,
                width: 200,
                height: 200
            }
        );
    }

    #[test]
    fn maps_frame_through_canvas_offset() {
        let rect = map_to_native(
            &FrameCoords::new(30.0, 20.0, 100.0, 50.0),
            &ScreenRect::new(70.0, 60.0, 200.0, 100.0),
            &ScreenRect::new(50.0, 50.0, 300.0, 300.0),
            400,
        );
        assert_eq!(
            rect,
            NativeRect {
                x: 20,
                y: 20,
                width: 200,
                height: 100
            }
        );
    }

    #[test]
    fn extracts_source_pixels() {
        let src = gradient(400, 400);
        let rect = NativeRect {
            x: 20,
            y: 20,
            width: 200,
            height: 200,
        };
        let out = extract_region(&src, rect).unwrap();
        assert_eq!(out.dimensions(), (200, 200));
        assert_eq!(out.get_pixel(0, 0), &Rgba([20, 20, 128, 255]));
        assert_eq!(out.get_pixel(199, 199), &Rgba([219, 219, 128, 255]));
    }

    #[test]
    fn region_outside_raster_is_transparent() {
        let src = gradient(50, 50);
        let rect = NativeRect {
            x: -10,
            y: 40,
            width: 20,
            height: 20,
        };
        let out = extract_region(&src, rect).unwrap();
        assert_eq!(out.get_pixel(0, 0)[3], 0);
        assert_eq!(out.get_pixel(10, 0), &Rgba([0, 40, 128, 255]));
        assert_eq!(out.get_pixel(10, 15)[3], 0);
    }

    #[test]
    fn empty_region_is_rejected() {
        let rect = NativeRect {
            x: 0,
            y: 0,
            width: 0,
            height: 5,
        };
        assert!(matches!(
            extract_region(&gradient(4, 4), rect),
            Err(CropError::EmptyRegion { .. })
        ));
    }

    #[test]
    fn mask_keeps_only_opaque_area() {
        let mut out = RgbaImage::from_pixel(4, 2, Rgba([10, 20, 30, 255]));
        let mask = RgbaImage::from_fn(4, 2, |x, _| {
            Rgba([0, 0, 0, if x < 2 { 255 } else { 0 }])
        });
        apply_mask(&mut out, &DynamicImage::ImageRgba8(mask));
        assert_eq!(out.get_pixel(0, 0), &Rgba([10, 20, 30, 255]));
        assert_eq!(out.get_pixel(3, 1)[3], 0);
    }

    #[tokio::test]
    async fn unmasked_export_is_lossy() {
        let lifetime = Lifetime::new();
        let payload = export(request(&lifetime, None)).await.unwrap();
        assert_eq!(payload.format, ExportFormat::Lossy);
        assert_eq!((payload.width, payload.height), (200, 200));
        assert!(payload.data_uri.starts_with("data:image/jpeg;base64,"));

        let decoded = image::load_from_memory(&payload.to_bytes().unwrap()).unwrap();
        assert_eq!(decoded.dimensions(), (200, 200));
    }

    #[tokio::test]
    async fn masked_export_is_lossless_with_alpha() {
        let lifetime = Lifetime::new();
        let mask = RgbaImage::from_fn(10, 10, |x, _| {
            Rgba([255, 255, 255, if x < 5 { 255 } else { 0 }])
        });
        let payload = export(request(&lifetime, Some(png_ref(&mask))))
            .await
            .unwrap();
        assert_eq!(payload.format, ExportFormat::Lossless);
        assert!(payload.data_uri.starts_with("data:image/png;base64,"));

        let decoded = image::load_from_memory(&payload.to_bytes().unwrap())
            .unwrap()
            .to_rgba8();
        assert_eq!(decoded.dimensions(), (200, 200));
        assert_eq!(decoded.get_pixel(0, 0), &Rgba([20, 20, 128, 255]));
        assert_eq!(decoded.get_pixel(199, 0)[3], 0);
    }

    #[tokio::test]
    async fn failed_mask_falls_back_to_unmasked_export() {
        let lifetime = Lifetime::new();
        let broken = ImageRef::Bytes(b"not an image".to_vec().into());
        let fallback = export(request(&lifetime, Some(broken))).await.unwrap();
        let plain = export(request(&lifetime, None)).await.unwrap();
        assert_eq!(fallback, plain);
    }
}
