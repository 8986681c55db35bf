//! Image references, off-thread decoding and initial frame placement.

use std::path::PathBuf;
use std::str::FromStr;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use base64::{Engine as _, engine::general_purpose::STANDARD as BASE64};
use image::{DynamicImage, ImageReader};
use log::debug;

use crate::constant::MIN_FRAME_SIZE;
use crate::error::{CropError, Result};
use crate::geometry::{FrameCoords, Point, StageLayout};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ImageRef {
    Path(PathBuf),
    /// Raw bytes, typically the payload of a `data:` URI.
    Bytes(Arc<[u8]>),
}

impl ImageRef {
    /// Parses a `data:[<mime>][;base64],<payload>` URI.
    pub fn from_data_uri(uri: &str) -> Result<Self> {
        let rest = uri
            .strip_prefix("data:")
            .ok_or_else(|| CropError::InvalidDataUri("missing 'data:' prefix".into()))?;
        let (header, payload) = rest
            .split_once(',')
            .ok_or_else(|| CropError::InvalidDataUri("missing ',' separator".into()))?;

        let bytes = if header.ends_with(";base64") {
            BASE64
                .decode(payload.trim())
                .map_err(|e| CropError::InvalidDataUri(e.to_string()))?
        } else {
            payload.as_bytes().to_vec()
        };
        Ok(Self::Bytes(bytes.into()))
    }
}

impl FromStr for ImageRef {
    type Err = CropError;

    fn from_str(s: &str) -> Result<Self> {
        if s.starts_with("data:") {
            Self::from_data_uri(s)
        } else if s.starts_with("http://") || s.starts_with("https://") {
            Err(CropError::UnsupportedReference(s.to_string()))
        } else {
            Ok(Self::Path(PathBuf::from(s.strip_prefix("file://").unwrap_or(s))))
        }
    }
}

/// Owned by a widget; dropping it invalidates every token handed out.
#[derive(Debug)]
pub struct Lifetime(Arc<AtomicBool>);

impl Lifetime {
    pub fn new() -> Self {
        Self(Arc::new(AtomicBool::new(true)))
    }

    pub fn token(&self) -> LifetimeToken {
        LifetimeToken(Arc::clone(&self.0))
    }
}

impl Default for Lifetime {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for Lifetime {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

#[derive(Debug, Clone)]
pub struct LifetimeToken(Arc<AtomicBool>);

impl LifetimeToken {
    pub fn is_alive(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }
}

pub fn decode_blocking(reference: &ImageRef) -> Result<DynamicImage> {
    let image = match reference {
        ImageRef::Path(path) => ImageReader::open(path)
            .map_err(|source| CropError::Io {
                path: path.clone(),
                source,
            })?
            .with_guessed_format()
            .map_err(|source| CropError::Io {
                path: path.clone(),
                source,
            })?
            .decode()?,
        ImageRef::Bytes(bytes) => image::load_from_memory(bytes)?,
    };
    debug!("decoded {}x{} image", image.width(), image.height());
    Ok(image)
}

/// Decodes `reference` on a blocking task. Returns [`CropError::Cancelled`]
/// when the token's owner went away before the decode finished.
pub async fn decode(reference: ImageRef, token: LifetimeToken) -> Result<DynamicImage> {
    let result = tokio::task::spawn_blocking(move || decode_blocking(&reference))
        .await
        .map_err(|e| CropError::Task(e.to_string()))?;

    if !token.is_alive() {
        debug!("discarding decode result, owner dropped");
        return Err(CropError::Cancelled);
    }
    result
}

/// Initial crop frame: half the smaller display dimension wide, shaped to
/// `aspect_ratio`, centered on the display raster and kept inside the stage.
pub fn initial_frame(layout: &StageLayout, aspect_ratio: Option<f32>) -> FrameCoords {
    let raster = layout.raster;
    let base = raster.width.min(raster.height) * 0.5;

    let (mut sx, mut sy) = match aspect_ratio {
        Some(ratio) => (base, base / ratio),
        None => (base, base),
    };

    // Grow to the minimum, then shrink to the stage, keeping the shape
    let grow = (MIN_FRAME_SIZE / sx).max(MIN_FRAME_SIZE / sy).max(1.0);
    sx *= grow;
    sy *= grow;
    let shrink = (layout.stage.width / sx).min(layout.stage.height / sy).min(1.0);
    sx *= shrink;
    sy *= shrink;

    let Point { x: cx, y: cy } = raster.center();
    FrameCoords::new(cx - sx * 0.5, cy - sy * 0.5, sx, sy).clamped_to(layout.stage)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::constant::ASPECT_EPSILON;
    use crate::geometry::Size;
    use image::{ImageFormat, RgbaImage};
    use std::io::Cursor;

    fn png_bytes(width: u32, height: u32) -> Vec<u8> {
        let mut bytes = Vec::new();
        DynamicImage::ImageRgba8(RgbaImage::new(width, height))
            .write_to(&mut Cursor::new(&mut bytes), ImageFormat::Png)
            .unwrap();
        bytes
    }

    #[test]
    fn parses_reference_kinds() {
        assert_eq!(
            "photos/cat.png".parse::<ImageRef>().unwrap(),
            ImageRef::Path(PathBuf::from("photos/cat.png"))
        );
        assert_eq!(
            "file:///tmp/a.png".parse::<ImageRef>().unwrap(),
            ImageRef::Path(PathBuf::from("/tmp/a.png"))
        );
        assert!(matches!(
            "https://example.com/a.png".parse::<ImageRef>(),
            Err(CropError::UnsupportedReference(_))
        ));
        assert!(matches!(
            "data:image/png;base64".parse::<ImageRef>(),
            Err(CropError::InvalidDataUri(_))
        ));
    }

    #[test]
    fn decodes_base64_data_uri() {
        let uri = format!("data:image/png;base64,{}", BASE64.encode(png_bytes(7, 5)));
        let reference: ImageRef = uri.parse().unwrap();
        let image = decode_blocking(&reference).unwrap();
        assert_eq!((image.width(), image.height()), (7, 5));
    }

    #[test]
    fn missing_file_reports_path() {
        let err = decode_blocking(&ImageRef::Path("/nonexistent/x.png".into())).unwrap_err();
        assert!(matches!(err, CropError::Io { .. }));
    }

    #[tokio::test]
    async fn decode_after_owner_dropped_is_cancelled() {
        let lifetime = Lifetime::new();
        let token = lifetime.token();
        drop(lifetime);
        let result = decode(ImageRef::Bytes(png_bytes(2, 2).into()), token).await;
        assert!(matches!(result, Err(CropError::Cancelled)));
    }

    #[tokio::test]
    async fn decode_with_live_owner() {
        let lifetime = Lifetime::new();
        let image = decode(ImageRef::Bytes(png_bytes(3, 4).into()), lifetime.token())
            .await
            .unwrap();
        assert_eq!((image.width(), image.height()), (3, 4));
    }

    #[test]
    fn initial_frame_is_centered_half_size() {
        let layout = StageLayout::centered((800, 600), Size::new(800.0, 600.0));
        let frame = initial_frame(&layout, None);
        assert_eq!(frame, FrameCoords::new(250.0, 150.0, 300.0, 300.0));
    }

    #[test]
    fn initial_frame_follows_aspect_ratio_and_minimum() {
        let layout = StageLayout::centered((400, 300), Size::new(400.0, 300.0));
        let frame = initial_frame(&layout, Some(2.0));
        assert!((frame.sx / frame.sy - 2.0).abs() < ASPECT_EPSILON);
        assert!(frame.sy >= MIN_FRAME_SIZE - ASPECT_EPSILON);
        assert!(frame.right() <= 400.0 && frame.bottom() <= 300.0);
    }
}
