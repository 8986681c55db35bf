// Widget configuration supplied by the host.

use crate::error::{CropError, Result};
use crate::loader::ImageRef;

#[derive(Debug, Clone, PartialEq)]
pub struct CropperConfig {
    pub src: ImageRef,
    pub aspect_ratio: Option<f32>,
    /// Guide image drawn over the crop frame; never exported.
    pub outline_src: Option<ImageRef>,
    pub mask_src: Option<ImageRef>,
    /// Upper bound for both stage dimensions, in screen pixels.
    pub max_size: Option<f32>,
}

impl CropperConfig {
    pub fn new(src: ImageRef) -> Self {
        Self {
            src,
            aspect_ratio: None,
            outline_src: None,
            mask_src: None,
            max_size: None,
        }
    }

    pub fn with_aspect_ratio(mut self, ratio: f32) -> Self {
        self.aspect_ratio = Some(ratio);
        self
    }

    pub fn with_outline(mut self, outline: ImageRef) -> Self {
        self.outline_src = Some(outline);
        self
    }

    pub fn with_mask(mut self, mask: ImageRef) -> Self {
        self.mask_src = Some(mask);
        self
    }

    pub fn with_max_size(mut self, max_size: f32) -> Self {
        self.max_size = Some(max_size);
        self
    }

    pub fn validate(&self) -> Result<()> {
        for (name, value) in [
            ("aspect_ratio", self.aspect_ratio),
            ("max_size", self.max_size),
        ] {
            if let Some(v) = value.filter(|v| !(v.is_finite() && *v > 0.0)) {
                return Err(CropError::InvalidConfig(format!(
                    "{name} must be a positive number, got {v}"
                )));
            }
        }
        Ok(())
    }
}
