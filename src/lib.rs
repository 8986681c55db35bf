//! Aspect-constrained image crop widget core.
//!
//! The widget shows a raster inside a stage, lets the user drag and resize a
//! crop frame over it, optionally rotates the raster, and exports the framed
//! pixels as an embedded-data URI.

pub mod config;
pub mod constant;
pub mod error;
pub mod export;
pub mod frame;
pub mod geometry;
pub mod loader;
pub mod rotation;
pub mod widget;

pub use config::CropperConfig;
pub use error::{CropError, Result};
pub use export::{ExportFormat, ExportPayload};
pub use frame::{FrameController, Handle};
pub use geometry::{FrameCoords, Point, ScreenRect, Size};
pub use loader::ImageRef;
pub use rotation::Rotation;
pub use widget::CropWidget;
