// Constants shared by the crop frame, transform and export stages.

// Smallest frame width or height, screen pixels
pub const MIN_FRAME_SIZE: f32 = 100.0;

pub const ROTATION_STEP: u16 = 90;

pub const FULL_ROTATION: u16 = 360;

// Pointer grab radius around a handle
pub const HANDLE_TOLERANCE: f32 = 10.0;

pub const JPEG_QUALITY: u8 = 92;

pub const ASPECT_EPSILON: f32 = 1e-3;
