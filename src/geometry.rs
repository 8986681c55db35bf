// Screen-space values are f32 logical pixels; frame coordinates are
// stage-relative.

#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Point {
    pub x: f32,
    pub y: f32,
}

impl Point {
    pub fn new(x: f32, y: f32) -> Self {
        Self { x, y }
    }

    pub fn distance(self, other: Point) -> f32 {
        ((self.x - other.x).powi(2) + (self.y - other.y).powi(2)).sqrt()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Size {
    pub width: f32,
    pub height: f32,
}

impl Size {
    pub fn new(width: f32, height: f32) -> Self {
        Self { width, height }
    }

    pub fn capped(self, max: Option<f32>) -> Self {
        match max {
            Some(max) => Self::new(self.width.min(max), self.height.min(max)),
            None => self,
        }
    }

    pub fn contains(self, p: Point) -> bool {
        p.x >= 0.0 && p.y >= 0.0 && p.x <= self.width && p.y <= self.height
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct ScreenRect {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
}

impl ScreenRect {
    pub fn new(x: f32, y: f32, width: f32, height: f32) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    pub fn from_min_size(min: Point, size: Size) -> Self {
        Self::new(min.x, min.y, size.width, size.height)
    }

    pub fn center(&self) -> Point {
        Point::new(self.x + self.width * 0.5, self.y + self.height * 0.5)
    }
}

/// Top-left offset and size of the crop rectangle, stage-relative.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct FrameCoords {
    pub tx: f32,
    pub ty: f32,
    pub sx: f32,
    pub sy: f32,
}

impl FrameCoords {
    pub fn new(tx: f32, ty: f32, sx: f32, sy: f32) -> Self {
        Self { tx, ty, sx, sy }
    }

    pub fn right(&self) -> f32 {
        self.tx + self.sx
    }

    pub fn bottom(&self) -> f32 {
        self.ty + self.sy
    }

    pub fn center(&self) -> Point {
        Point::new(self.tx + self.sx * 0.5, self.ty + self.sy * 0.5)
    }

    pub fn contains(&self, p: Point) -> bool {
        p.x >= self.tx && p.x <= self.right() && p.y >= self.ty && p.y <= self.bottom()
    }

    pub fn as_rect(&self) -> ScreenRect {
        ScreenRect::new(self.tx, self.ty, self.sx, self.sy)
    }

    /// Moves the frame back inside `stage`, shrinking it only when it is
    /// larger than the stage itself.
    pub fn clamped_to(self, stage: Size) -> Self {
        let sx = self.sx.min(stage.width);
        let sy = self.sy.min(stage.height);
        let tx = self.tx.max(0.0).min(stage.width - sx);
        let ty = self.ty.max(0.0).min(stage.height - sy);
        Self { tx, ty, sx, sy }
    }
}

/// Largest size with the aspect ratio of `native` that fits inside `stage`.
pub fn fit_display_size(native: (u32, u32), stage: Size) -> Size {
    let (w, h) = (native.0.max(1) as f32, native.1.max(1) as f32);
    let scale = (stage.width / w).min(stage.height / h);
    Size::new(w * scale, h * scale)
}

/// Where the display raster sits inside the stage.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct StageLayout {
    pub stage: Size,
    /// Display raster bounds, stage-relative.
    pub raster: ScreenRect,
}

impl StageLayout {
    /// Fits a raster of `native` pixels into `stage`, centered.
    pub fn centered(native: (u32, u32), stage: Size) -> Self {
        let display = fit_display_size(native, stage);
        let min = Point::new(
            ((stage.width - display.width) * 0.5).max(0.0),
            ((stage.height - display.height) * 0.5).max(0.0),
        );
        Self {
            stage,
            raster: ScreenRect::from_min_size(min, display),
        }
    }
}
