// Crop frame controller: idle or dragging one handle, driven by
// stage-relative pointer events.

use std::str::FromStr;

use log::debug;

use crate::constant::{HANDLE_TOLERANCE, MIN_FRAME_SIZE};
use crate::error::CropError;
use crate::geometry::{FrameCoords, Point, Size};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Handle {
    TopLeft,
    TopRight,
    BottomLeft,
    BottomRight,
    Top,
    Bottom,
    Left,
    Right,
    Move,
}

impl Handle {
    pub const ALL: [Handle; 9] = [
        Handle::TopLeft,
        Handle::TopRight,
        Handle::BottomLeft,
        Handle::BottomRight,
        Handle::Top,
        Handle::Bottom,
        Handle::Left,
        Handle::Right,
        Handle::Move,
    ];

    pub fn affects_left(self) -> bool {
        matches!(self, Handle::TopLeft | Handle::BottomLeft | Handle::Left)
    }

    pub fn affects_right(self) -> bool {
        matches!(self, Handle::TopRight | Handle::BottomRight | Handle::Right)
    }

    pub fn affects_top(self) -> bool {
        matches!(self, Handle::TopLeft | Handle::TopRight | Handle::Top)
    }

    pub fn affects_bottom(self) -> bool {
        matches!(self, Handle::BottomLeft | Handle::BottomRight | Handle::Bottom)
    }

    pub fn drives_width(self) -> bool {
        self.affects_left() || self.affects_right()
    }

    pub fn short_name(self) -> &'static str {
        match self {
            Handle::TopLeft => "tl",
            Handle::TopRight => "tr",
            Handle::BottomLeft => "bl",
            Handle::BottomRight => "br",
            Handle::Top => "t",
            Handle::Bottom => "b",
            Handle::Left => "l",
            Handle::Right => "r",
            Handle::Move => "move",
        }
    }

    /// Screen position of the handle on `frame`. `Move` maps to the center.
    pub fn anchor_on(self, frame: &FrameCoords) -> Point {
        let cx = frame.tx + frame.sx * 0.5;
        let cy = frame.ty + frame.sy * 0.5;
        match self {
            Handle::TopLeft => Point::new(frame.tx, frame.ty),
            Handle::TopRight => Point::new(frame.right(), frame.ty),
            Handle::BottomLeft => Point::new(frame.tx, frame.bottom()),
            Handle::BottomRight => Point::new(frame.right(), frame.bottom()),
            Handle::Top => Point::new(cx, frame.ty),
            Handle::Bottom => Point::new(cx, frame.bottom()),
            Handle::Left => Point::new(frame.tx, cy),
            Handle::Right => Point::new(frame.right(), cy),
            Handle::Move => Point::new(cx, cy),
        }
    }
}

impl FromStr for Handle {
    type Err = CropError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Handle::ALL
            .into_iter()
            .find(|h| h.short_name() == s)
            .ok_or_else(|| CropError::InvalidConfig(format!("unknown handle '{s}'")))
    }
}

impl std::fmt::Display for Handle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.short_name())
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct DragState {
    pub is_dragging: bool,
    pub drag_start: Point,
    pub active_handle: Option<Handle>,
}

#[derive(Clone, Debug)]
pub struct FrameController {
    frame: FrameCoords,
    drag: DragState,
    stage: Size,
    aspect_ratio: Option<f32>,
}

impl FrameController {
    pub fn new(frame: FrameCoords, stage: Size, aspect_ratio: Option<f32>) -> Self {
        Self {
            frame,
            drag: DragState::default(),
            stage,
            aspect_ratio,
        }
    }

    pub fn frame(&self) -> FrameCoords {
        self.frame
    }

    pub fn drag_state(&self) -> DragState {
        self.drag
    }

    pub fn stage(&self) -> Size {
        self.stage
    }

    pub fn aspect_ratio(&self) -> Option<f32> {
        self.aspect_ratio
    }

    pub fn is_dragging(&self) -> bool {
        self.drag.is_dragging
    }

    /// Finds the handle under `pos`: corners first, then edges, then the body.
    pub fn hit_test(pos: Point, frame: &FrameCoords) -> Option<Handle> {
        let corners = [
            Handle::TopLeft,
            Handle::TopRight,
            Handle::BottomLeft,
            Handle::BottomRight,
        ];
        if let Some(corner) = corners
            .into_iter()
            .find(|h| pos.distance(h.anchor_on(frame)) < HANDLE_TOLERANCE)
        {
            return Some(corner);
        }

        let within_y = pos.y > frame.ty && pos.y < frame.bottom();
        let within_x = pos.x > frame.tx && pos.x < frame.right();

        if (pos.x - frame.tx).abs() < HANDLE_TOLERANCE && within_y {
            return Some(Handle::Left);
        }
        if (pos.x - frame.right()).abs() < HANDLE_TOLERANCE && within_y {
            return Some(Handle::Right);
        }
        if (pos.y - frame.ty).abs() < HANDLE_TOLERANCE && within_x {
            return Some(Handle::Top);
        }
        if (pos.y - frame.bottom()).abs() < HANDLE_TOLERANCE && within_x {
            return Some(Handle::Bottom);
        }

        if frame.contains(pos) {
            return Some(Handle::Move);
        }

        None
    }

    pub fn pointer_down(&mut self, pos: Point) -> Option<Handle> {
        let handle = Self::hit_test(pos, &self.frame)?;
        self.begin_drag(handle, pos);
        Some(handle)
    }

    pub fn begin_drag(&mut self, handle: Handle, pos: Point) {
        debug!("drag start on '{handle}' at ({:.1}, {:.1})", pos.x, pos.y);
        self.drag = DragState {
            is_dragging: true,
            drag_start: pos,
            active_handle: Some(handle),
        };
    }

    /// Applies one pointer move. Returns `true` when the frame was updated.
    ///
    /// Deltas are measured from the previous move, not from the down point.
    /// Leaving the stage ends the drag.
    pub fn pointer_move(&mut self, pos: Point) -> bool {
        let Some(handle) = self.drag.active_handle.filter(|_| self.drag.is_dragging) else {
            return false;
        };
        if !self.stage.contains(pos) {
            self.pointer_leave();
            return false;
        }

        let dx = pos.x - self.drag.drag_start.x;
        let dy = pos.y - self.drag.drag_start.y;

        self.frame = match handle {
            Handle::Move => self.translate(dx, dy),
            _ => self.resize(handle, dx, dy),
        };
        self.drag.drag_start = pos;
        true
    }

    pub fn pointer_up(&mut self) {
        if self.drag.is_dragging {
            debug!("drag end, frame {:?}", self.frame);
        }
        self.drag = DragState::default();
    }

    pub fn pointer_leave(&mut self) {
        self.pointer_up();
    }

    /// Adopts a new stage size and reshapes the frame about its center so the
    /// ratio, the minimum size and the stage bounds still hold. A stage too
    /// small for the minimum wins over it.
    pub fn set_stage(&mut self, stage: Size) {
        self.stage = stage;
        self.frame = self.fitted(self.frame.center(), self.frame.sx, self.frame.sy);
    }

    pub fn set_aspect_ratio(&mut self, ratio: Option<f32>) {
        self.aspect_ratio = ratio;
        let Some(ratio) = ratio else {
            return;
        };

        // Preserve the major dimension
        let max_dim = self.frame.sx.max(self.frame.sy);
        let (w, h) = if ratio >= 1.0 {
            (max_dim, max_dim / ratio)
        } else {
            (max_dim * ratio, max_dim)
        };
        self.frame = self.fitted(self.frame.center(), w, h);
    }

    /// A `w` x `h` frame centered on `center`, grown to the minimum, capped by
    /// the stage and moved inside it. Under a ratio only `w` is used.
    fn fitted(&self, center: Point, w: f32, h: f32) -> FrameCoords {
        let stage = self.stage;
        let (w, h) = match self.aspect_ratio {
            Some(ratio) => {
                let (min_w, _) = min_size_for(ratio);
                let max_w = stage.width.min(stage.height * ratio);
                let w = w.max(min_w).min(max_w);
                (w, w / ratio)
            }
            None => (
                w.max(MIN_FRAME_SIZE).min(stage.width),
                h.max(MIN_FRAME_SIZE).min(stage.height),
            ),
        };
        FrameCoords::new(center.x - w * 0.5, center.y - h * 0.5, w, h).clamped_to(stage)
    }

    fn translate(&self, dx: f32, dy: f32) -> FrameCoords {
        let f = self.frame;
        FrameCoords {
            tx: (f.tx + dx).max(0.0).min(self.stage.width - f.sx),
            ty: (f.ty + dy).max(0.0).min(self.stage.height - f.sy),
            ..f
        }
    }

    fn resize(&self, handle: Handle, dx: f32, dy: f32) -> FrameCoords {
        let stage = self.stage;
        let mut f = self.frame;

        if handle.affects_right() {
            f.sx = (f.sx + dx).max(MIN_FRAME_SIZE).min(stage.width - f.tx);
        }
        if handle.affects_left() {
            let right = f.right();
            let left = (f.tx + dx).min(right - MIN_FRAME_SIZE).max(0.0);
            f.sx = right - left;
            f.tx = left;
        }
        if handle.affects_bottom() {
            f.sy = (f.sy + dy).max(MIN_FRAME_SIZE).min(stage.height - f.ty);
        }
        if handle.affects_top() {
            let bottom = f.bottom();
            let top = (f.ty + dy).min(bottom - MIN_FRAME_SIZE).max(0.0);
            f.sy = bottom - top;
            f.ty = top;
        }

        match self.aspect_ratio {
            Some(ratio) => self.constrain_aspect(f, handle, ratio),
            None => f,
        }
    }

    /// Derives the passive dimension from the driving one. The driving
    /// dimension is clamped first so the derived one keeps both the minimum
    /// size and the stage bounds. Edges opposite the handle stay put.
    fn constrain_aspect(&self, proposed: FrameCoords, handle: Handle, ratio: f32) -> FrameCoords {
        let original = self.frame;

        let avail_w = if handle.affects_left() {
            original.right()
        } else {
            self.stage.width - original.tx
        };
        let avail_h = if handle.affects_top() {
            original.bottom()
        } else {
            self.stage.height - original.ty
        };

        let (min_w, min_h) = min_size_for(ratio);
        let (sx, sy) = if handle.drives_width() {
            let sx = proposed.sx.max(min_w).min(avail_w.min(avail_h * ratio));
            (sx, sx / ratio)
        } else {
            let sy = proposed.sy.max(min_h).min(avail_h.min(avail_w / ratio));
            (sy * ratio, sy)
        };

        let tx = if handle.affects_left() {
            original.right() - sx
        } else {
            original.tx
        };
        let ty = if handle.affects_top() {
            original.bottom() - sy
        } else {
            original.ty
        };

        FrameCoords { tx, ty, sx, sy }
    }
}

/// Smallest `(width, height)` that keeps both sides at the minimum under `ratio`.
pub fn min_size_for(ratio: f32) -> (f32, f32) {
    let w = MIN_FRAME_SIZE.max(MIN_FRAME_SIZE * ratio);
    (w, w / ratio)
}
