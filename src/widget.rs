// One crop widget instance: rasters, rotation, stage layout and frame
// controller. Async results carry a lifetime token and are dropped once the
// widget is gone.

use std::sync::Arc;

use image::{DynamicImage, GenericImageView};
use log::{debug, error, info, warn};

use crate::config::CropperConfig;
use crate::error::{CropError, Result};
use crate::export::{self, ExportPayload, ExportRequest};
use crate::frame::{FrameController, Handle};
use crate::geometry::{FrameCoords, Point, ScreenRect, Size, StageLayout};
use crate::loader::{self, ImageRef, Lifetime, LifetimeToken, initial_frame};
use crate::rotation::{Rotation, render_rotated};

pub type ChangeCallback = Box<dyn FnMut(&ExportPayload) + Send>;

pub struct CropWidget {
    config: CropperConfig,
    available: Size,
    rotation: Rotation,
    source: Option<DynamicImage>,
    display: Option<Arc<DynamicImage>>,
    outline: Option<DynamicImage>,
    layout: Option<StageLayout>,
    controller: Option<FrameController>,
    on_change: Option<ChangeCallback>,
    lifetime: Lifetime,
}

impl CropWidget {
    pub fn new(config: CropperConfig, available: Size) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            config,
            available,
            rotation: Rotation::default(),
            source: None,
            display: None,
            outline: None,
            layout: None,
            controller: None,
            on_change: None,
            lifetime: Lifetime::new(),
        })
    }

    pub fn config(&self) -> &CropperConfig {
        &self.config
    }

    pub fn token(&self) -> LifetimeToken {
        self.lifetime.token()
    }

    pub fn set_on_change(&mut self, callback: impl FnMut(&ExportPayload) + Send + 'static) {
        self.on_change = Some(Box::new(callback));
    }

    pub fn stage(&self) -> Size {
        self.available.capped(self.config.max_size)
    }

    pub fn is_ready(&self) -> bool {
        self.display.is_some() && self.controller.is_some()
    }

    pub fn rotation(&self) -> Rotation {
        self.rotation
    }

    pub fn layout(&self) -> Option<&StageLayout> {
        self.layout.as_ref()
    }

    pub fn display(&self) -> Option<&Arc<DynamicImage>> {
        self.display.as_ref()
    }

    pub fn outline(&self) -> Option<&DynamicImage> {
        self.outline.as_ref()
    }

    pub fn frame(&self) -> Option<FrameCoords> {
        self.controller.as_ref().map(FrameController::frame)
    }

    pub fn active_handle(&self) -> Option<Handle> {
        self.controller
            .as_ref()
            .and_then(|c| c.drag_state().active_handle)
    }

    /// Decodes the configured source and outline, then initializes the
    /// frame. Returns whether the widget became ready.
    pub async fn load(&mut self) -> bool {
        let source = loader::decode(self.config.src.clone(), self.token()).await;
        self.apply_source(source);

        if let Some(outline) = self.config.outline_src.clone() {
            let outline = loader::decode(outline, self.token()).await;
            self.apply_outline(outline);
        }
        self.is_ready()
    }

    pub fn set_source(&mut self, src: ImageRef) {
        self.config.src = src;
        self.rotation = Rotation::default();
        self.source = None;
        self.display = None;
        self.layout = None;
        self.controller = None;
    }

    /// Installs a decoded source raster and places the initial frame.
    /// A failed decode leaves the widget non-interactive.
    pub fn apply_source(&mut self, decoded: Result<DynamicImage>) {
        match decoded {
            Ok(image) => {
                info!("loaded {}x{} source image", image.width(), image.height());
                self.source = Some(image);
                self.render_display();

                if let Some(layout) = self.layout {
                    let aspect = self.config.aspect_ratio;
                    let frame = initial_frame(&layout, aspect);
                    debug!("initial frame {frame:?}");
                    self.controller = Some(FrameController::new(frame, layout.stage, aspect));
                }
            }
            Err(CropError::Cancelled) => debug!("source decode cancelled"),
            Err(err) => error!("failed to load source image: {err}"),
        }
    }

    pub fn apply_outline(&mut self, decoded: Result<DynamicImage>) {
        match decoded {
            Ok(image) => self.outline = Some(image),
            Err(CropError::Cancelled) => {}
            Err(err) => warn!("failed to load outline image: {err}"),
        }
    }

    pub fn rotate_left(&mut self) {
        self.set_rotation(self.rotation.rotate_left());
    }

    pub fn rotate_right(&mut self) {
        self.set_rotation(self.rotation.rotate_right());
    }

    /// Re-renders the display raster. The crop frame keeps its coordinates.
    pub fn set_rotation(&mut self, rotation: Rotation) {
        if rotation == self.rotation {
            return;
        }
        debug!("rotation {} -> {}", self.rotation, rotation);
        self.rotation = rotation;
        self.render_display();
    }

    pub fn set_aspect_ratio(&mut self, ratio: Option<f32>) {
        self.config.aspect_ratio = ratio;
        if let Some(controller) = self.controller.as_mut() {
            controller.set_aspect_ratio(ratio);
        }
    }

    pub fn resize_stage(&mut self, available: Size) {
        if available == self.available {
            return;
        }
        self.available = available;
        let stage = self.stage();
        if let Some(display) = &self.display {
            self.layout = Some(StageLayout::centered(display.dimensions(), stage));
        }
        if let Some(controller) = self.controller.as_mut() {
            controller.set_stage(stage);
        }
    }

    fn render_display(&mut self) {
        let Some(source) = &self.source else {
            return;
        };
        let display = render_rotated(source, self.rotation);
        self.layout = Some(StageLayout::centered(display.dimensions(), self.stage()));
        self.display = Some(Arc::new(display));
    }

    pub fn pointer_down(&mut self, pos: Point) -> Option<Handle> {
        self.controller.as_mut()?.pointer_down(pos)
    }

    pub fn begin_drag(&mut self, handle: Handle, pos: Point) {
        if let Some(controller) = self.controller.as_mut() {
            controller.begin_drag(handle, pos);
        }
    }

    pub fn pointer_move(&mut self, pos: Point) -> bool {
        self.controller
            .as_mut()
            .is_some_and(|c| c.pointer_move(pos))
    }

    pub fn pointer_up(&mut self) {
        if let Some(controller) = self.controller.as_mut() {
            controller.pointer_up();
        }
    }

    pub fn pointer_leave(&mut self) {
        if let Some(controller) = self.controller.as_mut() {
            controller.pointer_leave();
        }
    }

    pub fn export_request(&self) -> Result<ExportRequest> {
        let (Some(display), Some(layout), Some(controller)) =
            (&self.display, &self.layout, &self.controller)
        else {
            return Err(CropError::NotReady);
        };

        Ok(ExportRequest {
            frame: controller.frame(),
            display: Arc::clone(display),
            raster_screen: layout.raster,
            stage_screen: ScreenRect::new(0.0, 0.0, layout.stage.width, layout.stage.height),
            mask: self.config.mask_src.clone(),
            token: self.token(),
        })
    }

    /// Hands a finished export to the change callback. Failures are logged,
    /// never forwarded.
    pub fn deliver(&mut self, result: Result<ExportPayload>) -> Option<ExportPayload> {
        match result {
            Ok(payload) => {
                info!(
                    "exported {}x{} {}",
                    payload.width,
                    payload.height,
                    payload.format.mime()
                );
                if let Some(on_change) = self.on_change.as_mut() {
                    on_change(&payload);
                }
                Some(payload)
            }
            Err(CropError::Cancelled) => None,
            Err(CropError::NotReady) => {
                debug!("export requested before image was ready");
                None
            }
            Err(err) => {
                error!("export failed: {err}");
                None
            }
        }
    }

    /// Exports the framed region and notifies the change callback.
    pub async fn commit(&mut self) -> Option<ExportPayload> {
        let result = match self.export_request() {
            Ok(request) => export::export(request).await,
            Err(err) => Err(err),
        };
        self.deliver(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::constant::MIN_FRAME_SIZE;
    use crate::export::ExportFormat;
    use image::{ImageFormat, Rgba, RgbaImage};
    use std::io::Cursor;
    use std::sync::Mutex;

    fn png_ref(width: u32, height: u32) -> ImageRef {
        let img = RgbaImage::from_fn(width, height, |x, y| {
            Rgba([(x % 256) as u8, (y % 256) as u8, 0, 255])
        });
        let mut bytes = Vec::new();
        img.write_to(&mut Cursor::new(&mut bytes), ImageFormat::Png)
            .unwrap();
        ImageRef::Bytes(bytes.into())
    }

    async fn loaded(config: CropperConfig, available: Size) -> CropWidget {
        let mut widget = CropWidget::new(config, available).unwrap();
        assert!(widget.load().await);
        widget
    }

    #[tokio::test]
    async fn load_places_centered_frame() {
        let widget = loaded(CropperConfig::new(png_ref(400, 400)), Size::new(200.0, 200.0)).await;
        assert_eq!(
            widget.layout().unwrap().raster,
            ScreenRect::new(0.0, 0.0, 200.0, 200.0)
        );
        assert_eq!(widget.frame(), Some(FrameCoords::new(50.0, 50.0, 100.0, 100.0)));
    }

    #[tokio::test]
    async fn failed_load_stays_not_ready() {
        let config = CropperConfig::new(ImageRef::Bytes(b"garbage".to_vec().into()));
        let mut widget = CropWidget::new(config, Size::new(200.0, 200.0)).unwrap();
        assert!(!widget.load().await);
        assert_eq!(widget.pointer_down(Point::new(100.0, 100.0)), None);
        assert!(matches!(widget.export_request(), Err(CropError::NotReady)));
        assert!(widget.commit().await.is_none());
    }

    #[tokio::test]
    async fn max_size_caps_stage() {
        let config = CropperConfig::new(png_ref(400, 200)).with_max_size(300.0);
        let widget = loaded(config, Size::new(1000.0, 1000.0)).await;
        assert_eq!(widget.stage(), Size::new(300.0, 300.0));
        assert_eq!(
            widget.layout().unwrap().raster,
            ScreenRect::new(0.0, 75.0, 300.0, 150.0)
        );
    }

    #[tokio::test]
    async fn rotation_rerenders_display_but_keeps_frame() {
        let mut widget = loaded(CropperConfig::new(png_ref(400, 200)), Size::new(400.0, 400.0)).await;
        let frame = widget.frame();

        widget.rotate_right();
        assert_eq!(widget.rotation().degrees(), 90);
        assert_eq!(widget.display().unwrap().dimensions(), (200, 400));
        assert_eq!(widget.frame(), frame);

        widget.rotate_left();
        widget.rotate_left();
        assert_eq!(widget.rotation().degrees(), 270);
        widget.set_rotation(Rotation::new(360));
        assert_eq!(widget.display().unwrap().dimensions(), (400, 200));
    }

    #[tokio::test]
    async fn commit_notifies_change_callback() {
        let mut widget = loaded(CropperConfig::new(png_ref(400, 400)), Size::new(200.0, 200.0)).await;
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        widget.set_on_change(move |payload| sink.lock().unwrap().push(payload.clone()));

        // Drag the frame to (10, 10)
        widget.begin_drag(Handle::Move, Point::new(100.0, 100.0));
        assert!(widget.pointer_move(Point::new(60.0, 60.0)));
        widget.pointer_up();
        assert_eq!(widget.frame(), Some(FrameCoords::new(10.0, 10.0, 100.0, 100.0)));

        let payload = widget.commit().await.unwrap();
        assert_eq!(payload.format, ExportFormat::Lossy);
        assert_eq!((payload.width, payload.height), (200, 200));
        assert_eq!(seen.lock().unwrap().as_slice(), &[payload]);
    }

    #[tokio::test]
    async fn mask_switches_to_lossless() {
        let config = CropperConfig::new(png_ref(300, 300)).with_mask(png_ref(10, 10));
        let mut widget = loaded(config, Size::new(300.0, 300.0)).await;
        let payload = widget.commit().await.unwrap();
        assert_eq!(payload.format, ExportFormat::Lossless);
    }

    #[tokio::test]
    async fn outline_is_loaded_alongside() {
        let config = CropperConfig::new(png_ref(300, 300)).with_outline(png_ref(20, 30));
        let widget = loaded(config, Size::new(300.0, 300.0)).await;
        assert_eq!(widget.outline().unwrap().dimensions(), (20, 30));
    }

    #[tokio::test]
    async fn resize_stage_reclamps_frame() {
        let mut widget = loaded(CropperConfig::new(png_ref(400, 400)), Size::new(400.0, 400.0)).await;
        widget.begin_drag(Handle::Move, Point::new(200.0, 200.0));
        widget.pointer_move(Point::new(350.0, 350.0));
        widget.pointer_up();

        widget.resize_stage(Size::new(250.0, 250.0));
        assert_eq!(widget.frame(), Some(FrameCoords::new(50.0, 50.0, 200.0, 200.0)));
        assert_eq!(
            widget.layout().unwrap().raster,
            ScreenRect::new(0.0, 0.0, 250.0, 250.0)
        );
    }

    #[tokio::test]
    async fn resize_stage_keeps_aspect_ratio() {
        let config = CropperConfig::new(png_ref(400, 400)).with_aspect_ratio(1.0);
        let mut widget = loaded(config, Size::new(400.0, 400.0)).await;

        widget.resize_stage(Size::new(400.0, 150.0));
        let frame = widget.frame().unwrap();
        assert_eq!(frame.sx, frame.sy);
        assert!(frame.sy >= MIN_FRAME_SIZE && frame.bottom() <= 150.0);
    }

    #[test]
    fn invalid_config_is_rejected() {
        let config = CropperConfig::new(png_ref(4, 4)).with_aspect_ratio(-2.0);
        assert!(matches!(
            CropWidget::new(config, Size::new(100.0, 100.0)),
            Err(CropError::InvalidConfig(_))
        ));
    }
}
