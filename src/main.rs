#![cfg_attr(not(debug_assertions), windows_subsystem = "windows")] // hide console window on Windows in release

use std::path::{Path, PathBuf};
use std::sync::mpsc;

use clap::Parser;
use cropframe::export::{self, ExportPayload};
use cropframe::frame::Handle;
use cropframe::loader;
use cropframe::{CropWidget, CropperConfig, ImageRef, Point, Rotation, ScreenRect, Size};
use eframe::egui;
use image::DynamicImage;
use log::{error, info, warn};

#[derive(Parser, Debug)]
#[command(version, about = "Crop an image with an aspect-constrained frame")]
struct Cli {
    /// Image path or data URI
    src: ImageRef,

    /// Fixed width/height ratio of the crop frame
    #[arg(long)]
    aspect_ratio: Option<f32>,

    /// Guide image drawn over the crop frame
    #[arg(long)]
    outline: Option<ImageRef>,

    /// Image whose alpha channel restricts the exported pixels
    #[arg(long)]
    mask: Option<ImageRef>,

    /// Upper bound for the stage width and height
    #[arg(long)]
    max_size: Option<f32>,

    /// Write the export here instead of asking for a path
    #[arg(long, short)]
    output: Option<PathBuf>,
}

#[derive(Clone, Copy, Debug, PartialEq)]
enum AspectRatioMode {
    Free,
    Fixed(f32),
    Original,
    Square,
    // Landscape
    R3_2,
    R4_3,
    R16_9,
    R16_10,
    // Portrait
    R2_3,
    R3_4,
    R9_16,
    R10_16,
    Custom,
}

impl AspectRatioMode {
    const LANDSCAPE: [AspectRatioMode; 4] = [
        AspectRatioMode::R3_2,
        AspectRatioMode::R4_3,
        AspectRatioMode::R16_9,
        AspectRatioMode::R16_10,
    ];
    const PORTRAIT: [AspectRatioMode; 4] = [
        AspectRatioMode::R2_3,
        AspectRatioMode::R3_4,
        AspectRatioMode::R9_16,
        AspectRatioMode::R10_16,
    ];

    fn counterpart(self) -> Self {
        match self {
            AspectRatioMode::R3_2 => AspectRatioMode::R2_3,
            AspectRatioMode::R4_3 => AspectRatioMode::R3_4,
            AspectRatioMode::R16_9 => AspectRatioMode::R9_16,
            AspectRatioMode::R16_10 => AspectRatioMode::R10_16,
            AspectRatioMode::R2_3 => AspectRatioMode::R3_2,
            AspectRatioMode::R3_4 => AspectRatioMode::R4_3,
            AspectRatioMode::R9_16 => AspectRatioMode::R16_9,
            AspectRatioMode::R10_16 => AspectRatioMode::R16_10,
            AspectRatioMode::Fixed(r) => AspectRatioMode::Fixed(1.0 / r),
            other => other,
        }
    }

    fn ratio(self, display: Option<&DynamicImage>, custom: (u32, u32)) -> Option<f32> {
        match self {
            AspectRatioMode::Free => None,
            AspectRatioMode::Fixed(r) => Some(r),
            AspectRatioMode::Original => display.map(|d| d.width() as f32 / d.height() as f32),
            AspectRatioMode::Square => Some(1.0),
            AspectRatioMode::R3_2 => Some(3.0 / 2.0),
            AspectRatioMode::R4_3 => Some(4.0 / 3.0),
            AspectRatioMode::R16_9 => Some(16.0 / 9.0),
            AspectRatioMode::R16_10 => Some(16.0 / 10.0),
            AspectRatioMode::R2_3 => Some(2.0 / 3.0),
            AspectRatioMode::R3_4 => Some(3.0 / 4.0),
            AspectRatioMode::R9_16 => Some(9.0 / 16.0),
            AspectRatioMode::R10_16 => Some(10.0 / 16.0),
            AspectRatioMode::Custom => Some(custom.0 as f32 / custom.1 as f32),
        }
    }
}

impl std::fmt::Display for AspectRatioMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AspectRatioMode::Fixed(r) => write!(f, "{r:.2}:1"),
            AspectRatioMode::Free => f.write_str("Free"),
            AspectRatioMode::Original => f.write_str("Original"),
            AspectRatioMode::Square => f.write_str("1:1"),
            AspectRatioMode::R3_2 => f.write_str("3:2"),
            AspectRatioMode::R4_3 => f.write_str("4:3"),
            AspectRatioMode::R16_9 => f.write_str("16:9"),
            AspectRatioMode::R16_10 => f.write_str("16:10"),
            AspectRatioMode::R2_3 => f.write_str("2:3"),
            AspectRatioMode::R3_4 => f.write_str("3:4"),
            AspectRatioMode::R9_16 => f.write_str("9:16"),
            AspectRatioMode::R10_16 => f.write_str("10:16"),
            AspectRatioMode::Custom => f.write_str("Custom"),
        }
    }
}

enum AppEvent {
    Source(u64, cropframe::Result<DynamicImage>),
    Outline(u64, cropframe::Result<DynamicImage>),
    Exported(cropframe::Result<ExportPayload>),
}

struct CropperApp {
    widget: CropWidget,
    runtime: tokio::runtime::Runtime,
    events_tx: mpsc::Sender<AppEvent>,
    events_rx: mpsc::Receiver<AppEvent>,
    generation: u64,
    started: bool,
    exporting: bool,
    texture: Option<egui::TextureHandle>,
    outline_texture: Option<egui::TextureHandle>,
    texture_dirty: bool,
    aspect_ratio_mode: AspectRatioMode,
    custom_w: u32,
    custom_h: u32,
    is_portrait: bool,
    slider_degrees: i32,
}

impl CropperApp {
    fn new(
        config: CropperConfig,
        output: Option<PathBuf>,
        runtime: tokio::runtime::Runtime,
    ) -> cropframe::Result<Self> {
        let aspect_ratio_mode = config
            .aspect_ratio
            .map_or(AspectRatioMode::Free, AspectRatioMode::Fixed);
        let is_portrait = config.aspect_ratio.is_some_and(|r| r < 1.0);
        let mut widget = CropWidget::new(config, Size::new(800.0, 600.0))?;
        widget.set_on_change(move |payload| save_payload(payload, output.as_deref()));

        let (events_tx, events_rx) = mpsc::channel();
        Ok(Self {
            widget,
            runtime,
            events_tx,
            events_rx,
            generation: 0,
            started: false,
            exporting: false,
            texture: None,
            outline_texture: None,
            texture_dirty: false,
            aspect_ratio_mode,
            custom_w: 4,
            custom_h: 3,
            is_portrait,
            slider_degrees: 0,
        })
    }

    fn spawn_load(&mut self, ctx: &egui::Context) {
        self.generation += 1;
        let generation = self.generation;
        let config = self.widget.config().clone();

        let tx = self.events_tx.clone();
        let token = self.widget.token();
        let ctx = ctx.clone();
        self.runtime.spawn(async move {
            let source = loader::decode(config.src, token.clone()).await;
            let _ = tx.send(AppEvent::Source(generation, source));
            if let Some(outline) = config.outline_src {
                let outline = loader::decode(outline, token).await;
                let _ = tx.send(AppEvent::Outline(generation, outline));
            }
            ctx.request_repaint();
        });
    }

    fn open(&mut self, ctx: &egui::Context, path: PathBuf) {
        info!("opening {}", path.display());
        self.widget.set_source(ImageRef::Path(path));
        self.texture = None;
        self.slider_degrees = 0;
        self.spawn_load(ctx);
    }

    fn spawn_export(&mut self, ctx: &egui::Context) {
        let request = match self.widget.export_request() {
            Ok(request) => request,
            Err(e) => {
                warn!("Nothing to export: {e}");
                return;
            }
        };
        self.exporting = true;
        let tx = self.events_tx.clone();
        let ctx = ctx.clone();
        self.runtime.spawn(async move {
            let _ = tx.send(AppEvent::Exported(export::export(request).await));
            ctx.request_repaint();
        });
    }

    fn drain_events(&mut self) {
        while let Ok(event) = self.events_rx.try_recv() {
            match event {
                AppEvent::Source(generation, result) if generation == self.generation => {
                    self.widget.apply_source(result);
                    self.texture_dirty = true;
                    if let Some(ratio) = self.current_ratio() {
                        self.widget.set_aspect_ratio(Some(ratio));
                    }
                }
                AppEvent::Outline(generation, result) if generation == self.generation => {
                    self.widget.apply_outline(result);
                    self.outline_texture = None;
                }
                AppEvent::Source(..) | AppEvent::Outline(..) => {}
                AppEvent::Exported(result) => {
                    self.exporting = false;
                    self.widget.deliver(result);
                }
            }
        }
    }

    fn current_ratio(&self) -> Option<f32> {
        let display = self.widget.display().cloned();
        self.aspect_ratio_mode
            .ratio(display.as_deref(), (self.custom_w, self.custom_h))
    }

    fn load_textures(&mut self, ctx: &egui::Context) {
        if self.texture_dirty {
            self.texture = self.widget.display().map(|d| upload(ctx, "image", d));
            self.texture_dirty = false;
        }
        if self.outline_texture.is_none() {
            self.outline_texture = self.widget.outline().map(|o| upload(ctx, "outline", o));
        }
    }

    fn controls(&mut self, ui: &mut egui::Ui, ctx: &egui::Context) {
        ui.horizontal(|ui| {
            if ui.button("Open Image").clicked() {
                if let Some(path) = rfd::FileDialog::new()
                    .add_filter("Image", &["png", "jpg", "jpeg", "bmp", "webp"])
                    .pick_file()
                {
                    self.open(ctx, path);
                }
            }

            if !self.widget.is_ready() {
                return;
            }

            ui.label("Aspect Ratio:");
            let mut changed = false;
            egui::ComboBox::from_id_salt("params_aspect_ratio")
                .selected_text(self.aspect_ratio_mode.to_string())
                .show_ui(ui, |ui| {
                    let mut option = |ui: &mut egui::Ui, mode: AspectRatioMode| {
                        changed |= ui
                            .selectable_value(&mut self.aspect_ratio_mode, mode, mode.to_string())
                            .changed();
                    };
                    for mode in [
                        AspectRatioMode::Free,
                        AspectRatioMode::Original,
                        AspectRatioMode::Square,
                    ] {
                        option(ui, mode);
                    }

                    ui.separator();
                    let oriented = if self.is_portrait {
                        AspectRatioMode::PORTRAIT
                    } else {
                        AspectRatioMode::LANDSCAPE
                    };
                    for mode in oriented {
                        option(ui, mode);
                    }

                    ui.separator();
                    option(ui, AspectRatioMode::Custom);
                });

            if ui.button("🔄").clicked() {
                self.is_portrait = !self.is_portrait;
                if self.aspect_ratio_mode == AspectRatioMode::Custom {
                    std::mem::swap(&mut self.custom_w, &mut self.custom_h);
                } else {
                    self.aspect_ratio_mode = self.aspect_ratio_mode.counterpart();
                }
                changed = true;
            }

            if self.aspect_ratio_mode == AspectRatioMode::Custom {
                changed |= ui
                    .add(
                        egui::DragValue::new(&mut self.custom_w)
                            .speed(0.1)
                            .range(1..=100),
                    )
                    .changed();
                ui.label(":");
                changed |= ui
                    .add(
                        egui::DragValue::new(&mut self.custom_h)
                            .speed(0.1)
                            .range(1..=100),
                    )
                    .changed();
            }

            if changed {
                let ratio = self.current_ratio();
                self.widget.set_aspect_ratio(ratio);
            }

            ui.separator();
            if ui.button("⟲").clicked() {
                self.widget.rotate_left();
                self.texture_dirty = true;
            }
            if ui.button("⟳").clicked() {
                self.widget.rotate_right();
                self.texture_dirty = true;
            }
            self.slider_degrees = i32::from(self.widget.rotation().degrees());
            let slider = ui.add(
                egui::Slider::new(&mut self.slider_degrees, 0..=360)
                    .step_by(1.0)
                    .suffix("°"),
            );
            if slider.changed() {
                self.widget.set_rotation(Rotation::new(self.slider_degrees));
                self.texture_dirty = true;
            }

            ui.separator();
            if ui
                .add_enabled(!self.exporting, egui::Button::new("Done"))
                .clicked()
            {
                self.spawn_export(ctx);
            }
        });
    }

    fn stage(&mut self, ui: &mut egui::Ui) {
        const PADDING: f32 = 20.0;
        let available = ui.available_size() - egui::vec2(PADDING * 2.0, PADDING * 2.0);
        self.widget
            .resize_stage(Size::new(available.x.max(1.0), available.y.max(1.0)));

        let stage = self.widget.stage();
        let origin = ui.cursor().min + egui::vec2(PADDING, PADDING);
        let stage_rect = egui::Rect::from_min_size(origin, egui::vec2(stage.width, stage.height));
        let response = ui.allocate_rect(stage_rect.expand(PADDING), egui::Sense::drag());
        let painter = ui.painter_at(stage_rect.expand(PADDING));

        let (Some(texture), Some(layout)) = (&self.texture, self.widget.layout().copied()) else {
            painter.text(
                stage_rect.center(),
                egui::Align2::CENTER_CENTER,
                "Loading…",
                egui::FontId::proportional(16.0),
                ui.visuals().text_color(),
            );
            return;
        };

        let image_rect = to_screen(origin, layout.raster);
        painter.image(
            texture.id(),
            image_rect,
            egui::Rect::from_min_max(egui::pos2(0.0, 0.0), egui::pos2(1.0, 1.0)),
            egui::Color32::WHITE,
        );

        // Handle Input
        let relative = |pos: egui::Pos2| Point::new(pos.x - origin.x, pos.y - origin.y);
        if response.drag_started() {
            if let Some(pos) = response.interact_pointer_pos() {
                self.widget.pointer_down(relative(pos));
            }
        }
        if response.dragged() {
            if let Some(pos) = response.interact_pointer_pos() {
                self.widget.pointer_move(relative(pos));
            }
        }
        if response.drag_stopped() {
            self.widget.pointer_up();
        }

        let Some(frame) = self.widget.frame() else {
            return;
        };
        let crop_rect = to_screen(origin, frame.as_rect());

        // Dim everything outside the frame
        let overlay_color = egui::Color32::from_black_alpha(150);
        let outer = stage_rect;
        for rect in [
            egui::Rect::from_min_max(outer.min, egui::pos2(outer.max.x, crop_rect.min.y)),
            egui::Rect::from_min_max(egui::pos2(outer.min.x, crop_rect.max.y), outer.max),
            egui::Rect::from_min_max(
                egui::pos2(outer.min.x, crop_rect.min.y),
                egui::pos2(crop_rect.min.x, crop_rect.max.y),
            ),
            egui::Rect::from_min_max(
                egui::pos2(crop_rect.max.x, crop_rect.min.y),
                egui::pos2(outer.max.x, crop_rect.max.y),
            ),
        ] {
            painter.rect_filled(rect, 0.0, overlay_color);
        }

        if let Some(outline) = &self.outline_texture {
            painter.image(
                outline.id(),
                crop_rect,
                egui::Rect::from_min_max(egui::pos2(0.0, 0.0), egui::pos2(1.0, 1.0)),
                egui::Color32::WHITE,
            );
        }

        painter.rect_stroke(crop_rect, 0.0, egui::Stroke::new(1.0, egui::Color32::WHITE));

        let active = self.widget.active_handle();
        for handle in Handle::ALL.into_iter().filter(|h| *h != Handle::Move) {
            let p = handle.anchor_on(&frame);
            let fill = if active == Some(handle) {
                egui::Color32::LIGHT_BLUE
            } else {
                egui::Color32::WHITE
            };
            painter.circle(
                egui::pos2(origin.x + p.x, origin.y + p.y),
                6.0,
                fill,
                egui::Stroke::new(1.0, egui::Color32::BLACK),
            );
        }
    }
}

impl eframe::App for CropperApp {
    fn update(&mut self, ctx: &egui::Context, _frame: &mut eframe::Frame) {
        // Handle dropped files
        let dropped = ctx.input(|i| i.raw.dropped_files.first().and_then(|f| f.path.clone()));
        if let Some(path) = dropped {
            self.open(ctx, path);
        }

        self.drain_events();
        self.load_textures(ctx);

        egui::CentralPanel::default().show(ctx, |ui| {
            self.controls(ui, ctx);
            ui.separator();

            self.stage(ui);
            if !self.started {
                // Load once the first frame has sized the stage
                self.spawn_load(ctx);
                self.started = true;
            }
        });
    }
}

fn upload(ctx: &egui::Context, name: &str, image: &DynamicImage) -> egui::TextureHandle {
    let size = [image.width() as _, image.height() as _];
    let image_buffer = image.to_rgba8();
    let pixels = image_buffer.as_flat_samples();
    let color_image = egui::ColorImage::from_rgba_unmultiplied(size, pixels.as_slice());
    ctx.load_texture(name, color_image, egui::TextureOptions::LINEAR)
}

fn to_screen(origin: egui::Pos2, rect: ScreenRect) -> egui::Rect {
    egui::Rect::from_min_size(
        origin + egui::vec2(rect.x, rect.y),
        egui::vec2(rect.width, rect.height),
    )
}

fn save_payload(payload: &ExportPayload, output: Option<&Path>) {
    let ext = payload.format.extension();
    let path = match output {
        Some(path) => Some(path.to_path_buf()),
        None => rfd::FileDialog::new()
            .add_filter("Image", &[ext])
            .set_file_name(format!("cropped.{ext}"))
            .save_file(),
    };
    let Some(path) = path else {
        return;
    };

    let result = payload
        .to_bytes()
        .map_err(anyhow::Error::from)
        .and_then(|bytes| std::fs::write(&path, bytes).map_err(anyhow::Error::from));
    match result {
        Ok(()) => info!("saved {}", path.display()),
        Err(e) => error!("Failed to save image: {e}"),
    }
}

fn main() -> anyhow::Result<()> {
    env_logger::init();
    let cli = Cli::parse();

    let mut config = CropperConfig::new(cli.src);
    config.aspect_ratio = cli.aspect_ratio;
    config.outline_src = cli.outline;
    config.mask_src = cli.mask;
    config.max_size = cli.max_size;

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?;
    let app = CropperApp::new(config, cli.output, runtime)?;

    let options = eframe::NativeOptions {
        viewport: egui::ViewportBuilder::default().with_inner_size([800.0, 600.0]),
        ..Default::default()
    };
    eframe::run_native(
        "Crop Frame",
        options,
        Box::new(|_cc| Ok(Box::new(app))),
    )
    .map_err(|e| anyhow::anyhow!("{e}"))
}
