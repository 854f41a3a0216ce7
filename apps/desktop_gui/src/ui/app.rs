use std::{borrow::Cow, fs, time::Duration};

use arboard::{Clipboard, ImageData};
use client_core::{
    mapping::{ScreenPoint, SurfaceSize},
    render::MarkerStyle,
    EngineImage, NoticeSeverity, SessionController, SessionEffect, SessionPhase, VisualOutput,
};
use crossbeam_channel::{Receiver, Sender};
use eframe::egui;
use egui::TextureHandle;
use shared::domain::InitMethod;

use crate::backend_bridge::commands::BackendCommand;
use crate::controller::events::{UiError, UiErrorCategory, UiErrorContext, UiEvent};
use crate::controller::reducer::{apply_effects, NoticeFeed};

const POINT_COLOR: egui::Color32 = egui::Color32::from_rgb(52, 101, 164);
const CENTROID_COLOR: egui::Color32 = egui::Color32::from_rgb(204, 0, 0);

#[derive(Debug, Clone)]
pub struct StartupConfig {
    pub engine_url: String,
    pub surface: SurfaceSize,
}

enum FrameTexture {
    Stale,
    Ready(TextureHandle),
    Failed,
}

pub struct KmeansApp {
    session: SessionController,
    cmd_tx: Sender<BackendCommand>,
    ui_rx: Receiver<UiEvent>,
    engine_url: String,
    status: String,
    feed: NoticeFeed,
    k_input: u32,
    frame_texture: FrameTexture,
    frames_loaded: u64,
    frames_saved: u32,
    show_notice_log: bool,
}

impl KmeansApp {
    pub fn new(
        config: StartupConfig,
        cmd_tx: Sender<BackendCommand>,
        ui_rx: Receiver<UiEvent>,
    ) -> Self {
        let session = SessionController::new(config.surface);
        let k_input = session.state().k().get();
        Self {
            session,
            cmd_tx,
            ui_rx,
            engine_url: config.engine_url,
            status: "Generate a dataset to begin".to_string(),
            feed: NoticeFeed::default(),
            k_input,
            frame_texture: FrameTexture::Stale,
            frames_loaded: 0,
            frames_saved: 0,
            show_notice_log: false,
        }
    }

    fn run_effects(&mut self, effects: Vec<SessionEffect>) {
        let applied = apply_effects(
            &mut self.session,
            effects,
            &self.cmd_tx,
            &mut self.status,
            &mut self.feed,
        );
        if applied.redraw {
            self.frame_texture = FrameTexture::Stale;
        }
    }

    fn process_ui_events(&mut self) {
        while let Ok(event) = self.ui_rx.try_recv() {
            match event {
                UiEvent::Info(message) => {
                    self.feed.push_info(message.clone());
                    self.status = message;
                }
                UiEvent::Error(err) => {
                    tracing::warn!(category = ?err.category(), "{}", err.message());
                    self.status = err.message().to_string();
                    self.feed.push_error(err);
                }
                UiEvent::EngineCompleted { intent, outcome } => {
                    let effects = self.session.complete(intent, outcome);
                    self.run_effects(effects);
                }
            }
        }
    }

    /// Uploads the latest engine frame once per change.
    fn current_texture(&mut self, ctx: &egui::Context) -> Option<TextureHandle> {
        let image = match self.session.display() {
            VisualOutput::Image(image) => image.clone(),
            _ => return None,
        };
        match &self.frame_texture {
            FrameTexture::Ready(texture) => return Some(texture.clone()),
            FrameTexture::Failed => return None,
            FrameTexture::Stale => {}
        }

        match DecodedFrame::decode(image.bytes()) {
            Ok(frame) => {
                self.frames_loaded += 1;
                let texture = ctx.load_texture(
                    format!("kmeans-frame:{}", self.frames_loaded),
                    frame.to_color_image(),
                    egui::TextureOptions::LINEAR,
                );
                self.frame_texture = FrameTexture::Ready(texture.clone());
                Some(texture)
            }
            Err(err) => {
                self.frame_texture = FrameTexture::Failed;
                self.feed.push_error(UiError::from_message(
                    UiErrorContext::General,
                    format!("Engine frame could not be decoded: {err}"),
                ));
                None
            }
        }
    }

    fn show_controls(&mut self, ui: &mut egui::Ui) {
        let idle = self.session.state().in_flight().is_none();

        ui.horizontal(|ui| {
            ui.label("Number of Clusters (k):");
            let k_response = ui.add_enabled(
                idle,
                egui::DragValue::new(&mut self.k_input).range(1..=u32::MAX),
            );
            if k_response.changed() {
                let effects = self.session.set_k(self.k_input);
                self.run_effects(effects);
                self.k_input = self.session.state().k().get();
            }

            ui.add_space(12.0);
            ui.label("Initialization Method:");
            let current = self.session.state().init_method();
            let mut selected = current;
            ui.add_enabled_ui(idle, |ui| {
                egui::ComboBox::from_id_salt("init_method")
                    .selected_text(selected.label())
                    .show_ui(ui, |ui| {
                        for method in InitMethod::ALL {
                            ui.selectable_value(&mut selected, method, method.label());
                        }
                    });
            });
            if selected != current {
                let effects = self.session.set_init_method(selected);
                self.run_effects(effects);
            }
        });

        ui.horizontal(|ui| {
            if ui
                .add_enabled(idle, egui::Button::new("Step Through KMeans"))
                .clicked()
            {
                let effects = self.session.step();
                self.run_effects(effects);
            }
            if ui
                .add_enabled(idle, egui::Button::new("Run to Convergence"))
                .clicked()
            {
                let effects = self.session.converge();
                self.run_effects(effects);
            }
            if ui
                .add_enabled(idle, egui::Button::new("Generate New Dataset"))
                .clicked()
            {
                let effects = self.session.generate_dataset();
                self.run_effects(effects);
            }
            if ui
                .add_enabled(idle, egui::Button::new("Reset Algorithm"))
                .clicked()
            {
                let effects = self.session.reset();
                self.run_effects(effects);
            }

            ui.separator();
            let has_frame = self.session.state().last_image().is_some();
            if ui
                .add_enabled(has_frame, egui::Button::new("Save frame..."))
                .clicked()
            {
                self.save_frame_as();
            }
            if ui
                .add_enabled(has_frame, egui::Button::new("Copy frame"))
                .clicked()
            {
                self.copy_frame_to_clipboard();
            }
            ui.toggle_value(&mut self.show_notice_log, "Notice log");
        });
    }

    fn show_banner(&mut self, ui: &mut egui::Ui) {
        let Some(banner) = self.feed.banner() else {
            return;
        };
        let fill = match banner.category() {
            UiErrorCategory::Validation => egui::Color32::from_rgb(92, 74, 20),
            UiErrorCategory::Engine => egui::Color32::from_rgb(110, 38, 38),
            UiErrorCategory::Transport => egui::Color32::from_rgb(96, 30, 60),
            UiErrorCategory::Unknown => egui::Color32::from_rgb(60, 60, 60),
        };
        let title = match banner.context() {
            UiErrorContext::BackendStartup => "Engine worker".to_string(),
            UiErrorContext::EngineRequest(intent) => intent.to_string(),
            UiErrorContext::ExportFrame => "Export".to_string(),
            UiErrorContext::General => "Session".to_string(),
        };
        let message = banner.message().to_string();

        let mut dismissed = false;
        egui::Frame::group(ui.style()).fill(fill).show(ui, |ui| {
            ui.horizontal(|ui| {
                ui.label(
                    egui::RichText::new(title)
                        .strong()
                        .color(egui::Color32::WHITE),
                );
                ui.label(egui::RichText::new(message).color(egui::Color32::WHITE));
                if ui.small_button("Dismiss").clicked() {
                    dismissed = true;
                }
            });
        });
        if dismissed {
            self.feed.dismiss_banner();
        }
    }

    fn show_canvas(&mut self, ui: &mut egui::Ui) {
        let texture = self.current_texture(ui.ctx());
        let size = self.session.surface_size();
        let (response, painter) =
            ui.allocate_painter(egui::vec2(size.width, size.height), egui::Sense::click());
        let rect = response.rect;
        painter.rect_filled(rect, 0.0, egui::Color32::WHITE);

        match self.session.display() {
            VisualOutput::Image(_) => {
                if let Some(texture) = &texture {
                    let target = fit_within(rect, texture.size_vec2());
                    painter.image(
                        texture.id(),
                        target,
                        egui::Rect::from_min_max(egui::pos2(0.0, 0.0), egui::pos2(1.0, 1.0)),
                        egui::Color32::WHITE,
                    );
                }
            }
            VisualOutput::Overlay(list) => {
                for (center, radius, style) in list.markers() {
                    let color = match style {
                        MarkerStyle::Point => POINT_COLOR,
                        MarkerStyle::Centroid => CENTROID_COLOR,
                    };
                    painter.circle_filled(rect.min + egui::vec2(center.x, center.y), radius, color);
                }
            }
            VisualOutput::Empty => {
                painter.text(
                    rect.center(),
                    egui::Align2::CENTER_CENTER,
                    "Generate a dataset to begin",
                    egui::FontId::proportional(16.0),
                    egui::Color32::GRAY,
                );
            }
        }
        painter.rect_stroke(
            rect,
            0.0,
            egui::Stroke::new(1.0, egui::Color32::GRAY),
            egui::StrokeKind::Inside,
        );

        if !self.session.accepts_clicks() {
            return;
        }
        let response = response.on_hover_cursor(egui::CursorIcon::Crosshair);
        if response.clicked() {
            if let Some(pos) = response.interact_pointer_pos() {
                let local = pos - rect.min;
                let effects = self.session.place_centroid(ScreenPoint::new(local.x, local.y));
                self.run_effects(effects);
            }
        }
    }

    fn show_status_bar(&self, ctx: &egui::Context) {
        let state = self.session.state();
        egui::TopBottomPanel::bottom("status_bar").show(ctx, |ui| {
            ui.horizontal(|ui| {
                ui.label(format!("Phase: {}", state.phase().label()));
                if state.phase() == SessionPhase::CollectingCentroids {
                    ui.separator();
                    ui.label(format!(
                        "Centroids: {}/{}",
                        state.centroids().len(),
                        state.k()
                    ));
                }
                if let Some(intent) = state.in_flight() {
                    ui.separator();
                    ui.spinner();
                    ui.label(format!("Waiting on {intent}"));
                }
                ui.separator();
                ui.label(&self.status);
            });
        });
    }

    fn show_notice_log(&mut self, ctx: &egui::Context) {
        if !self.show_notice_log {
            return;
        }
        let feed = &self.feed;
        egui::Window::new("Notice log")
            .open(&mut self.show_notice_log)
            .default_width(420.0)
            .show(ctx, |ui| {
                egui::ScrollArea::vertical()
                    .stick_to_bottom(true)
                    .show(ui, |ui| {
                        for entry in feed.entries() {
                            ui.horizontal(|ui| {
                                ui.label(
                                    egui::RichText::new(entry.at.format("%H:%M:%S").to_string())
                                        .monospace()
                                        .weak(),
                                );
                                ui.colored_label(severity_color(entry.severity), &entry.text);
                            });
                        }
                    });
            });
    }

    fn save_frame_as(&mut self) {
        let Some(image) = self.session.state().last_image().cloned() else {
            return;
        };
        let suggested_name = frame_file_name(self.frames_saved + 1, &image);
        if let Some(path) = rfd::FileDialog::new()
            .set_file_name(&suggested_name)
            .save_file()
        {
            match fs::write(&path, image.bytes()) {
                Ok(()) => {
                    self.frames_saved += 1;
                    self.status = format!("Saved frame to {}", path.display());
                    self.feed.push_info(self.status.clone());
                }
                Err(err) => self.feed.push_error(UiError::from_message(
                    UiErrorContext::ExportFrame,
                    format!("Failed to save frame: {err}"),
                )),
            }
        }
    }

    fn copy_frame_to_clipboard(&mut self) {
        let Some(image) = self.session.state().last_image() else {
            return;
        };
        let copied = DecodedFrame::decode(image.bytes()).and_then(|frame| {
            Clipboard::new()
                .and_then(|mut clipboard| clipboard.set_image(frame.into_clipboard_image()))
                .map_err(|err| err.to_string())
        });
        match copied {
            Ok(()) => self.status = "Copied frame to clipboard".to_string(),
            Err(err) => self.feed.push_error(UiError::from_message(
                UiErrorContext::ExportFrame,
                format!("Failed to copy frame: {err}"),
            )),
        }
    }
}

impl eframe::App for KmeansApp {
    fn update(&mut self, ctx: &egui::Context, _frame: &mut eframe::Frame) {
        self.process_ui_events();

        egui::TopBottomPanel::top("controls").show(ctx, |ui| {
            ui.horizontal(|ui| {
                ui.heading("KMeans Clustering Algorithm");
                ui.label(egui::RichText::new(&self.engine_url).weak());
            });
            self.show_controls(ui);
            ui.add_space(4.0);
        });
        self.show_status_bar(ctx);

        egui::CentralPanel::default().show(ctx, |ui| {
            self.show_banner(ui);
            egui::ScrollArea::both().show(ui, |ui| {
                self.show_canvas(ui);
            });
        });
        self.show_notice_log(ctx);

        if self.session.state().in_flight().is_some() {
            ctx.request_repaint_after(Duration::from_millis(16));
        } else {
            ctx.request_repaint_after(Duration::from_millis(100));
        }
    }
}

fn severity_color(severity: NoticeSeverity) -> egui::Color32 {
    match severity {
        NoticeSeverity::Info => egui::Color32::LIGHT_GRAY,
        NoticeSeverity::Warning => egui::Color32::from_rgb(230, 180, 60),
        NoticeSeverity::Error => egui::Color32::from_rgb(230, 90, 90),
    }
}

/// Largest rect with the texture's aspect ratio centered inside `bounds`.
fn fit_within(bounds: egui::Rect, texture_size: egui::Vec2) -> egui::Rect {
    if texture_size.x <= 0.0 || texture_size.y <= 0.0 {
        return bounds;
    }
    let scale = (bounds.width() / texture_size.x).min(bounds.height() / texture_size.y);
    egui::Rect::from_center_size(bounds.center(), texture_size * scale)
}

fn frame_file_name(index: u32, image: &EngineImage) -> String {
    let extension = match image.content_type() {
        Some(ct) if ct.contains("jpeg") || ct.contains("jpg") => "jpg",
        Some(ct) if ct.contains("gif") => "gif",
        Some(ct) if ct.contains("webp") => "webp",
        _ => "png",
    };
    format!("frame_{index:03}.{extension}")
}

/// An engine frame decoded once to unmultiplied RGBA.
struct DecodedFrame {
    size: [usize; 2],
    rgba: Vec<u8>,
}

impl DecodedFrame {
    fn decode(bytes: &[u8]) -> Result<Self, String> {
        let rgba = image::load_from_memory(bytes)
            .map_err(|err| err.to_string())?
            .into_rgba8();
        Ok(Self {
            size: [rgba.width() as usize, rgba.height() as usize],
            rgba: rgba.into_raw(),
        })
    }

    fn to_color_image(&self) -> egui::ColorImage {
        egui::ColorImage::from_rgba_unmultiplied(self.size, &self.rgba)
    }

    fn into_clipboard_image(self) -> ImageData<'static> {
        let [width, height] = self.size;
        ImageData {
            width,
            height,
            bytes: Cow::Owned(self.rgba),
        }
    }
}
